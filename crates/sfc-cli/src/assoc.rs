//! The `assoc` command: walk the collected graph and report the assets
//! associated with the seed domains through their registration records.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use clap::Args;
use colored::Colorize;
use sfc_core::assoc::get_associations;
use sfc_core::config::Config;
use sfc_core::graph::{GraphStore, InMemoryGraph, StoredAsset};
use sfc_core::model::{Asset, RelationLabel};
use std::path::PathBuf;
use tracing::warn;

/// Layout for the `-since` flag, zone token included.
pub const TIME_FORMAT: &str = "01/02 15:04:05 2006 MST";

const NAIVE_FORMAT: &str = "%m/%d %H:%M:%S %Y";

/// Arguments for the `assoc` command.
#[derive(Args, Debug)]
pub struct AssocArgs {
    /// Domain names (can be used multiple times)
    #[arg(short = 'd', long = "domain", value_name = "DOMAIN")]
    pub domains: Vec<String>,

    /// Path to a file providing registered domain names, one per line
    #[arg(long = "df", value_name = "FILE")]
    pub domains_file: Option<PathBuf>,

    /// Path to the YAML configuration file
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Path to the directory containing the graph database
    #[arg(long = "dir", value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Exclude all assets discovered before this time
    /// (format: 01/02 15:04:05 2006 MST, interpreted as UTC)
    #[arg(long = "since", value_name = "TIME")]
    pub since: Option<String>,

    /// Show additional information about the associated assets
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Disable all output during execution
    #[arg(long = "silent")]
    pub silent: bool,

    /// Disable colorized output
    #[arg(long = "nocolor")]
    pub nocolor: bool,
}

/// Runs the command, returning the process exit code.
pub fn run(args: AssocArgs) -> i32 {
    if args.nocolor {
        colored::control::set_override(false);
    }

    match execute(args) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("{}", format!("{err:#}").red());
            1
        }
    }
}

fn execute(args: AssocArgs) -> Result<()> {
    let since = args
        .since
        .as_deref()
        .map(parse_since)
        .transpose()
        .with_context(|| format!("the time value is not in the {TIME_FORMAT} format"))?;

    let mut domains = args.domains.clone();
    if let Some(path) = &args.domains_file {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to parse the domain names file {}", path.display()))?;
        domains.extend(
            contents
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(String::from),
        );
    }

    let config = match &args.config {
        Some(path) => Config::load(path).context("failed to load the configuration file")?,
        None => Config::default(),
    };
    if domains.is_empty() {
        domains = config.scope.domains.clone();
    }
    if domains.is_empty() {
        return Err(anyhow!("no root domain names were provided"));
    }

    let dir = args
        .dir
        .clone()
        .or_else(|| config.dir.clone())
        .ok_or_else(|| anyhow!("no graph database directory was provided"))?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start the runtime")?;
    runtime.block_on(async move {
        let graph =
            InMemoryGraph::open(&dir).map_err(|e| anyhow!("failed to connect with the database: {e}"))?;

        for name in &domains {
            let associations = get_associations(&graph, name, since)
                .await
                .map_err(|e| anyhow!("association query failed for {name}: {e}"))?;

            for (i, assoc) in associations.iter().enumerate() {
                if args.silent {
                    continue;
                }
                if i != 0 {
                    println!();
                }
                print_association(&graph, assoc, since, args.verbose).await;
            }
        }
        Ok(())
    })
}

async fn print_association(
    graph: &InMemoryGraph,
    assoc: &StoredAsset,
    since: Option<DateTime<Utc>>,
    verbose: bool,
) {
    let contact_rel = match &assoc.asset {
        Asset::DomainRecord(record) => {
            println!("{}", record.domain.green());
            if verbose {
                println!("{}{}", "Name: ".blue(), record.name.green());
                println!("{}{}", "Expiration: ".blue(), record.expiration_date.green());
            }
            RelationLabel::RegistrantContact
        }
        Asset::AutnumRecord(record) => {
            println!("{}", record.handle.green());
            if verbose {
                println!("{}{}", "Name: ".blue(), record.name.green());
                let status = record.status.first().map(String::as_str).unwrap_or("");
                println!("{}{}", "Status: ".blue(), status.green());
                println!("{}{}", "Updated: ".blue(), record.updated_date.green());
            }
            RelationLabel::Registrant
        }
        Asset::IpNetRecord(record) => {
            println!("{}", record.cidr.to_string().green());
            if verbose {
                println!("{}{}", "Name: ".blue(), record.name.green());
                let status = record.status.first().map(String::as_str).unwrap_or("");
                println!("{}{}", "Status: ".blue(), status.green());
                println!("{}{}", "Updated: ".blue(), record.updated_date.green());
            }
            RelationLabel::Registrant
        }
        other => {
            println!("{}", other.key().green());
            return;
        }
    };

    if verbose {
        println!("{}", "Registrant: ".blue());
        print_contact_info(graph, assoc, contact_rel, since).await;
        println!();
    }
}

async fn print_contact_info(
    graph: &InMemoryGraph,
    assoc: &StoredAsset,
    contact_rel: RelationLabel,
    since: Option<DateTime<Utc>>,
) {
    let contact = match graph.outgoing_relations(assoc.id, since, Some(contact_rel)).await {
        Ok(rels) if !rels.is_empty() => match graph.find_by_id(rels[0].to_id, since).await {
            Ok(Some(contact)) => contact,
            _ => return,
        },
        _ => return,
    };

    for label in [
        RelationLabel::Person,
        RelationLabel::Organization,
        RelationLabel::Location,
        RelationLabel::Phone,
        RelationLabel::Email,
    ] {
        let Ok(rels) = graph.outgoing_relations(contact.id, since, Some(label)).await else {
            continue;
        };
        for rel in rels {
            if let Ok(Some(target)) = graph.find_by_id(rel.to_id, since).await {
                println!(
                    "{}{}{}",
                    target.asset.asset_type().to_string().blue(),
                    ": ".blue(),
                    target.asset.key().green()
                );
            }
        }
    }
}

/// Parses a `-since` value in the fixed layout. The trailing zone token
/// is required for layout compatibility but values are interpreted as
/// UTC.
pub fn parse_since(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    let (naive_part, zone) = value
        .rsplit_once(' ')
        .ok_or_else(|| anyhow!("missing time zone token"))?;

    let naive = NaiveDateTime::parse_from_str(naive_part.trim(), NAIVE_FORMAT)?;
    if !zone.eq_ignore_ascii_case("UTC") {
        warn!(zone, "time zone token ignored; since values are UTC");
    }
    Ok(naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use sfc_core::model::{DomainRecord, Fqdn};

    #[test]
    fn test_parse_since() {
        let parsed = parse_since("06/15 13:45:30 2024 UTC").unwrap();
        assert_eq!(parsed.month(), 6);
        assert_eq!(parsed.day(), 15);
        assert_eq!(parsed.hour(), 13);
        assert_eq!(parsed.minute(), 45);
        assert_eq!(parsed.second(), 30);
        assert_eq!(parsed.year(), 2024);
    }

    #[test]
    fn test_parse_since_rejects_bad_layout() {
        assert!(parse_since("2024-06-15T13:45:30Z").is_err());
        assert!(parse_since("06/15 13:45:30").is_err());
        assert!(parse_since("").is_err());
    }

    #[tokio::test]
    async fn test_graph_round_trip_through_snapshot_dir() {
        let dir = tempfile::tempdir().unwrap();

        let graph = InMemoryGraph::new();
        let fqdn = graph
            .create_asset(Asset::Fqdn(Fqdn::new("example.com")))
            .await
            .unwrap();
        let record = graph
            .create_asset(Asset::DomainRecord(DomainRecord {
                domain: "example.com".to_string(),
                ..Default::default()
            }))
            .await
            .unwrap();
        graph
            .create_relation(fqdn.id, record.id, RelationLabel::Registration)
            .await
            .unwrap();
        graph.save(dir.path()).await.unwrap();

        let reopened = InMemoryGraph::open(dir.path()).unwrap();
        let assocs = get_associations(&reopened, "example.com", None).await.unwrap();
        // The registration root itself is not an association.
        assert!(assocs.is_empty());
        assert_eq!(reopened.asset_count().await, 2);
    }
}
