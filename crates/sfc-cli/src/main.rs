//! Surfacer CLI.
//!
//! Command-line interface for the Surfacer attack-surface mapping
//! engine.

use clap::{Parser, Subcommand};

mod assoc;

use assoc::AssocArgs;

/// Long flags accepted in single-dash form (`-config`, `-since`, ...),
/// matching the traditional flag surface of the original tooling. The
/// GNU-style double-dash forms work as well.
const SINGLE_DASH_FLAGS: &[&str] = &[
    "df", "config", "dir", "since", "silent", "nocolor", "verbose", "help",
];

#[derive(Parser)]
#[command(name = "surfacer")]
#[command(version)]
#[command(about = "Attack-surface discovery and asset graph analysis", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze the collected graph to identify assets associated with
    /// the seed domains
    Assoc(AssocArgs),
}

/// Rewrites single-dash long flags (`-config`, `-since=...`) into the
/// double-dash form the parser defines. Short flags, values, and
/// anything already double-dashed pass through untouched.
fn normalize_flags<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    args.into_iter()
        .map(|arg| {
            let Some(rest) = arg.strip_prefix('-') else {
                return arg;
            };
            if rest.starts_with('-') {
                return arg;
            }
            let name = rest.split('=').next().unwrap_or(rest);
            if SINGLE_DASH_FLAGS.contains(&name) {
                format!("-{arg}")
            } else {
                arg
            }
        })
        .collect()
}

fn main() {
    let cli = match Cli::try_parse_from(normalize_flags(std::env::args())) {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    sfc_observability::init_logging();

    let exit_code = match cli.command {
        Commands::Assoc(args) => assoc::run(args),
    };
    std::process::exit(exit_code);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn test_single_dash_long_flags_are_normalized() {
        let normalized = normalize_flags(argv(&[
            "surfacer", "assoc", "-config", "c.yml", "-dir", "/tmp/g", "-nocolor", "-silent",
        ]));
        assert_eq!(
            normalized,
            argv(&[
                "surfacer", "assoc", "--config", "c.yml", "--dir", "/tmp/g", "--nocolor",
                "--silent",
            ])
        );
    }

    #[test]
    fn test_short_flags_values_and_double_dash_untouched() {
        let normalized = normalize_flags(argv(&[
            "surfacer",
            "assoc",
            "-d",
            "example.com",
            "-v",
            "--since",
            "01/02 15:04:05 2006 UTC",
            "config",
        ]));
        assert_eq!(
            normalized,
            argv(&[
                "surfacer",
                "assoc",
                "-d",
                "example.com",
                "-v",
                "--since",
                "01/02 15:04:05 2006 UTC",
                "config",
            ])
        );
    }

    #[test]
    fn test_attached_value_form_is_normalized() {
        let normalized = normalize_flags(argv(&["surfacer", "assoc", "-since=01/02 15:04:05 2006 UTC"]));
        assert_eq!(normalized[2], "--since=01/02 15:04:05 2006 UTC");
    }

    #[test]
    fn test_spec_surface_parses() {
        let cli = Cli::try_parse_from(normalize_flags(argv(&[
            "surfacer",
            "assoc",
            "-d",
            "example.com",
            "-d",
            "example.net",
            "-df",
            "domains.txt",
            "-config",
            "config.yml",
            "-dir",
            "/tmp/graph",
            "-since",
            "06/15 13:45:30 2024 UTC",
            "-v",
            "-silent",
            "-nocolor",
        ])))
        .unwrap();

        let Commands::Assoc(args) = cli.command;
        assert_eq!(args.domains, vec!["example.com", "example.net"]);
        assert_eq!(args.domains_file.as_deref().unwrap().to_str(), Some("domains.txt"));
        assert_eq!(args.config.as_deref().unwrap().to_str(), Some("config.yml"));
        assert_eq!(args.dir.as_deref().unwrap().to_str(), Some("/tmp/graph"));
        assert_eq!(args.since.as_deref(), Some("06/15 13:45:30 2024 UTC"));
        assert!(args.verbose);
        assert!(args.silent);
        assert!(args.nocolor);
    }
}
