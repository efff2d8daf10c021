//! Session scope: decides which discovered assets belong to the
//! organization under assessment.
//!
//! Scope is seeded with registered domains, netblocks, and ASNs, plus
//! allow/deny keyword lists. Verdicts carry a confidence in [0, 100];
//! zero confidence means rejected. Verdicts are memoized for the lifetime
//! of the session so a given input always yields the same answer.

use crate::config::ScopeConfig;
use crate::graph::GraphStore;
use crate::model::{Asset, AssetType, Autnum, Fqdn, RelationLabel};
use ipnet::IpNet;
use moka::future::Cache;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Confidence for an exact seed match.
const CONFIDENCE_SEED: u8 = 100;
/// Confidence for containment under a seed (subdomain, announced address).
const CONFIDENCE_DERIVED: u8 = 80;
/// Confidence for allow-keyword and registration-path matches.
const CONFIDENCE_ASSOCIATED: u8 = 50;

/// Relation labels that connect assets through registration data.
const REGISTRATION_LABELS: [RelationLabel; 9] = [
    RelationLabel::Registration,
    RelationLabel::Registrant,
    RelationLabel::RegistrantContact,
    RelationLabel::AssociatedWith,
    RelationLabel::Person,
    RelationLabel::Organization,
    RelationLabel::Location,
    RelationLabel::Phone,
    RelationLabel::Email,
];

/// Scope for a discovery session.
pub struct Scope {
    domains: Vec<String>,
    netblocks: Vec<IpNet>,
    asns: Vec<u32>,
    allow: Vec<String>,
    deny: Vec<String>,
    max_depth: usize,
    graph: Arc<dyn GraphStore>,
    verdicts: Cache<String, Option<(Asset, u8)>>,
}

impl Scope {
    /// Builds a scope from seed configuration and a graph handle.
    pub fn new(config: &ScopeConfig, graph: Arc<dyn GraphStore>) -> Self {
        let domains = config
            .domains
            .iter()
            .map(|d| d.trim().trim_end_matches('.').to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        Self {
            domains,
            netblocks: config.netblocks.clone(),
            asns: config.asns.clone(),
            allow: config.allow.iter().map(|k| k.to_lowercase()).collect(),
            deny: config.deny.iter().map(|k| k.to_lowercase()).collect(),
            max_depth: config.max_depth,
            graph,
            verdicts: Cache::new(100_000),
        }
    }

    /// Returns the seed domain names.
    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    /// Decides whether `asset` is in scope.
    ///
    /// Returns the canonical form of the asset and a confidence in
    /// [1, 100] when accepted, or `None` when rejected. `depth` extends
    /// the registration-path allowance for ancillary assets; event
    /// handlers pass 0. When several rules match, the highest confidence
    /// wins.
    pub async fn in_scope(&self, asset: &Asset, depth: usize) -> Option<(Asset, u8)> {
        let cache_key = format!("{}:{}:{}", asset.asset_type(), asset.key(), depth);
        if let Some(verdict) = self.verdicts.get(&cache_key).await {
            return verdict;
        }

        let verdict = self.evaluate(asset, depth).await;
        if verdict.is_none() {
            debug!(asset = %asset.key(), kind = %asset.asset_type(), "asset rejected by scope");
        }
        self.verdicts.insert(cache_key, verdict.clone()).await;
        verdict
    }

    async fn evaluate(&self, asset: &Asset, depth: usize) -> Option<(Asset, u8)> {
        match asset {
            Asset::Fqdn(fqdn) => self.evaluate_fqdn(&fqdn.name),
            Asset::IpAddress(ip) => self
                .evaluate_address(ip.address)
                .await
                .map(|conf| (asset.clone(), conf)),
            Asset::Netblock(nb) => self
                .evaluate_netblock(&nb.cidr)
                .map(|conf| (asset.clone(), conf)),
            Asset::Autnum(autnum) => self
                .evaluate_autnum(autnum.number)
                .map(|conf| (asset.clone(), conf)),
            Asset::DomainRecord(record) => self
                .evaluate_fqdn(&record.domain)
                .map(|(_, conf)| (asset.clone(), conf)),
            Asset::AutnumRecord(record) => match self.evaluate_autnum(record.number) {
                Some(conf) => Some((asset.clone(), conf)),
                None => self
                    .evaluate_reachability(asset, self.max_depth + depth)
                    .await
                    .map(|conf| (asset.clone(), conf)),
            },
            Asset::IpNetRecord(record) => match self.evaluate_netblock(&record.cidr) {
                Some(conf) => Some((asset.clone(), conf)),
                None => self
                    .evaluate_reachability(asset, self.max_depth + depth)
                    .await
                    .map(|conf| (asset.clone(), conf)),
            },
            Asset::Source(_) => Some((asset.clone(), CONFIDENCE_SEED)),
            _ => self
                .evaluate_reachability(asset, self.max_depth + depth)
                .await
                .map(|conf| (asset.clone(), conf)),
        }
    }

    fn evaluate_fqdn(&self, name: &str) -> Option<(Asset, u8)> {
        let name = name.trim().trim_end_matches('.').to_lowercase();
        if name.is_empty() || self.denied(&name) {
            return None;
        }

        let mut best: Option<u8> = None;
        for seed in &self.domains {
            if name == *seed {
                best = Some(best.unwrap_or(0).max(CONFIDENCE_SEED));
            } else if name.ends_with(&format!(".{seed}")) {
                best = Some(best.unwrap_or(0).max(CONFIDENCE_DERIVED));
            }
        }
        if best.is_none() && self.allow.iter().any(|kw| name.contains(kw.as_str())) {
            best = Some(CONFIDENCE_ASSOCIATED);
        }

        best.map(|conf| (Asset::Fqdn(Fqdn::new(name)), conf))
    }

    async fn evaluate_address(&self, address: IpAddr) -> Option<u8> {
        if self.netblocks.iter().any(|nb| nb.contains(&address)) {
            return Some(CONFIDENCE_SEED);
        }

        // Fall back to the graph: is the address inside a netblock
        // announced by one of the seed autonomous systems?
        for asn in &self.asns {
            let autnums = self
                .graph
                .find_by_content(&Asset::Autnum(Autnum { number: *asn }), None)
                .await
                .ok()?;
            for autnum in autnums {
                let announced = self
                    .graph
                    .outgoing_relations(autnum.id, None, Some(RelationLabel::Announces))
                    .await
                    .ok()?;
                for rel in announced {
                    if let Ok(Some(stored)) = self.graph.find_by_id(rel.to_id, None).await {
                        if let Asset::Netblock(nb) = &stored.asset {
                            if nb.cidr.contains(&address) {
                                return Some(CONFIDENCE_DERIVED);
                            }
                        }
                    }
                }
            }
        }
        None
    }

    fn evaluate_netblock(&self, cidr: &IpNet) -> Option<u8> {
        let mut best: Option<u8> = None;
        for seed in &self.netblocks {
            if seed == cidr {
                best = Some(best.unwrap_or(0).max(CONFIDENCE_SEED));
            } else if seed.contains(cidr) || cidr.contains(seed) {
                best = Some(best.unwrap_or(0).max(CONFIDENCE_DERIVED));
            }
        }
        best
    }

    fn evaluate_autnum(&self, number: u32) -> Option<u8> {
        self.asns.contains(&number).then_some(CONFIDENCE_SEED)
    }

    /// Checks whether an ancillary asset reaches a seed domain through at
    /// most `max_depth` registration edges, walking outward from the
    /// seeds with an explicit worklist.
    async fn evaluate_reachability(&self, candidate: &Asset, max_depth: usize) -> Option<u8> {
        let target = (candidate.asset_type(), candidate.key());
        let mut visited: HashSet<Uuid> = HashSet::new();
        let mut frontier: Vec<Uuid> = Vec::new();

        for seed in &self.domains {
            let fqdns = self
                .graph
                .find_by_content(&Asset::Fqdn(Fqdn::new(seed.clone())), None)
                .await
                .ok()?;
            for stored in fqdns {
                if visited.insert(stored.id) {
                    frontier.push(stored.id);
                }
            }
        }

        for _ in 0..max_depth {
            if frontier.is_empty() {
                break;
            }
            let mut next = Vec::new();
            for id in frontier.drain(..) {
                for label in REGISTRATION_LABELS {
                    let rels = self
                        .graph
                        .outgoing_relations(id, None, Some(label))
                        .await
                        .ok()?;
                    for rel in rels {
                        if !visited.insert(rel.to_id) {
                            continue;
                        }
                        if let Ok(Some(stored)) = self.graph.find_by_id(rel.to_id, None).await {
                            if (stored.asset.asset_type(), stored.asset.key()) == target {
                                return Some(CONFIDENCE_ASSOCIATED);
                            }
                            next.push(stored.id);
                        }
                    }
                }
            }
            frontier = next;
        }
        None
    }

    fn denied(&self, name: &str) -> bool {
        self.deny.iter().any(|kw| name.contains(kw.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScopeConfig;
    use crate::graph::InMemoryGraph;
    use crate::model::{Netblock, Organization};

    fn scope_with(config: ScopeConfig) -> (Scope, Arc<InMemoryGraph>) {
        let graph = Arc::new(InMemoryGraph::new());
        let scope = Scope::new(&config, graph.clone() as Arc<dyn GraphStore>);
        (scope, graph)
    }

    fn seed_domains(domains: &[&str]) -> ScopeConfig {
        ScopeConfig {
            domains: domains.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_fqdn_seed_and_subdomain() {
        let (scope, _graph) = scope_with(seed_domains(&["example.com"]));

        let (canonical, conf) = scope
            .in_scope(&Asset::Fqdn(Fqdn::new("Example.COM")), 0)
            .await
            .unwrap();
        assert_eq!(conf, CONFIDENCE_SEED);
        assert_eq!(canonical.key(), "example.com");

        let (_, conf) = scope
            .in_scope(&Asset::Fqdn(Fqdn::new("www.api.example.com")), 0)
            .await
            .unwrap();
        assert_eq!(conf, CONFIDENCE_DERIVED);
    }

    #[tokio::test]
    async fn test_fqdn_rejects_lookalike_suffix() {
        let (scope, _graph) = scope_with(seed_domains(&["example.com"]));

        // Suffix match must align on a label boundary.
        assert!(scope
            .in_scope(&Asset::Fqdn(Fqdn::new("notexample.com")), 0)
            .await
            .is_none());
        assert!(scope
            .in_scope(&Asset::Fqdn(Fqdn::new("unrelated.org")), 0)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_deny_keyword_wins() {
        let mut config = seed_domains(&["example.com"]);
        config.deny = vec!["internal".to_string()];
        let (scope, _graph) = scope_with(config);

        assert!(scope
            .in_scope(&Asset::Fqdn(Fqdn::new("internal.example.com")), 0)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_allow_keyword_admits_foreign_name() {
        let mut config = seed_domains(&["example.com"]);
        config.allow = vec!["examplecorp".to_string()];
        let (scope, _graph) = scope_with(config);

        let (_, conf) = scope
            .in_scope(&Asset::Fqdn(Fqdn::new("examplecorp.net")), 0)
            .await
            .unwrap();
        assert_eq!(conf, CONFIDENCE_ASSOCIATED);
    }

    #[tokio::test]
    async fn test_address_in_seed_netblock() {
        let config = ScopeConfig {
            netblocks: vec!["198.51.100.0/24".parse().unwrap()],
            ..Default::default()
        };
        let (scope, _graph) = scope_with(config);

        let inside = Asset::IpAddress(crate::model::IpAddress::new(
            "198.51.100.42".parse().unwrap(),
        ));
        assert!(scope.in_scope(&inside, 0).await.is_some());

        let outside = Asset::IpAddress(crate::model::IpAddress::new("203.0.113.9".parse().unwrap()));
        assert!(scope.in_scope(&outside, 0).await.is_none());
    }

    #[tokio::test]
    async fn test_address_announced_by_seed_asn() {
        let config = ScopeConfig {
            asns: vec![64496],
            ..Default::default()
        };
        let (scope, graph) = scope_with(config);

        let autnum = graph
            .create_asset(Asset::Autnum(Autnum { number: 64496 }))
            .await
            .unwrap();
        let netblock = graph
            .create_asset(Asset::Netblock(Netblock {
                cidr: "203.0.113.0/24".parse().unwrap(),
            }))
            .await
            .unwrap();
        graph
            .create_relation(autnum.id, netblock.id, RelationLabel::Announces)
            .await
            .unwrap();

        let addr = Asset::IpAddress(crate::model::IpAddress::new("203.0.113.7".parse().unwrap()));
        let (_, conf) = scope.in_scope(&addr, 0).await.unwrap();
        assert_eq!(conf, CONFIDENCE_DERIVED);
    }

    #[tokio::test]
    async fn test_netblock_overlap() {
        let config = ScopeConfig {
            netblocks: vec!["198.51.100.0/24".parse().unwrap()],
            ..Default::default()
        };
        let (scope, _graph) = scope_with(config);

        let narrower = Asset::Netblock(Netblock {
            cidr: "198.51.100.128/25".parse().unwrap(),
        });
        let (_, conf) = scope.in_scope(&narrower, 0).await.unwrap();
        assert_eq!(conf, CONFIDENCE_DERIVED);

        let disjoint = Asset::Netblock(Netblock {
            cidr: "203.0.113.0/24".parse().unwrap(),
        });
        assert!(scope.in_scope(&disjoint, 0).await.is_none());
    }

    #[tokio::test]
    async fn test_ancillary_reachable_through_registration() {
        let (scope, graph) = scope_with(seed_domains(&["example.com"]));

        let fqdn = graph
            .create_asset(Asset::Fqdn(Fqdn::new("example.com")))
            .await
            .unwrap();
        let record = graph
            .create_asset(Asset::DomainRecord(crate::model::DomainRecord {
                domain: "example.com".to_string(),
                ..Default::default()
            }))
            .await
            .unwrap();
        let org = graph
            .create_asset(Asset::Organization(Organization {
                name: "Example LLC".to_string(),
            }))
            .await
            .unwrap();
        graph
            .create_relation(fqdn.id, record.id, RelationLabel::Registration)
            .await
            .unwrap();
        graph
            .create_relation(record.id, org.id, RelationLabel::Organization)
            .await
            .unwrap();

        let candidate = Asset::Organization(Organization {
            name: "Example LLC".to_string(),
        });
        let (_, conf) = scope.in_scope(&candidate, 0).await.unwrap();
        assert_eq!(conf, CONFIDENCE_ASSOCIATED);

        let stranger = Asset::Organization(Organization {
            name: "Unrelated Inc".to_string(),
        });
        assert!(scope.in_scope(&stranger, 0).await.is_none());
    }

    #[tokio::test]
    async fn test_verdicts_are_stable_within_session() {
        let (scope, graph) = scope_with(seed_domains(&["example.com"]));

        let candidate = Asset::Organization(Organization {
            name: "Example LLC".to_string(),
        });
        // First verdict: unreachable, rejected.
        assert!(scope.in_scope(&candidate, 0).await.is_none());

        // Adding the registration path later must not change the cached
        // verdict for identical inputs.
        let fqdn = graph
            .create_asset(Asset::Fqdn(Fqdn::new("example.com")))
            .await
            .unwrap();
        let org = graph.create_asset(candidate.clone()).await.unwrap();
        graph
            .create_relation(fqdn.id, org.id, RelationLabel::Registration)
            .await
            .unwrap();

        assert!(scope.in_scope(&candidate, 0).await.is_none());
    }
}
