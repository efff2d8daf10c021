//! Association engine.
//!
//! Computes the set of assets associated with a seed domain by walking
//! its registration records and then the transitive closure of
//! `associated_with` edges. The traversal is read-only, breadth-first
//! with an explicit worklist, and deterministic: each frontier is visited
//! in ascending asset-id order.

use crate::graph::{GraphResult, GraphStore, StoredAsset};
use crate::model::{Asset, Fqdn, RelationLabel};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

/// Returns the assets associated with `domain`, excluding the
/// registration roots themselves.
///
/// The visited set only grows and the graph is finite, so the walk
/// terminates even on cyclic `associated_with` structures.
pub async fn get_associations(
    graph: &dyn GraphStore,
    domain: &str,
    since: Option<DateTime<Utc>>,
) -> GraphResult<Vec<StoredAsset>> {
    let fqdns = graph
        .find_by_content(&Asset::Fqdn(Fqdn::new(domain)), since)
        .await?;
    if fqdns.is_empty() {
        return Ok(Vec::new());
    }

    // Registration roots: the records the seed's FQDNs point at.
    let mut roots = Vec::new();
    for fqdn in &fqdns {
        let rels = graph
            .outgoing_relations(fqdn.id, since, Some(RelationLabel::Registration))
            .await?;
        for rel in rels {
            if let Some(target) = graph.find_by_id(rel.to_id, since).await? {
                roots.push(target);
            }
        }
    }

    let mut visited: HashSet<Uuid> = roots.iter().map(|a| a.id).collect();
    let mut results = Vec::new();
    let mut frontier = roots;

    while !frontier.is_empty() {
        frontier.sort_by_key(|a| a.id);
        let mut next = Vec::new();

        for asset in &frontier {
            let rels = graph
                .outgoing_relations(asset.id, since, Some(RelationLabel::AssociatedWith))
                .await?;
            for rel in rels {
                if !visited.insert(rel.to_id) {
                    continue;
                }
                if let Some(target) = graph.find_by_id(rel.to_id, since).await? {
                    results.push(target.clone());
                    next.push(target);
                }
            }
        }
        frontier = next;
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::InMemoryGraph;
    use crate::model::DomainRecord;

    async fn domain_record(graph: &InMemoryGraph, domain: &str) -> StoredAsset {
        graph
            .create_asset(Asset::DomainRecord(DomainRecord {
                domain: domain.to_string(),
                ..Default::default()
            }))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_closure_excludes_root_and_survives_cycles() {
        let graph = InMemoryGraph::new();

        let fqdn = graph
            .create_asset(Asset::Fqdn(Fqdn::new("example.com")))
            .await
            .unwrap();
        let d1 = domain_record(&graph, "example.com").await;
        let d2 = domain_record(&graph, "example.net").await;
        let d3 = domain_record(&graph, "example.org").await;

        graph
            .create_relation(fqdn.id, d1.id, RelationLabel::Registration)
            .await
            .unwrap();
        graph
            .create_relation(d1.id, d2.id, RelationLabel::AssociatedWith)
            .await
            .unwrap();
        graph
            .create_relation(d2.id, d3.id, RelationLabel::AssociatedWith)
            .await
            .unwrap();
        // Close the cycle back to the registration root.
        graph
            .create_relation(d3.id, d1.id, RelationLabel::AssociatedWith)
            .await
            .unwrap();

        let assocs = get_associations(&graph, "example.com", None).await.unwrap();
        let keys: Vec<String> = assocs.iter().map(|a| a.asset.key()).collect();
        assert_eq!(keys, vec!["example.net", "example.org"]);
    }

    #[tokio::test]
    async fn test_unknown_domain_yields_nothing() {
        let graph = InMemoryGraph::new();
        let assocs = get_associations(&graph, "missing.example", None)
            .await
            .unwrap();
        assert!(assocs.is_empty());
    }

    #[tokio::test]
    async fn test_traversal_does_not_mutate_graph() {
        let graph = InMemoryGraph::new();
        let fqdn = graph
            .create_asset(Asset::Fqdn(Fqdn::new("example.com")))
            .await
            .unwrap();
        let d1 = domain_record(&graph, "example.com").await;
        graph
            .create_relation(fqdn.id, d1.id, RelationLabel::Registration)
            .await
            .unwrap();

        let assets_before = graph.asset_count().await;
        let relations_before = graph.relation_count().await;
        get_associations(&graph, "example.com", None).await.unwrap();
        assert_eq!(graph.asset_count().await, assets_before);
        assert_eq!(graph.relation_count().await, relations_before);
    }
}
