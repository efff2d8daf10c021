//! Support library shared by every plugin.
//!
//! Implements the common storage-and-dispatch tail of the handler
//! discipline: resolving the plugin's `Source` asset, branching on
//! freshness, persisting names with source attribution, and re-emitting
//! dedup-filtered successor events through the global queue.

use chrono::{DateTime, Utc};
use sfc_core::error::EngineResult;
use sfc_core::events::Event;
use sfc_core::graph::{GraphStore, StoredAsset};
use sfc_core::model::{Asset, AssetType, Fqdn, RelationLabel, Source};
use sfc_core::session::Session;
use std::sync::Arc;
use tracing::debug;

/// Resolves the memoized `Source` asset for a plugin's source definition.
pub async fn get_source(session: &Arc<Session>, definition: &Source) -> EngineResult<StoredAsset> {
    session.source_asset(definition).await
}

/// Records that `asset` was just queried through `source`.
pub async fn mark_asset_monitored(session: &Session, asset: &StoredAsset, source: &StoredAsset) {
    session.monitor().mark(asset.id, source.id).await;
}

/// Returns true if `asset` was queried through `source` at or after the
/// `since` cutoff, i.e. the external API must not be hit again yet.
pub async fn asset_monitored_within_ttl(
    session: &Session,
    asset: &StoredAsset,
    source: &StoredAsset,
    since: DateTime<Utc>,
) -> bool {
    session.monitor().within_ttl(asset.id, source.id, since).await
}

/// Inserts each name as an FQDN asset (or refreshes the existing node)
/// and records a `source` relation to the plugin's `Source` asset.
///
/// Names are expected to be normalized already; the caller's
/// plugin/handler names are recorded on the debug log only.
pub async fn store_fqdns_with_source(
    session: &Arc<Session>,
    names: &[String],
    source: &StoredAsset,
    plugin: &str,
    handler: &str,
) -> EngineResult<Vec<StoredAsset>> {
    let graph = session.graph();
    let mut stored = Vec::with_capacity(names.len());

    for name in names {
        let asset = graph.create_asset(Asset::Fqdn(Fqdn::new(name.clone()))).await?;
        graph
            .create_relation(asset.id, source.id, RelationLabel::Source)
            .await?;
        stored.push(asset);
    }

    debug!(
        plugin = %plugin,
        handler = %handler,
        count = stored.len(),
        "stored names with source attribution"
    );
    Ok(stored)
}

/// Serves a previous query's results from the graph: assets of the given
/// type attributed to `source` within the TTL window that fall under
/// `name`.
pub async fn source_to_assets_within_ttl(
    session: &Arc<Session>,
    name: &str,
    asset_type: AssetType,
    source: &StoredAsset,
    since: DateTime<Utc>,
) -> EngineResult<Vec<StoredAsset>> {
    let graph = session.graph();
    let name = name.to_lowercase();
    let suffix = format!(".{name}");

    let rels = graph
        .incoming_relations(source.id, Some(since), Some(RelationLabel::Source))
        .await?;

    let mut assets = Vec::new();
    for rel in rels {
        let Some(stored) = graph.find_by_id(rel.from_id, Some(since)).await? else {
            continue;
        };
        if stored.asset.asset_type() != asset_type {
            continue;
        }
        let key = stored.asset.key();
        if key == name || key.ends_with(&suffix) {
            assets.push(stored);
        }
    }
    Ok(assets)
}

/// Enqueues a successor event for each asset not yet seen this session,
/// attributed to the plugin behind `source` and queued at the emitting
/// handler's priority.
pub async fn process_fqdns_with_source(
    event: &Event,
    assets: &[StoredAsset],
    source: &StoredAsset,
    priority: u8,
) -> EngineResult<()> {
    let origin = match &source.asset {
        Asset::Source(s) => s.name.clone(),
        _ => String::new(),
    };

    for asset in assets {
        if !event.session.seen().insert(&asset.asset.key()) {
            continue;
        }
        let successor = event.successor(asset.clone(), &origin, priority);
        match event.dispatcher.dispatch(successor).await {
            Ok(()) => {}
            Err(err) if err.is_cancelled() => return Ok(()),
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sfc_core::config::Config;
    use sfc_core::graph::{GraphStore, InMemoryGraph};
    use sfc_core::model::AssetType;

    fn test_session() -> Arc<Session> {
        Session::new(Config::default(), Arc::new(InMemoryGraph::new()))
    }

    fn source_def(name: &str) -> Source {
        Source {
            name: name.to_string(),
            confidence: 100,
        }
    }

    #[tokio::test]
    async fn test_store_attaches_source_relation() {
        let session = test_session();
        let src = get_source(&session, &source_def("TestSource")).await.unwrap();

        let names = vec!["www.example.com".to_string(), "api.example.com".to_string()];
        let stored = store_fqdns_with_source(&session, &names, &src, "TestSource", "TestHandler")
            .await
            .unwrap();
        assert_eq!(stored.len(), 2);

        for asset in &stored {
            let rels = session
                .graph()
                .outgoing_relations(asset.id, None, Some(RelationLabel::Source))
                .await
                .unwrap();
            assert_eq!(rels.len(), 1);
            assert_eq!(rels[0].to_id, src.id);
        }
    }

    #[tokio::test]
    async fn test_store_is_idempotent() {
        let session = test_session();
        let src = get_source(&session, &source_def("TestSource")).await.unwrap();

        let names = vec!["www.example.com".to_string()];
        let first = store_fqdns_with_source(&session, &names, &src, "p", "h")
            .await
            .unwrap();
        let second = store_fqdns_with_source(&session, &names, &src, "p", "h")
            .await
            .unwrap();

        assert_eq!(first[0].id, second[0].id);
        let rels = session
            .graph()
            .outgoing_relations(first[0].id, None, Some(RelationLabel::Source))
            .await
            .unwrap();
        // No duplicate source edge from the second insert.
        assert_eq!(rels.len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_serves_prior_results_under_name() {
        let session = test_session();
        let src = get_source(&session, &source_def("TestSource")).await.unwrap();
        let since = Utc::now() - chrono::Duration::hours(1);

        let names = vec![
            "www.example.com".to_string(),
            "api.example.com".to_string(),
            "other.example.net".to_string(),
        ];
        store_fqdns_with_source(&session, &names, &src, "p", "h")
            .await
            .unwrap();

        let mut served: Vec<String> =
            source_to_assets_within_ttl(&session, "example.com", AssetType::Fqdn, &src, since)
                .await
                .unwrap()
                .iter()
                .map(|a| a.asset.key())
                .collect();
        served.sort();
        assert_eq!(served, vec!["api.example.com", "www.example.com"]);
    }

    #[tokio::test]
    async fn test_monitor_round_trip() {
        let session = test_session();
        let src = get_source(&session, &source_def("TestSource")).await.unwrap();
        let asset = session
            .graph()
            .create_asset(Asset::Fqdn(Fqdn::new("example.com")))
            .await
            .unwrap();

        let since = Utc::now() - chrono::Duration::hours(24);
        assert!(!asset_monitored_within_ttl(&session, &asset, &src, since).await);
        mark_asset_monitored(&session, &asset, &src).await;
        assert!(asset_monitored_within_ttl(&session, &asset, &src, since).await);
    }
}
