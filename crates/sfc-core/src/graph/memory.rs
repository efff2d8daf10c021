//! In-memory graph store.
//!
//! Reference implementation of [`GraphStore`] backed by RwLock'd maps,
//! with JSON snapshot load/save so the CLI can open a graph directory
//! without the external database.

use super::{GraphError, GraphResult, GraphStore, StoredAsset};
use crate::model::{Asset, AssetType, Relation, RelationLabel};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use uuid::Uuid;

/// File name of the JSON snapshot inside a graph directory.
pub const SNAPSHOT_FILE: &str = "surfacer.json";

#[derive(Default)]
struct GraphInner {
    assets: HashMap<Uuid, StoredAsset>,
    /// Natural-key index: `(type, key)` to asset id.
    keys: HashMap<(AssetType, String), Uuid>,
    relations: HashMap<Uuid, Relation>,
    outgoing: HashMap<Uuid, Vec<Uuid>>,
    incoming: HashMap<Uuid, Vec<Uuid>>,
}

impl GraphInner {
    fn upsert_relation(&mut self, from: Uuid, to: Uuid, label: RelationLabel) -> Relation {
        let existing = self
            .outgoing
            .get(&from)
            .into_iter()
            .flatten()
            .filter_map(|rid| self.relations.get(rid))
            .find(|r| r.to_id == to && r.label == label)
            .map(|r| r.id);

        if let Some(rid) = existing {
            let rel = self.relations.get_mut(&rid).expect("indexed relation");
            rel.touch();
            return rel.clone();
        }

        let rel = Relation::new(from, to, label);
        self.outgoing.entry(from).or_default().push(rel.id);
        self.incoming.entry(to).or_default().push(rel.id);
        self.relations.insert(rel.id, rel.clone());
        rel
    }

    fn insert_stored(&mut self, stored: StoredAsset) {
        self.keys
            .insert((stored.asset.asset_type(), stored.asset.key()), stored.id);
        self.assets.insert(stored.id, stored);
    }
}

/// In-memory implementation of [`GraphStore`].
pub struct InMemoryGraph {
    inner: RwLock<GraphInner>,
}

impl InMemoryGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(GraphInner::default()),
        }
    }

    /// Loads a graph from the JSON snapshot inside `dir`.
    pub fn open(dir: &Path) -> GraphResult<Self> {
        let path = dir.join(SNAPSHOT_FILE);
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| GraphError::Backend(format!("{}: {}", path.display(), e)))?;
        let snapshot: GraphSnapshot = serde_json::from_str(&contents)
            .map_err(|e| GraphError::Backend(format!("{}: {}", path.display(), e)))?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Builds a graph from a deserialized snapshot.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        let mut inner = GraphInner::default();
        for stored in snapshot.assets {
            inner.insert_stored(stored);
        }
        for rel in snapshot.relations {
            inner.outgoing.entry(rel.from_id).or_default().push(rel.id);
            inner.incoming.entry(rel.to_id).or_default().push(rel.id);
            inner.relations.insert(rel.id, rel);
        }
        Self {
            inner: RwLock::new(inner),
        }
    }

    /// Serializes the graph into a snapshot.
    pub async fn snapshot(&self) -> GraphSnapshot {
        let inner = self.inner.read().await;
        GraphSnapshot {
            assets: inner.assets.values().cloned().collect(),
            relations: inner.relations.values().cloned().collect(),
        }
    }

    /// Writes the JSON snapshot into `dir`.
    pub async fn save(&self, dir: &Path) -> GraphResult<()> {
        let snapshot = self.snapshot().await;
        let contents = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| GraphError::Backend(e.to_string()))?;
        let path = dir.join(SNAPSHOT_FILE);
        std::fs::write(&path, contents)
            .map_err(|e| GraphError::Backend(format!("{}: {}", path.display(), e)))
    }

    /// Returns the number of assets in the graph.
    pub async fn asset_count(&self) -> usize {
        self.inner.read().await.assets.len()
    }

    /// Returns the number of relations in the graph.
    pub async fn relation_count(&self) -> usize {
        self.inner.read().await.relations.len()
    }
}

impl Default for InMemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

fn fresh(last_seen: DateTime<Utc>, since: Option<DateTime<Utc>>) -> bool {
    since.map_or(true, |cutoff| last_seen >= cutoff)
}

#[async_trait]
impl GraphStore for InMemoryGraph {
    async fn create_asset(&self, asset: Asset) -> GraphResult<StoredAsset> {
        let mut inner = self.inner.write().await;
        let key = (asset.asset_type(), asset.key());

        if let Some(id) = inner.keys.get(&key).copied() {
            let stored = inner.assets.get_mut(&id).expect("indexed asset");
            stored.last_seen = Utc::now();
            return Ok(stored.clone());
        }

        let now = Utc::now();
        let stored = StoredAsset {
            id: Uuid::new_v4(),
            created_at: now,
            last_seen: now,
            asset,
        };
        inner.insert_stored(stored.clone());
        Ok(stored)
    }

    async fn create_relation(
        &self,
        from: Uuid,
        to: Uuid,
        label: RelationLabel,
    ) -> GraphResult<Relation> {
        let mut inner = self.inner.write().await;
        if !inner.assets.contains_key(&from) {
            return Err(GraphError::AssetNotFound(from));
        }
        if !inner.assets.contains_key(&to) {
            return Err(GraphError::AssetNotFound(to));
        }

        let rel = inner.upsert_relation(from, to, label);
        if label == RelationLabel::AssociatedWith && from != to {
            inner.upsert_relation(to, from, label);
        }
        Ok(rel)
    }

    async fn update_last_seen(&self, relation_id: Uuid) -> GraphResult<()> {
        let mut inner = self.inner.write().await;
        let rel = inner
            .relations
            .get_mut(&relation_id)
            .ok_or(GraphError::RelationNotFound(relation_id))?;
        rel.touch();
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> GraphResult<Option<StoredAsset>> {
        let inner = self.inner.read().await;
        Ok(inner
            .assets
            .get(&id)
            .filter(|a| fresh(a.last_seen, since))
            .cloned())
    }

    async fn find_by_content(
        &self,
        asset: &Asset,
        since: Option<DateTime<Utc>>,
    ) -> GraphResult<Vec<StoredAsset>> {
        let inner = self.inner.read().await;
        let key = (asset.asset_type(), asset.key());
        Ok(inner
            .keys
            .get(&key)
            .and_then(|id| inner.assets.get(id))
            .filter(|a| fresh(a.last_seen, since))
            .cloned()
            .into_iter()
            .collect())
    }

    async fn outgoing_relations(
        &self,
        from: Uuid,
        since: Option<DateTime<Utc>>,
        label: Option<RelationLabel>,
    ) -> GraphResult<Vec<Relation>> {
        let inner = self.inner.read().await;
        Ok(inner
            .outgoing
            .get(&from)
            .into_iter()
            .flatten()
            .filter_map(|rid| inner.relations.get(rid))
            .filter(|r| label.map_or(true, |l| r.label == l))
            .filter(|r| fresh(r.last_seen, since))
            .cloned()
            .collect())
    }

    async fn incoming_relations(
        &self,
        to: Uuid,
        since: Option<DateTime<Utc>>,
        label: Option<RelationLabel>,
    ) -> GraphResult<Vec<Relation>> {
        let inner = self.inner.read().await;
        Ok(inner
            .incoming
            .get(&to)
            .into_iter()
            .flatten()
            .filter_map(|rid| inner.relations.get(rid))
            .filter(|r| label.map_or(true, |l| r.label == l))
            .filter(|r| fresh(r.last_seen, since))
            .cloned()
            .collect())
    }
}

/// Serialized form of the graph for snapshot files.
#[derive(Debug, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// All stored assets.
    pub assets: Vec<StoredAsset>,
    /// All stored relations.
    pub relations: Vec<Relation>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Fqdn;

    #[tokio::test]
    async fn test_create_asset_upserts_by_natural_key() {
        let graph = InMemoryGraph::new();

        let a = graph
            .create_asset(Asset::Fqdn(Fqdn::new("www.example.com")))
            .await
            .unwrap();
        let b = graph
            .create_asset(Asset::Fqdn(Fqdn::new("WWW.EXAMPLE.COM")))
            .await
            .unwrap();

        assert_eq!(a.id, b.id);
        assert_eq!(graph.asset_count().await, 1);
        assert!(b.last_seen >= a.last_seen);
    }

    #[tokio::test]
    async fn test_create_relation_deduplicates() {
        let graph = InMemoryGraph::new();
        let a = graph
            .create_asset(Asset::Fqdn(Fqdn::new("a.example.com")))
            .await
            .unwrap();
        let b = graph
            .create_asset(Asset::Fqdn(Fqdn::new("example.com")))
            .await
            .unwrap();

        let r1 = graph
            .create_relation(a.id, b.id, RelationLabel::SubdomainOf)
            .await
            .unwrap();
        let r2 = graph
            .create_relation(a.id, b.id, RelationLabel::SubdomainOf)
            .await
            .unwrap();

        assert_eq!(r1.id, r2.id);
        assert_eq!(graph.relation_count().await, 1);
    }

    #[tokio::test]
    async fn test_associated_with_is_symmetric() {
        let graph = InMemoryGraph::new();
        let a = graph
            .create_asset(Asset::Organization(crate::model::Organization {
                name: "Example LLC".to_string(),
            }))
            .await
            .unwrap();
        let b = graph
            .create_asset(Asset::Organization(crate::model::Organization {
                name: "Example Holdings".to_string(),
            }))
            .await
            .unwrap();

        graph
            .create_relation(a.id, b.id, RelationLabel::AssociatedWith)
            .await
            .unwrap();

        let reverse = graph
            .outgoing_relations(b.id, None, Some(RelationLabel::AssociatedWith))
            .await
            .unwrap();
        assert_eq!(reverse.len(), 1);
        assert_eq!(reverse[0].to_id, a.id);
    }

    #[tokio::test]
    async fn test_update_last_seen_refreshes_relation() {
        let graph = InMemoryGraph::new();
        let a = graph
            .create_asset(Asset::Fqdn(Fqdn::new("a.example.com")))
            .await
            .unwrap();
        let b = graph
            .create_asset(Asset::Fqdn(Fqdn::new("example.com")))
            .await
            .unwrap();
        let rel = graph
            .create_relation(a.id, b.id, RelationLabel::SubdomainOf)
            .await
            .unwrap();

        graph.update_last_seen(rel.id).await.unwrap();
        let refreshed = graph.outgoing_relations(a.id, None, None).await.unwrap();
        assert!(refreshed[0].last_seen >= rel.last_seen);

        let err = graph.update_last_seen(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, GraphError::RelationNotFound(_)));
    }

    #[tokio::test]
    async fn test_since_cutoff_excludes_stale_reads() {
        let graph = InMemoryGraph::new();
        let a = graph
            .create_asset(Asset::Fqdn(Fqdn::new("old.example.com")))
            .await
            .unwrap();

        let future = Utc::now() + chrono::Duration::hours(1);
        assert!(graph.find_by_id(a.id, Some(future)).await.unwrap().is_none());
        assert!(graph.find_by_id(a.id, None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_relation_requires_existing_endpoints() {
        let graph = InMemoryGraph::new();
        let a = graph
            .create_asset(Asset::Fqdn(Fqdn::new("example.com")))
            .await
            .unwrap();

        let err = graph
            .create_relation(a.id, Uuid::new_v4(), RelationLabel::Source)
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::AssetNotFound(_)));
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let graph = InMemoryGraph::new();
        let a = graph
            .create_asset(Asset::Fqdn(Fqdn::new("example.com")))
            .await
            .unwrap();
        let b = graph
            .create_asset(Asset::Fqdn(Fqdn::new("www.example.com")))
            .await
            .unwrap();
        graph
            .create_relation(b.id, a.id, RelationLabel::SubdomainOf)
            .await
            .unwrap();

        let snapshot = graph.snapshot().await;
        let restored = InMemoryGraph::from_snapshot(snapshot);

        assert_eq!(restored.asset_count().await, 2);
        assert_eq!(restored.relation_count().await, 1);
        let found = restored
            .find_by_content(&Asset::Fqdn(Fqdn::new("example.com")), None)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, a.id);
    }
}
