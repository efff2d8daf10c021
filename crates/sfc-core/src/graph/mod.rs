//! Graph store seam.
//!
//! The engine persists discovered assets and relations through the
//! [`GraphStore`] trait. Production deployments back it with an external
//! graph database; [`memory::InMemoryGraph`] provides the reference
//! implementation used by tests and the local CLI.
//!
//! All mutations go through upsert-by-natural-key
//! ([`GraphStore::create_asset`]) and append-only relation insertion
//! ([`GraphStore::create_relation`]), which keeps concurrent writers safe.
//! Every read accepts an optional `since` cutoff; entries whose
//! `last_seen` predates the cutoff are excluded.

pub mod memory;

use crate::model::{Asset, Relation, RelationLabel};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use memory::InMemoryGraph;

/// Errors returned by graph store operations.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("asset not found: {0}")]
    AssetNotFound(Uuid),

    #[error("relation not found: {0}")]
    RelationNotFound(Uuid),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result type for graph store operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// An asset as stored in the graph: the typed value plus node bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAsset {
    /// Stable identifier assigned at creation.
    pub id: Uuid,
    /// When the asset was first created.
    pub created_at: DateTime<Utc>,
    /// When the asset was last observed.
    pub last_seen: DateTime<Utc>,
    /// The typed asset value.
    pub asset: Asset,
}

/// Typed store for assets and relations.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Upserts an asset by natural key.
    ///
    /// If an asset of the same type with the same [`Asset::key`] already
    /// exists, its `last_seen` is refreshed and the existing node is
    /// returned; otherwise a new node is created.
    async fn create_asset(&self, asset: Asset) -> GraphResult<StoredAsset>;

    /// Records a directed relation between two assets.
    ///
    /// An existing `(from, to, label)` edge has its `last_seen` refreshed
    /// instead of being duplicated. `associated_with` edges are stored
    /// symmetrically: the mirror edge is upserted in the same call, so
    /// traversal never depends on ingestion orientation.
    async fn create_relation(
        &self,
        from: Uuid,
        to: Uuid,
        label: RelationLabel,
    ) -> GraphResult<Relation>;

    /// Refreshes the `last_seen` timestamp of a relation.
    async fn update_last_seen(&self, relation_id: Uuid) -> GraphResult<()>;

    /// Finds an asset by id, subject to the `since` cutoff.
    async fn find_by_id(
        &self,
        id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> GraphResult<Option<StoredAsset>>;

    /// Finds assets matching the given typed value by natural key.
    async fn find_by_content(
        &self,
        asset: &Asset,
        since: Option<DateTime<Utc>>,
    ) -> GraphResult<Vec<StoredAsset>>;

    /// Returns relations leaving `from`, optionally restricted to a label.
    async fn outgoing_relations(
        &self,
        from: Uuid,
        since: Option<DateTime<Utc>>,
        label: Option<RelationLabel>,
    ) -> GraphResult<Vec<Relation>>;

    /// Returns relations arriving at `to`, optionally restricted to a label.
    async fn incoming_relations(
        &self,
        to: Uuid,
        since: Option<DateTime<Utc>>,
        label: Option<RelationLabel>,
    ) -> GraphResult<Vec<Relation>>;
}
