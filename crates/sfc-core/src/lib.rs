//! # sfc-core
//!
//! Core discovery engine for Surfacer: the typed asset graph model, the
//! session scope, the plugin registry and event dispatcher, the
//! per-source freshness layer, and the association engine.

pub mod assoc;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod filter;
pub mod graph;
pub mod model;
pub mod scope;
pub mod session;
pub mod ttl;

pub use assoc::get_associations;
pub use config::{Config, ConfigError, Credential, DataSourceConfig, EngineSettings, ScopeConfig};
pub use dispatch::{Dispatcher, DispatcherStatsSnapshot, EventQueue};
pub use error::{EngineError, EngineResult};
pub use events::{
    Event, EventMeta, Handler, HandlerAction, Plugin, RegisteredHandler, Registry,
    DEFAULT_PRIORITY,
};
pub use filter::FqdnFilter;
pub use graph::{GraphError, GraphResult, GraphStore, InMemoryGraph, StoredAsset};
pub use model::{
    Asset, AssetType, Autnum, AutnumRecord, DomainRecord, EmailAddress, Fqdn, IpAddress,
    IpNetRecord, IpVersion, Location, Netblock, Organization, Person, PhoneNumber, Relation,
    RelationLabel, Source, TlsCertificate, Url,
};
pub use scope::Scope;
pub use session::{IoKind, IoToken, Session, SessionState};
pub use ttl::{ttl_start, MonitorLedger, SingleFlight};
