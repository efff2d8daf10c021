//! Events, handlers, and the plugin registry.
//!
//! An event says "this asset should be processed by any matching
//! handlers". Plugins register handlers for one asset type each, with a
//! priority (lower runs earlier) and an instance cap; the registry keeps
//! them ordered by priority, stable on registration order.

use crate::dispatch::Dispatcher;
use crate::error::{EngineError, EngineResult};
use crate::graph::StoredAsset;
use crate::model::AssetType;
use crate::session::Session;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::info;

/// Default dispatch priority for seed events.
pub const DEFAULT_PRIORITY: u8 = 5;

/// Dispatch bookkeeping carried by an event.
#[derive(Debug, Clone)]
pub struct EventMeta {
    /// Discovery depth: how many plugin hops from a seed.
    pub depth: usize,
    /// Priority lane the event was queued at.
    pub priority: u8,
    /// Name of the plugin that emitted the event, if any.
    pub origin: Option<String>,
    /// When set, matching handlers skip the event.
    pub suppress: bool,
    /// When the event was created.
    pub created_at: DateTime<Utc>,
}

impl EventMeta {
    fn seed() -> Self {
        Self {
            depth: 0,
            priority: DEFAULT_PRIORITY,
            origin: None,
            suppress: false,
            created_at: Utc::now(),
        }
    }
}

/// A unit of work flowing through the dispatcher.
#[derive(Clone)]
pub struct Event {
    /// The stored asset to process.
    pub asset: StoredAsset,
    /// The session this event belongs to.
    pub session: Arc<Session>,
    /// The dispatcher feeding the global queue; handlers re-emit
    /// successor events through it rather than recursing.
    pub dispatcher: Arc<Dispatcher>,
    /// Dispatch bookkeeping.
    pub meta: EventMeta,
}

impl Event {
    /// Creates a seed event at the default priority.
    pub fn new(asset: StoredAsset, session: Arc<Session>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            asset,
            session,
            dispatcher,
            meta: EventMeta::seed(),
        }
    }

    /// Creates a successor event one hop deeper, attributed to `origin`
    /// and queued at `priority`.
    pub fn successor(&self, asset: StoredAsset, origin: &str, priority: u8) -> Self {
        Self {
            asset,
            session: self.session.clone(),
            dispatcher: self.dispatcher.clone(),
            meta: EventMeta {
                depth: self.meta.depth + 1,
                priority,
                origin: Some(origin.to_string()),
                suppress: false,
                created_at: Utc::now(),
            },
        }
    }
}

/// The callback side of a handler registration.
#[async_trait]
pub trait HandlerAction: Send + Sync {
    /// Processes one event. Errors are logged by the dispatcher and do
    /// not stop the event's remaining handlers.
    async fn handle(&self, event: &Event) -> EngineResult<()>;
}

/// A plugin: a named bundle of handlers over the event stream.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Stable identifier, used for source attribution and config lookup.
    fn name(&self) -> &str;

    /// Registers the plugin's handlers and acquires resources.
    async fn start(self: Arc<Self>, registry: &Registry) -> EngineResult<()>;

    /// Releases resources. Idempotent.
    async fn stop(&self);
}

/// A handler registration: which events, at what priority, how wide.
pub struct Handler {
    /// Owning plugin name.
    pub plugin: String,
    /// Handler name, unique within the event type.
    pub name: String,
    /// Asset type this handler fires on.
    pub event_type: AssetType,
    /// Asset types this handler may produce.
    pub transforms: Vec<AssetType>,
    /// Dispatch priority; lower runs earlier.
    pub priority: u8,
    /// Maximum concurrent invocations.
    pub max_instances: usize,
    /// The callback.
    pub action: Arc<dyn HandlerAction>,
}

/// A handler as held by the registry, with its admission semaphore.
pub struct RegisteredHandler {
    /// The registration record.
    pub handler: Handler,
    /// Registration sequence number, for stable ordering.
    pub seq: u64,
    /// Admission gate of `max_instances` permits.
    pub gate: Arc<Semaphore>,
}

#[derive(Default)]
struct RegistryInner {
    handlers: HashMap<AssetType, Vec<Arc<RegisteredHandler>>>,
    next_seq: u64,
}

/// The table of registered handlers, indexed by event type.
///
/// Registrations are immutable once made; the registry only grows during
/// plugin startup.
#[derive(Default)]
pub struct Registry {
    inner: std::sync::RwLock<RegistryInner>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler. Fails on a zero instance cap or a duplicate
    /// handler name for the same event type; registration failures are
    /// fatal to session startup.
    pub fn register(&self, handler: Handler) -> EngineResult<()> {
        if handler.max_instances == 0 {
            return Err(EngineError::Registration(format!(
                "handler {} has a zero instance cap",
                handler.name
            )));
        }

        let mut inner = self.inner.write().expect("registry lock");
        let entries = inner.handlers.entry(handler.event_type).or_default();
        if entries.iter().any(|h| h.handler.name == handler.name) {
            return Err(EngineError::Registration(format!(
                "handler {} already registered for {}",
                handler.name, handler.event_type
            )));
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        let gate = Arc::new(Semaphore::new(handler.max_instances));
        info!(
            plugin = %handler.plugin,
            handler = %handler.name,
            event_type = %handler.event_type,
            priority = handler.priority,
            "handler registered"
        );

        let registered = Arc::new(RegisteredHandler { handler, seq, gate });
        let entries = inner
            .handlers
            .entry(registered.handler.event_type)
            .or_default();
        entries.push(registered);
        entries.sort_by_key(|h| (h.handler.priority, h.seq));
        Ok(())
    }

    /// Returns the handlers for an event type, priority ascending with
    /// ties in registration order.
    pub fn handlers_for(&self, event_type: AssetType) -> Vec<Arc<RegisteredHandler>> {
        let inner = self.inner.read().expect("registry lock");
        inner
            .handlers
            .get(&event_type)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns every registered handler.
    pub fn all_handlers(&self) -> Vec<Arc<RegisteredHandler>> {
        let inner = self.inner.read().expect("registry lock");
        inner.handlers.values().flatten().cloned().collect()
    }

    /// Returns true when no handler invocation is currently admitted,
    /// i.e. every admission gate is fully replenished.
    pub fn all_idle(&self) -> bool {
        let inner = self.inner.read().expect("registry lock");
        inner.handlers.values().flatten().all(|h| {
            h.gate.available_permits() == h.handler.max_instances
        })
    }
}
