//! Per-run session context.
//!
//! A session ties together the configuration, scope, graph handle, and
//! the shared state plugins need: the seen-name filter, the DNS cache,
//! the source-asset memo, the freshness ledger, single-flight locks, and
//! the global concurrency gates. The session's done signal broadcasts
//! termination to every suspended operation.

use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::filter::FqdnFilter;
use crate::graph::{GraphStore, StoredAsset};
use crate::model::{Asset, Source};
use crate::scope::Scope;
use crate::ttl::{MonitorLedger, SingleFlight};
use moka::future::Cache;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, RwLock, Semaphore};
use tracing::info;
use uuid::Uuid;

/// Default capacity of the session-wide seen-name filter.
const SEEN_FILTER_CAPACITY: usize = 1 << 20;

/// Lifecycle state of a session. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, not yet dispatching.
    Start,
    /// Dispatching events.
    Running,
    /// No longer accepting seeds; waiting for the stream to drain.
    Draining,
    /// Terminated.
    Stopped,
}

/// The kind of external I/O a token accounts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoKind {
    Http,
    Dns,
}

/// Per-run context shared by the dispatcher and every plugin handler.
pub struct Session {
    id: Uuid,
    config: Arc<Config>,
    scope: Arc<Scope>,
    graph: Arc<dyn GraphStore>,
    seen: FqdnFilter,
    dns_cache: Cache<String, Arc<Vec<IpAddr>>>,
    sources: RwLock<HashMap<String, StoredAsset>>,
    monitor: MonitorLedger,
    single_flight: SingleFlight,
    http_gate: Arc<Semaphore>,
    dns_gate: Arc<Semaphore>,
    io_outstanding: Arc<AtomicU64>,
    state: std::sync::RwLock<SessionState>,
    done_tx: watch::Sender<bool>,
}

impl Session {
    /// Creates a session over the given configuration and graph store.
    pub fn new(config: Config, graph: Arc<dyn GraphStore>) -> Arc<Self> {
        let config = Arc::new(config);
        let scope = Arc::new(Scope::new(&config.scope, graph.clone()));
        let (done_tx, _) = watch::channel(false);

        let session = Arc::new(Self {
            id: Uuid::new_v4(),
            http_gate: Arc::new(Semaphore::new(config.engine.max_concurrent_http)),
            dns_gate: Arc::new(Semaphore::new(config.engine.max_concurrent_dns)),
            config,
            scope,
            graph,
            seen: FqdnFilter::new(SEEN_FILTER_CAPACITY),
            dns_cache: Cache::new(100_000),
            sources: RwLock::new(HashMap::new()),
            monitor: MonitorLedger::new(),
            single_flight: SingleFlight::new(),
            io_outstanding: Arc::new(AtomicU64::new(0)),
            state: std::sync::RwLock::new(SessionState::Start),
            done_tx,
        });
        info!(session = %session.id, "session created");
        session
    }

    /// The session identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The session configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The session scope.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// The graph store handle.
    pub fn graph(&self) -> Arc<dyn GraphStore> {
        self.graph.clone()
    }

    /// The session-wide seen-name dedup filter.
    pub fn seen(&self) -> &FqdnFilter {
        &self.seen
    }

    /// The shared DNS resolution cache.
    pub fn dns_cache(&self) -> &Cache<String, Arc<Vec<IpAddr>>> {
        &self.dns_cache
    }

    /// The freshness ledger for `(asset, source)` query marks.
    pub fn monitor(&self) -> &MonitorLedger {
        &self.monitor
    }

    /// The per-(plugin, asset) single-flight locks.
    pub fn single_flight(&self) -> &SingleFlight {
        &self.single_flight
    }

    /// Resolves the memoized `Source` asset for a source definition,
    /// creating it in the graph on first use.
    pub async fn source_asset(&self, definition: &Source) -> EngineResult<StoredAsset> {
        {
            let sources = self.sources.read().await;
            if let Some(stored) = sources.get(&definition.name) {
                return Ok(stored.clone());
            }
        }

        let stored = self
            .graph
            .create_asset(Asset::Source(definition.clone()))
            .await?;
        let mut sources = self.sources.write().await;
        Ok(sources
            .entry(definition.name.clone())
            .or_insert(stored)
            .clone())
    }

    /// Acquires an external-I/O token, observing the done signal.
    ///
    /// The token holds a permit on the relevant global gate and counts
    /// toward the quiescence check; dropping it releases both.
    pub async fn io_guard(&self, kind: IoKind) -> EngineResult<IoToken> {
        let gate = match kind {
            IoKind::Http => self.http_gate.clone(),
            IoKind::Dns => self.dns_gate.clone(),
        };

        let mut done = self.done();
        let permit = tokio::select! {
            permit = gate.acquire_owned() => {
                permit.map_err(|_| EngineError::Cancelled)?
            }
            _ = done.wait_for(|d| *d) => return Err(EngineError::Cancelled),
        };

        self.io_outstanding.fetch_add(1, Ordering::SeqCst);
        Ok(IoToken {
            _permit: permit,
            counter: self.io_outstanding.clone(),
        })
    }

    /// Number of external calls currently in flight.
    pub fn outstanding_io(&self) -> u64 {
        self.io_outstanding.load(Ordering::SeqCst)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.read().expect("session state lock")
    }

    /// Marks the session as running.
    pub fn mark_running(&self) {
        self.transition(SessionState::Running);
    }

    /// Marks the session as draining.
    pub fn mark_draining(&self) {
        self.transition(SessionState::Draining);
    }

    /// Returns a receiver on the done signal.
    pub fn done(&self) -> watch::Receiver<bool> {
        self.done_tx.subscribe()
    }

    /// Returns true once the done signal has fired.
    pub fn is_done(&self) -> bool {
        *self.done_tx.borrow()
    }

    /// Terminates the session: fires the done signal and moves the
    /// lifecycle to `Stopped`. Idempotent.
    pub fn finish(&self) {
        let already = {
            let mut state = self.state.write().expect("session state lock");
            let done = *state == SessionState::Stopped;
            *state = SessionState::Stopped;
            done
        };
        if !already {
            info!(session = %self.id, "session stopped");
            let _ = self.done_tx.send(true);
        }
    }

    fn transition(&self, next: SessionState) {
        let mut state = self.state.write().expect("session state lock");
        if *state != SessionState::Stopped {
            *state = next;
        }
    }
}

/// A held external-I/O permit; released on drop.
#[derive(Debug)]
pub struct IoToken {
    _permit: tokio::sync::OwnedSemaphorePermit,
    counter: Arc<AtomicU64>,
}

impl Drop for IoToken {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}
