//! Testing harness for plugin and engine behavior.
//!
//! [`ScriptedPlugin`] follows the full handler discipline (credential
//! check, scope, TTL branch, normalization, attributed storage, successor
//! events) but answers from a canned name list instead of the network,
//! while counting the external queries it would have made.

use crate::normalize::normalize_fqdn;
use crate::support;
use async_trait::async_trait;
use sfc_core::error::{EngineError, EngineResult};
use sfc_core::events::{Event, Handler, HandlerAction, Plugin, Registry};
use sfc_core::filter::FqdnFilter;
use sfc_core::model::{Asset, AssetType, Fqdn, Source};
use sfc_core::ttl::ttl_start;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared journal of handler start/end marks, for ordering assertions.
#[derive(Default)]
pub struct Journal {
    entries: Mutex<Vec<String>>,
}

impl Journal {
    /// Creates an empty journal.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Appends an entry.
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().expect("journal lock").push(entry.into());
    }

    /// Returns the recorded entries in order.
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().expect("journal lock").clone()
    }
}

/// Tracks how many scripted handlers run at once across plugins.
#[derive(Default)]
pub struct ConcurrencyProbe {
    active: AtomicUsize,
    max_seen: AtomicUsize,
}

impl ConcurrencyProbe {
    /// Creates a probe.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    /// The highest concurrent count observed.
    pub fn max_seen(&self) -> usize {
        self.max_seen.load(Ordering::SeqCst)
    }
}

/// A plugin that answers from a canned name list.
pub struct ScriptedPlugin {
    name: String,
    priority: u8,
    max_instances: usize,
    source: Source,
    responses: Vec<String>,
    require_creds: bool,
    hold: Option<Duration>,
    queries: Mutex<HashMap<String, usize>>,
    journal: Option<Arc<Journal>>,
    probe: Option<Arc<ConcurrencyProbe>>,
}

impl ScriptedPlugin {
    /// Creates a scripted plugin with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            source: Source {
                name: name.clone(),
                confidence: 100,
            },
            name,
            priority: 6,
            max_instances: 10,
            responses: Vec::new(),
            require_creds: false,
            hold: None,
            queries: Mutex::new(HashMap::new()),
            journal: None,
            probe: None,
        }
    }

    /// Sets the canned raw names the fake API returns.
    pub fn with_responses<I, S>(mut self, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.responses = responses.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the handler priority.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the instance cap.
    pub fn with_max_instances(mut self, max_instances: usize) -> Self {
        self.max_instances = max_instances;
        self
    }

    /// Makes the plugin require configured API keys, like a real
    /// key-authenticated source.
    pub fn with_required_creds(mut self) -> Self {
        self.require_creds = true;
        self
    }

    /// Holds the handler open for `duration` to make overlap observable.
    pub fn with_hold(mut self, duration: Duration) -> Self {
        self.hold = Some(duration);
        self
    }

    /// Attaches a shared journal receiving start/end marks.
    pub fn with_journal(mut self, journal: Arc<Journal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Attaches a shared concurrency probe.
    pub fn with_probe(mut self, probe: Arc<ConcurrencyProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Finishes construction.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Number of external queries made for `name`.
    pub fn queries_for(&self, name: &str) -> usize {
        self.queries
            .lock()
            .expect("queries lock")
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    /// Total external queries made by this plugin.
    pub fn total_queries(&self) -> usize {
        self.queries.lock().expect("queries lock").values().sum()
    }

    fn handler_name(&self) -> String {
        format!("{}-Handler", self.name)
    }

    async fn check(&self, event: &Event) -> EngineResult<()> {
        let Asset::Fqdn(fqdn) = &event.asset.asset else {
            return Err(EngineError::WrongAssetType {
                expected: AssetType::Fqdn,
            });
        };

        if self.require_creds {
            let keys = event
                .session
                .config()
                .data_source(&self.name)
                .map(|ds| ds.api_keys())
                .unwrap_or_default();
            if keys.is_empty() {
                return Ok(());
            }
        }

        let Some((canonical, _conf)) = event.session.scope().in_scope(&event.asset.asset, 0).await
        else {
            return Ok(());
        };
        if !canonical.key().eq_ignore_ascii_case(&fqdn.name) {
            return Ok(());
        }

        let src = support::get_source(&event.session, &self.source).await?;
        let since = ttl_start(
            event.session.config(),
            AssetType::Fqdn,
            AssetType::Fqdn,
            &self.name,
        );

        let flight = event.session.single_flight().acquire(&self.name, &fqdn.name);
        let _guard = flight.lock().await;

        if let Some(journal) = &self.journal {
            journal.record(format!("start:{}", self.name));
        }
        if let Some(probe) = &self.probe {
            probe.enter();
        }

        let result = self.run_branch(event, &fqdn.name, &src, since).await;

        if let Some(hold) = self.hold {
            tokio::time::sleep(hold).await;
        }
        if let Some(probe) = &self.probe {
            probe.exit();
        }
        if let Some(journal) = &self.journal {
            journal.record(format!("end:{}", self.name));
        }

        let names = result?;
        if !names.is_empty() {
            support::process_fqdns_with_source(event, &names, &src, self.priority).await?;
        }
        Ok(())
    }

    async fn run_branch(
        &self,
        event: &Event,
        name: &str,
        src: &sfc_core::graph::StoredAsset,
        since: chrono::DateTime<chrono::Utc>,
    ) -> EngineResult<Vec<sfc_core::graph::StoredAsset>> {
        if support::asset_monitored_within_ttl(&event.session, &event.asset, src, since).await {
            return support::source_to_assets_within_ttl(
                &event.session,
                name,
                AssetType::Fqdn,
                src,
                since,
            )
            .await;
        }

        {
            let mut queries = self.queries.lock().expect("queries lock");
            *queries.entry(name.to_string()).or_insert(0) += 1;
        }

        let filter = FqdnFilter::new(4096);
        for raw in &self.responses {
            let Some(candidate) = normalize_fqdn(raw) else {
                continue;
            };
            let asset = Asset::Fqdn(Fqdn::new(candidate.clone()));
            if event.session.scope().in_scope(&asset, 0).await.is_some() {
                filter.insert(&candidate);
            }
        }

        let stored = support::store_fqdns_with_source(
            &event.session,
            &filter.to_vec(),
            src,
            &self.name,
            &self.handler_name(),
        )
        .await?;
        support::mark_asset_monitored(&event.session, &event.asset, src).await;
        Ok(stored)
    }
}

#[async_trait]
impl Plugin for ScriptedPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(self: Arc<Self>, registry: &Registry) -> EngineResult<()> {
        registry.register(Handler {
            plugin: self.name.clone(),
            name: self.handler_name(),
            event_type: AssetType::Fqdn,
            transforms: vec![AssetType::Fqdn],
            priority: self.priority,
            max_instances: self.max_instances,
            action: self.clone(),
        })
    }

    async fn stop(&self) {}
}

#[async_trait]
impl HandlerAction for ScriptedPlugin {
    async fn handle(&self, event: &Event) -> EngineResult<()> {
        self.check(event).await
    }
}
