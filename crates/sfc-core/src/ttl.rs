//! Freshness control for external data sources.
//!
//! Every data source carries a TTL; a plugin may query the external API
//! for a given asset at most once per TTL window and must otherwise serve
//! results from the graph. The [`MonitorLedger`] records when each
//! `(asset, source)` pair was last queried, and [`SingleFlight`] collapses
//! concurrent dispatches for the same `(plugin, asset)` onto one query.

use crate::config::Config;
use crate::model::AssetType;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Returns the oldest graph timestamp still considered fresh for queries
/// transforming `_from` into `_to` through the named source.
///
/// The cutoff is `now - ttl(source)`; an unconfigured source uses the
/// engine default TTL, so the lookup never fails.
pub fn ttl_start(
    config: &Config,
    _from: AssetType,
    _to: AssetType,
    source_name: &str,
) -> DateTime<Utc> {
    Utc::now() - config.ttl_for(source_name)
}

/// Records when each `(asset, source)` pair was last queried externally.
#[derive(Default)]
pub struct MonitorLedger {
    inner: RwLock<HashMap<(Uuid, Uuid), DateTime<Utc>>>,
}

impl MonitorLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `asset` was just queried through `source`.
    pub async fn mark(&self, asset: Uuid, source: Uuid) {
        self.mark_at(asset, source, Utc::now()).await;
    }

    /// Records a query at an explicit time.
    pub async fn mark_at(&self, asset: Uuid, source: Uuid, at: DateTime<Utc>) {
        let mut inner = self.inner.write().await;
        inner.insert((asset, source), at);
    }

    /// Returns true if `asset` was queried through `source` at or after
    /// the `since` cutoff.
    pub async fn within_ttl(&self, asset: Uuid, source: Uuid, since: DateTime<Utc>) -> bool {
        let inner = self.inner.read().await;
        inner
            .get(&(asset, source))
            .map_or(false, |marked| *marked >= since)
    }
}

/// Keyed async locks serializing external queries per `(plugin, asset)`.
///
/// The map holds weak references keyed by identifiers; a lock is evicted
/// once every holder has dropped it, so completed queries leave nothing
/// behind and no strong cycle ties futures to sessions.
#[derive(Default)]
pub struct SingleFlight {
    inner: Mutex<HashMap<(String, String), Weak<tokio::sync::Mutex<()>>>>,
}

impl SingleFlight {
    /// Creates an empty single-flight map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock for `(plugin, key)`, creating it if absent.
    ///
    /// Callers hold the lock guard for the duration of the external
    /// query; a second dispatch acquires only after the first completes
    /// and re-checks the ledger before querying again.
    pub fn acquire(&self, plugin: &str, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut inner = self.inner.lock().expect("single-flight lock");
        inner.retain(|_, weak| weak.strong_count() > 0);

        let entry = (plugin.to_string(), key.to_string());
        if let Some(existing) = inner.get(&entry).and_then(Weak::upgrade) {
            return existing;
        }
        let lock = Arc::new(tokio::sync::Mutex::new(()));
        inner.insert(entry, Arc::downgrade(&lock));
        lock
    }

    /// Number of live entries, for diagnostics.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().expect("single-flight lock");
        inner.values().filter(|w| w.strong_count() > 0).count()
    }

    /// Returns true if no queries are in flight.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_ledger_monotonic_within_ttl() {
        let ledger = MonitorLedger::new();
        let asset = Uuid::new_v4();
        let source = Uuid::new_v4();

        let t0 = Utc::now();
        ledger.mark_at(asset, source, t0).await;

        // Fresh: cutoff one hour before the mark.
        assert!(ledger.within_ttl(asset, source, t0 - Duration::hours(1)).await);
        // Stale: cutoff after the mark.
        assert!(!ledger.within_ttl(asset, source, t0 + Duration::hours(1)).await);
        // Unknown pair is never fresh.
        assert!(
            !ledger
                .within_ttl(Uuid::new_v4(), source, t0 - Duration::hours(1))
                .await
        );
    }

    #[test]
    fn test_ttl_start_uses_source_override() {
        let yaml = r#"
engine:
  default_ttl_minutes: 60
datasources:
  - name: ZETAlytics
    ttl_minutes: 1440
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        let start = ttl_start(&config, AssetType::Fqdn, AssetType::Fqdn, "ZETAlytics");
        let delta = Utc::now() - start;
        assert!(delta >= Duration::minutes(1439) && delta <= Duration::minutes(1441));

        let start = ttl_start(&config, AssetType::Fqdn, AssetType::Fqdn, "Unknown");
        let delta = Utc::now() - start;
        assert!(delta >= Duration::minutes(59) && delta <= Duration::minutes(61));
    }

    #[tokio::test]
    async fn test_single_flight_shares_and_evicts() {
        let flights = SingleFlight::new();

        let a = flights.acquire("ZETAlytics", "example.com");
        let b = flights.acquire("ZETAlytics", "example.com");
        assert!(Arc::ptr_eq(&a, &b));

        let other = flights.acquire("VirusTotal", "example.com");
        assert!(!Arc::ptr_eq(&a, &other));
        assert_eq!(flights.len(), 2);

        drop(a);
        drop(b);
        drop(other);
        // Dead entries are swept on the next acquire.
        let _fresh = flights.acquire("ZETAlytics", "other.com");
        assert_eq!(flights.len(), 1);
    }

    #[tokio::test]
    async fn test_single_flight_serializes_holders() {
        let flights = SingleFlight::new();
        let lock = flights.acquire("p", "k");

        let guard = lock.lock().await;
        let second = flights.acquire("p", "k");
        assert!(second.try_lock().is_err());
        drop(guard);
        assert!(second.try_lock().is_ok());
    }
}
