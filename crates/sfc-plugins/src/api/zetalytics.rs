//! ZETAlytics passive-DNS subdomain source.

use crate::http::{rate_limiter, DirectRateLimiter, HttpClient, HttpClientConfig, HttpError};
use crate::normalize::normalize_fqdn;
use crate::support;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use sfc_core::error::{EngineError, EngineResult};
use sfc_core::events::{Event, Handler, HandlerAction, Plugin, Registry};
use sfc_core::filter::FqdnFilter;
use sfc_core::graph::StoredAsset;
use sfc_core::model::{Asset, AssetType, Fqdn, Source};
use sfc_core::session::IoKind;
use sfc_core::ttl::ttl_start;
use std::sync::Arc;
use tracing::{debug, info};

const NAME: &str = "ZETAlytics";
const PRIORITY: u8 = 6;
const MAX_INSTANCES: usize = 10;
const REQUESTS_PER_SECOND: u32 = 5;

/// How far back the subdomain query reaches, in days.
const QUERY_WINDOW_DAYS: i64 = 90;

/// Cap on candidate names kept from a single query.
const RESULT_CAP: usize = 1000;

#[derive(Debug, Deserialize)]
struct SubdomainsResponse {
    #[serde(default)]
    total: i64,
    #[serde(default)]
    results: Vec<SubdomainEntry>,
}

#[derive(Debug, Deserialize)]
struct SubdomainEntry {
    qname: String,
}

/// ZETAlytics plugin: expands an in-scope FQDN into the subdomains the
/// zonecruncher passive-DNS feed has seen for it.
pub struct Zetalytics {
    source: Source,
    limiter: Arc<DirectRateLimiter>,
    http: HttpClient,
}

impl Zetalytics {
    /// Creates the plugin with its default rate limit.
    pub fn new() -> EngineResult<Arc<Self>> {
        Self::with_rate(REQUESTS_PER_SECOND)
    }

    /// Creates the plugin with an overridden requests-per-second rate.
    pub fn with_rate(per_second: u32) -> EngineResult<Arc<Self>> {
        Self::with_options(per_second, HttpClientConfig::default())
    }

    /// Creates the plugin with explicit rate and HTTP settings.
    pub fn with_options(per_second: u32, http: HttpClientConfig) -> EngineResult<Arc<Self>> {
        let http = HttpClient::new(http).map_err(|e| EngineError::Plugin(e.to_string()))?;
        Ok(Arc::new(Self {
            source: Source {
                name: NAME.to_string(),
                confidence: 100,
            },
            limiter: rate_limiter(per_second),
            http,
        }))
    }

    fn handler_name(&self) -> String {
        format!("{NAME}-Handler")
    }

    async fn check(&self, event: &Event) -> EngineResult<()> {
        let Asset::Fqdn(fqdn) = &event.asset.asset else {
            return Err(EngineError::WrongAssetType {
                expected: AssetType::Fqdn,
            });
        };

        // Missing credentials are not an error; the source simply does
        // not participate in this session.
        let Some(ds) = event.session.config().data_source(NAME) else {
            return Ok(());
        };
        let keys = ds.api_keys();
        if keys.is_empty() {
            return Ok(());
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
            NAME,
        );

        // One concurrent external query per (plugin, asset); a second
        // dispatch waits here, then sees the ledger freshly marked and
        // takes the graph path.
        let flight = event.session.single_flight().acquire(NAME, &fqdn.name);
        let _guard = flight.lock().await;

        let names = if support::asset_monitored_within_ttl(&event.session, &event.asset, &src, since)
            .await
        {
            self.lookup(event, &fqdn.name, &src, since).await?
        } else {
            let names = self.query(event, &fqdn.name, &src, &keys).await?;
            support::mark_asset_monitored(&event.session, &event.asset, &src).await;
            names
        };

        if !names.is_empty() {
            support::process_fqdns_with_source(event, &names, &src, PRIORITY).await?;
        }
        Ok(())
    }

    async fn lookup(
        &self,
        event: &Event,
        name: &str,
        src: &StoredAsset,
        since: DateTime<Utc>,
    ) -> EngineResult<Vec<StoredAsset>> {
        support::source_to_assets_within_ttl(&event.session, name, AssetType::Fqdn, src, since)
            .await
    }

    async fn query(
        &self,
        event: &Event,
        name: &str,
        src: &StoredAsset,
        keys: &[String],
    ) -> EngineResult<Vec<StoredAsset>> {
        let names = FqdnFilter::new(RESULT_CAP * 4);

        for key in keys {
            let start = (Utc::now() - Duration::days(QUERY_WINDOW_DAYS)).timestamp();
            let url = format!(
                "https://zonecruncher.com/api/v1/subdomains?q={name}&token={key}\
                 &tsfield=last_seen&start={start}"
            );

            self.limiter.until_ready().await;
            let _io = event.session.io_guard(IoKind::Http).await?;

            // A transport failure moves on to the next key; a malformed
            // body means the source itself is misbehaving, so stop.
            let response: SubdomainsResponse = match self.http.get_json(&url).await {
                Ok(response) => response,
                Err(HttpError::InvalidResponse(err)) => {
                    debug!(plugin = NAME, error = %err, "malformed subdomain response");
                    break;
                }
                Err(err) => {
                    debug!(plugin = NAME, error = %err, "subdomain query failed");
                    continue;
                }
            };
            if response.total == 0 {
                break;
            }

            for entry in &response.results {
                let Some(candidate) = normalize_fqdn(&entry.qname) else {
                    continue;
                };
                let asset = Asset::Fqdn(Fqdn::new(candidate.clone()));
                if event.session.scope().in_scope(&asset, 0).await.is_some() {
                    names.insert(&candidate);
                }
            }
            break;
        }

        names.prune(RESULT_CAP);
        support::store_fqdns_with_source(
            &event.session,
            &names.to_vec(),
            src,
            NAME,
            &self.handler_name(),
        )
        .await
    }
}

#[async_trait]
impl Plugin for Zetalytics {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(self: Arc<Self>, registry: &Registry) -> EngineResult<()> {
        registry.register(Handler {
            plugin: NAME.to_string(),
            name: self.handler_name(),
            event_type: AssetType::Fqdn,
            transforms: vec![AssetType::Fqdn],
            priority: PRIORITY,
            max_instances: MAX_INSTANCES,
            action: self.clone(),
        })?;

        info!(plugin = NAME, "plugin started");
        Ok(())
    }

    async fn stop(&self) {
        info!(plugin = NAME, "plugin stopped");
    }
}

#[async_trait]
impl HandlerAction for Zetalytics {
    async fn handle(&self, event: &Event) -> EngineResult<()> {
        self.check(event).await
    }
}
