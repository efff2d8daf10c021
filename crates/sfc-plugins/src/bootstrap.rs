//! Built-in plugin bootstrap.
//!
//! Constructs the shipped data-source plugins, applying any per-source
//! rate override from the configuration, and registers their handlers.
//! A registration failure here is fatal to session startup.

use crate::api::{VirusTotal, Zetalytics};
use crate::http::HttpClientConfig;
use sfc_core::config::Config;
use sfc_core::error::EngineResult;
use sfc_core::events::{Plugin, Registry};
use std::sync::Arc;

fn http_settings(config: &Config) -> HttpClientConfig {
    HttpClientConfig {
        timeout_secs: config.engine.http_timeout_secs,
        max_retries: config.engine.max_retries,
        ..HttpClientConfig::default()
    }
}

fn rate_for(config: &Config, source: &str, default: u32) -> u32 {
    config
        .data_source(source)
        .and_then(|ds| ds.rate)
        .unwrap_or(default)
}

/// Starts every built-in plugin against the registry.
///
/// Returns the started plugins so the caller can `stop()` them at
/// session shutdown, in reverse start order.
pub async fn start_builtin_plugins(
    config: &Config,
    registry: &Registry,
) -> EngineResult<Vec<Arc<dyn Plugin>>> {
    let http = http_settings(config);
    let mut plugins: Vec<Arc<dyn Plugin>> = Vec::new();

    let zetalytics =
        Zetalytics::with_options(rate_for(config, "ZETAlytics", 5), http.clone())?;
    zetalytics.clone().start(registry).await?;
    plugins.push(zetalytics);

    let virustotal = VirusTotal::with_options(rate_for(config, "VirusTotal", 5), http)?;
    virustotal.clone().start(registry).await?;
    plugins.push(virustotal);

    Ok(plugins)
}

/// Stops plugins in reverse start order.
pub async fn stop_plugins(plugins: &[Arc<dyn Plugin>]) {
    for plugin in plugins.iter().rev() {
        plugin.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sfc_core::model::AssetType;

    #[tokio::test]
    async fn test_builtin_plugins_register_fqdn_handlers() {
        let registry = Registry::new();
        let plugins = start_builtin_plugins(&Config::default(), &registry)
            .await
            .unwrap();
        assert_eq!(plugins.len(), 2);

        let handlers = registry.handlers_for(AssetType::Fqdn);
        let names: Vec<&str> = handlers.iter().map(|h| h.handler.plugin.as_str()).collect();
        assert_eq!(names, vec!["ZETAlytics", "VirusTotal"]);

        stop_plugins(&plugins).await;
    }

    #[tokio::test]
    async fn test_double_start_is_a_fatal_registration_error() {
        let registry = Registry::new();
        start_builtin_plugins(&Config::default(), &registry)
            .await
            .unwrap();
        assert!(start_builtin_plugins(&Config::default(), &registry)
            .await
            .is_err());
    }
}
