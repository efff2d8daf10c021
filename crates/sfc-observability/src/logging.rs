//! Logging infrastructure for Surfacer.
//!
//! Structured logging via the tracing ecosystem; the environment filter
//! (`RUST_LOG`) wins over the configured level when set.

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level.
    pub level: Level,
    /// Whether to emit JSON instead of human-readable lines.
    pub json_format: bool,
    /// Whether to include span open/close events.
    pub include_spans: bool,
    /// Whether to include the target (module path).
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            include_spans: false,
            include_target: true,
        }
    }
}

impl LoggingConfig {
    /// Verbose configuration for interactive debugging.
    pub fn verbose() -> Self {
        Self {
            level: Level::DEBUG,
            include_spans: true,
            ..Self::default()
        }
    }

    /// JSON output for log collectors.
    pub fn production() -> Self {
        Self {
            json_format: true,
            ..Self::default()
        }
    }
}

/// Initializes logging with the default configuration.
pub fn init_logging() {
    init_logging_with_config(LoggingConfig::default());
}

/// Initializes logging with the given configuration.
pub fn init_logging_with_config(config: LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "sfc_core={},sfc_plugins={},sfc_cli={}",
            config.level, config.level, config.level
        ))
    });

    let span_events = if config.include_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    if config.json_format {
        let fmt_layer = fmt::layer()
            .json()
            .with_span_events(span_events)
            .with_target(config.include_target);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    } else {
        let fmt_layer = fmt::layer()
            .with_span_events(span_events)
            .with_target(config.include_target);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    }
}
