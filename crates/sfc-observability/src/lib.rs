//! # sfc-observability
//!
//! Logging and tracing setup shared by the Surfacer binaries.

pub mod logging;

pub use logging::{init_logging, init_logging_with_config, LoggingConfig};
