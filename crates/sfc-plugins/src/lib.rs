//! # sfc-plugins
//!
//! Data-source plugins for Surfacer and the support library they share:
//! the HTTP client with retry and rate limiting, FQDN normalization, and
//! the attributed-storage helpers implementing the common handler tail.

pub mod api;
pub mod bootstrap;
pub mod http;
pub mod normalize;
pub mod support;
pub mod testing;

pub use api::{VirusTotal, Zetalytics};
pub use bootstrap::{start_builtin_plugins, stop_plugins};
pub use http::{rate_limiter, DirectRateLimiter, HttpClient, HttpClientConfig, HttpError};
pub use normalize::{clean_name, normalize_fqdn, remove_wildcard_label};
