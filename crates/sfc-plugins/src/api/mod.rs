//! API-backed data-source plugins.

pub mod virustotal;
pub mod zetalytics;

pub use virustotal::VirusTotal;
pub use zetalytics::Zetalytics;
