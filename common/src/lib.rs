//! Shared plumbing for the Jellyfin exporter.
//!
//! Holds everything that is not Jellyfin-specific: log output policy,
//! tracing setup and the built-in Prometheus scrape endpoint.

pub mod cli;
pub mod observability;

pub use cli::ColorWhen;
pub use observability::{init_tracing, MetricsContext, MetricsServerConfig, ScrapeSource};
