//! Jellyfin Prometheus exporter library.
//!
//! Polls a Jellyfin server's HTTP API on every scrape and republishes
//! sessions, streams, users and library item counts as Prometheus gauges.
//! The binary wires these pieces to the scrape endpoint from
//! `jellyfin-exporter-common`; tests drive them directly.

pub mod client;
pub mod collector;
pub mod config;
pub mod model;
pub mod sessions;

pub use client::JellyfinClient;
pub use collector::{JellyfinCollector, ScrapeMetrics, INSTANCE_LABEL};
pub use config::{ExporterArgs, ExporterConfig};
pub use sessions::{SessionSummary, StreamKind};
