//! Process configuration.
//!
//! Settings come from command-line flags, each backed by an environment
//! variable, and are validated once into an immutable [`ExporterConfig`]
//! that is handed to the client and collector at startup.

use anyhow::{ensure, Context, Result};
use chrono::TimeDelta;
use clap::Parser;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Default port of the metrics endpoint.
pub const DEFAULT_PORT: u16 = 9027;

/// Default active-session window in minutes.
pub const DEFAULT_ACTIVE_WINDOW_MINUTES: u64 = 60;

/// Label format differences operators migrating dashboards need to know.
pub const LABEL_FORMAT_NOTE: &str = "\
Label format: boolean labels of jellyfin_streams (is_paused, is_muted) are
rendered as \"true\"/\"false\". Earlier exporter releases emitted \"True\"/\"False\";
update dashboard and alert selectors such as is_paused=\"True\" accordingly.";

/// Raw exporter settings as given on the command line or in the environment.
#[derive(Parser, Debug, Clone)]
#[command(after_help = LABEL_FORMAT_NOTE)]
pub struct ExporterArgs {
    // ---
    /// Base URL of the Jellyfin instance, e.g. `http://jellyfin:8096`
    #[arg(long, env = "JELLYFIN_BASEURL")]
    pub base_url: Option<String>,

    /// Jellyfin API key
    #[arg(long, env = "JELLYFIN_APIKEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Port of the metrics endpoint
    #[arg(long, env = "JELLYFIN_EXPORTER_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address the metrics endpoint binds to
    #[arg(
        long,
        env = "JELLYFIN_EXPORTER_LISTEN_ADDRESS",
        default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    )]
    pub listen_address: IpAddr,

    /// Sessions whose last activity is older than this are not reported as active
    #[arg(
        long,
        env = "JELLYFIN_ACTIVE_WINDOW_MINUTES",
        default_value_t = DEFAULT_ACTIVE_WINDOW_MINUTES
    )]
    pub active_window_minutes: u64,
}

/// Validated, immutable exporter configuration.
#[derive(Clone)]
pub struct ExporterConfig {
    // ---
    /// Base URL exactly as configured; also the `jellyfin_instance` label.
    pub base_url: String,
    pub api_key: String,
    pub listen: SocketAddr,
    pub active_window: TimeDelta,
}

impl ExporterArgs {
    // ---
    /// Validates the raw settings.
    ///
    /// # Errors
    ///
    /// Fails when the base URL or API key is missing or empty, when the base
    /// URL does not parse, or when the active window is zero or out of range.
    pub fn into_config(self) -> Result<ExporterConfig> {
        // ---
        let base_url = self
            .base_url
            .filter(|v| !v.trim().is_empty())
            .context("JELLYFIN_BASEURL environment variable is required.")?;
        let api_key = self
            .api_key
            .filter(|v| !v.trim().is_empty())
            .context("JELLYFIN_APIKEY environment variable is required.")?;

        reqwest::Url::parse(&base_url)
            .with_context(|| format!("JELLYFIN_BASEURL is not a valid URL: {base_url}"))?;

        ensure!(
            self.active_window_minutes > 0,
            "active window must be at least one minute"
        );
        let active_window = i64::try_from(self.active_window_minutes)
            .ok()
            .and_then(TimeDelta::try_minutes)
            .context("active window is out of range")?;

        Ok(ExporterConfig {
            base_url,
            api_key,
            listen: SocketAddr::new(self.listen_address, self.port),
            active_window,
        })
    }
}

impl fmt::Debug for ExporterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        f.debug_struct("ExporterConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("listen", &self.listen)
            .field("active_window", &self.active_window)
            .finish()
    }
}
