//! Jellyfin HTTP API client.
//!
//! Thin authenticated GET wrapper: every call appends the `api_key` query
//! parameter, logs its latency and feeds the latency histogram. Failures
//! (transport, non-2xx status, unexpected JSON) are returned, never retried.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::{DeserializeOwned, IgnoredAny};
use std::time::Instant;
use tracing::info;

use crate::config::ExporterConfig;
use crate::model::{ItemCounts, Session};
use jellyfin_exporter_common::MetricsContext;

/// Authenticated client for one Jellyfin instance.
#[derive(Clone)]
pub struct JellyfinClient {
    // ---
    http: Client,
    base_url: String,
    api_key: String,
    metrics: MetricsContext,
}

impl JellyfinClient {
    // ---
    /// Creates a client for the instance named in `config`.
    ///
    /// # Errors
    ///
    /// Returns error if the underlying HTTP client cannot be built.
    pub fn new(config: &ExporterConfig, metrics: MetricsContext) -> Result<Self> {
        // ---
        let http = Client::builder()
            .user_agent(concat!("jellyfin-exporter/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            metrics,
        })
    }

    /// Issues `GET <base_url><path>` and decodes the JSON body as `T`.
    ///
    /// `params` are sent as query parameters in addition to `api_key`.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, params: &[(&str, &str)]) -> Result<T> {
        // ---
        let url = format!("{}{}", self.base_url, path);
        let start = Instant::now();

        let result = self.fetch(&url, params).await;

        let elapsed = start.elapsed();
        self.metrics
            .api_request_duration_seconds
            .with_label_values(&[path])
            .observe(elapsed.as_secs_f64());
        info!("GET {path} {params:?} returned in {:.3}s", elapsed.as_secs_f64());

        result.with_context(|| format!("request to {path} failed"))
    }

    async fn fetch<T: DeserializeOwned>(&self, url: &str, params: &[(&str, &str)]) -> Result<T> {
        // ---
        let response = self
            .http
            .get(url)
            .query(&[("api_key", self.api_key.as_str())])
            .query(params)
            .send()
            .await?
            .error_for_status()?;

        let body = response.bytes().await?;
        serde_json::from_slice(&body).context("response is not the expected JSON document")
    }

    /// All sessions known to the server.
    pub async fn sessions(&self) -> Result<Vec<Session>> {
        // ---
        self.get("/Sessions", &[]).await
    }

    /// Number of users on the server.
    pub async fn users(&self) -> Result<usize> {
        // ---
        self.count("/Users", &[]).await
    }

    /// Number of disabled users.
    pub async fn disabled_users(&self) -> Result<usize> {
        // ---
        self.count("/Users", &[("isDisabled", "true")]).await
    }

    /// Length of the JSON array at `path`; entries are not inspected.
    async fn count(&self, path: &str, params: &[(&str, &str)]) -> Result<usize> {
        // ---
        let entries: Vec<IgnoredAny> = self.get(path, params).await?;
        Ok(entries.len())
    }

    /// Library item counts by type.
    pub async fn item_counts(&self) -> Result<ItemCounts> {
        // ---
        self.get("/Items/Counts", &[]).await
    }
}
