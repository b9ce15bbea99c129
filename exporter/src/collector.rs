//! Per-scrape Jellyfin collector.
//!
//! Each scrape queries the API, aggregates the answers and records them into
//! a registry that lives only for that scrape. Any failed API call discards
//! the whole cycle: the scrape then carries no Jellyfin metrics at all.

use anyhow::Result;
use chrono::{TimeDelta, Utc};
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, Opts, Registry};
use std::collections::HashMap;
use tracing::{debug, error};

use crate::client::JellyfinClient;
use crate::config::ExporterConfig;
use crate::model::ItemCounts;
use crate::sessions::SessionSummary;
use jellyfin_exporter_common::{MetricsContext, ScrapeSource};

/// Name prefix of every Jellyfin metric.
const NAMESPACE: &str = "jellyfin";

/// Constant label naming the monitored instance.
pub const INSTANCE_LABEL: &str = "jellyfin_instance";

const STREAM_LABELS: &[&str] = &[
    "user",
    "client",
    "device_name",
    "play_name",
    "path",
    "run_time_ticks",
    "container",
    "video_display_title",
    "bit_rate",
    "bit_depth",
    "color_space",
    "audio_display_title",
    "position_ticks",
    "is_paused",
    "is_muted",
    "volume_level",
    "play_method",
];

const SESSION_LABELS: &[&str] = &["user", "client", "device_name", "last_active"];

/// Gauges of a single scrape.
///
/// Every series gets the `jellyfin_instance` label from the registry.
pub struct ScrapeMetrics {
    // ---
    registry: Registry,

    // Per-session rows
    sessions: GaugeVec,
    streams: GaugeVec,

    // Scalars
    sessions_count: GaugeVec,
    sessions_count_active: GaugeVec,
    active_streams_count: GaugeVec,
    active_streams_count_direct: GaugeVec,
    active_streams_count_transcode: GaugeVec,
    users_count: GaugeVec,
    users_count_disabled: GaugeVec,

    // Library
    item_counts: GaugeVec,
}

impl ScrapeMetrics {
    // ---
    /// Create a fresh registry for `instance` and register all gauges.
    pub fn new(instance: &str) -> Result<Self> {
        // ---
        let const_labels = HashMap::from([(INSTANCE_LABEL.to_string(), instance.to_string())]);
        let registry = Registry::new_custom(Some(NAMESPACE.into()), Some(const_labels))?;

        let gauge = |name: &str, help: &str, labels: &[&str]| -> Result<GaugeVec> {
            let vec = GaugeVec::new(Opts::new(name, help), labels)?;
            registry.register(Box::new(vec.clone()))?;
            Ok(vec)
        };

        Ok(Self {
            sessions: gauge("sessions", "Jellyfin user sessions", SESSION_LABELS)?,
            streams: gauge("streams", "Jellyfin user streams", STREAM_LABELS)?,
            sessions_count: gauge("sessions_count", "Jellyfin user sessions count", &[])?,
            sessions_count_active: gauge(
                "sessions_count_active",
                "Jellyfin active user sessions count",
                &[],
            )?,
            active_streams_count: gauge(
                "active_streams_count",
                "Jellyfin active streams count",
                &[],
            )?,
            active_streams_count_direct: gauge(
                "active_streams_count_direct",
                "Jellyfin active streams count (direct)",
                &[],
            )?,
            active_streams_count_transcode: gauge(
                "active_streams_count_transcode",
                "Jellyfin active streams count (transcode)",
                &[],
            )?,
            users_count: gauge("users_count", "Jellyfin users count", &[])?,
            users_count_disabled: gauge(
                "users_count_disabled",
                "Jellyfin disabled users count",
                &[],
            )?,
            item_counts: gauge("item_counts", "Jellyfin items counts", &["type"])?,
            registry,
        })
    }

    /// Records session counts and the per-session rows.
    pub fn record_sessions(&self, summary: &SessionSummary) {
        // ---
        for row in &summary.stream_rows {
            let run_time_ticks = row.run_time_ticks.to_string();
            let bit_rate = row.bit_rate.to_string();
            let bit_depth = row.bit_depth.to_string();
            let position_ticks = row.position_ticks.to_string();
            let is_paused = row.is_paused.to_string();
            let is_muted = row.is_muted.to_string();
            let volume_level = row.volume_level.to_string();

            self.streams
                .with_label_values(&[
                    &row.user,
                    &row.client,
                    &row.device_name,
                    &row.play_name,
                    &row.path,
                    &run_time_ticks,
                    &row.container,
                    &row.video_display_title,
                    &bit_rate,
                    &bit_depth,
                    &row.color_space,
                    &row.audio_display_title,
                    &position_ticks,
                    &is_paused,
                    &is_muted,
                    &volume_level,
                    &row.play_method,
                ])
                .set(1.0);
        }

        for row in &summary.active_rows {
            self.sessions
                .with_label_values(&[&row.user, &row.client, &row.device_name, &row.last_active])
                .set(1.0);
        }

        set_scalar(&self.sessions_count, summary.sessions);
        set_scalar(&self.sessions_count_active, summary.active_sessions);
        set_scalar(&self.active_streams_count, summary.streams);
        set_scalar(&self.active_streams_count_direct, summary.direct_streams);
        set_scalar(&self.active_streams_count_transcode, summary.transcode_streams);
    }

    pub fn record_users(&self, total: usize, disabled: usize) {
        // ---
        set_scalar(&self.users_count, total as u64);
        set_scalar(&self.users_count_disabled, disabled as u64);
    }

    /// One `item_counts` row per key; an empty mapping records nothing.
    pub fn record_item_counts(&self, counts: &ItemCounts) {
        // ---
        for (item_type, count) in counts {
            self.item_counts
                .with_label_values(&[item_type])
                .set(*count as f64);
        }
    }

    /// Gather the recorded families. Families without rows are omitted.
    pub fn gather(&self) -> Vec<MetricFamily> {
        // ---
        self.registry.gather()
    }
}

fn set_scalar(gauge: &GaugeVec, value: u64) {
    gauge.with_label_values(&[]).set(value as f64);
}

/// Scrape source that polls one Jellyfin instance.
pub struct JellyfinCollector {
    // ---
    client: JellyfinClient,
    instance: String,
    active_window: TimeDelta,
    metrics: MetricsContext,
}

impl JellyfinCollector {
    // ---
    pub fn new(config: &ExporterConfig, client: JellyfinClient, metrics: MetricsContext) -> Self {
        // ---
        Self {
            client,
            instance: config.base_url.clone(),
            active_window: config.active_window,
            metrics,
        }
    }

    /// Runs one collection cycle, failing on the first API error.
    pub async fn try_collect(&self) -> Result<Vec<MetricFamily>> {
        // ---
        let scrape = ScrapeMetrics::new(&self.instance)?;

        let sessions = self.client.sessions().await?;
        let summary = SessionSummary::from_sessions(&sessions, Utc::now(), self.active_window);
        scrape.record_sessions(&summary);

        let users = self.client.users().await?;
        let disabled_users = self.client.disabled_users().await?;
        scrape.record_users(users, disabled_users);

        let item_counts = self.client.item_counts().await?;
        scrape.record_item_counts(&item_counts);

        debug!(
            "Collected {} sessions ({} active), {} streams, {} users, {} item types",
            summary.sessions,
            summary.active_sessions,
            summary.streams,
            users,
            item_counts.len()
        );

        Ok(scrape.gather())
    }
}

impl ScrapeSource for JellyfinCollector {
    async fn collect(&self) -> Vec<MetricFamily> {
        // ---
        match self.try_collect().await {
            Ok(families) => families,
            Err(e) => {
                error!("Error getting metrics: {e:#}");
                self.metrics.scrape_failures_total.inc();
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::sessions::{ActiveSessionRow, StreamRow};

    const INSTANCE: &str = "http://jellyfin:8096";

    fn family<'a>(families: &'a [MetricFamily], name: &str) -> Option<&'a MetricFamily> {
        families.iter().find(|mf| mf.get_name() == name)
    }

    fn label<'a>(metric: &'a prometheus::proto::Metric, name: &str) -> Option<&'a str> {
        // ---
        metric
            .get_label()
            .iter()
            .find(|l| l.get_name() == name)
            .map(|l| l.get_value())
    }

    #[test]
    fn scalars_carry_instance_label() {
        // ---
        let scrape = ScrapeMetrics::new(INSTANCE).expect("registry");
        scrape.record_sessions(&SessionSummary {
            sessions: 3,
            active_sessions: 2,
            streams: 2,
            direct_streams: 1,
            transcode_streams: 1,
            ..SessionSummary::default()
        });
        scrape.record_users(5, 1);

        let families = scrape.gather();
        for (name, expected) in [
            ("jellyfin_sessions_count", 3.0),
            ("jellyfin_sessions_count_active", 2.0),
            ("jellyfin_active_streams_count", 2.0),
            ("jellyfin_active_streams_count_direct", 1.0),
            ("jellyfin_active_streams_count_transcode", 1.0),
            ("jellyfin_users_count", 5.0),
            ("jellyfin_users_count_disabled", 1.0),
        ] {
            let mf = family(&families, name).unwrap_or_else(|| panic!("missing {name}"));
            let metric = &mf.get_metric()[0];
            assert_eq!(metric.get_gauge().get_value(), expected, "{name}");
            assert_eq!(label(metric, INSTANCE_LABEL), Some(INSTANCE), "{name}");
        }
    }

    #[test]
    fn rows_render_labels() {
        // ---
        let scrape = ScrapeMetrics::new(INSTANCE).expect("registry");
        scrape.record_sessions(&SessionSummary {
            sessions: 1,
            active_sessions: 1,
            streams: 1,
            direct_streams: 1,
            stream_rows: vec![StreamRow {
                user: "alice".into(),
                play_name: "Movie".into(),
                run_time_ticks: 100,
                is_paused: true,
                ..StreamRow::default()
            }],
            active_rows: vec![ActiveSessionRow {
                user: "alice".into(),
                client: "Web".into(),
                device_name: "PC".into(),
                last_active: "2024-05-01T12:00:00Z".into(),
            }],
            ..SessionSummary::default()
        });

        let families = scrape.gather();

        let streams = family(&families, "jellyfin_streams").expect("streams");
        let row = &streams.get_metric()[0];
        assert_eq!(row.get_gauge().get_value(), 1.0);
        assert_eq!(label(row, "play_name"), Some("Movie"));
        assert_eq!(label(row, "run_time_ticks"), Some("100"));
        assert_eq!(label(row, "is_paused"), Some("true"));
        assert_eq!(label(row, "is_muted"), Some("false"));
        assert_eq!(label(row, INSTANCE_LABEL), Some(INSTANCE));

        let sessions = family(&families, "jellyfin_sessions").expect("sessions");
        let row = &sessions.get_metric()[0];
        assert_eq!(label(row, "last_active"), Some("2024-05-01T12:00:00Z"));
        assert_eq!(label(row, "device_name"), Some("PC"));
    }

    #[test]
    fn item_counts_one_row_per_key() {
        // ---
        let scrape = ScrapeMetrics::new(INSTANCE).expect("registry");
        let counts = ItemCounts::from([("MovieCount".to_string(), 42), ("SeriesCount".to_string(), 7)]);
        scrape.record_item_counts(&counts);

        let families = scrape.gather();
        let mf = family(&families, "jellyfin_item_counts").expect("item counts");
        assert_eq!(mf.get_metric().len(), 2);

        let value_of = |key: &str| {
            mf.get_metric()
                .iter()
                .find(|m| label(m, "type") == Some(key))
                .map(|m| m.get_gauge().get_value())
        };
        assert_eq!(value_of("MovieCount"), Some(42.0));
        assert_eq!(value_of("SeriesCount"), Some(7.0));
    }

    #[test]
    fn empty_item_counts_emit_no_rows() {
        // ---
        let scrape = ScrapeMetrics::new(INSTANCE).expect("registry");
        scrape.record_item_counts(&ItemCounts::new());

        assert!(family(&scrape.gather(), "jellyfin_item_counts").is_none());
    }

    #[test]
    fn fresh_registry_per_scrape() {
        // ---
        let first = ScrapeMetrics::new(INSTANCE).expect("registry");
        first.record_users(10, 2);
        let second = ScrapeMetrics::new(INSTANCE).expect("registry");

        assert!(family(&second.gather(), "jellyfin_users_count").is_none());
    }
}
