//! Session aggregation.
//!
//! Turns the `/Sessions` document into counts plus the label rows of the
//! per-session gauges. Pure: the caller supplies `now` and the window.

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use tracing::debug;

use crate::model::{NowPlayingItem, PlayState, Session};

/// How a playing session is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Direct,
    Transcode,
}

/// Label values of one `jellyfin_streams` row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamRow {
    // ---
    pub user: String,
    pub client: String,
    pub device_name: String,
    pub play_name: String,
    pub path: String,
    pub run_time_ticks: i64,
    pub container: String,
    pub video_display_title: String,
    pub bit_rate: i64,
    pub bit_depth: i64,
    pub color_space: String,
    pub audio_display_title: String,
    pub position_ticks: i64,
    pub is_paused: bool,
    pub is_muted: bool,
    pub volume_level: i64,
    pub play_method: String,
}

/// Label values of one `jellyfin_sessions` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSessionRow {
    // ---
    pub user: String,
    pub client: String,
    pub device_name: String,
    /// Last-activity timestamp as reported by the server.
    pub last_active: String,
}

/// Everything one scrape reports about sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    // ---
    pub sessions: u64,
    pub active_sessions: u64,
    pub streams: u64,
    pub direct_streams: u64,
    pub transcode_streams: u64,
    pub stream_rows: Vec<StreamRow>,
    pub active_rows: Vec<ActiveSessionRow>,
}

impl SessionSummary {
    // ---
    /// Aggregates `sessions` as observed at `now`.
    ///
    /// Sessions without a user name are skipped entirely. A session is
    /// active when it is flagged active and its last activity lies less than
    /// `active_window` before `now`.
    pub fn from_sessions(sessions: &[Session], now: DateTime<Utc>, active_window: TimeDelta) -> Self {
        // ---
        let mut summary = Self::default();

        for session in sessions {
            let Some(user) = session.user_name.as_deref() else {
                continue;
            };

            summary.sessions += 1;

            if let Some(item) = &session.now_playing_item {
                summary.streams += 1;
                match classify(session, item) {
                    StreamKind::Direct => summary.direct_streams += 1,
                    StreamKind::Transcode => summary.transcode_streams += 1,
                }
                summary
                    .stream_rows
                    .push(stream_row(user, session, item, session.play_state.as_ref()));
            }

            if session.is_active && is_recent(session, now, active_window) {
                summary.active_sessions += 1;
                summary.active_rows.push(ActiveSessionRow {
                    user: user.to_string(),
                    client: session.client.clone(),
                    device_name: session.device_name.clone(),
                    last_active: session.last_activity_date.clone().unwrap_or_default(),
                });
            }
        }

        summary
    }
}

/// Direct unless transcoding info says the video is not passed through.
///
/// The session-level block wins; the now-playing item's block is the fallback.
pub fn classify(session: &Session, item: &NowPlayingItem) -> StreamKind {
    // ---
    match session
        .transcoding_info
        .as_ref()
        .or(item.transcoding_info.as_ref())
    {
        Some(info) if !info.is_video_direct => StreamKind::Transcode,
        _ => StreamKind::Direct,
    }
}

fn stream_row(
    user: &str,
    session: &Session,
    item: &NowPlayingItem,
    play_state: Option<&PlayState>,
) -> StreamRow {
    // ---
    let mut row = StreamRow {
        user: user.to_string(),
        client: session.client.clone(),
        device_name: session.device_name.clone(),
        play_name: item.name.clone(),
        path: item.path.clone(),
        run_time_ticks: item.run_time_ticks,
        container: item.container.clone(),
        ..StreamRow::default()
    };

    // Stream details only when both a video and an audio slot exist
    if let [video, audio, ..] = item.media_streams.as_slice() {
        row.video_display_title = video.display_title.clone();
        row.bit_rate = video.bit_rate;
        row.bit_depth = video.bit_depth;
        row.color_space = video.color_space.clone();
        row.audio_display_title = audio.display_title.clone();
    }

    if let Some(state) = play_state {
        row.position_ticks = state.position_ticks;
        row.is_paused = state.is_paused;
        row.is_muted = state.is_muted;
        row.volume_level = state.volume_level;
        row.play_method = state.play_method.clone();
    }

    row
}

fn is_recent(session: &Session, now: DateTime<Utc>, window: TimeDelta) -> bool {
    // ---
    let Some(raw) = session.last_activity_date.as_deref() else {
        return false;
    };
    match parse_timestamp(raw) {
        Some(last_active) => now.signed_duration_since(last_active) < window,
        None => {
            debug!("Ignoring unparseable LastActivityDate {raw:?}");
            false
        }
    }
}

/// Parses an ISO-8601 timestamp; values without an offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    // ---
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
