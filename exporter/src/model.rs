//! Jellyfin API documents consumed by the exporter.
//!
//! Only the fields the exporter reads are modelled. Every field is
//! optional on the wire and decoded leniently: a missing key, an explicit
//! `null` or a value of the wrong JSON type falls back to the field's
//! default, so one odd field never fails the whole document. Only the
//! top-level shape (an array of session objects, a map of counts) is strict.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;

/// Scalar leaf types that can be recovered from loosely-typed JSON.
trait Lenient: Sized {
    /// Converts `value`, or `None` if it has no sensible reading as `Self`.
    fn from_json(value: Value) -> Option<Self>;
}

impl Lenient for String {
    fn from_json(value: Value) -> Option<Self> {
        // ---
        match value {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl Lenient for i64 {
    fn from_json(value: Value) -> Option<Self> {
        // ---
        match value {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>().ok().or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(|f| f as i64)
                })
            }
            _ => None,
        }
    }
}

impl Lenient for bool {
    fn from_json(value: Value) -> Option<Self> {
        // ---
        match value {
            Value::Bool(b) => Some(b),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }
}

/// Scalar field: wrong types and `null` decode as `T::default()`.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Lenient + Default,
{
    Ok(T::from_json(Value::deserialize(deserializer)?).unwrap_or_default())
}

/// Optional scalar field: wrong types and `null` decode as `None`.
fn lenient_opt<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Lenient,
{
    Ok(T::from_json(Value::deserialize(deserializer)?))
}

/// Optional sub-object: anything that is not a usable object is `None`.
fn lenient_nested<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(serde_json::from_value(Value::deserialize(deserializer)?).ok())
}

/// List of sub-objects: a non-array is empty, a bad entry keeps its slot as a default.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).unwrap_or_default())
            .collect(),
        _ => Vec::new(),
    })
}

/// One connected client, as returned by `GET /Sessions`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Session {
    // ---
    /// Sessions without a user (e.g. pre-login clients) are ignored.
    #[serde(deserialize_with = "lenient_opt")]
    pub user_name: Option<String>,

    #[serde(deserialize_with = "lenient")]
    pub client: String,

    #[serde(deserialize_with = "lenient")]
    pub device_name: String,

    #[serde(deserialize_with = "lenient")]
    pub is_active: bool,

    /// ISO-8601 timestamp, kept verbatim for the `last_active` label.
    #[serde(deserialize_with = "lenient_opt")]
    pub last_activity_date: Option<String>,

    #[serde(deserialize_with = "lenient_nested")]
    pub now_playing_item: Option<NowPlayingItem>,

    #[serde(deserialize_with = "lenient_nested")]
    pub play_state: Option<PlayState>,

    /// Jellyfin reports transcoding on the session itself.
    #[serde(deserialize_with = "lenient_nested")]
    pub transcoding_info: Option<TranscodingInfo>,
}

/// The item a session is currently playing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NowPlayingItem {
    // ---
    #[serde(deserialize_with = "lenient")]
    pub name: String,

    #[serde(deserialize_with = "lenient")]
    pub path: String,

    /// Duration in 100ns ticks.
    #[serde(deserialize_with = "lenient")]
    pub run_time_ticks: i64,

    #[serde(deserialize_with = "lenient")]
    pub container: String,

    /// Positional: index 0 is taken as video, index 1 as audio.
    #[serde(deserialize_with = "lenient_list")]
    pub media_streams: Vec<MediaStream>,

    #[serde(deserialize_with = "lenient_nested")]
    pub transcoding_info: Option<TranscodingInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MediaStream {
    // ---
    #[serde(deserialize_with = "lenient")]
    pub display_title: String,

    #[serde(deserialize_with = "lenient")]
    pub bit_rate: i64,

    #[serde(deserialize_with = "lenient")]
    pub bit_depth: i64,

    #[serde(deserialize_with = "lenient")]
    pub color_space: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TranscodingInfo {
    // ---
    #[serde(deserialize_with = "lenient")]
    pub is_video_direct: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PlayState {
    // ---
    #[serde(deserialize_with = "lenient")]
    pub position_ticks: i64,

    #[serde(deserialize_with = "lenient")]
    pub is_paused: bool,

    #[serde(deserialize_with = "lenient")]
    pub is_muted: bool,

    #[serde(deserialize_with = "lenient")]
    pub volume_level: i64,

    #[serde(deserialize_with = "lenient")]
    pub play_method: String,
}

/// Library item counts from `GET /Items/Counts`, keyed by type name
/// (`MovieCount`, `SeriesCount`, ...).
pub type ItemCounts = BTreeMap<String, i64>;
