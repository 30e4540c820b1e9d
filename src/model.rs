//! Mirrored player state
//!
//! Parsing is deliberately lenient: the remote side has no fixed schema, so
//! every field is located by name (see [`crate::extract`]) and missing values
//! fall back to documented defaults instead of failing the poll.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::extract::{extract_str, find_field, value_as_i64, value_as_id};

/// Duration reported for a missing track or a track without a duration.
pub const UNKNOWN_DURATION_MS: u64 = 1;

/// Playback state enumeration
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PlayState {
    Playing,
    Paused,
    #[default]
    Stopped,
}

impl PlayState {
    /// Any token other than `playing`/`paused` reads as stopped.
    pub fn from_token(token: &str) -> Self {
        match token {
            "playing" => Self::Playing,
            "paused" => Self::Paused,
            _ => Self::Stopped,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
        }
    }

    /// A track is loaded (playing or paused).
    pub fn has_track(&self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }
}

impl std::fmt::Display for PlayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A track as reported by `info track` / `info playlist`. Identity is the uri.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub uri: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration_ms: Option<u64>,
    pub playlist_position: Option<usize>,
    /// Everything the server sent for this track, untouched
    pub metadata: Map<String, Value>,
}

impl Track {
    /// Parse a track object. Returns `None` when there is no uri (`link`).
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let uri = obj
            .get("link")
            .or_else(|| obj.get("uri"))
            .and_then(|v| v.as_str())?
            .to_string();

        let text = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| obj.get(*k).and_then(|v| v.as_str()))
                .map(|s| s.to_string())
        };

        Some(Self {
            uri,
            title: text(&["title", "name"]),
            artist: text(&["artist"]),
            album: text(&["album"]),
            duration_ms: obj
                .get("duration")
                .and_then(value_as_i64)
                .and_then(|d| u64::try_from(d).ok()),
            playlist_position: obj
                .get("playlistPosition")
                .and_then(value_as_i64)
                .and_then(|p| usize::try_from(p).ok()),
            metadata: obj.clone(),
        })
    }

    /// Duration with the 1 ms sentinel substituted for missing/zero values.
    pub fn effective_duration_ms(&self) -> u64 {
        self.duration_ms
            .filter(|d| *d > 0)
            .unwrap_or(UNKNOWN_DURATION_MS)
    }
}

/// Result of an `info track` poll. Replaced wholesale on each successful poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub track: Option<Track>,
    pub play_state: PlayState,
    pub track_uri: Option<String>,
}

impl PlayerState {
    pub fn from_response(response: &Value) -> Self {
        let play_state = PlayState::from_token(extract_str(response, "state", "stopped"));
        let track = find_field(response, "track").and_then(Track::from_value);
        let track_uri = track.as_ref().map(|t| t.uri.clone());
        Self {
            track,
            play_state,
            track_uri,
        }
    }

    /// Composite change key: `<uri>-<state>`, with `null` for a missing uri.
    pub fn change_key(&self) -> String {
        format!(
            "{}-{}",
            self.track_uri.as_deref().unwrap_or("null"),
            self.play_state
        )
    }

    pub fn duration_ms(&self) -> u64 {
        self.track
            .as_ref()
            .map(Track::effective_duration_ms)
            .unwrap_or(UNKNOWN_DURATION_MS)
    }
}

/// Playlist entries plus the server's opaque fingerprint for them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaylistState {
    pub hash: Option<String>,
    pub entries: Vec<Track>,
}

/// Parse the `playlist` array of an `info playlist` response.
pub fn playlist_entries(response: &Value) -> Vec<Track> {
    find_field(response, "playlist")
        .and_then(|v| v.as_array())
        .map(|items| items.iter().filter_map(Track::from_value).collect())
        .unwrap_or_default()
}

/// A selectable audio output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sink {
    pub index: String,
    pub name: String,
    pub is_default: bool,
}

impl Sink {
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let index = obj.get("index").and_then(value_as_id)?;
        Some(Self {
            name: obj
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or(&index)
                .to_string(),
            is_default: obj
                .get("isDefault")
                .map(|v| match v {
                    Value::Bool(b) => *b,
                    other => value_as_i64(other).unwrap_or(0) != 0,
                })
                .unwrap_or(false),
            index,
        })
    }
}

/// Output sinks and how to tell whether they changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SinkSet {
    pub hash: Option<String>,
    pub entries: Vec<Sink>,
}

/// Identity used for sink change detection: the server hash when one is
/// supplied, otherwise the entry count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkFingerprint {
    Hash(String),
    Length(usize),
}

impl SinkSet {
    pub fn from_response(response: &Value) -> Self {
        let entries = find_field(response, "sinks")
            .and_then(|v| v.as_array())
            .map(|items| items.iter().filter_map(Sink::from_value).collect())
            .unwrap_or_default();
        let hash = find_field(response, "sinkhash").and_then(value_as_id);
        Self { hash, entries }
    }

    pub fn fingerprint(&self) -> SinkFingerprint {
        match &self.hash {
            Some(hash) => SinkFingerprint::Hash(hash.clone()),
            None => SinkFingerprint::Length(self.entries.len()),
        }
    }

    pub fn default_position(&self) -> Option<usize> {
        self.entries.iter().position(|s| s.is_default)
    }
}
