//! Observer-facing event types
//!
//! Nine event kinds, each with a fixed payload shape. Payloads serialize as
//! `{"type": "<kind>", "payload": {...}}`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::model::{Sink, Track};
use crate::sync::Artwork;

/// Observer slot identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    TrackPosition,
    TrackImage,
    Playlist,
    PlayState,
    TrackInfo,
    Volume,
    Shuffle,
    /// Reserved; never emitted
    PlaylistImage,
    SinksUpdated,
}

impl EventKind {
    pub const ALL: [EventKind; 9] = [
        EventKind::TrackPosition,
        EventKind::TrackImage,
        EventKind::Playlist,
        EventKind::PlayState,
        EventKind::TrackInfo,
        EventKind::Volume,
        EventKind::Shuffle,
        EventKind::PlaylistImage,
        EventKind::SinksUpdated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TrackPosition => "track-position",
            Self::TrackImage => "track-image",
            Self::Playlist => "playlist",
            Self::PlayState => "play-state",
            Self::TrackInfo => "track-info",
            Self::Volume => "volume",
            Self::Shuffle => "shuffle",
            Self::PlaylistImage => "playlist-image",
            Self::SinksUpdated => "sinks-updated",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change worth telling observers about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum PlayerEvent {
    TrackPosition {
        duration_ms: u64,
        current_ms: u64,
    },
    /// `None` clears the displayed artwork
    TrackImage {
        image: Artwork,
    },
    Playlist {
        entries: Vec<Track>,
        /// Playlist position of the current track, if any
        highlighted: Option<usize>,
        /// Artwork known so far, keyed by track uri
        images: HashMap<String, Artwork>,
    },
    PlayState {
        playing: bool,
    },
    /// `None` clears the current track display
    TrackInfo {
        track: Option<Track>,
    },
    Volume {
        volume: i64,
    },
    Shuffle {
        enabled: bool,
    },
    PlaylistImage {
        uri: String,
        image: Artwork,
    },
    SinksUpdated {
        entries: Vec<Sink>,
        /// Position of the active sink within `entries`
        current: Option<usize>,
    },
}

impl PlayerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::TrackPosition { .. } => EventKind::TrackPosition,
            Self::TrackImage { .. } => EventKind::TrackImage,
            Self::Playlist { .. } => EventKind::Playlist,
            Self::PlayState { .. } => EventKind::PlayState,
            Self::TrackInfo { .. } => EventKind::TrackInfo,
            Self::Volume { .. } => EventKind::Volume,
            Self::Shuffle { .. } => EventKind::Shuffle,
            Self::PlaylistImage { .. } => EventKind::PlaylistImage,
            Self::SinksUpdated { .. } => EventKind::SinksUpdated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_with_kind_tag() {
        let event = PlayerEvent::TrackPosition {
            duration_ms: 2000,
            current_ms: 1000,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "track-position", "payload": {"duration_ms": 2000, "current_ms": 1000}})
        );
    }

    #[test]
    fn kind_tags_match_event_tags() {
        let event = PlayerEvent::SinksUpdated {
            entries: vec![],
            current: None,
        };
        let tag = serde_json::to_value(&event).unwrap()["type"].clone();
        assert_eq!(tag, json!(event.kind().as_str()));
        assert_eq!(EventKind::ALL.len(), 9);
    }
}
