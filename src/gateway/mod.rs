//! Command gateway - the single request/response channel to the player
//!
//! The player exposes one endpoint taking `{"command": "<verb> [args]"}` and
//! answering with an array of key/value objects. There is no push channel;
//! everything the engine knows arrives through [`CommandGateway::send`].

mod http;

pub use http::HttpGateway;

use async_trait::async_trait;
use serde_json::Value;

/// Transport-level failure. A failed poll simply yields no update; the next
/// scheduled tick tries again.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("player returned HTTP {0}")]
    Status(u16),
    #[error("response is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Sends one opaque command string and returns the parsed response.
///
/// Concurrent calls are allowed and may complete in any order.
#[async_trait]
pub trait CommandGateway: Send + Sync + 'static {
    async fn send(&self, command: &str) -> Result<Value, GatewayError>;
}

/// Command verbs understood by the player
pub mod commands {
    pub const STATS: &str = "stats";
    pub const INFO_TRACK: &str = "info track";
    pub const INFO_PLAYLIST: &str = "info playlist";
    pub const INFO_PLAYLIST_HASH: &str = "info playlisthash";
    pub const VOLUME: &str = "volume";
    pub const SHUFFLE: &str = "shuffle";
    pub const SINK: &str = "sink";
    pub const PLAY: &str = "play";
    pub const PAUSE: &str = "pause";
    pub const RESUME: &str = "resume";
    pub const STOP: &str = "stop";
    pub const SKIP: &str = "skip";
    pub const BACK: &str = "back";
    pub const CLEAR: &str = "clear";
    pub const DISCONNECT: &str = "disconnect";
    pub const SCAN: &str = "scan";

    pub fn image(uri: &str) -> String {
        format!("image {}", uri)
    }

    pub fn set_volume(volume: i64) -> String {
        format!("volume {}", volume)
    }

    pub fn set_shuffle(on: bool) -> String {
        format!("shuffle {}", if on { "on" } else { "off" })
    }

    pub fn set_sink(index: &str) -> String {
        format!("sink {}", index)
    }

    pub fn reset(position: i64) -> String {
        format!("reset {}", position)
    }
}
