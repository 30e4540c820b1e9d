//! Player Sync - client-side state mirror for a remote audio player
//!
//! The player exposes a single JSON command endpoint and no push channel.
//! This library polls it on two cadences, detects changes per facet and
//! notifies registered observers only when something actually changed.
//!
//! This library provides:
//! - A command gateway over HTTP (`{"command": "..."}` request/response)
//! - Lenient field extraction from the player's key/value responses
//! - Change detection for track, playlist, volume, shuffle and output sinks
//! - Local playback position extrapolation between authoritative syncs
//! - Session power control and the user action surface

pub mod bus;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod model;
pub mod sync;

pub use bus::{create_bus, EventBus, EventKind, PlayerEvent, SharedBus};
pub use engine::{EngineConfig, Facet, PlayerEngine, SessionSnapshot};
pub use error::{SyncError, SyncResult};
pub use gateway::{CommandGateway, GatewayError, HttpGateway};
