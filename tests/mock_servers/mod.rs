//! Mock servers for integration testing
//!
//! Simulates the remote player's command endpoint so the engine can be
//! exercised end to end over real HTTP without a player.

pub mod player;

pub use player::{FailureMode, MockPlayerServer, MockTrack};
