//! Playback position extrapolation
//!
//! The player only reports position as a raw sample count (`stats`), and only
//! when asked. Between authoritative syncs the estimate is advanced locally by
//! one second of samples per tick, so observers see a smooth once-a-second
//! position without a network round trip per second.
//!
//! ```text
//! current_ms = round(1000 * (total - occupancy) / rate), clamped to [0, duration_ms]
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::{SyncError, SyncResult};
use crate::extract::{find_field, value_as_i64};
use crate::model::PlayState;

/// Raw buffer counters from a `stats` response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    /// Samples delivered to the output buffer since the track started
    pub total: i64,
    /// Samples still sitting in the buffer (not yet audible)
    pub occupancy: i64,
    /// Samples per second
    pub rate: i64,
}

impl StreamStats {
    /// Parse the `stats` object. `Ok(None)` when the response carries none;
    /// a zero rate is a contract violation.
    pub fn from_response(response: &Value) -> SyncResult<Option<Self>> {
        let Some(stats) = find_field(response, "stats") else {
            return Ok(None);
        };
        let field = |name: &str| find_field(stats, name).and_then(value_as_i64).unwrap_or(0);
        let parsed = Self {
            total: field("total"),
            occupancy: field("occupancy"),
            rate: field("rate"),
        };
        if parsed.rate <= 0 {
            return Err(SyncError::DataContract(format!(
                "stats sample rate must be positive, got {}",
                parsed.rate
            )));
        }
        Ok(Some(parsed))
    }

    /// Unclamped audible position in milliseconds
    pub fn position_ms(&self) -> i64 {
        let audible = (self.total - self.occupancy) as f64;
        (1000.0 * audible / self.rate as f64).round() as i64
    }
}

/// Payload of a track-position notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PositionSample {
    pub duration_ms: u64,
    pub current_ms: u64,
}

/// Result of one local tick while playing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionTick {
    pub sample: PositionSample,
    /// The estimate just reached the end of the track; re-poll track info.
    /// Set on the first tick that reaches the end after a sync, never again
    /// until the next sync.
    pub track_ended: bool,
}

#[derive(Debug, Default)]
pub struct PositionExtrapolator {
    stats: Option<StreamStats>,
    last_sync: Option<DateTime<Utc>>,
    end_reported: bool,
}

impl PositionExtrapolator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt an authoritative sample. Half a second of samples is taken off
    /// `total` to account for the request round trip.
    pub fn sync(&mut self, mut stats: StreamStats, duration_ms: u64) -> PositionSample {
        stats.total -= stats.rate / 2;
        self.stats = Some(stats);
        self.last_sync = Some(Utc::now());
        self.end_reported = false;
        self.sample(duration_ms)
    }

    /// Advance one second. No-op unless playing.
    pub fn tick(&mut self, play_state: PlayState, duration_ms: u64) -> Option<PositionTick> {
        if play_state != PlayState::Playing {
            return None;
        }
        let stats = self.stats.as_mut()?;
        stats.total += stats.rate;

        let sample = self.sample(duration_ms);
        let at_end = sample.current_ms == duration_ms;
        let track_ended = at_end && !self.end_reported;
        if at_end {
            self.end_reported = true;
        }
        Some(PositionTick {
            sample,
            track_ended,
        })
    }

    /// Current estimate, 0 before the first sync.
    pub fn sample(&self, duration_ms: u64) -> PositionSample {
        let current = self.stats.map(|s| s.position_ms()).unwrap_or(0);
        PositionSample {
            duration_ms,
            current_ms: current.clamp(0, duration_ms as i64) as u64,
        }
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.last_sync
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
