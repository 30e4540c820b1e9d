//! Player synchronization engine
//!
//! Mirrors the remote player's state into a local session and tells observers
//! only about what changed.
//!
//! ## Cycles
//!
//! ```text
//! power_on ─┬─ reset session, clear artwork
//!           ├─ position cycle (1s):  extrapolate position, re-poll track at end of track
//!           ├─ periodic cycle (60s): playlist hash, volume, shuffle, sinks
//!           └─ immediate full refresh
//! ```
//!
//! Track info is not polled on a timer. It is fetched at power-on, when the
//! position estimate reaches the end of the track, and after every command.
//!
//! ## Concurrency
//!
//! All session state lives behind one `RwLock`. Each poll takes a ticket
//! under the lock, releases it for the network round trip, then applies the
//! result in a single critical section. Events are collected inside the
//! critical section and dispatched after the lock is released.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::bus::{EventKind, PlayerEvent, SharedBus};
use crate::error::{SyncError, SyncResult};
use crate::extract::{extract_i64, extract_str, find_field, value_as_id};
use crate::gateway::{commands, CommandGateway};
use crate::model::{
    playlist_entries, PlayState, PlayerState, PlaylistState, SinkFingerprint, SinkSet,
};
use crate::sync::{
    ChangeDetector, ImageCache, Observation, PositionExtrapolator, PositionSample, Scheduler,
    StreamStats,
};

/// Concurrent `image` requests while prefetching playlist artwork
const IMAGE_FETCH_CONCURRENCY: usize = 4;

/// Cycle periods
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub position_tick: Duration,
    pub periodic_refresh: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            position_tick: Duration::from_secs(1),
            periodic_refresh: Duration::from_secs(60),
        }
    }
}

/// Independently polled dimension of player state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facet {
    Track,
    Playlist,
    Volume,
    Shuffle,
    Sinks,
}

const ALL_FACETS: [Facet; 5] = [
    Facet::Track,
    Facet::Playlist,
    Facet::Volume,
    Facet::Shuffle,
    Facet::Sinks,
];

/// Read-only copy of the mirrored state
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub powered: bool,
    pub player: PlayerState,
    pub playlist: PlaylistState,
    pub volume: Option<i64>,
    pub shuffle: Option<bool>,
    pub sinks: SinkSet,
    pub current_sink: Option<usize>,
    pub position: PositionSample,
    pub last_position_sync: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct SessionState {
    powered: bool,
    player: PlayerState,
    playlist: PlaylistState,
    volume: Option<i64>,
    shuffle: Option<bool>,
    sinks: SinkSet,
    selected_sink: Option<usize>,
    track_detector: ChangeDetector<String>,
    playlist_detector: ChangeDetector<Option<String>>,
    volume_detector: ChangeDetector<i64>,
    shuffle_detector: ChangeDetector<String>,
    sinks_detector: ChangeDetector<SinkFingerprint>,
    stats_detector: ChangeDetector<StreamStats>,
    position: PositionExtrapolator,
    scheduler: Option<Scheduler>,
}

impl SessionState {
    /// Back to the empty session. Detectors are reset in place so tickets
    /// from requests still in flight are recognised as stale.
    fn reset(&mut self) {
        self.player = PlayerState::default();
        self.playlist = PlaylistState::default();
        self.volume = None;
        self.shuffle = None;
        self.sinks = SinkSet::default();
        self.selected_sink = None;
        self.track_detector.reset();
        self.playlist_detector.reset();
        self.volume_detector.reset();
        self.shuffle_detector.reset();
        self.sinks_detector.reset();
        self.stats_detector.reset();
        self.position.reset();
    }

    fn current_sink(&self) -> Option<usize> {
        self.selected_sink
            .filter(|i| *i < self.sinks.entries.len())
            .or_else(|| self.sinks.default_position())
    }

    fn playlist_event(&self, images: &ImageCache) -> PlayerEvent {
        PlayerEvent::Playlist {
            entries: self.playlist.entries.clone(),
            highlighted: self.player.track.as_ref().and_then(|t| t.playlist_position),
            images: images.snapshot(),
        }
    }

    fn sinks_event(&self) -> PlayerEvent {
        PlayerEvent::SinksUpdated {
            entries: self.sinks.entries.clone(),
            current: self.current_sink(),
        }
    }

    /// Events for a change of track or play state, in delivery order.
    /// Artwork for the new track is resolved afterwards.
    fn track_transition_events(&self, images: &ImageCache) -> Vec<PlayerEvent> {
        let playing = self.player.play_state == PlayState::Playing;
        if self.player.play_state.has_track() {
            vec![
                PlayerEvent::TrackInfo {
                    track: self.player.track.clone(),
                },
                self.playlist_event(images),
                PlayerEvent::PlayState { playing },
                PlayerEvent::TrackImage { image: None },
            ]
        } else {
            vec![
                PlayerEvent::TrackInfo { track: None },
                PlayerEvent::PlayState { playing },
                PlayerEvent::TrackImage { image: None },
            ]
        }
    }
}

struct EngineInner {
    gateway: Arc<dyn CommandGateway>,
    bus: SharedBus,
    images: ImageCache,
    config: EngineConfig,
    state: RwLock<SessionState>,
}

/// Handle to one player session. Cheap to clone.
#[derive(Clone)]
pub struct PlayerEngine {
    inner: Arc<EngineInner>,
}

impl PlayerEngine {
    pub fn new(gateway: Arc<dyn CommandGateway>, bus: SharedBus, config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                gateway,
                bus,
                images: ImageCache::new(),
                config,
                state: RwLock::new(SessionState::default()),
            }),
        }
    }

    pub fn bus(&self) -> &SharedBus {
        &self.inner.bus
    }

    /// Register the observer for `kind` (replaces any previous one)
    pub fn on<F>(&self, kind: EventKind, observer: F)
    where
        F: Fn(&PlayerEvent) + Send + Sync + 'static,
    {
        self.inner.bus.on(kind, observer);
    }

    pub async fn is_powered(&self) -> bool {
        self.inner.state.read().await.powered
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.state.read().await;
        SessionSnapshot {
            powered: state.powered,
            player: state.player.clone(),
            playlist: state.playlist.clone(),
            volume: state.volume,
            shuffle: state.shuffle,
            sinks: state.sinks.clone(),
            current_sink: state.current_sink(),
            position: state.position.sample(state.player.duration_ms()),
            last_position_sync: state.position.last_sync(),
        }
    }

    // =========================================================================
    // Power / session lifecycle
    // =========================================================================

    /// Start a fresh session: reset every cache, start both cycles and
    /// refresh everything once. Returns the new power state.
    pub async fn power_on(&self) -> bool {
        {
            let mut state = self.inner.state.write().await;
            if state.powered {
                return true;
            }
            self.inner.images.clear();
            state.reset();
            state.powered = true;
            state.scheduler = Some(self.start_cycles());
        }
        info!("Player session powered on");

        self.refresh_all().await;
        true
    }

    /// Stop both cycles, stop remote playback and tear the session down.
    /// Returns the new power state.
    pub async fn power_off(&self) -> bool {
        let scheduler = {
            let mut state = self.inner.state.write().await;
            if !state.powered {
                return false;
            }
            state.powered = false;
            state.scheduler.take()
        };
        if let Some(mut scheduler) = scheduler {
            scheduler.cancel();
        }

        if let Err(e) = self.inner.gateway.send(commands::STOP).await {
            warn!("Failed to stop playback on power off: {}", e);
        }

        {
            let mut state = self.inner.state.write().await;
            // Skip teardown if a power_on slipped in while `stop` was in flight
            if !state.powered {
                state.reset();
                self.inner.images.clear();
            }
        }
        info!("Player session powered off");
        false
    }

    pub async fn toggle_power(&self) -> bool {
        if self.is_powered().await {
            self.power_off().await
        } else {
            self.power_on().await
        }
    }

    fn start_cycles(&self) -> Scheduler {
        let mut scheduler = Scheduler::new();

        let weak = Arc::downgrade(&self.inner);
        scheduler.spawn_periodic("position", self.inner.config.position_tick, move || {
            let engine = PlayerEngine::upgrade(&weak);
            async move {
                if let Some(engine) = engine {
                    engine.tick_position().await;
                }
            }
        });

        let weak = Arc::downgrade(&self.inner);
        scheduler.spawn_periodic("periodic", self.inner.config.periodic_refresh, move || {
            let engine = PlayerEngine::upgrade(&weak);
            async move {
                if let Some(engine) = engine {
                    engine.refresh_periodic().await;
                }
            }
        });

        scheduler
    }

    fn upgrade(weak: &Weak<EngineInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    // =========================================================================
    // Cycles
    // =========================================================================

    /// One position tick: extrapolate, notify, and re-poll track info the
    /// first time the estimate reaches the end of the track.
    pub async fn tick_position(&self) {
        let tick = self
            .with_state(|s| {
                if !s.powered {
                    return None;
                }
                let duration = s.player.duration_ms();
                s.position.tick(s.player.play_state, duration)
            })
            .await;
        let Some(tick) = tick else {
            return;
        };

        self.inner.bus.notify(PlayerEvent::TrackPosition {
            duration_ms: tick.sample.duration_ms,
            current_ms: tick.sample.current_ms,
        });

        if tick.track_ended {
            debug!("Position reached end of track, re-polling track info");
            // Resync even when the track is unchanged so the end can be
            // reported again once the estimate catches up
            log_poll(Facet::Track, self.poll_track(true).await);
        }
    }

    /// Playlist, volume, shuffle and sinks, concurrently.
    pub async fn refresh_periodic(&self) {
        let (playlist, volume, shuffle, sinks) = futures::join!(
            self.refresh_playlist(),
            self.refresh_volume(),
            self.refresh_shuffle(),
            self.refresh_sinks(),
        );
        log_poll(Facet::Playlist, playlist);
        log_poll(Facet::Volume, volume);
        log_poll(Facet::Shuffle, shuffle);
        log_poll(Facet::Sinks, sinks);
    }

    async fn refresh_all(&self) {
        self.refresh_facets(&ALL_FACETS).await;
    }

    async fn refresh_facets(&self, facets: &[Facet]) {
        let results = futures::future::join_all(
            facets.iter().map(|facet| self.refresh_facet(*facet)),
        )
        .await;
        for (facet, result) in facets.iter().zip(results) {
            log_poll(*facet, result);
        }
    }

    /// Out-of-cycle refresh. A track refresh here always resynchronises the
    /// position estimate.
    async fn refresh_facet(&self, facet: Facet) -> SyncResult<()> {
        match facet {
            Facet::Track => self.poll_track(true).await,
            Facet::Playlist => self.refresh_playlist().await,
            Facet::Volume => self.refresh_volume().await,
            Facet::Shuffle => self.refresh_shuffle().await,
            Facet::Sinks => self.refresh_sinks().await,
        }
    }

    // =========================================================================
    // Facet polls
    // =========================================================================

    /// Poll `info track`; on a change of track or play state notify and
    /// resynchronise the position estimate.
    pub async fn refresh_track(&self) -> SyncResult<()> {
        self.poll_track(false).await
    }

    async fn poll_track(&self, force_sync: bool) -> SyncResult<()> {
        let Some(ticket) = self
            .with_state(|s| s.powered.then(|| s.track_detector.ticket()))
            .await
        else {
            return Ok(());
        };

        let response = self.inner.gateway.send(commands::INFO_TRACK).await?;
        let player = PlayerState::from_response(&response);
        let key = player.change_key();

        let images = &self.inner.images;
        let events = self
            .with_state(|s| match s.track_detector.observe(ticket, key) {
                Observation::Stale => None,
                Observation::Unchanged => {
                    s.player = player.clone();
                    Some(Vec::new())
                }
                Observation::Changed => {
                    s.player = player.clone();
                    Some(s.track_transition_events(images))
                }
            })
            .await;
        let Some(events) = events else {
            debug!("Discarding stale track response");
            return Ok(());
        };

        let changed = !events.is_empty();
        if changed {
            debug!(key = %player.change_key(), "Track state changed");
            self.dispatch(events);
            if player.play_state.has_track() {
                if let Some(uri) = player.track_uri.as_deref() {
                    self.resolve_track_image(uri).await;
                }
            }
        }

        if changed || force_sync {
            self.sync_position().await?;
        }
        Ok(())
    }

    async fn resolve_track_image(&self, uri: &str) {
        let lookup = match self
            .inner
            .images
            .get_image(uri, self.inner.gateway.as_ref())
            .await
        {
            Ok(lookup) => lookup,
            Err(e) => {
                warn!(uri, "Failed to fetch track artwork: {}", e);
                return;
            }
        };

        // The track may have moved on while the image was loading
        let still_current = self
            .with_state(|s| s.powered && s.player.track_uri.as_deref() == Some(uri))
            .await;
        if still_current {
            self.inner.bus.notify(PlayerEvent::TrackImage {
                image: lookup.image,
            });
        }
    }

    /// Authoritative position sync from `stats`.
    pub async fn sync_position(&self) -> SyncResult<()> {
        let Some(ticket) = self
            .with_state(|s| s.powered.then(|| s.stats_detector.ticket()))
            .await
        else {
            return Ok(());
        };

        let response = self.inner.gateway.send(commands::STATS).await?;
        let Some(stats) = StreamStats::from_response(&response)? else {
            debug!("stats response carried no counters");
            return Ok(());
        };

        let sample = self
            .with_state(|s| {
                if s.stats_detector.observe(ticket, stats) == Observation::Stale {
                    return None;
                }
                let duration = s.player.duration_ms();
                Some(s.position.sync(stats, duration))
            })
            .await;

        if let Some(sample) = sample {
            self.inner.bus.notify(PlayerEvent::TrackPosition {
                duration_ms: sample.duration_ms,
                current_ms: sample.current_ms,
            });
        }
        Ok(())
    }

    /// Poll the playlist hash; fetch entries only when the hash moved.
    pub async fn refresh_playlist(&self) -> SyncResult<()> {
        let Some(ticket) = self
            .with_state(|s| s.powered.then(|| s.playlist_detector.ticket()))
            .await
        else {
            return Ok(());
        };

        let response = self
            .inner
            .gateway
            .send(commands::INFO_PLAYLIST_HASH)
            .await?;
        let hash = find_field(&response, "playlisthash").and_then(value_as_id);

        let observation = self
            .with_state(|s| {
                let observation = s.playlist_detector.observe(ticket, hash.clone());
                if observation != Observation::Stale {
                    s.playlist.hash = hash.clone();
                }
                observation
            })
            .await;
        if !observation.is_changed() {
            return Ok(());
        }

        debug!(hash = ?hash, "Playlist hash changed, fetching entries");
        let response = match self.inner.gateway.send(commands::INFO_PLAYLIST).await {
            Ok(response) => response,
            Err(e) => {
                // Forget the hash so the next cycle fetches the entries again
                self.with_state(|s| {
                    if s.playlist.hash == hash {
                        s.playlist_detector.forget();
                    }
                })
                .await;
                return Err(e.into());
            }
        };
        let entries = playlist_entries(&response);

        let images = &self.inner.images;
        let prepared = self
            .with_state(|s| {
                // A newer hash was observed while these entries were in flight
                if !s.powered || s.playlist.hash != hash {
                    return None;
                }
                s.playlist.entries = entries;
                let uris: Vec<String> = s.playlist.entries.iter().map(|t| t.uri.clone()).collect();
                Some((s.playlist_event(images), uris))
            })
            .await;
        let Some((event, uris)) = prepared else {
            debug!(hash = ?hash, "Discarding playlist entries for superseded hash");
            return Ok(());
        };

        self.inner.bus.notify(event);
        self.load_playlist_images(uris).await;
        Ok(())
    }

    /// Resolve artwork for every playlist entry; re-notify the playlist if
    /// anything new arrived.
    async fn load_playlist_images(&self, uris: Vec<String>) {
        let mut seen = HashSet::new();
        let uris: Vec<String> = uris.into_iter().filter(|u| seen.insert(u.clone())).collect();
        let gateway = self.inner.gateway.as_ref();

        let results: Vec<_> = stream::iter(uris)
            .map(|uri| async move {
                let result = self.inner.images.get_image(&uri, gateway).await;
                (uri, result)
            })
            .buffer_unordered(IMAGE_FETCH_CONCURRENCY)
            .collect()
            .await;

        let mut any_new = false;
        for (uri, result) in results {
            match result {
                Ok(lookup) => any_new |= lookup.is_new_fetch,
                Err(e) => warn!(uri = %uri, "Failed to fetch playlist artwork: {}", e),
            }
        }

        if any_new {
            let images = &self.inner.images;
            let event = self
                .with_state(|s| s.powered.then(|| s.playlist_event(images)))
                .await;
            if let Some(event) = event {
                self.inner.bus.notify(event);
            }
        }
    }

    pub async fn refresh_volume(&self) -> SyncResult<()> {
        let Some(ticket) = self
            .with_state(|s| s.powered.then(|| s.volume_detector.ticket()))
            .await
        else {
            return Ok(());
        };

        let response = self.inner.gateway.send(commands::VOLUME).await?;
        let volume = extract_i64(&response, "volume").unwrap_or(0);

        let observation = self
            .with_state(|s| {
                let observation = s.volume_detector.observe(ticket, volume);
                if observation != Observation::Stale {
                    s.volume = Some(volume);
                }
                observation
            })
            .await;

        if observation.is_changed() {
            self.inner.bus.notify(PlayerEvent::Volume { volume });
        }
        Ok(())
    }

    pub async fn refresh_shuffle(&self) -> SyncResult<()> {
        let Some(ticket) = self
            .with_state(|s| s.powered.then(|| s.shuffle_detector.ticket()))
            .await
        else {
            return Ok(());
        };

        let response = self.inner.gateway.send(commands::SHUFFLE).await?;
        let token = extract_str(&response, "shuffle", "off").to_string();
        let enabled = token == "on";

        let observation = self
            .with_state(|s| {
                let observation = s.shuffle_detector.observe(ticket, token);
                if observation != Observation::Stale {
                    s.shuffle = Some(enabled);
                }
                observation
            })
            .await;

        if observation.is_changed() {
            self.inner.bus.notify(PlayerEvent::Shuffle { enabled });
        }
        Ok(())
    }

    pub async fn refresh_sinks(&self) -> SyncResult<()> {
        let Some(ticket) = self
            .with_state(|s| s.powered.then(|| s.sinks_detector.ticket()))
            .await
        else {
            return Ok(());
        };

        let response = self.inner.gateway.send(commands::SINK).await?;
        let sinks = SinkSet::from_response(&response);
        let fingerprint = sinks.fingerprint();

        let event = self
            .with_state(|s| {
                let observation = s.sinks_detector.observe(ticket, fingerprint);
                if observation == Observation::Stale {
                    return None;
                }
                s.sinks = sinks;
                observation.is_changed().then(|| s.sinks_event())
            })
            .await;

        if let Some(event) = event {
            self.inner.bus.notify(event);
        }
        Ok(())
    }

    // =========================================================================
    // User actions (no-ops while powered off)
    // =========================================================================

    /// Play/pause toggle: pause when playing, resume when paused, else play.
    pub async fn play(&self) -> SyncResult<()> {
        let command = match self.inner.state.read().await.player.play_state {
            PlayState::Playing => commands::PAUSE,
            PlayState::Paused => commands::RESUME,
            PlayState::Stopped => commands::PLAY,
        };
        self.command(command, &[Facet::Track]).await
    }

    pub async fn stop(&self) -> SyncResult<()> {
        self.command(commands::STOP, &[Facet::Track]).await
    }

    pub async fn skip(&self) -> SyncResult<()> {
        self.command(commands::SKIP, &[Facet::Track]).await
    }

    pub async fn back(&self) -> SyncResult<()> {
        self.command(commands::BACK, &[Facet::Track]).await
    }

    pub async fn clear(&self) -> SyncResult<()> {
        self.command(commands::CLEAR, &[Facet::Playlist, Facet::Track])
            .await
    }

    /// Set volume, clamped to 0..=100.
    pub async fn set_volume(&self, volume: i64) -> SyncResult<()> {
        self.command(&commands::set_volume(volume.clamp(0, 100)), &[Facet::Volume])
            .await
    }

    /// Shuffling reorders the playlist, so its hash is re-checked too.
    pub async fn set_shuffle(&self, enabled: bool) -> SyncResult<()> {
        self.command(
            &commands::set_shuffle(enabled),
            &[Facet::Shuffle, Facet::Playlist],
        )
        .await
    }

    /// Jump to `position` (player-defined units) within the current track.
    pub async fn reset_position(&self, position: i64) -> SyncResult<()> {
        self.command(&commands::reset(position), &[Facet::Track])
            .await
    }

    /// Select the sink at `position` in the last reported sink list.
    pub async fn set_sink(&self, position: usize) -> SyncResult<()> {
        let index = {
            let state = self.inner.state.read().await;
            if !state.powered {
                debug!(position, "set_sink ignored while powered off");
                return Ok(());
            }
            state
                .sinks
                .entries
                .get(position)
                .map(|sink| sink.index.clone())
                .ok_or(SyncError::NoSuchSink(position))?
        };

        self.inner.gateway.send(&commands::set_sink(&index)).await?;
        info!(position, index = %index, "Sink selected");

        let event = self
            .with_state(|s| {
                s.powered.then(|| {
                    s.selected_sink = Some(position);
                    s.sinks_event()
                })
            })
            .await;
        if let Some(event) = event {
            self.inner.bus.notify(event);
        }

        self.refresh_facets(&[Facet::Sinks]).await;
        log_poll(Facet::Track, self.sync_position().await);
        Ok(())
    }

    /// Free-text command passed through verbatim. Anything may have
    /// changed, so every facet is refreshed.
    pub async fn send_utterance(&self, utterance: &str) -> SyncResult<()> {
        self.command(utterance, &ALL_FACETS).await
    }

    pub async fn disconnect(&self) -> SyncResult<()> {
        self.command(commands::DISCONNECT, &[Facet::Sinks]).await
    }

    pub async fn scan(&self) -> SyncResult<()> {
        self.command(commands::SCAN, &[Facet::Sinks]).await
    }

    async fn command(&self, command: &str, refresh: &[Facet]) -> SyncResult<()> {
        if !self.is_powered().await {
            debug!(command, "Command ignored while powered off");
            return Ok(());
        }

        self.inner.gateway.send(command).await?;
        info!(command, "Command sent");

        self.refresh_facets(refresh).await;
        // A track refresh out of cycle already resyncs the position
        if !refresh.contains(&Facet::Track) {
            log_poll(Facet::Track, self.sync_position().await);
        }
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Run `f` inside one write critical section. `f` must not block.
    async fn with_state<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut state = self.inner.state.write().await;
        f(&mut state)
    }

    fn dispatch(&self, events: Vec<PlayerEvent>) {
        for event in events {
            self.inner.bus.notify(event);
        }
    }
}

/// Poll failures never propagate: the next tick retries.
fn log_poll(facet: Facet, result: SyncResult<()>) {
    match result {
        Ok(()) => {}
        Err(e @ SyncError::DataContract(_)) => error!(?facet, "Poll rejected: {}", e),
        Err(e) => warn!(?facet, "Poll failed: {}", e),
    }
}
