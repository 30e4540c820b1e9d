//! Mock player for testing
//!
//! Simulates the single command endpoint: `POST /` with `{"command": "..."}`,
//! answered with an array of key/value objects.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// How the mock answers every request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    None,
    /// HTTP 500 for every command
    ServerError,
    /// 200 with a body that is not JSON
    Garbage,
}

#[derive(Debug, Clone)]
pub struct MockTrack {
    pub uri: String,
    pub name: String,
    pub duration_ms: u64,
}

impl MockTrack {
    pub fn new(uri: &str, name: &str, duration_ms: u64) -> Self {
        Self {
            uri: uri.to_string(),
            name: name.to_string(),
            duration_ms,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MockSink {
    pub index: String,
    pub name: String,
    pub is_default: bool,
}

/// Mock player state
struct MockPlayerState {
    state: String, // "playing", "paused", "stopped"
    playlist: Vec<MockTrack>,
    current: usize,
    playlist_generation: u64,
    volume: i64,
    shuffle: bool,
    sinks: Vec<MockSink>,
    sink_generation: u64,
    images: HashMap<String, String>,
    /// (total, occupancy, rate)
    stats: (i64, i64, i64),
    failure: FailureMode,
    received: Vec<String>,
}

impl MockPlayerState {
    fn track_json(&self, position: usize) -> Option<Value> {
        self.playlist.get(position).map(|t| {
            json!({
                "link": t.uri,
                "name": t.name,
                "duration": t.duration_ms,
                "playlistPosition": position,
            })
        })
    }

    fn sinks_json(&self) -> Value {
        let sinks: Vec<Value> = self
            .sinks
            .iter()
            .map(|s| json!({"index": s.index, "name": s.name, "isDefault": s.is_default}))
            .collect();
        json!([{"sinkhash": format!("s{}", self.sink_generation), "sinks": sinks}])
    }

    fn touch_playlist(&mut self) {
        self.playlist_generation += 1;
    }
}

/// Mock player server
pub struct MockPlayerServer {
    addr: SocketAddr,
    state: Arc<RwLock<MockPlayerState>>,
    handle: JoinHandle<()>,
}

impl MockPlayerServer {
    /// Start a mock player on a random port
    pub async fn start() -> Self {
        let state = Arc::new(RwLock::new(MockPlayerState {
            state: "stopped".to_string(),
            playlist: Vec::new(),
            current: 0,
            playlist_generation: 0,
            volume: 50,
            shuffle: false,
            sinks: vec![MockSink {
                index: "0".to_string(),
                name: "Built-in Audio".to_string(),
                is_default: true,
            }],
            sink_generation: 0,
            images: HashMap::new(),
            stats: (0, 0, 44100),
            failure: FailureMode::None,
            received: Vec::new(),
        }));

        let app = Router::new()
            .route("/", post(handle_command))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub async fn set_playlist(&self, tracks: Vec<MockTrack>) {
        let mut state = self.state.write().await;
        state.playlist = tracks;
        state.current = 0;
        state.touch_playlist();
    }

    /// "playing", "paused" or "stopped"
    pub async fn set_state(&self, play_state: &str) {
        self.state.write().await.state = play_state.to_string();
    }

    pub async fn set_volume(&self, volume: i64) {
        self.state.write().await.volume = volume;
    }

    pub async fn set_stats(&self, total: i64, occupancy: i64, rate: i64) {
        self.state.write().await.stats = (total, occupancy, rate);
    }

    pub async fn set_image(&self, uri: &str, image: &str) {
        self.state
            .write()
            .await
            .images
            .insert(uri.to_string(), image.to_string());
    }

    pub async fn add_sink(&self, index: &str, name: &str) {
        let mut state = self.state.write().await;
        state.sinks.push(MockSink {
            index: index.to_string(),
            name: name.to_string(),
            is_default: false,
        });
        state.sink_generation += 1;
    }

    pub async fn set_failure(&self, failure: FailureMode) {
        self.state.write().await.failure = failure;
    }

    /// Every command received so far, in arrival order
    pub async fn received(&self) -> Vec<String> {
        self.state.read().await.received.clone()
    }

    pub async fn count(&self, command: &str) -> usize {
        self.received()
            .await
            .iter()
            .filter(|c| c.as_str() == command)
            .count()
    }

    /// Stop the mock server
    pub async fn stop(self) {
        self.handle.abort();
    }
}

#[derive(Debug, Deserialize)]
struct CommandRequest {
    command: String,
}

async fn handle_command(
    State(state): State<Arc<RwLock<MockPlayerState>>>,
    Json(request): Json<CommandRequest>,
) -> axum::response::Response {
    let mut state = state.write().await;
    state.received.push(request.command.clone());

    match state.failure {
        FailureMode::ServerError => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        FailureMode::Garbage => return "<html>not json</html>".into_response(),
        FailureMode::None => {}
    }

    let (verb, arg) = match request.command.split_once(' ') {
        Some((verb, arg)) => (verb, Some(arg)),
        None => (request.command.as_str(), None),
    };
    let ok = json!([{"status": "ok"}]);

    let body = match (verb, arg) {
        ("stats", _) => {
            let (total, occupancy, rate) = state.stats;
            json!([{"stats": {"total": total, "occupancy": occupancy, "rate": rate}}])
        }
        ("info", Some("track")) => {
            let mut body = vec![json!({"state": state.state})];
            if state.state != "stopped" {
                if let Some(track) = state.track_json(state.current) {
                    body.push(json!({"track": track}));
                }
            }
            Value::Array(body)
        }
        ("info", Some("playlist")) => {
            let entries: Vec<Value> = (0..state.playlist.len())
                .filter_map(|i| state.track_json(i))
                .collect();
            json!([{"playlist": entries}])
        }
        ("info", Some("playlisthash")) => {
            json!([{"playlisthash": format!("h{}", state.playlist_generation)}])
        }
        ("volume", None) => json!([{"volume": state.volume}]),
        ("volume", Some(v)) => {
            if let Ok(v) = v.parse::<i64>() {
                state.volume = v;
            }
            ok
        }
        ("shuffle", None) => json!([{"shuffle": if state.shuffle { "on" } else { "off" }}]),
        ("shuffle", Some(v)) => {
            state.shuffle = v == "on";
            state.touch_playlist();
            ok
        }
        ("sink", None) => state.sinks_json(),
        ("sink", Some(index)) => {
            for sink in state.sinks.iter_mut() {
                sink.is_default = sink.index == index;
            }
            state.sink_generation += 1;
            ok
        }
        ("image", Some(uri)) => match state.images.get(uri) {
            Some(image) => json!([{"albumImage": image}]),
            None => json!([{}]),
        },
        ("play", None) | ("resume", None) => {
            if !state.playlist.is_empty() {
                state.state = "playing".to_string();
            }
            ok
        }
        ("pause", None) => {
            if state.state == "playing" {
                state.state = "paused".to_string();
            }
            ok
        }
        ("stop", None) => {
            state.state = "stopped".to_string();
            ok
        }
        ("skip", None) => {
            if state.current + 1 < state.playlist.len() {
                state.current += 1;
            }
            ok
        }
        ("back", None) => {
            state.current = state.current.saturating_sub(1);
            ok
        }
        ("clear", None) => {
            state.playlist.clear();
            state.current = 0;
            state.state = "stopped".to_string();
            state.touch_playlist();
            ok
        }
        _ => ok,
    };

    Json(body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn send(endpoint: &str, command: &str) -> Value {
        reqwest::Client::new()
            .post(endpoint)
            .json(&json!({ "command": command }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn mock_player_answers_volume() {
        let server = MockPlayerServer::start().await;
        server.set_volume(42).await;

        let body = send(&server.endpoint(), "volume").await;
        assert_eq!(body, json!([{"volume": 42}]));
        assert_eq!(server.received().await, vec!["volume"]);

        server.stop().await;
    }

    #[tokio::test]
    async fn mock_player_skip_advances_track() {
        let server = MockPlayerServer::start().await;
        server
            .set_playlist(vec![
                MockTrack::new("u1", "One", 1000),
                MockTrack::new("u2", "Two", 1000),
            ])
            .await;
        server.set_state("playing").await;

        send(&server.endpoint(), "skip").await;
        let body = send(&server.endpoint(), "info track").await;
        assert_eq!(body[1]["track"]["link"], "u2");

        server.stop().await;
    }
}
