//! Artwork memoization keyed by track uri
//!
//! Artwork never changes for a given uri, so the first `image <uri>` answer is
//! kept for the rest of the session. Two lookups racing on the same miss both
//! fetch; whichever completes last overwrites an identical value.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use crate::extract::find_field;
use crate::gateway::{commands, CommandGateway, GatewayError};

/// Cached artwork payload as sent by the player (`albumImage`), `None` when
/// the player had no image for the track.
pub type Artwork = Option<Value>;

/// Result of a cache lookup
#[derive(Debug, Clone, PartialEq)]
pub struct ImageLookup {
    /// `true` when this lookup went to the network
    pub is_new_fetch: bool,
    pub image: Artwork,
}

#[derive(Debug, Default)]
pub struct ImageCache {
    entries: Mutex<HashMap<String, Artwork>>,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached(&self, uri: &str) -> Option<Artwork> {
        self.lock().get(uri).cloned()
    }

    /// Cache hit returns immediately; a miss issues `image <uri>` and stores
    /// the answer.
    pub async fn get_image(
        &self,
        uri: &str,
        gateway: &dyn CommandGateway,
    ) -> Result<ImageLookup, GatewayError> {
        if let Some(image) = self.cached(uri) {
            return Ok(ImageLookup {
                is_new_fetch: false,
                image,
            });
        }

        let response = gateway.send(&commands::image(uri)).await?;
        let image = find_field(&response, "albumImage")
            .filter(|v| !v.is_null())
            .cloned();
        debug!(uri, found = image.is_some(), "artwork fetched");

        self.lock().insert(uri.to_string(), image.clone());
        Ok(ImageLookup {
            is_new_fetch: true,
            image,
        })
    }

    /// Copy of every cached entry (sent with playlist notifications)
    pub fn snapshot(&self) -> HashMap<String, Artwork> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Artwork>> {
        // A panic while holding this guard cannot leave the map half-written
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingGateway {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CommandGateway for CountingGateway {
        async fn send(&self, command: &str) -> Result<Value, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(command, "image spotify:track:1");
            Ok(json!([{"albumImage": "base64data"}]))
        }
    }

    #[tokio::test]
    async fn miss_fetches_then_hit_is_served_from_cache() {
        let gateway = CountingGateway {
            calls: AtomicUsize::new(0),
        };
        let cache = ImageCache::new();

        let first = cache.get_image("spotify:track:1", &gateway).await.unwrap();
        assert!(first.is_new_fetch);
        assert_eq!(first.image, Some(json!("base64data")));

        let second = cache.get_image("spotify:track:1", &gateway).await.unwrap();
        assert!(!second.is_new_fetch);
        assert_eq!(second.image, first.image);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn clear_empties_the_session_cache() {
        let gateway = CountingGateway {
            calls: AtomicUsize::new(0),
        };
        let cache = ImageCache::new();
        cache.get_image("spotify:track:1", &gateway).await.unwrap();
        assert!(cache.cached("spotify:track:1").is_some());

        cache.clear();
        assert_eq!(cache.cached("spotify:track:1"), None);
        assert!(cache.snapshot().is_empty());
        assert!(cache.get_image("spotify:track:1", &gateway).await.unwrap().is_new_fetch);
    }
}
