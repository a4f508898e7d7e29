//! Screenshot cache (C3): a TTL'd opaque-ID to PNG bytes map, so the render
//! response can carry a short screenshot URL instead of inlining megabytes of
//! base64 into every render's JSON body.
//!
//! Grounded on RustWall's `dashmap`-backed concurrent registries.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

const DEFAULT_TTL: Duration = Duration::from_secs(300);
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Entry {
    bytes: Arc<Vec<u8>>,
    expires_at: Instant,
}

#[derive(Clone)]
pub struct ScreenshotCache {
    entries: Arc<DashMap<Uuid, Entry>>,
    ttl: Duration,
}

impl ScreenshotCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Stores `bytes` and returns the opaque ID clients use to fetch it back.
    pub fn insert(&self, bytes: Vec<u8>) -> Uuid {
        let id = Uuid::new_v4();
        self.entries.insert(
            id,
            Entry {
                bytes: Arc::new(bytes),
                expires_at: Instant::now() + self.ttl,
            },
        );
        id
    }

    /// Returns the bytes if present and not expired. Does not extend the TTL.
    pub fn get(&self, id: Uuid) -> Option<Arc<Vec<u8>>> {
        let entry = self.entries.get(&id)?;
        if entry.expires_at <= Instant::now() {
            drop(entry);
            self.entries.remove(&id);
            return None;
        }
        Some(entry.bytes.clone())
    }

    /// Drops every expired entry. Intended to run on a periodic background task.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
    }

    /// Spawns the periodic sweeper, returning its join handle so the caller
    /// can abort it on shutdown.
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                cache.sweep();
            }
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ScreenshotCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get_roundtrip() {
        let cache = ScreenshotCache::new();
        let id = cache.insert(vec![1, 2, 3]);
        assert_eq!(cache.get(id).unwrap().as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn get_missing_returns_none() {
        let cache = ScreenshotCache::new();
        assert!(cache.get(Uuid::new_v4()).is_none());
    }

    #[test]
    fn expired_entry_is_swept_on_get() {
        let cache = ScreenshotCache::with_ttl(Duration::from_millis(0));
        let id = cache.insert(vec![9]);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(id).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn sweep_removes_only_expired() {
        let cache = ScreenshotCache::with_ttl(Duration::from_millis(0));
        cache.insert(vec![1]);
        std::thread::sleep(Duration::from_millis(5));
        let fresh = ScreenshotCache::new();
        let fresh_id = fresh.insert(vec![2]);
        cache.sweep();
        assert!(cache.is_empty());
        assert!(fresh.get(fresh_id).is_some());
    }
}
