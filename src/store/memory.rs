//! In-process stores for single-node deployments, development and tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::{Quota, RateLimitStore, SessionData, SessionStore, StoreError};

/// Expired entries are swept every this many operations.
const SWEEP_EVERY: u64 = 1024;

struct Entry {
    data: SessionData,
    expires_at: Instant,
}

/// Session store backed by a concurrent map. Expiry is enforced on read,
/// and abandoned sessions are swept every 1024 writes.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<DashMap<String, Entry>>,
    writes: Arc<AtomicU64>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drops every session whose TTL has run out.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, e| e.expires_at > now);
        debug!(removed = before.saturating_sub(self.sessions.len()), "expired sessions swept");
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, key: &str) -> Result<Option<SessionData>, StoreError> {
        let now = Instant::now();
        let expired = match self.sessions.get(key) {
            Some(entry) if entry.expires_at > now => return Ok(Some(entry.data.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.sessions.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, data: &SessionData, ttl: Duration) -> Result<(), StoreError> {
        if self.writes.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.purge_expired();
        }
        let entry = Entry { data: data.clone(), expires_at: Instant::now() + ttl };
        self.sessions.insert(key.to_owned(), entry);
        Ok(())
    }

    async fn destroy(&self, key: &str) -> Result<(), StoreError> {
        self.sessions.remove(key);
        Ok(())
    }
}

struct Window {
    count: u64,
    ends_at: Instant,
    reset: SystemTime,
}

/// Fixed-window counters. The map's entry lock makes each increment atomic.
#[derive(Clone, Default)]
pub struct MemoryRateLimitStore {
    windows: Arc<DashMap<String, Window>>,
    ops: Arc<AtomicU64>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every window that has already ended.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, w| w.ends_at > now);
        debug!(removed = before.saturating_sub(self.windows.len()), "rate-limit windows swept");
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn increment(&self, key: &str, window: Duration, max: u64) -> Result<Quota, StoreError> {
        if self.ops.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.purge_expired();
        }

        let now = Instant::now();
        let open = || Window { count: 0, ends_at: now + window, reset: SystemTime::now() + window };

        let mut entry = self.windows.entry(key.to_owned()).or_insert_with(open);
        if entry.ends_at <= now {
            *entry = open();
        }
        entry.count += 1;

        Ok(Quota {
            count: entry.count,
            remaining: max.saturating_sub(entry.count),
            reset: entry.reset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn session_round_trip_and_destroy() {
        let store = MemorySessionStore::new();
        let mut data = SessionData::new();
        data.insert("views".into(), json!(3));

        store.set("abc", &data, Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("abc").await.unwrap(), Some(data));

        store.destroy("abc").await.unwrap();
        assert_eq!(store.get("abc").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_session_is_gone() {
        let store = MemorySessionStore::new();
        store.set("abc", &SessionData::new(), Duration::ZERO).await.unwrap();
        assert_eq!(store.get("abc").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn abandoned_sessions_are_swept() {
        let store = MemorySessionStore::new();
        for i in 0..SWEEP_EVERY - 1 {
            store.set(&format!("old-{i}"), &SessionData::new(), Duration::ZERO).await.unwrap();
        }
        assert_eq!(store.len() as u64, SWEEP_EVERY - 1);

        // The next write triggers a sweep before inserting.
        store.set("live", &SessionData::new(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get("live").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn purge_keeps_live_sessions() {
        let store = MemorySessionStore::new();
        store.set("gone", &SessionData::new(), Duration::ZERO).await.unwrap();
        store.set("kept", &SessionData::new(), Duration::from_secs(60)).await.unwrap();
        store.purge_expired();
        assert_eq!(store.len(), 1);
        assert!(store.get("kept").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn counts_within_window_then_resets() {
        let store = MemoryRateLimitStore::new();
        let window = Duration::from_millis(30);

        let first = store.increment("ip", window, 2).await.unwrap();
        let second = store.increment("ip", window, 2).await.unwrap();
        let third = store.increment("ip", window, 2).await.unwrap();
        assert_eq!((first.count, first.remaining), (1, 1));
        assert_eq!((second.count, second.remaining), (2, 0));
        assert_eq!((third.count, third.remaining), (3, 0));

        tokio::time::sleep(Duration::from_millis(60)).await;
        let fresh = store.increment("ip", window, 2).await.unwrap();
        assert_eq!(fresh.count, 1);
    }

    #[tokio::test]
    async fn identities_are_counted_separately() {
        let store = MemoryRateLimitStore::new();
        let window = Duration::from_secs(60);
        store.increment("a", window, 5).await.unwrap();
        let b = store.increment("b", window, 5).await.unwrap();
        assert_eq!(b.count, 1);
    }
}
