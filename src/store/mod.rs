//! External collaborators behind narrow async contracts.
//!
//! Sessions and rate-limit counters are shared by every in-flight request,
//! so they live outside the pipeline. The units only ever call the traits
//! below; the backends decide how atomicity and expiry are achieved.
//!
//! | Backend | Sessions | Rate limit | Feature |
//! |---|---|---|---|
//! | memory | [`MemorySessionStore`] | [`MemoryRateLimitStore`] | always |
//! | Redis | `RedisSessionStore` | `RedisRateLimitStore` | `redis` |

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use thiserror::Error;

mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use memory::{MemoryRateLimitStore, MemorySessionStore};
#[cfg(feature = "redis")]
pub use self::redis::{RedisRateLimitStore, RedisSessionStore};

/// Session payload: a JSON object.
pub type SessionData = serde_json::Map<String, serde_json::Value>;

/// Failure talking to a store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("payload codec: {0}")]
    Codec(#[from] serde_json::Error),

    #[cfg(feature = "redis")]
    #[error("redis: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// Where session payloads are kept between requests.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// `None` when the key is unknown or expired.
    async fn get(&self, key: &str) -> Result<Option<SessionData>, StoreError>;

    /// Stores `data` under `key`, expiring after `ttl`.
    async fn set(&self, key: &str, data: &SessionData, ttl: Duration) -> Result<(), StoreError>;

    async fn destroy(&self, key: &str) -> Result<(), StoreError>;
}

/// Result of one counted hit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Quota {
    /// Hits in the current window, this one included.
    pub count: u64,
    /// Hits left before the limit trips; saturates at zero.
    pub remaining: u64,
    /// When the current window ends.
    pub reset: SystemTime,
}

/// Counter store for [`RateLimit`](crate::middleware::RateLimit).
#[async_trait]
pub trait RateLimitStore: Send + Sync + 'static {
    /// Atomically counts one hit for `key` in a window of length `window`.
    ///
    /// The first hit opens the window; the counter expires with it.
    async fn increment(&self, key: &str, window: Duration, max: u64) -> Result<Quota, StoreError>;
}
