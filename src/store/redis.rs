//! Redis-backed stores. Both share one multiplexed connection manager,
//! which reconnects on its own after transient failures.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tracing::info;

use super::{Quota, RateLimitStore, SessionData, SessionStore, StoreError};

/// INCR the counter, start its expiry on the first hit, report the TTL left.
const INCREMENT_WITH_EXPIRY: &str = r"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
  ttl = tonumber(ARGV[1])
end
return {count, ttl}
";

/// Opens a connection manager and fails fast if Redis is unreachable.
async fn connect(url: &str) -> Result<ConnectionManager, StoreError> {
    let client = redis::Client::open(url)?;
    let conn = ConnectionManager::new(client).await?;
    info!(url, "connected to redis");
    Ok(conn)
}

/// Sessions as JSON strings under `<prefix><key>`, expiring with `PX`.
#[derive(Clone)]
pub struct RedisSessionStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisSessionStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        Ok(Self { conn: connect(url).await?, prefix: "strata:sess:".to_owned() })
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn get(&self, key: &str) -> Result<Option<SessionData>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(self.key(key)).await?;
        raw.map(|json| serde_json::from_str(&json)).transpose().map_err(StoreError::from)
    }

    async fn set(&self, key: &str, data: &SessionData, ttl: Duration) -> Result<(), StoreError> {
        let json = serde_json::to_string(data)?;
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let mut conn = self.conn.clone();
        let () = conn.pset_ex(self.key(key), json, ttl_ms).await?;
        Ok(())
    }

    async fn destroy(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let () = conn.del(self.key(key)).await?;
        Ok(())
    }
}

/// Fixed-window counters maintained by a Lua script, so increment and
/// expiry happen in one atomic step on the server.
#[derive(Clone)]
pub struct RedisRateLimitStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisRateLimitStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        Ok(Self { conn: connect(url).await?, prefix: "strata:limit:".to_owned() })
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn increment(&self, key: &str, window: Duration, max: u64) -> Result<Quota, StoreError> {
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX).max(1);
        let mut conn = self.conn.clone();
        let (count, ttl_ms): (u64, i64) = Script::new(INCREMENT_WITH_EXPIRY)
            .key(format!("{}{key}", self.prefix))
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await?;

        let left = Duration::from_millis(u64::try_from(ttl_ms).unwrap_or(window_ms));
        Ok(Quota {
            count,
            remaining: max.saturating_sub(count),
            reset: SystemTime::now() + left,
        })
    }
}
