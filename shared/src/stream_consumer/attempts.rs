// ============================================================================
// Attempt Tracking
// ============================================================================
//
// Per-message retry counters that survive process restarts.
//
// Redis key: retry:{stream}:{group}:{message_id} → u64
// TTL is reset on every increment, so a message under active retry never
// expires mid-cycle while an orphaned counter eventually disappears.
//
// ============================================================================

use async_trait::async_trait;
use clickstream_error::ConsumerResult;
use clickstream_redis::RedisClient;
use std::sync::Arc;

/// Keyed counter store with per-key expiry
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment each key and (re)set its TTL; returns the new values in input order
    async fn incr_with_ttl(&self, keys: &[String], ttl_secs: u64) -> ConsumerResult<Vec<u64>>;

    /// Current value, `0` when the key is absent
    async fn get(&self, key: &str) -> ConsumerResult<u64>;

    /// Delete keys; absent keys are ignored
    async fn delete(&self, keys: &[String]) -> ConsumerResult<()>;
}

/// `CounterStore` backed by Redis INCR / EXPIRE / GET / DEL
#[derive(Clone)]
pub struct RedisCounterStore {
    client: RedisClient,
}

impl RedisCounterStore {
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn incr_with_ttl(&self, keys: &[String], ttl_secs: u64) -> ConsumerResult<Vec<u64>> {
        let mut client = self.client.clone();
        let counts = client.incr_with_ttl(keys, ttl_secs).await?;
        Ok(counts.into_iter().map(|c| c.max(0) as u64).collect())
    }

    async fn get(&self, key: &str) -> ConsumerResult<u64> {
        let mut client = self.client.clone();
        Ok(client.get_int(key).await?)
    }

    async fn delete(&self, keys: &[String]) -> ConsumerResult<()> {
        let mut client = self.client.clone();
        client.del(keys).await?;
        Ok(())
    }
}

/// Retry-budget bookkeeping for one (stream, group)
#[derive(Clone)]
pub struct AttemptTracker {
    store: Arc<dyn CounterStore>,
    stream_key: String,
    group: String,
    ttl_secs: u64,
}

impl AttemptTracker {
    pub fn new(
        store: Arc<dyn CounterStore>,
        stream_key: impl Into<String>,
        group: impl Into<String>,
        ttl_secs: u64,
    ) -> Self {
        Self {
            store,
            stream_key: stream_key.into(),
            group: group.into(),
            ttl_secs,
        }
    }

    /// Counter key for a message id
    pub fn key(&self, message_id: &str) -> String {
        format!("retry:{}:{}:{}", self.stream_key, self.group, message_id)
    }

    /// Count one more attempt for every id
    ///
    /// Each id's counter moves by exactly one. Returns the highest new count
    /// among them, which is what the retry ceiling is checked against.
    pub async fn increment(&self, message_ids: &[String]) -> ConsumerResult<u64> {
        if message_ids.is_empty() {
            return Ok(0);
        }
        let keys = self.keys(message_ids);
        let counts = self.store.incr_with_ttl(&keys, self.ttl_secs).await?;
        Ok(counts.into_iter().max().unwrap_or(0))
    }

    /// Attempts recorded for one id (`0` if none)
    pub async fn read(&self, message_id: &str) -> ConsumerResult<u64> {
        self.store.get(&self.key(message_id)).await
    }

    /// Forget attempts for the given ids
    pub async fn clear(&self, message_ids: &[String]) -> ConsumerResult<()> {
        if message_ids.is_empty() {
            return Ok(());
        }
        self.store.delete(&self.keys(message_ids)).await
    }

    fn keys(&self, message_ids: &[String]) -> Vec<String> {
        message_ids.iter().map(|id| self.key(id)).collect()
    }
}
