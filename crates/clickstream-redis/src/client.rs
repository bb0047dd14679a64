//! Redis client implementation with connection management

use crate::Result;
use redis::{AsyncCommands, aio::ConnectionManager};

/// Redis client with automatic reconnection
#[derive(Clone)]
pub struct RedisClient {
    conn: ConnectionManager,
}

impl RedisClient {
    /// Connect to Redis server
    ///
    /// Supports both redis:// and rediss:// (TLS) URLs
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    pub(crate) fn connection_mut(&mut self) -> &mut ConnectionManager {
        &mut self.conn
    }

    // ============================================================================
    // Key Operations
    // ============================================================================

    /// DEL - Delete keys
    ///
    /// An empty key list is a no-op (Redis rejects `DEL` without arguments).
    pub async fn del(&mut self, keys: &[String]) -> Result<i64> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.conn.del(keys).await
    }

    /// TTL - Get time to live in seconds
    pub async fn ttl(&mut self, key: &str) -> Result<i64> {
        self.conn.ttl(key).await
    }

    // ============================================================================
    // Counters
    // ============================================================================

    /// INCR + EXPIRE for every key inside one MULTI/EXEC
    ///
    /// The TTL is refreshed on every call (sliding expiry). Returns the new
    /// value of each key, in input order.
    pub async fn incr_with_ttl(&mut self, keys: &[String], ttl_seconds: u64) -> Result<Vec<i64>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for key in keys {
            pipe.cmd("INCR").arg(key);
            pipe.cmd("EXPIRE").arg(key).arg(ttl_seconds).ignore();
        }

        pipe.query_async(&mut self.conn).await
    }

    /// GET parsed as an integer; absent keys read as `0`
    ///
    /// A value that is not a valid non-negative integer also reads as `0`
    /// and is logged, so a corrupted counter never blocks the caller.
    pub async fn get_int(&mut self, key: &str) -> Result<u64> {
        let value: Option<String> = self.conn.get(key).await?;
        Ok(match value {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(key = %key, value = %raw, "Non-numeric counter value, reading as 0");
                0
            }),
            None => 0,
        })
    }
}
