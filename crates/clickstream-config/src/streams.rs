// ============================================================================
// Redis Streams Configuration
// ============================================================================

use crate::constants::{
    DEFAULT_RETRY_KEY_TTL_SECS, DEFAULT_STREAMS_BLOCK_MS, DEFAULT_STREAMS_MAX_RETRIES,
    DEFAULT_STREAMS_READ_COUNT,
};

/// Consumer-side tuning for Redis Streams
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamsConfig {
    /// Failed attempts before a message is moved to the dead-letter stream
    pub max_retries: u32,
    /// Maximum entries returned by one XREADGROUP call
    pub read_count: usize,
    /// XREADGROUP BLOCK timeout in milliseconds
    pub block_ms: u64,
    /// TTL of the per-message attempt counters, refreshed on every failure
    pub retry_key_ttl_secs: u64,
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_STREAMS_MAX_RETRIES,
            read_count: DEFAULT_STREAMS_READ_COUNT,
            block_ms: DEFAULT_STREAMS_BLOCK_MS,
            retry_key_ttl_secs: DEFAULT_RETRY_KEY_TTL_SECS,
        }
    }
}

impl StreamsConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            max_retries: std::env::var("REDIS_STREAMS_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_STREAMS_MAX_RETRIES),
            read_count: std::env::var("REDIS_STREAMS_READ_COUNT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_STREAMS_READ_COUNT),
            // 0 would mean "block forever" to XREADGROUP
            block_ms: std::env::var("REDIS_STREAMS_BLOCK_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|ms: &u64| *ms > 0)
                .unwrap_or(DEFAULT_STREAMS_BLOCK_MS),
            retry_key_ttl_secs: std::env::var("REDIS_STREAMS_RETRY_KEY_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_RETRY_KEY_TTL_SECS),
        }
    }
}
