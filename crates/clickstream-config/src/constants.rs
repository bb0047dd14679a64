// ============================================================================
// Configuration Constants
// ============================================================================

// Stream names used by the shortlink click pipeline
pub const SHORTLINK_CLICK_STREAM: &str = "shortlink:click";
pub const SHORTLINK_CLICK_GROUP: &str = "shortlink:click:group";
pub const SHORTLINK_CLICK_DLQ: &str = "shortlink:click:dlq";

// Consumer registered by default
pub(crate) const DEFAULT_CONSUMER_NAME: &str = "ClickConsumer";

// Redis Streams consumer defaults
pub(crate) const DEFAULT_STREAMS_MAX_RETRIES: u32 = 3;
pub(crate) const DEFAULT_STREAMS_READ_COUNT: usize = 100;
pub(crate) const DEFAULT_STREAMS_BLOCK_MS: u64 = 5_000;
pub(crate) const DEFAULT_RETRY_KEY_TTL_SECS: u64 = SECONDS_PER_DAY;

// Graceful shutdown window for the worker binary
pub(crate) const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

// Time conversion constants
pub const SECONDS_PER_DAY: u64 = 86_400;
