use thiserror::Error;

pub type ConsumerResult<T> = Result<T, ConsumerError>;

/// Error type shared by the stream consumer, its broker adapters and the worker
///
/// Configuration errors are fatal at startup. Broker and dead-letter errors
/// are transient: the consume loop logs them and keeps reading.
#[derive(Error, Debug)]
pub enum ConsumerError {
    // ===== Configuration Errors =====
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Consumer {0} not found")]
    UnknownConsumer(String),

    // ===== Broker & Storage Errors =====
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Broker error: {0}")]
    Broker(String),

    // ===== Processing Errors =====
    // Handler failures never surface here: they drive retries instead.
    #[error("Dead-letter append to {stream} failed: {reason}")]
    DeadLetter { stream: String, reason: String },
}

impl ConsumerError {
    /// Get error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ConsumerError::Config(_) => "CONFIG_ERROR",
            ConsumerError::UnknownConsumer(_) => "UNKNOWN_CONSUMER",
            #[cfg(feature = "redis")]
            ConsumerError::Redis(_) => "REDIS_ERROR",
            ConsumerError::Broker(_) => "BROKER_ERROR",
            ConsumerError::DeadLetter { .. } => "DEAD_LETTER_ERROR",
        }
    }

    /// Whether the consume loop may keep going after this error
    ///
    /// Configuration errors abort startup; everything else is logged and the
    /// loop carries on with the next read.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ConsumerError::Config(_) | ConsumerError::UnknownConsumer(_)
        )
    }

    /// Log this error with appropriate level and context
    pub fn log(&self) {
        let code = self.error_code();

        if self.is_retryable() {
            tracing::error!(
                error = %self,
                error_code = %code,
                "Consumer operation failed"
            );
        } else {
            tracing::error!(
                error = %self,
                error_code = %code,
                "Fatal consumer error"
            );
        }
    }
}

// ============================================================================
// Helper functions for creating common errors
// ============================================================================

impl ConsumerError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        ConsumerError::Config(msg.into())
    }

    /// Create a broker error
    pub fn broker(msg: impl Into<String>) -> Self {
        ConsumerError::Broker(msg.into())
    }

    /// Create a dead-letter error for `stream`
    pub fn dead_letter(stream: impl Into<String>, reason: impl Into<String>) -> Self {
        ConsumerError::DeadLetter {
            stream: stream.into(),
            reason: reason.into(),
        }
    }
}
