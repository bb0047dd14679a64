// ============================================================================
// Database Configuration
// ============================================================================

/// Postgres connection pool configuration for the analytics store
#[derive(Clone, Debug)]
pub struct DbConfig {
    /// Minimum number of idle connections kept in the pool
    pub min_connections: u32,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Timeout for acquiring a connection from the pool (seconds)
    pub acquire_timeout_secs: u64,
    /// Timeout for idle connections before they are closed (seconds)
    pub idle_timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            min_connections: 2,
            max_connections: 10,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 10,
        }
    }
}

impl DbConfig {
    pub(crate) fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_connections: std::env::var("DB_POOL_MIN")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.min_connections),
            max_connections: std::env::var("DB_POOL_MAX")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
            acquire_timeout_secs: std::env::var("DB_ACQUIRE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.acquire_timeout_secs),
            idle_timeout_secs: std::env::var("DB_POOL_IDLE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.idle_timeout_secs),
        }
    }
}
