//! # Clickstream Redis
//!
//! Low-level Redis client for the click-stream worker.
//!
//! ## Design Principles
//!
//! - **No business logic** - Pure infrastructure layer
//! - **No dependencies** on other clickstream-* crates
//! - **Cheap to share** - `RedisClient` is `Clone` over one `ConnectionManager`
//!
//! ## Features
//!
//! - Connection management with automatic reconnection
//! - Counters with sliding TTL (INCR + EXPIRE in one MULTI/EXEC)
//! - Redis Streams with consumer groups (XADD, XGROUP, XREADGROUP, XACK)
//!
//! ## Example
//!
//! ```rust,no_run
//! use clickstream_redis::{RedisClient, StreamAddOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = RedisClient::connect("redis://localhost:6379").await?;
//!
//!     let id = client
//!         .xadd("shortlink:click", &[("alias", "abc123")], StreamAddOptions::default())
//!         .await?;
//!     client.xgroup_create("shortlink:click", "shortlink:click:group", "0").await?;
//!
//!     Ok(())
//! }
//! ```

mod client;
mod streams;

pub use client::RedisClient;
pub use streams::{StreamAddOptions, StreamEntry, StreamReadOptions, parse_stream_read_reply};

// Re-export commonly used types
pub use redis::RedisError;

/// Result type for Redis operations
pub type Result<T> = std::result::Result<T, RedisError>;
