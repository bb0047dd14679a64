//! # Clickstream Shared
//!
//! Durable consumption of Redis Streams with bounded retry and
//! dead-lettering, plus the click analytics handler the worker runs.

pub mod analytics;
pub mod db;
pub mod metrics;
pub mod stream_consumer;

pub use stream_consumer::{
    BatchHandler, ConsumerOptions, ConsumerSupervisor, Message, StreamBroker, StreamConsumer,
};
