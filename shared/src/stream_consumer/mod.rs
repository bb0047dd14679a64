// ============================================================================
// Stream Consumer - durable consumer-group processing over Redis Streams
// ============================================================================
//
// Components:
// - StreamBroker: append / create group / blocking group read / ack
// - AttemptTracker: per-message retry counters with rolling expiry
// - DeadLetterRouter: moves exhausted messages to the DLQ stream
// - StreamConsumer: the read → handle → ack / retry / dead-letter loop
// - ConsumerSupervisor: builds and starts a consumer by name
//
// Delivery is at-least-once. Handlers must be idempotent.
//
// ============================================================================

pub mod attempts;
pub mod broker;
pub mod consumer;
pub mod dead_letter;
pub mod handler;
pub mod message;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

pub use attempts::{AttemptTracker, CounterStore, RedisCounterStore};
pub use broker::{AppendOptions, RedisStreamBroker, StreamBroker};
pub use consumer::{BatchOutcome, ConsumerOptions, StreamConsumer};
pub use dead_letter::{DeadLetterRecord, DeadLetterRouter};
pub use handler::{BatchHandler, FnHandler, handler_fn};
pub use message::Message;
pub use supervisor::{CLICK_CONSUMER, ConsumerRegistration, ConsumerSupervisor};
