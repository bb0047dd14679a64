// ============================================================================
// Stream Broker
// ============================================================================
//
// The log abstraction the consumer runs against: append, idempotent
// consumer-group creation, blocking group reads and acknowledgement.
//
// RedisStreamBroker maps it onto XADD / XGROUP CREATE MKSTREAM /
// XREADGROUP ... > / XACK.
//
// ============================================================================

use super::message::Message;
use async_trait::async_trait;
use clickstream_error::ConsumerResult;
use clickstream_redis::{RedisClient, StreamAddOptions, StreamReadOptions};
use tracing::{debug, error, info};

/// Length cap applied when appending
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendOptions {
    pub max_len: Option<u64>,
    /// Approximate (`~`) trimming
    pub approximate: bool,
}

/// Broker contract required by `StreamConsumer`
#[async_trait]
pub trait StreamBroker: Send + Sync {
    /// Append an entry and return its broker-assigned id
    async fn append(
        &self,
        stream: &str,
        fields: &[(String, String)],
        options: AppendOptions,
    ) -> ConsumerResult<String>;

    /// Create a consumer group (and the stream if missing)
    ///
    /// Creating a group that already exists is not an error.
    async fn create_group(&self, stream: &str, group: &str, start_id: &str)
    -> ConsumerResult<()>;

    /// Read entries never delivered to any consumer of `group`
    ///
    /// Blocks up to `block_ms`; a timeout returns an empty batch.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> ConsumerResult<Vec<Message>>;

    /// Acknowledge ids for `group`, returning how many were pending
    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> ConsumerResult<u64>;
}

/// `StreamBroker` over Redis Streams
#[derive(Clone)]
pub struct RedisStreamBroker {
    client: RedisClient,
}

impl RedisStreamBroker {
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StreamBroker for RedisStreamBroker {
    async fn append(
        &self,
        stream: &str,
        fields: &[(String, String)],
        options: AppendOptions,
    ) -> ConsumerResult<String> {
        let mut client = self.client.clone();
        let options = StreamAddOptions {
            max_len: options.max_len,
            approximate: options.approximate,
        };

        match client.xadd(stream, fields, options).await {
            Ok(id) => {
                debug!(stream = %stream, stream_id = %id, "Appended entry to stream");
                Ok(id)
            }
            Err(e) => {
                error!(stream = %stream, error = %e, "Failed to append entry to stream");
                Err(e.into())
            }
        }
    }

    async fn create_group(
        &self,
        stream: &str,
        group: &str,
        start_id: &str,
    ) -> ConsumerResult<()> {
        let mut client = self.client.clone();

        match client.xgroup_create(stream, group, start_id).await {
            Ok(true) => {
                info!(stream = %stream, group = %group, "Consumer group created");
                Ok(())
            }
            Ok(false) => {
                info!(stream = %stream, group = %group, "Consumer group already exists");
                Ok(())
            }
            Err(e) => {
                error!(
                    stream = %stream,
                    group = %group,
                    error = %e,
                    "Failed to create consumer group"
                );
                Err(e.into())
            }
        }
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> ConsumerResult<Vec<Message>> {
        let mut client = self.client.clone();
        let options = StreamReadOptions {
            block: Some(block_ms),
            count: Some(count),
        };

        let entries = client
            .xreadgroup(stream, group, consumer, options)
            .await
            .inspect_err(|e| {
                error!(stream = %stream, group = %group, error = %e, "Failed to read from stream");
            })?;

        Ok(entries.into_iter().map(Message::from).collect())
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> ConsumerResult<u64> {
        let mut client = self.client.clone();

        let acked = client.xack(stream, group, ids).await.inspect_err(|e| {
            error!(
                stream = %stream,
                group = %group,
                count = ids.len(),
                error = %e,
                "Failed to acknowledge messages"
            );
        })?;

        debug!(stream = %stream, group = %group, count = ids.len(), acked, "Acknowledged messages");
        Ok(acked.max(0) as u64)
    }
}
