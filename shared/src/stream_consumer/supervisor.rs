// ============================================================================
// Consumer Supervisor
// ============================================================================
//
// Resolves a consumer by name, wires it with the shared broker, counter
// store and streams tuning, and starts it.
//
// Registered consumers:
// - "ClickConsumer": shortlink:click → analytics handler
//
// An unknown name is fatal: the worker must not come up idle.
//
// ============================================================================

use super::attempts::CounterStore;
use super::broker::StreamBroker;
use super::consumer::{ConsumerOptions, StreamConsumer};
use super::handler::BatchHandler;
use clickstream_config::{
    SHORTLINK_CLICK_DLQ, SHORTLINK_CLICK_GROUP, SHORTLINK_CLICK_STREAM, StreamsConfig,
};
use clickstream_error::{ConsumerError, ConsumerResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Name of the click-event consumer
pub const CLICK_CONSUMER: &str = "ClickConsumer";

/// What a named consumer reads and who handles it
#[derive(Clone)]
pub struct ConsumerRegistration {
    pub stream_key: String,
    pub group: String,
    pub dlq_key: Option<String>,
    pub handler: Arc<dyn BatchHandler>,
}

impl ConsumerRegistration {
    /// Click events from `shortlink:click` into the given handler
    pub fn click_events(handler: Arc<dyn BatchHandler>) -> Self {
        Self {
            stream_key: SHORTLINK_CLICK_STREAM.to_string(),
            group: SHORTLINK_CLICK_GROUP.to_string(),
            dlq_key: Some(SHORTLINK_CLICK_DLQ.to_string()),
            handler,
        }
    }
}

pub struct ConsumerSupervisor {
    broker: Arc<dyn StreamBroker>,
    counters: Arc<dyn CounterStore>,
    streams: StreamsConfig,
    consumer_id: String,
    registry: HashMap<String, ConsumerRegistration>,
    active: Mutex<Vec<Arc<StreamConsumer>>>,
}

impl ConsumerSupervisor {
    pub fn new(
        broker: Arc<dyn StreamBroker>,
        counters: Arc<dyn CounterStore>,
        streams: StreamsConfig,
        consumer_id: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            counters,
            streams,
            consumer_id: consumer_id.into(),
            registry: HashMap::new(),
            active: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, registration: ConsumerRegistration) {
        self.registry.insert(name.into(), registration);
    }

    pub fn registered(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.registry.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build (but don't start) the consumer registered under `name`
    pub fn build(&self, name: &str) -> ConsumerResult<StreamConsumer> {
        let registration = self
            .registry
            .get(name)
            .ok_or_else(|| ConsumerError::UnknownConsumer(name.to_string()))?;

        let mut options = ConsumerOptions::new(
            registration.stream_key.clone(),
            registration.group.clone(),
            self.consumer_id.clone(),
        );
        options.dlq_key = registration.dlq_key.clone();
        options.max_retries = self.streams.max_retries;
        options.read_count = self.streams.read_count;
        options.read_block_ms = self.streams.block_ms;
        options.retry_key_ttl_secs = self.streams.retry_key_ttl_secs;

        StreamConsumer::new(
            options,
            self.broker.clone(),
            self.counters.clone(),
            registration.handler.clone(),
        )
    }

    /// Build and start the consumer registered under `name`
    pub async fn initialize(&self, name: &str) -> ConsumerResult<Arc<StreamConsumer>> {
        let consumer = Arc::new(self.build(name)?);
        consumer.start().await?;

        info!(
            consumer = name,
            consumer_id = %self.consumer_id,
            stream = %consumer.options().stream_key,
            "Consumer initialized"
        );

        self.active.lock().await.push(consumer.clone());
        Ok(consumer)
    }

    /// Stop every consumer started through `initialize`
    pub async fn stop_all(&self) {
        let consumers: Vec<_> = self.active.lock().await.drain(..).collect();
        for consumer in consumers {
            consumer.stop().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream_consumer::testing::{MemoryBroker, MemoryCounterStore, ScriptedHandler};

    fn supervisor(broker: Arc<MemoryBroker>) -> ConsumerSupervisor {
        let mut supervisor = ConsumerSupervisor::new(
            broker,
            Arc::new(MemoryCounterStore::default()),
            StreamsConfig {
                max_retries: 5,
                read_count: 50,
                block_ms: 200,
                retry_key_ttl_secs: 3_600,
            },
            "worker-1",
        );
        supervisor.register(
            CLICK_CONSUMER,
            ConsumerRegistration::click_events(Arc::new(ScriptedHandler::succeeding())),
        );
        supervisor
    }

    #[test]
    fn test_build_applies_streams_config() {
        let supervisor = supervisor(Arc::new(MemoryBroker::default()));
        let consumer = supervisor.build(CLICK_CONSUMER).unwrap();
        let options = consumer.options();

        assert_eq!(options.stream_key, "shortlink:click");
        assert_eq!(options.group, "shortlink:click:group");
        assert_eq!(options.dlq_key(), "shortlink:click:dlq");
        assert_eq!(options.consumer_name, "worker-1");
        assert_eq!(options.max_retries, 5);
        assert_eq!(options.read_count, 50);
        assert_eq!(options.read_block_ms, 200);
        assert_eq!(options.retry_key_ttl_secs, 3_600);
    }

    #[tokio::test]
    async fn test_unknown_consumer_is_fatal() {
        let broker = Arc::new(MemoryBroker::default());
        let supervisor = supervisor(broker.clone());

        let err = supervisor.initialize("ViewConsumer").await.err().unwrap();
        assert!(matches!(err, ConsumerError::UnknownConsumer(ref n) if n == "ViewConsumer"));
        assert!(!err.is_retryable());
        assert_eq!(broker.create_group_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_starts_and_stop_all_stops() {
        let broker = Arc::new(MemoryBroker::default());
        let supervisor = supervisor(broker.clone());
        assert_eq!(supervisor.registered(), vec![CLICK_CONSUMER]);

        let consumer = supervisor.initialize(CLICK_CONSUMER).await.unwrap();
        assert!(consumer.is_running().await);
        assert!(broker.group_exists("shortlink:click", "shortlink:click:group"));

        supervisor.stop_all().await;
        assert!(!consumer.is_running().await);
    }
}
