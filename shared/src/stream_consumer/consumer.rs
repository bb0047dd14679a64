// ============================================================================
// Stream Consumer
// ============================================================================
//
// Long-running read → handle → ack / retry / dead-letter loop over one
// consumer group.
//
// Flow per batch:
// 1. Hand the whole batch to the handler (a panic counts as a failure)
// 2. Success:
//    - XACK every id
//    - Clear their attempt counters
// 3. Failure:
//    - Count one attempt for every id in the batch
//    - Below max_retries: leave the batch pending (no ack) for redelivery
//    - At max_retries: append each message to the DLQ, then force-ack the
//      batch even if a DLQ append failed
//
// Guarantees:
// - At-least-once delivery while retries remain
// - A message at the retry ceiling is dead-lettered and acked once
// - Runtime errors never end the loop; only stop() does
//
// ============================================================================

use super::attempts::{AttemptTracker, CounterStore};
use super::broker::StreamBroker;
use super::dead_letter::DeadLetterRouter;
use super::handler::BatchHandler;
use super::message::Message;
use crate::metrics;
use clickstream_error::{ConsumerError, ConsumerResult};
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pause after a failed iteration before reading again
pub const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Cursor used when the group is first created: deliver the whole stream
pub const GROUP_START_ID: &str = "0";

/// Settings for one `StreamConsumer`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerOptions {
    pub stream_key: String,
    pub group: String,
    /// Identity of this worker inside the group
    pub consumer_name: String,
    /// Dead-letter stream, `{stream_key}:dlq` when unset
    pub dlq_key: Option<String>,
    pub max_retries: u32,
    pub read_count: usize,
    pub read_block_ms: u64,
    pub retry_key_ttl_secs: u64,
}

impl ConsumerOptions {
    pub fn new(
        stream_key: impl Into<String>,
        group: impl Into<String>,
        consumer_name: impl Into<String>,
    ) -> Self {
        Self {
            stream_key: stream_key.into(),
            group: group.into(),
            consumer_name: consumer_name.into(),
            dlq_key: None,
            max_retries: 3,
            read_count: 10,
            read_block_ms: 5_000,
            retry_key_ttl_secs: 86_400,
        }
    }

    pub fn dlq_key(&self) -> String {
        self.dlq_key
            .clone()
            .unwrap_or_else(|| format!("{}:dlq", self.stream_key))
    }

    fn validate(&self) -> ConsumerResult<()> {
        let missing: Vec<&str> = [
            ("stream_key", &self.stream_key),
            ("group", &self.group),
            ("consumer_name", &self.consumer_name),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            return Err(ConsumerError::config(format!(
                "{} required",
                missing.join(", ")
            )));
        }
        if self.read_count == 0 {
            return Err(ConsumerError::config("read_count must be at least 1"));
        }
        if self.max_retries == 0 {
            return Err(ConsumerError::config("max_retries must be at least 1"));
        }
        // BLOCK 0 waits forever and would make stop() hang
        if self.read_block_ms == 0 {
            return Err(ConsumerError::config("read_block_ms must be at least 1"));
        }
        Ok(())
    }
}

/// What happened to a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Handler succeeded; batch acked and counters cleared
    Acked,
    /// Handler failed; batch left pending
    Retrying { attempts: u64 },
    /// Retry budget exhausted; batch dead-lettered and acked
    DeadLettered { attempts: u64 },
}

struct RunningLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Durable consumer for one (stream, group, consumer)
pub struct StreamConsumer {
    inner: Arc<ConsumerInner>,
    running: Mutex<Option<RunningLoop>>,
}

struct ConsumerInner {
    options: ConsumerOptions,
    broker: Arc<dyn StreamBroker>,
    handler: Arc<dyn BatchHandler>,
    attempts: AttemptTracker,
    dead_letters: DeadLetterRouter,
}

impl StreamConsumer {
    /// Build a consumer; fails fast on missing stream, group or consumer name
    pub fn new(
        options: ConsumerOptions,
        broker: Arc<dyn StreamBroker>,
        counters: Arc<dyn CounterStore>,
        handler: Arc<dyn BatchHandler>,
    ) -> ConsumerResult<Self> {
        options.validate()?;

        let attempts = AttemptTracker::new(
            counters,
            options.stream_key.clone(),
            options.group.clone(),
            options.retry_key_ttl_secs,
        );
        let dead_letters = DeadLetterRouter::new(
            broker.clone(),
            options.stream_key.clone(),
            options.group.clone(),
            options.dlq_key(),
        );

        Ok(Self {
            inner: Arc::new(ConsumerInner {
                options,
                broker,
                handler,
                attempts,
                dead_letters,
            }),
            running: Mutex::new(None),
        })
    }

    pub fn options(&self) -> &ConsumerOptions {
        &self.inner.options
    }

    /// Ensure the group exists and launch the consume loop
    ///
    /// Returns once the loop is spawned. Calling it while already running
    /// logs a warning and does nothing. A group-creation failure is returned
    /// and the consumer stays stopped.
    pub async fn start(&self) -> ConsumerResult<()> {
        let mut running = self.running.lock().await;
        let opts = &self.inner.options;

        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            warn!(group = %opts.group, consumer = %opts.consumer_name, "Consumer already running");
            return Ok(());
        }

        self.inner
            .broker
            .create_group(&opts.stream_key, &opts.group, GROUP_START_ID)
            .await?;

        let cancel = CancellationToken::new();
        let inner = self.inner.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { inner.consume_loop(token).await });

        *running = Some(RunningLoop { cancel, handle });

        info!(
            stream = %opts.stream_key,
            group = %opts.group,
            consumer = %opts.consumer_name,
            max_retries = opts.max_retries,
            read_count = opts.read_count,
            "Stream consumer started"
        );
        Ok(())
    }

    /// Ask the loop to stop and wait for it to exit
    ///
    /// The flag is observed at the top of the next iteration, so an in-flight
    /// blocking read finishes first (up to `read_block_ms`).
    pub async fn stop(&self) {
        let Some(RunningLoop { cancel, handle }) = self.running.lock().await.take() else {
            return;
        };

        cancel.cancel();
        if let Err(e) = handle.await {
            error!(group = %self.inner.options.group, error = %e, "Consume loop task failed");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Run one batch through the handler / ack / retry / dead-letter cycle
    pub async fn process_batch(&self, batch: &[Message]) -> ConsumerResult<BatchOutcome> {
        self.inner.process_batch(batch).await
    }
}

impl ConsumerInner {
    async fn consume_loop(self: Arc<Self>, cancel: CancellationToken) {
        let opts = &self.options;

        while !cancel.is_cancelled() {
            if let Err(e) = self.poll_once().await {
                metrics::STREAM_CONSUME_ERRORS_TOTAL
                    .with_label_values(&[&opts.stream_key])
                    .inc();
                error!(
                    group = %opts.group,
                    consumer = %opts.consumer_name,
                    error = %e,
                    error_code = e.error_code(),
                    "Consume error"
                );

                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                }
            }
        }

        info!(group = %opts.group, consumer = %opts.consumer_name, "Stream consumer stopped");
    }

    async fn poll_once(&self) -> ConsumerResult<()> {
        let opts = &self.options;
        let batch = self
            .broker
            .read_group(
                &opts.stream_key,
                &opts.group,
                &opts.consumer_name,
                opts.read_count,
                opts.read_block_ms,
            )
            .await?;

        if batch.is_empty() {
            return Ok(());
        }

        self.process_batch(&batch).await.map(|_| ())
    }

    async fn process_batch(&self, batch: &[Message]) -> ConsumerResult<BatchOutcome> {
        let opts = &self.options;
        let ids: Vec<String> = batch.iter().map(|m| m.id.clone()).collect();

        if ids.is_empty() {
            return Ok(BatchOutcome::Acked);
        }

        let handled = AssertUnwindSafe(self.handler.handle(batch))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(handler_panic(panic)));

        match handled {
            Ok(()) => {
                self.broker.ack(&opts.stream_key, &opts.group, &ids).await?;
                self.attempts.clear(&ids).await?;

                metrics::record_batch(&opts.stream_key, "acked", ids.len());
                debug!(group = %opts.group, count = ids.len(), "Batch processed and acknowledged");
                Ok(BatchOutcome::Acked)
            }
            Err(err) => {
                let attempts = self.attempts.increment(&ids).await?;
                let reason = format!("{:#}", err);

                error!(
                    group = %opts.group,
                    count = ids.len(),
                    attempts,
                    error = %reason,
                    "Batch processing failed"
                );

                if attempts < u64::from(opts.max_retries) {
                    metrics::record_batch(&opts.stream_key, "retrying", 0);
                    return Ok(BatchOutcome::Retrying { attempts });
                }

                let routed = self.dead_letter(batch, &reason).await;

                // Ack even when the DLQ append failed: stop redelivery
                self.broker.ack(&opts.stream_key, &opts.group, &ids).await?;
                metrics::record_batch(&opts.stream_key, "dead_lettered", ids.len());
                routed?;

                Ok(BatchOutcome::DeadLettered { attempts })
            }
        }
    }

    /// Route every message to the DLQ; returns the first failure
    async fn dead_letter(&self, batch: &[Message], reason: &str) -> ConsumerResult<()> {
        let mut first_err = None;

        for msg in batch {
            let result = match self.attempts.read(&msg.id).await {
                Ok(attempts) => self
                    .dead_letters
                    .route(msg, reason, attempts)
                    .await
                    .map(|_| ()),
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => metrics::STREAM_DEAD_LETTERED_TOTAL
                    .with_label_values(&[&self.options.stream_key])
                    .inc(),
                Err(e) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }

        first_err.map_or(Ok(()), Err)
    }
}

/// A panicking handler counts as a failed batch
fn handler_panic(panic: Box<dyn Any + Send>) -> anyhow::Error {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    anyhow::anyhow!("handler panicked: {}", detail)
}
