use super::event_record::{EventRecord, EventRecordStore};
use crate::stream_consumer::{BatchHandler, Message};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Writes one event record per click message
///
/// A message that can't be mapped fails the whole batch, so it goes through
/// the retry budget and ends up in the DLQ.
pub struct ClickEventHandler {
    store: Arc<dyn EventRecordStore>,
    /// Source stream, recorded in each event's payload
    stream_key: String,
}

impl ClickEventHandler {
    pub fn new(store: Arc<dyn EventRecordStore>, stream_key: impl Into<String>) -> Self {
        Self {
            store,
            stream_key: stream_key.into(),
        }
    }
}

#[async_trait]
impl BatchHandler for ClickEventHandler {
    async fn handle(&self, batch: &[Message]) -> Result<()> {
        let records = batch
            .iter()
            .map(|message| EventRecord::from_message(&self.stream_key, message))
            .collect::<Result<Vec<_>>>()?;

        let inserted = self.store.bulk_insert(&records).await?;
        debug!(count = inserted, "Recorded click events");
        Ok(())
    }
}
