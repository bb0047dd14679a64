// ============================================================================
// Dead Letter Routing
// ============================================================================
//
// Messages that exhausted their retry budget are appended to a secondary
// stream (default: {stream}:dlq) with the failure context spread in front of
// the original fields:
//
//   orig_stream, group, id, error (≤ 256 chars), attempts, <original fields>
//
// The router never retries. An append failure goes back to the caller, which
// still force-acks the batch.
//
// ============================================================================

use super::broker::{AppendOptions, StreamBroker};
use super::message::Message;
use clickstream_error::{ConsumerError, ConsumerResult};
use std::sync::Arc;
use tracing::{error, warn};

/// Maximum characters of error text kept in a dead-letter record
pub const MAX_ERROR_LEN: usize = 256;

/// A failed message plus its failure metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterRecord {
    pub orig_stream: String,
    pub group: String,
    pub id: String,
    pub error: String,
    pub attempts: u64,
    pub fields: Vec<(String, String)>,
}

impl DeadLetterRecord {
    pub fn new(
        orig_stream: &str,
        group: &str,
        message: &Message,
        error_text: &str,
        attempts: u64,
    ) -> Self {
        Self {
            orig_stream: orig_stream.to_string(),
            group: group.to_string(),
            id: message.id.clone(),
            error: truncate_chars(error_text, MAX_ERROR_LEN),
            attempts,
            fields: message.fields.clone(),
        }
    }

    /// Flatten into stream fields
    ///
    /// An original field sharing a name with a metadata field overwrites its
    /// value in place.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut out = vec![
            ("orig_stream".to_string(), self.orig_stream.clone()),
            ("group".to_string(), self.group.clone()),
            ("id".to_string(), self.id.clone()),
            ("error".to_string(), self.error.clone()),
            ("attempts".to_string(), self.attempts.to_string()),
        ];

        for (name, value) in &self.fields {
            match out.iter_mut().find(|(k, _)| k == name) {
                Some(slot) => slot.1 = value.clone(),
                None => out.push((name.clone(), value.clone())),
            }
        }
        out
    }
}

/// Appends dead-letter records to the DLQ stream
#[derive(Clone)]
pub struct DeadLetterRouter {
    broker: Arc<dyn StreamBroker>,
    orig_stream: String,
    group: String,
    dlq_key: String,
}

impl DeadLetterRouter {
    pub fn new(
        broker: Arc<dyn StreamBroker>,
        orig_stream: impl Into<String>,
        group: impl Into<String>,
        dlq_key: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            orig_stream: orig_stream.into(),
            group: group.into(),
            dlq_key: dlq_key.into(),
        }
    }

    /// Append `message` to the DLQ; returns the DLQ entry id
    pub async fn route(
        &self,
        message: &Message,
        error_text: &str,
        attempts: u64,
    ) -> ConsumerResult<String> {
        let record =
            DeadLetterRecord::new(&self.orig_stream, &self.group, message, error_text, attempts);

        match self
            .broker
            .append(&self.dlq_key, &record.to_fields(), AppendOptions::default())
            .await
        {
            Ok(dlq_id) => {
                warn!(
                    group = %self.group,
                    message_id = %message.id,
                    attempts,
                    dlq = %self.dlq_key,
                    "Moved message to DLQ"
                );
                Ok(dlq_id)
            }
            Err(e) => {
                error!(
                    group = %self.group,
                    message_id = %message.id,
                    dlq = %self.dlq_key,
                    error = %e,
                    "Failed to append message to DLQ"
                );
                Err(ConsumerError::dead_letter(&self.dlq_key, e.to_string()))
            }
        }
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
