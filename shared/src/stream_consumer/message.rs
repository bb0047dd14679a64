// ============================================================================
// Stream Message
// ============================================================================

use clickstream_redis::StreamEntry;
use serde_json::{Map, Value, json};

/// A message read from a stream
///
/// `fields` keep the order the broker returned them in. `timestamp` is the
/// millisecond prefix of the broker-assigned id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub fields: Vec<(String, String)>,
    pub timestamp: i64,
}

impl Message {
    pub fn new(id: impl Into<String>, fields: Vec<(String, String)>) -> Self {
        let id = id.into();
        let timestamp = timestamp_from_id(&id);
        Self {
            id,
            fields,
            timestamp,
        }
    }

    /// Value of the first field named `name`
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// JSON form `{ "streamName", "id", "fields": {..}, "timestamp" }`
    pub fn to_json(&self, stream: &str) -> Value {
        let fields: Map<String, Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();

        json!({
            "streamName": stream,
            "id": self.id,
            "fields": fields,
            "timestamp": self.timestamp,
        })
    }
}

impl From<StreamEntry> for Message {
    fn from(entry: StreamEntry) -> Self {
        Message::new(entry.id, entry.fields)
    }
}

/// Millisecond part of a stream id (`"<ms>-<seq>"`); `0` when unparsable
pub fn timestamp_from_id(id: &str) -> i64 {
    id.split('-')
        .next()
        .and_then(|ms| ms.parse().ok())
        .unwrap_or(0)
}
