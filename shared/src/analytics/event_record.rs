// ============================================================================
// Event Records
// ============================================================================
//
// Table (created by the API service's migrations):
//
//   "eventRecord" (
//       id          uuid primary key default uuid_generate_v4(),
//       alias       varchar not null references shortlink(alias),
//       "timestamp" timestamptz not null,
//       "eventType" varchar not null,
//       "eventData" jsonb,
//       "createdAt" timestamptz not null default now(),
//       "updatedAt" timestamptz not null default now()
//   )
//
// ============================================================================

use crate::stream_consumer::Message;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;

/// One analytics row
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub alias: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    /// The whole stream message, as JSON
    pub event_data: Value,
}

impl EventRecord {
    /// Map a click message read from `stream`
    ///
    /// `alias` and `eventType` are required. The event time comes from the
    /// `timestamp` field (epoch milliseconds) and falls back to the stream id.
    pub fn from_message(stream: &str, message: &Message) -> Result<Self> {
        let alias = message
            .field("alias")
            .filter(|a| !a.is_empty())
            .with_context(|| format!("message {} has no alias", message.id))?;
        let event_type = message
            .field("eventType")
            .filter(|t| !t.is_empty())
            .with_context(|| format!("message {} has no eventType", message.id))?;

        let millis = message
            .field("timestamp")
            .and_then(|ts| ts.trim().parse::<i64>().ok())
            .unwrap_or(message.timestamp);
        let timestamp = DateTime::<Utc>::from_timestamp_millis(millis)
            .filter(|_| millis > 0)
            .ok_or_else(|| anyhow!("message {} has an invalid timestamp", message.id))?;

        Ok(Self {
            alias: alias.to_string(),
            timestamp,
            event_type: event_type.to_string(),
            event_data: message.to_json(stream),
        })
    }
}

/// Persistence for event records
#[async_trait]
pub trait EventRecordStore: Send + Sync {
    /// Insert all records in one statement; returns rows written
    async fn bulk_insert(&self, records: &[EventRecord]) -> Result<u64>;
}

pub struct PostgresEventRecordStore {
    pool: PgPool,
}

impl PostgresEventRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventRecordStore for PostgresEventRecordStore {
    async fn bulk_insert(&self, records: &[EventRecord]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut aliases = Vec::with_capacity(records.len());
        let mut timestamps = Vec::with_capacity(records.len());
        let mut event_types = Vec::with_capacity(records.len());
        let mut event_data = Vec::with_capacity(records.len());
        for record in records {
            aliases.push(record.alias.clone());
            timestamps.push(record.timestamp);
            event_types.push(record.event_type.clone());
            event_data.push(record.event_data.clone());
        }

        let result = sqlx::query(
            r#"
            INSERT INTO "eventRecord"
                ("alias", "timestamp", "eventType", "eventData", "createdAt", "updatedAt")
            SELECT alias, ts, event_type, event_data, NOW(), NOW()
            FROM UNNEST($1::varchar[], $2::timestamptz[], $3::varchar[], $4::jsonb[])
                AS t(alias, ts, event_type, event_data)
            "#,
        )
        .bind(&aliases)
        .bind(&timestamps)
        .bind(&event_types)
        .bind(&event_data)
        .execute(&self.pool)
        .await
        .context("Failed to insert event records")?;

        Ok(result.rows_affected())
    }
}
