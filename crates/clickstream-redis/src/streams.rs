//! Redis Streams support (consumer groups)

use crate::{RedisClient, Result};
use redis::{ErrorKind, RedisError, Value};

/// Entry in a Redis Stream (string values, broker order preserved)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    pub id: String,
    pub fields: Vec<(String, String)>,
}

/// Trimming policy applied by XADD
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamAddOptions {
    /// Cap the stream at this many entries (None = unbounded)
    pub max_len: Option<u64>,
    /// Use `MAXLEN ~` (approximate, cheaper) instead of exact trimming
    pub approximate: bool,
}

/// Options for XREADGROUP
#[derive(Debug, Clone, Default)]
pub struct StreamReadOptions {
    /// Block for N milliseconds (None = no blocking)
    pub block: Option<u64>,
    /// Maximum number of entries to return
    pub count: Option<usize>,
}

impl RedisClient {
    // ============================================================================
    // Stream Operations
    // ============================================================================

    /// XADD - Append an entry with an auto-generated ID
    ///
    /// `XADD key [MAXLEN [~] n] * field value ...`. Returns the generated ID.
    pub async fn xadd<F, V>(
        &mut self,
        stream_key: &str,
        fields: &[(F, V)],
        options: StreamAddOptions,
    ) -> Result<String>
    where
        F: redis::ToRedisArgs,
        V: redis::ToRedisArgs,
    {
        let mut cmd = redis::cmd("XADD");
        cmd.arg(stream_key);

        if let Some(max_len) = options.max_len {
            cmd.arg("MAXLEN");
            if options.approximate {
                cmd.arg("~");
            }
            cmd.arg(max_len);
        }

        cmd.arg("*");
        for (field, value) in fields {
            cmd.arg(field).arg(value);
        }

        cmd.query_async(self.connection_mut()).await
    }

    /// XGROUP CREATE ... MKSTREAM
    ///
    /// Returns `true` when the group was created and `false` when it already
    /// existed (`BUSYGROUP`). Any other failure is returned as an error.
    pub async fn xgroup_create(
        &mut self,
        stream_key: &str,
        group: &str,
        start_id: &str,
    ) -> Result<bool> {
        let result: Result<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream_key)
            .arg(group)
            .arg(start_id)
            .arg("MKSTREAM")
            .query_async(self.connection_mut())
            .await;

        match result {
            Ok(()) => Ok(true),
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// XREADGROUP with the `>` cursor - entries never delivered to this group
    ///
    /// A blocking read that times out returns an empty vector.
    pub async fn xreadgroup(
        &mut self,
        stream_key: &str,
        group: &str,
        consumer: &str,
        options: StreamReadOptions,
    ) -> Result<Vec<StreamEntry>> {
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP").arg(group).arg(consumer);

        if let Some(count) = options.count {
            cmd.arg("COUNT").arg(count);
        }
        if let Some(block_ms) = options.block {
            cmd.arg("BLOCK").arg(block_ms);
        }

        cmd.arg("STREAMS").arg(stream_key).arg(">");

        let reply: Value = cmd.query_async(self.connection_mut()).await?;
        parse_stream_read_reply(reply)
    }

    /// XACK - Acknowledge stream entries for a group
    ///
    /// Returns the number of entries that were actually pending.
    pub async fn xack(&mut self, stream_key: &str, group: &str, ids: &[String]) -> Result<i64> {
        if ids.is_empty() {
            return Ok(0);
        }
        redis::cmd("XACK")
            .arg(stream_key)
            .arg(group)
            .arg(ids)
            .query_async(self.connection_mut())
            .await
    }

    /// XLEN - Get stream length
    pub async fn xlen(&mut self, stream_key: &str) -> Result<i64> {
        redis::cmd("XLEN")
            .arg(stream_key)
            .query_async(self.connection_mut())
            .await
    }
}

/// Flatten an XREAD / XREADGROUP reply into entries
///
/// Accepts both the RESP2 shape (`[[stream, [[id, [k, v, ...]], ...]], ...]`)
/// and the RESP3 map shape. `Nil` (block timeout) yields no entries; an entry
/// whose field list is `Nil` (trimmed while pending) yields no fields.
pub fn parse_stream_read_reply(reply: Value) -> Result<Vec<StreamEntry>> {
    let streams: Vec<(Value, Value)> = match reply {
        Value::Nil => return Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Array(mut pair) if pair.len() == 2 => {
                    let entries = pair.pop().unwrap_or(Value::Nil);
                    let name = pair.pop().unwrap_or(Value::Nil);
                    Ok((name, entries))
                }
                other => Err(protocol_error("stream reply item", &other)),
            })
            .collect::<Result<_>>()?,
        Value::Map(pairs) => pairs,
        other => return Err(protocol_error("stream reply", &other)),
    };

    let mut out = Vec::new();
    for (_name, entries) in streams {
        let entries = match entries {
            Value::Array(entries) => entries,
            Value::Nil => continue,
            other => return Err(protocol_error("stream entries", &other)),
        };

        for entry in entries {
            let mut parts = match entry {
                Value::Array(parts) if parts.len() == 2 => parts,
                other => return Err(protocol_error("stream entry", &other)),
            };
            let raw_fields = parts.pop().unwrap_or(Value::Nil);
            let id = value_to_string(parts.pop().unwrap_or(Value::Nil))
                .ok_or_else(|| protocol_error_msg("stream entry id is not a string"))?;

            out.push(StreamEntry {
                id,
                fields: parse_fields(raw_fields)?,
            });
        }
    }

    Ok(out)
}

fn parse_fields(raw: Value) -> Result<Vec<(String, String)>> {
    let flat = match raw {
        Value::Nil => return Ok(Vec::new()),
        Value::Array(flat) => flat,
        Value::Map(pairs) => {
            return pairs
                .into_iter()
                .map(|(k, v)| match (value_to_string(k), value_to_string(v)) {
                    (Some(k), Some(v)) => Ok((k, v)),
                    _ => Err(protocol_error_msg("stream field is not a string")),
                })
                .collect();
        }
        other => return Err(protocol_error("stream fields", &other)),
    };

    if flat.len() % 2 != 0 {
        return Err(protocol_error_msg("odd number of stream field items"));
    }

    let mut fields = Vec::with_capacity(flat.len() / 2);
    let mut iter = flat.into_iter();
    while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
        match (value_to_string(k), value_to_string(v)) {
            (Some(k), Some(v)) => fields.push((k, v)),
            _ => return Err(protocol_error_msg("stream field is not a string")),
        }
    }
    Ok(fields)
}

fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::BulkString(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Value::SimpleString(s) => Some(s),
        Value::Int(i) => Some(i.to_string()),
        _ => None,
    }
}

fn protocol_error(what: &'static str, got: &Value) -> RedisError {
    RedisError::from((ErrorKind::TypeError, what, format!("unexpected value {:?}", got)))
}

fn protocol_error_msg(what: &'static str) -> RedisError {
    RedisError::from((ErrorKind::TypeError, what))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(s: &str) -> Value {
        Value::BulkString(s.as_bytes().to_vec())
    }

    #[test]
    fn test_parse_nil_reply() {
        assert!(parse_stream_read_reply(Value::Nil).unwrap().is_empty());
    }

    #[test]
    fn test_parse_resp2_reply_keeps_field_order() {
        let reply = Value::Array(vec![Value::Array(vec![
            bulk("shortlink:click"),
            Value::Array(vec![
                Value::Array(vec![
                    bulk("1700000000000-0"),
                    Value::Array(vec![
                        bulk("timestamp"),
                        bulk("1700000000000"),
                        bulk("alias"),
                        bulk("abc123"),
                    ]),
                ]),
                Value::Array(vec![
                    bulk("1700000000001-0"),
                    Value::Array(vec![bulk("alias"), bulk("zzz")]),
                ]),
            ]),
        ])]);

        let entries = parse_stream_read_reply(reply).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "1700000000000-0");
        assert_eq!(
            entries[0].fields,
            vec![
                ("timestamp".to_string(), "1700000000000".to_string()),
                ("alias".to_string(), "abc123".to_string()),
            ]
        );
        assert_eq!(entries[1].fields[0].1, "zzz");
    }

    #[test]
    fn test_parse_resp3_map_reply() {
        let reply = Value::Map(vec![(
            bulk("s"),
            Value::Array(vec![Value::Array(vec![
                bulk("1-0"),
                Value::Map(vec![(bulk("k"), bulk("v"))]),
            ])]),
        )]);

        let entries = parse_stream_read_reply(reply).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].fields, vec![("k".to_string(), "v".to_string())]);
    }

    #[test]
    fn test_parse_trimmed_entry_has_no_fields() {
        let reply = Value::Array(vec![Value::Array(vec![
            bulk("s"),
            Value::Array(vec![Value::Array(vec![bulk("1-0"), Value::Nil])]),
        ])]);

        let entries = parse_stream_read_reply(reply).unwrap();
        assert_eq!(entries[0].id, "1-0");
        assert!(entries[0].fields.is_empty());
    }

    #[test]
    fn test_parse_rejects_odd_field_list() {
        let reply = Value::Array(vec![Value::Array(vec![
            bulk("s"),
            Value::Array(vec![Value::Array(vec![
                bulk("1-0"),
                Value::Array(vec![bulk("dangling")]),
            ])]),
        ])]);

        assert!(parse_stream_read_reply(reply).is_err());
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_consumer_group_operations() -> Result<()> {
        let mut client = RedisClient::connect("redis://localhost:6379").await?;
        let stream_key = "test_group_stream";
        client.del(&[stream_key.to_string()]).await?;

        // Group creation is idempotent
        assert!(client.xgroup_create(stream_key, "g", "0").await?);
        assert!(!client.xgroup_create(stream_key, "g", "0").await?);

        let id = client
            .xadd(stream_key, &[("alias", "abc")], StreamAddOptions::default())
            .await?;

        let entries = client
            .xreadgroup(
                stream_key,
                "g",
                "c1",
                StreamReadOptions {
                    block: Some(100),
                    count: Some(10),
                },
            )
            .await?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, id);

        // Nothing new for the group
        let entries = client
            .xreadgroup(
                stream_key,
                "g",
                "c2",
                StreamReadOptions {
                    block: Some(100),
                    count: Some(10),
                },
            )
            .await?;
        assert!(entries.is_empty());

        assert_eq!(client.xack(stream_key, "g", &[id.clone()]).await?, 1);
        // Re-ack is harmless
        assert_eq!(client.xack(stream_key, "g", &[id]).await?, 0);

        client.del(&[stream_key.to_string()]).await?;
        Ok(())
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_xadd_exact_maxlen() -> Result<()> {
        let mut client = RedisClient::connect("redis://localhost:6379").await?;
        let stream_key = "test_maxlen_stream";
        client.del(&[stream_key.to_string()]).await?;

        let options = StreamAddOptions {
            max_len: Some(2),
            approximate: false,
        };
        for i in 0..5 {
            client
                .xadd(stream_key, &[("n", i.to_string())], options)
                .await?;
        }
        assert_eq!(client.xlen(stream_key).await?, 2);

        client.del(&[stream_key.to_string()]).await?;
        Ok(())
    }
}
