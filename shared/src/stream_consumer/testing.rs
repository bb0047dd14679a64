//! In-memory doubles for the broker, counter store and handler

use super::attempts::CounterStore;
use super::broker::{AppendOptions, StreamBroker};
use super::handler::BatchHandler;
use super::message::Message;
use async_trait::async_trait;
use clickstream_error::{ConsumerError, ConsumerResult};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

const BASE_MS: i64 = 1_700_000_000_000;

#[derive(Default)]
struct GroupState {
    delivered: HashSet<String>,
    pending: Vec<String>,
    reclaimed: VecDeque<String>,
}

#[derive(Default)]
struct BrokerState {
    streams: HashMap<String, Vec<Message>>,
    groups: HashMap<(String, String), GroupState>,
    seq: i64,
    failing_reads: usize,
    failing_appends: HashSet<String>,
    fail_create_group: bool,
    create_group_calls: usize,
    read_calls: usize,
    ack_calls: Vec<Vec<String>>,
}

/// Consumer-group semantics of a Redis stream, in memory
#[derive(Default)]
pub(crate) struct MemoryBroker {
    state: Mutex<BrokerState>,
    notify: Notify,
}

impl MemoryBroker {
    pub(crate) fn publish(&self, stream: &str, fields: &[(&str, &str)]) -> String {
        let fields = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut state = self.state.lock().unwrap();
        let id = Self::push(&mut state, stream, fields, AppendOptions::default());
        drop(state);
        self.notify.notify_waiters();
        id
    }

    pub(crate) fn stream(&self, name: &str) -> Vec<Message> {
        let state = self.state.lock().unwrap();
        state.streams.get(name).cloned().unwrap_or_default()
    }

    pub(crate) fn pending(&self, stream: &str, group: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .groups
            .get(&(stream.to_string(), group.to_string()))
            .map(|g| g.pending.clone())
            .unwrap_or_default()
    }

    pub(crate) fn group_exists(&self, stream: &str, group: &str) -> bool {
        let state = self.state.lock().unwrap();
        state
            .groups
            .contains_key(&(stream.to_string(), group.to_string()))
    }

    /// Make every pending entry deliverable again, as a reclaimer would
    pub(crate) fn reclaim_pending(&self, stream: &str, group: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(g) = state
            .groups
            .get_mut(&(stream.to_string(), group.to_string()))
        {
            let pending = g.pending.clone();
            g.reclaimed.extend(pending);
        }
        drop(state);
        self.notify.notify_waiters();
    }

    pub(crate) fn fail_appends_to(&self, stream: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_appends
            .insert(stream.to_string());
    }

    pub(crate) fn fail_next_reads(&self, n: usize) {
        self.state.lock().unwrap().failing_reads = n;
    }

    pub(crate) fn fail_create_group(&self) {
        self.state.lock().unwrap().fail_create_group = true;
    }

    pub(crate) fn create_group_calls(&self) -> usize {
        self.state.lock().unwrap().create_group_calls
    }

    pub(crate) fn read_calls(&self) -> usize {
        self.state.lock().unwrap().read_calls
    }

    pub(crate) fn ack_calls(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().ack_calls.clone()
    }

    fn push(
        state: &mut BrokerState,
        stream: &str,
        fields: Vec<(String, String)>,
        options: AppendOptions,
    ) -> String {
        state.seq += 1;
        let id = format!("{}-0", BASE_MS + state.seq);
        let entries = state.streams.entry(stream.to_string()).or_default();
        entries.push(Message::new(id.clone(), fields));
        if let Some(max_len) = options.max_len {
            let max_len = max_len as usize;
            if entries.len() > max_len {
                let excess = entries.len() - max_len;
                entries.drain(..excess);
            }
        }
        id
    }

    fn take(
        state: &mut BrokerState,
        stream: &str,
        group: &str,
        count: usize,
    ) -> ConsumerResult<Vec<Message>> {
        let entries = state.streams.get(stream).cloned().unwrap_or_default();
        let g = state
            .groups
            .get_mut(&(stream.to_string(), group.to_string()))
            .ok_or_else(|| ConsumerError::broker("NOGROUP No such consumer group"))?;

        let mut batch = Vec::new();
        while batch.len() < count {
            let Some(id) = g.reclaimed.pop_front() else {
                break;
            };
            if let Some(msg) = entries.iter().find(|m| m.id == id) {
                batch.push(msg.clone());
            }
        }
        for msg in entries {
            if batch.len() >= count {
                break;
            }
            if g.delivered.insert(msg.id.clone()) {
                g.pending.push(msg.id.clone());
                batch.push(msg);
            }
        }
        Ok(batch)
    }
}

#[async_trait]
impl StreamBroker for MemoryBroker {
    async fn append(
        &self,
        stream: &str,
        fields: &[(String, String)],
        options: AppendOptions,
    ) -> ConsumerResult<String> {
        let mut state = self.state.lock().unwrap();
        if state.failing_appends.contains(stream) {
            return Err(ConsumerError::broker("READONLY You can't write against a read only replica"));
        }
        let id = Self::push(&mut state, stream, fields.to_vec(), options);
        drop(state);
        self.notify.notify_waiters();
        Ok(id)
    }

    async fn create_group(
        &self,
        stream: &str,
        group: &str,
        _start_id: &str,
    ) -> ConsumerResult<()> {
        let mut state = self.state.lock().unwrap();
        state.create_group_calls += 1;
        if state.fail_create_group {
            return Err(ConsumerError::broker("WRONGTYPE Operation against a key holding the wrong kind of value"));
        }
        state.streams.entry(stream.to_string()).or_default();
        state
            .groups
            .entry((stream.to_string(), group.to_string()))
            .or_default();
        Ok(())
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        _consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> ConsumerResult<Vec<Message>> {
        {
            let mut state = self.state.lock().unwrap();
            state.read_calls += 1;
            if state.failing_reads > 0 {
                state.failing_reads -= 1;
                return Err(ConsumerError::broker("Connection refused"));
            }
            let batch = Self::take(&mut state, stream, group, count)?;
            if !batch.is_empty() {
                return Ok(batch);
            }
        }

        let _ = tokio::time::timeout(Duration::from_millis(block_ms), self.notify.notified()).await;

        let mut state = self.state.lock().unwrap();
        Self::take(&mut state, stream, group, count)
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> ConsumerResult<u64> {
        let mut state = self.state.lock().unwrap();
        state.ack_calls.push(ids.to_vec());
        let mut acked = 0;
        if let Some(g) = state
            .groups
            .get_mut(&(stream.to_string(), group.to_string()))
        {
            for id in ids {
                if let Some(pos) = g.pending.iter().position(|p| p == id) {
                    g.pending.remove(pos);
                    acked += 1;
                }
            }
        }
        Ok(acked)
    }
}

/// Counters with TTL bookkeeping (expiry itself is not simulated)
#[derive(Default)]
pub(crate) struct MemoryCounterStore {
    counters: Mutex<HashMap<String, (u64, u64)>>,
    incr_calls: Mutex<usize>,
}

impl MemoryCounterStore {
    pub(crate) fn ttl_of(&self, key: &str) -> Option<u64> {
        self.counters.lock().unwrap().get(key).map(|(_, ttl)| *ttl)
    }

    pub(crate) fn incr_calls(&self) -> usize {
        *self.incr_calls.lock().unwrap()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.counters.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn incr_with_ttl(&self, keys: &[String], ttl_secs: u64) -> ConsumerResult<Vec<u64>> {
        *self.incr_calls.lock().unwrap() += 1;
        let mut counters = self.counters.lock().unwrap();
        Ok(keys
            .iter()
            .map(|key| {
                let entry = counters.entry(key.clone()).or_insert((0, ttl_secs));
                entry.0 += 1;
                entry.1 = ttl_secs;
                entry.0
            })
            .collect())
    }

    async fn get(&self, key: &str) -> ConsumerResult<u64> {
        Ok(self
            .counters
            .lock()
            .unwrap()
            .get(key)
            .map(|(count, _)| *count)
            .unwrap_or(0))
    }

    async fn delete(&self, keys: &[String]) -> ConsumerResult<()> {
        let mut counters = self.counters.lock().unwrap();
        for key in keys {
            counters.remove(key);
        }
        Ok(())
    }
}

/// Handler whose outcome per call is scripted; records every batch it sees
pub(crate) struct ScriptedHandler {
    script: Mutex<VecDeque<bool>>,
    default_ok: bool,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedHandler {
    pub(crate) fn succeeding() -> Self {
        Self::with(Vec::new(), true)
    }

    pub(crate) fn failing() -> Self {
        Self::with(Vec::new(), false)
    }

    /// `true` = succeed; once the script runs out every call succeeds
    pub(crate) fn script(outcomes: Vec<bool>) -> Self {
        Self::with(outcomes, true)
    }

    fn with(outcomes: Vec<bool>, default_ok: bool) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            default_ok,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BatchHandler for ScriptedHandler {
    async fn handle(&self, batch: &[Message]) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(batch.iter().map(|m| m.id.clone()).collect());
        let ok = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.default_ok);
        if ok {
            Ok(())
        } else {
            anyhow::bail!("insert into eventRecord failed: connection reset")
        }
    }
}
