//! Runtime call-frequency detection and result caching.
//!
//! Tracks recent call timestamps and execution times per operation key,
//! derives a call frequency and average latency, and keeps a bounded FIFO
//! result cache keyed on a structural hash of the input. Tier decisions made
//! here are debounced for a short window to avoid recomputation storms on hot
//! call-sites.

pub mod hash;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::tier::clock::{Clock, SystemClock};
use crate::tier::{OperationKey, Tier};

pub use hash::hash_input;

/// Tuning knobs for the frequency detector.
#[derive(Debug, Clone, Serialize)]
pub struct FrequencyConfig {
    /// Sliding window over which frequency is computed.
    pub window_ms: u64,
    /// How long a tier decision is reused before recomputation.
    pub debounce_ms: u64,
    /// Capacity of the per-key recent-calls buffer (FIFO).
    pub buffer_capacity: usize,
    /// Result caching. Off by default: a cache hit skips execution entirely,
    /// so only referentially transparent operations may enable it.
    pub cache_enabled: bool,
    /// Capacity of the per-key result cache (FIFO, oldest-first eviction).
    pub cache_capacity: usize,
    /// Calls/second at or above which the call-site is high-value.
    pub high_frequency_threshold: f64,
    /// Calls/second at or above which the call-site is conditional.
    pub conditional_frequency_threshold: f64,
    /// Average execution time at or above which the call-site is high-value.
    pub high_latency_ms: f64,
    /// Average execution time at or above which the call-site is conditional.
    pub conditional_latency_ms: f64,
}

impl Default for FrequencyConfig {
    fn default() -> Self {
        Self {
            window_ms: 1_000,
            debounce_ms: 1_000,
            buffer_capacity: 100,
            cache_enabled: false,
            cache_capacity: 100,
            high_frequency_threshold: 10.0,
            conditional_frequency_threshold: 3.0,
            high_latency_ms: 10.0,
            conditional_latency_ms: 2.0,
        }
    }
}

/// One recorded call. Created on `record_call`, completed once by
/// `record_result`.
#[derive(Debug, Clone)]
struct CallRecord {
    at_ms: u64,
    input_hash: u64,
    execution_ms: Option<f64>,
}

#[derive(Debug, Default)]
struct OpState {
    records: VecDeque<CallRecord>,
    frequency: f64,
    avg_execution_ms: f64,
    completed_calls: u64,
    total_calls: u64,
    cache: VecDeque<(u64, Value)>,
    cache_hits: u64,
    cache_misses: u64,
    last_decision: Option<(Tier, u64)>,
}

/// Read-only view of one key's detection state.
#[derive(Debug, Clone, Serialize)]
pub struct FrequencyStats {
    pub total_calls: u64,
    pub completed_calls: u64,
    pub frequency: f64,
    pub avg_execution_ms: f64,
    pub buffered_records: usize,
    pub cache_entries: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub last_tier: Option<Tier>,
    /// Rough bytes held by the recent-calls buffer and result cache.
    pub approx_memory_bytes: usize,
}

pub struct FrequencyDetector {
    config: FrequencyConfig,
    clock: Arc<dyn Clock>,
    ops: RwLock<HashMap<OperationKey, Arc<Mutex<OpState>>>>,
}

impl FrequencyDetector {
    pub fn new(config: FrequencyConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: FrequencyConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            ops: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &FrequencyConfig {
        &self.config
    }

    /// Per-key state, created on first touch. Locking is per key: concurrent
    /// callers on different operations never contend.
    fn state(&self, key: &OperationKey) -> Arc<Mutex<OpState>> {
        if let Some(state) = self.ops.read().expect("ops lock poisoned").get(key) {
            return Arc::clone(state);
        }
        let mut ops = self.ops.write().expect("ops lock poisoned");
        Arc::clone(ops.entry(key.clone()).or_default())
    }

    /// Record an incoming call and return the input's structural hash.
    pub fn record_call(&self, key: &OperationKey, input: &[Value]) -> u64 {
        let input_hash = hash_input(input);
        let now = self.clock.now_ms();
        let state = self.state(key);
        let mut state = state.lock().expect("op state poisoned");

        if state.records.len() >= self.config.buffer_capacity {
            state.records.pop_front();
        }
        state.records.push_back(CallRecord {
            at_ms: now,
            input_hash,
            execution_ms: None,
        });
        state.total_calls += 1;

        let window_start = now.saturating_sub(self.config.window_ms);
        let in_window = state
            .records
            .iter()
            .filter(|r| r.at_ms >= window_start)
            .count();
        state.frequency = in_window as f64 * 1_000.0 / self.config.window_ms as f64;

        input_hash
    }

    /// Complete the matching pending call record and (optionally) cache the
    /// result.
    pub fn record_result(&self, key: &OperationKey, input_hash: u64, result: &Value, execution_ms: f64) {
        let state = self.state(key);
        let mut state = state.lock().expect("op state poisoned");

        let pending = state
            .records
            .iter_mut()
            .rev()
            .find(|r| r.input_hash == input_hash && r.execution_ms.is_none());
        let Some(record) = pending else {
            debug!(%key, input_hash, "no pending call record for result");
            return;
        };
        record.execution_ms = Some(execution_ms);

        state.completed_calls += 1;
        let n = state.completed_calls as f64;
        state.avg_execution_ms += (execution_ms - state.avg_execution_ms) / n;

        if self.config.cache_enabled {
            // Drop any stale entry for this hash first so a refresh never
            // costs an unrelated entry its slot
            state.cache.retain(|(h, _)| *h != input_hash);
            if state.cache.len() >= self.config.cache_capacity {
                state.cache.pop_front();
            }
            state.cache.push_back((input_hash, result.clone()));
        }
    }

    /// Cache lookup by recomputed input hash. A hit means the caller can skip
    /// execution entirely.
    pub fn cached_result(&self, key: &OperationKey, input: &[Value]) -> Option<Value> {
        if !self.config.cache_enabled {
            return None;
        }
        let input_hash = hash_input(input);
        let state = self.state(key);
        let mut state = state.lock().expect("op state poisoned");
        let hit = state
            .cache
            .iter()
            .find(|(h, _)| *h == input_hash)
            .map(|(_, v)| v.clone());
        match &hit {
            Some(_) => state.cache_hits += 1,
            None => state.cache_misses += 1,
        }
        hit
    }

    /// The debounced decision, if one was stored within the debounce window.
    pub fn fresh_decision(&self, key: &OperationKey) -> Option<Tier> {
        let state = self.state(key);
        let state = state.lock().expect("op state poisoned");
        let (tier, at_ms) = state.last_decision?;
        let now = self.clock.now_ms();
        (now.saturating_sub(at_ms) < self.config.debounce_ms).then_some(tier)
    }

    /// Store a decision for debounced reuse.
    pub fn store_decision(&self, key: &OperationKey, tier: Tier) {
        let state = self.state(key);
        let mut state = state.lock().expect("op state poisoned");
        state.last_decision = Some((tier, self.clock.now_ms()));
    }

    /// Classify the call-site from its observed frequency and latency alone.
    /// `JsPreferred` means "no load-based preference", not "reference wins".
    pub fn classify(&self, key: &OperationKey) -> Tier {
        let state = self.state(key);
        let state = state.lock().expect("op state poisoned");
        if state.frequency >= self.config.high_frequency_threshold
            || state.avg_execution_ms >= self.config.high_latency_ms
        {
            Tier::HighValue
        } else if state.frequency >= self.config.conditional_frequency_threshold
            || state.avg_execution_ms >= self.config.conditional_latency_ms
        {
            Tier::Conditional
        } else {
            Tier::JsPreferred
        }
    }

    /// Debounced tier decision: returns the stored decision while fresh,
    /// otherwise classifies and stores a new one.
    pub fn determine_tier(&self, key: &OperationKey) -> Tier {
        if let Some(tier) = self.fresh_decision(key) {
            return tier;
        }
        let tier = self.classify(key);
        self.store_decision(key, tier);
        tier
    }

    pub fn stats(&self, key: &OperationKey) -> Option<FrequencyStats> {
        let state = Arc::clone(self.ops.read().expect("ops lock poisoned").get(key)?);
        let state = state.lock().expect("op state poisoned");

        let cache_bytes: usize = state
            .cache
            .iter()
            .map(|(_, v)| approx_value_bytes(v))
            .sum();
        Some(FrequencyStats {
            total_calls: state.total_calls,
            completed_calls: state.completed_calls,
            frequency: state.frequency,
            avg_execution_ms: state.avg_execution_ms,
            buffered_records: state.records.len(),
            cache_entries: state.cache.len(),
            cache_hits: state.cache_hits,
            cache_misses: state.cache_misses,
            last_tier: state.last_decision.map(|(t, _)| t),
            approx_memory_bytes: state.records.len() * std::mem::size_of::<CallRecord>()
                + cache_bytes,
        })
    }

    pub fn keys(&self) -> Vec<OperationKey> {
        self.ops
            .read()
            .expect("ops lock poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

/// Rough in-memory footprint of a cached value.
fn approx_value_bytes(value: &Value) -> usize {
    match value {
        Value::Null | Value::Bool(_) => 8,
        Value::Number(_) => 16,
        Value::String(s) => 24 + s.len(),
        Value::Array(items) => 24 + items.iter().map(approx_value_bytes).sum::<usize>(),
        Value::Object(map) => {
            24 + map
                .iter()
                .map(|(k, v)| 24 + k.len() + approx_value_bytes(v))
                .sum::<usize>()
        }
    }
}
