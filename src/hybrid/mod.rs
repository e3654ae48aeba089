//! Hybrid execution pipeline.
//!
//! Composes a three-stage accelerated pipeline (prepare -> run -> finish) with
//! a single-stage reference implementation, dispatches on the tier chosen by
//! the dispatcher, and falls back to the reference path when any accelerated
//! stage fails. The caller never observes an accelerated-stage failure.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::adaptive::{AdaptiveConfig, AdaptiveStats, AdaptiveThresholdManager};
use crate::dispatch::{BaseDispatcher, TieringStrategy};
use crate::frequency::{FrequencyConfig, FrequencyDetector, FrequencyStats};
use crate::tier::clock::{Clock, SystemClock};
use crate::tier::{OperationKey, StaticThresholds, Tier};

/// The always-available slow path.
pub trait ReferenceKernel<I: ?Sized, O>: Send + Sync {
    fn execute(&self, input: &I) -> Result<O>;
}

impl<I: ?Sized, O, F> ReferenceKernel<I, O> for F
where
    F: Fn(&I) -> Result<O> + Send + Sync,
{
    fn execute(&self, input: &I) -> Result<O> {
        self(input)
    }
}

/// The compiled fast path, split into the three stages the pipeline runs.
/// Any stage may fail; the hybrid boundary absorbs the failure.
pub trait AcceleratedKernel<I: ?Sized, O>: Send + Sync {
    /// Intermediate representation handed from `prepare` to `run`.
    type Prepared;

    /// Whether the backend capability is present at all.
    fn is_available(&self) -> bool {
        true
    }

    /// Marshal the input into kernel-ready form.
    fn prepare(&self, input: &I) -> Result<Self::Prepared>;

    /// Run the accelerated kernel.
    fn run(&self, prepared: Self::Prepared) -> Result<O>;

    /// Unmarshal the kernel output.
    fn finish(&self, output: O) -> Result<O>;
}

/// Static performance expectations for one accelerator.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceProfile {
    pub estimated_speedup: f64,
    /// Input size from which the estimate applies, when known.
    pub effective_input_size: Option<usize>,
    pub memory_overhead: Option<f64>,
}

impl Default for PerformanceProfile {
    fn default() -> Self {
        Self {
            estimated_speedup: 1.0,
            effective_input_size: None,
            memory_overhead: None,
        }
    }
}

/// Per-tier execution counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TierStats {
    pub calls: u64,
    /// Running weighted average execution time.
    pub avg_time_ms: f64,
    pub min_input_size: usize,
    pub max_input_size: usize,
    pub total_input_size: u64,
}

impl TierStats {
    fn record(&mut self, elapsed_ms: f64, input_size: usize) {
        if self.calls == 0 {
            self.min_input_size = input_size;
            self.max_input_size = input_size;
        } else {
            self.min_input_size = self.min_input_size.min(input_size);
            self.max_input_size = self.max_input_size.max(input_size);
        }
        self.calls += 1;
        self.total_input_size += input_size as u64;
        self.avg_time_ms += (elapsed_ms - self.avg_time_ms) / self.calls as f64;
    }

    pub fn mean_input_size(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.total_input_size as f64 / self.calls as f64
        }
    }
}

/// Read-only execution statistics for one accelerator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PerformanceStats {
    pub high_value: TierStats,
    pub conditional: TierStats,
    pub js_preferred: TierStats,
    /// Accelerated attempts that fell back to the reference path.
    pub fallbacks: u64,
    /// Cache hits that skipped execution entirely.
    pub cache_short_circuits: u64,
    /// Shadow-mode double executions and the extra time they cost.
    pub shadow_runs: u64,
    pub shadow_overhead_ms: f64,
}

impl PerformanceStats {
    fn tier_mut(&mut self, tier: Tier) -> &mut TierStats {
        match tier {
            Tier::HighValue => &mut self.high_value,
            Tier::Conditional => &mut self.conditional,
            Tier::JsPreferred => &mut self.js_preferred,
        }
    }

    pub fn tier(&self, tier: Tier) -> &TierStats {
        match tier {
            Tier::HighValue => &self.high_value,
            Tier::Conditional => &self.conditional,
            Tier::JsPreferred => &self.js_preferred,
        }
    }

    pub fn total_calls(&self) -> u64 {
        self.high_value.calls + self.conditional.calls + self.js_preferred.calls
    }
}

/// Everything configurable about one hybrid accelerator.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub static_thresholds: StaticThresholds,
    pub frequency: FrequencyConfig,
    pub adaptive: AdaptiveConfig,
    /// Run both paths back-to-back on accelerated calls to feed the adaptive
    /// manager. Doubles work per sampled call; off by default.
    pub shadow_execution: bool,
    pub profile: PerformanceProfile,
}

/// Object-safe execution surface stored in the registry.
pub trait Accelerator: Send + Sync {
    fn key(&self) -> &OperationKey;
    fn execute(&self, input: &[Value]) -> Result<Value>;
    fn is_available(&self) -> bool;
    fn determine_tier(&self, input: &[Value]) -> Tier;
    fn performance_profile(&self) -> PerformanceProfile;
    fn performance_stats(&self) -> PerformanceStats;
    fn adaptive_threshold_stats(&self) -> AdaptiveStats;
    fn frequency_detection_stats(&self) -> Option<FrequencyStats>;
}

/// Hybrid accelerator: reference path plus three-stage accelerated pipeline,
/// tier-dispatched per call.
pub struct HybridAccelerator<K, R>
where
    K: AcceleratedKernel<[Value], Value>,
    R: ReferenceKernel<[Value], Value>,
{
    key: OperationKey,
    kernel: K,
    reference: R,
    dispatcher: BaseDispatcher,
    frequency: Arc<FrequencyDetector>,
    adaptive: Arc<AdaptiveThresholdManager>,
    shadow_execution: bool,
    profile: PerformanceProfile,
    stats: Mutex<PerformanceStats>,
}

impl<K, R> HybridAccelerator<K, R>
where
    K: AcceleratedKernel<[Value], Value>,
    R: ReferenceKernel<[Value], Value>,
{
    pub fn new(key: OperationKey, kernel: K, reference: R) -> Self {
        Self::with_config(key, kernel, reference, EngineConfig::default())
    }

    pub fn with_config(key: OperationKey, kernel: K, reference: R, config: EngineConfig) -> Self {
        Self::with_clock(key, kernel, reference, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        key: OperationKey,
        kernel: K,
        reference: R,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let frequency = Arc::new(FrequencyDetector::with_clock(
            config.frequency,
            Arc::clone(&clock),
        ));
        let adaptive = Arc::new(AdaptiveThresholdManager::with_clock(
            config.adaptive,
            Arc::clone(&clock),
        ));
        let dispatcher = BaseDispatcher::new(
            key.clone(),
            config.static_thresholds,
            Arc::clone(&frequency),
            Arc::clone(&adaptive),
        );
        Self {
            key,
            kernel,
            reference,
            dispatcher,
            frequency,
            adaptive,
            shadow_execution: config.shadow_execution,
            profile: config.profile,
            stats: Mutex::new(PerformanceStats::default()),
        }
    }

    /// Install a caller-supplied tiering strategy.
    pub fn with_strategy(mut self, strategy: Box<dyn TieringStrategy>) -> Self {
        self.dispatcher.set_strategy(strategy);
        self
    }

    pub fn frequency(&self) -> &Arc<FrequencyDetector> {
        &self.frequency
    }

    pub fn adaptive(&self) -> &Arc<AdaptiveThresholdManager> {
        &self.adaptive
    }

    fn run_pipeline(&self, input: &[Value]) -> Result<Value> {
        if !self.kernel.is_available() {
            anyhow::bail!(crate::tier::EngineError::Unavailable(self.key.to_string()));
        }
        let prepared = self
            .kernel
            .prepare(input)
            .map_err(|e| stage_error("prepare", e))?;
        let raw = self.kernel.run(prepared).map_err(|e| stage_error("run", e))?;
        self.kernel.finish(raw).map_err(|e| stage_error("finish", e))
    }

    /// Run the other path after the fact to collect one adaptive sample.
    fn shadow_sample(&self, input: &[Value], tier: Tier, primary_ms: f64) {
        let started = Instant::now();
        let sample = match tier {
            // Primary was accelerated: shadow the reference path
            Tier::HighValue | Tier::Conditional => self
                .reference
                .execute(input)
                .ok()
                .map(|_| (elapsed_ms(started), primary_ms)),
            // Primary was the reference: shadow the accelerated path
            Tier::JsPreferred => self
                .run_pipeline(input)
                .ok()
                .map(|_| (primary_ms, elapsed_ms(started))),
        };
        let shadow_ms = elapsed_ms(started);

        let mut stats = self.stats.lock().expect("stats poisoned");
        stats.shadow_runs += 1;
        stats.shadow_overhead_ms += shadow_ms;
        drop(stats);

        if let Some((reference_ms, accelerated_ms)) = sample {
            self.adaptive
                .add_sample(input.len(), reference_ms, accelerated_ms);
        }
    }
}

fn stage_error(stage: &'static str, source: anyhow::Error) -> anyhow::Error {
    anyhow::Error::new(crate::tier::EngineError::StageFailed {
        stage,
        message: format!("{source:#}"),
    })
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1_000.0
}

impl<K, R> Accelerator for HybridAccelerator<K, R>
where
    K: AcceleratedKernel<[Value], Value>,
    R: ReferenceKernel<[Value], Value>,
{
    fn key(&self) -> &OperationKey {
        &self.key
    }

    fn execute(&self, input: &[Value]) -> Result<Value> {
        // A cache hit skips tiering and execution entirely
        if let Some(hit) = self.frequency.cached_result(&self.key, input) {
            debug!(key = %self.key, "result cache hit");
            let mut stats = self.stats.lock().expect("stats poisoned");
            stats.cache_short_circuits += 1;
            return Ok(hit);
        }

        let input_hash = self.frequency.record_call(&self.key, input);
        let tier = self.dispatcher.determine_tier(input);

        let started = Instant::now();
        let mut fell_back = false;
        let result = match tier {
            Tier::JsPreferred => self.reference.execute(input)?,
            Tier::Conditional | Tier::HighValue => match self.run_pipeline(input) {
                Ok(value) => value,
                Err(error) => {
                    warn!(
                        key = %self.key,
                        %tier,
                        error = %error,
                        "accelerated pipeline failed, re-running on reference path"
                    );
                    fell_back = true;
                    let mut stats = self.stats.lock().expect("stats poisoned");
                    stats.fallbacks += 1;
                    drop(stats);
                    self.reference.execute(input)?
                }
            },
        };
        let execution_ms = elapsed_ms(started);

        self.frequency
            .record_result(&self.key, input_hash, &result, execution_ms);
        {
            let mut stats = self.stats.lock().expect("stats poisoned");
            stats.tier_mut(tier).record(execution_ms, input.len());
        }

        // A fallback call timed the reference path, not the kernel, so its
        // timing would mislabel the adaptive sample.
        if self.shadow_execution && !fell_back {
            self.shadow_sample(input, tier, execution_ms);
        }

        Ok(result)
    }

    fn is_available(&self) -> bool {
        self.kernel.is_available()
    }

    fn determine_tier(&self, input: &[Value]) -> Tier {
        self.dispatcher.determine_tier(input)
    }

    fn performance_profile(&self) -> PerformanceProfile {
        let mut profile = self.profile.clone();
        // Prefer what the input actually looks like when we have seen one
        if profile.effective_input_size.is_none() {
            let (_, conditional) = self.adaptive.thresholds();
            profile.effective_input_size = Some(conditional);
        }
        profile
    }

    fn performance_stats(&self) -> PerformanceStats {
        self.stats.lock().expect("stats poisoned").clone()
    }

    fn adaptive_threshold_stats(&self) -> AdaptiveStats {
        self.adaptive.stats()
    }

    fn frequency_detection_stats(&self) -> Option<FrequencyStats> {
        self.frequency.stats(&self.key)
    }
}
