//! Adaptive threshold learning.
//!
//! Accumulates (input size, reference time, accelerated time) samples per
//! call-site and periodically recomputes the input-size thresholds at which
//! the accelerated path should be preferred, via crossover-point
//! interpolation. Deliberately simple: piecewise-linear crossover rather than
//! regression, assuming speedup grows roughly monotonically with input size.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::debug;

use crate::tier::clock::{Clock, SystemClock};
use crate::tier::Tier;

/// Tuning knobs for the adaptive manager.
#[derive(Debug, Clone, Serialize)]
pub struct AdaptiveConfig {
    /// Sample ring-buffer capacity (oldest-first eviction once full).
    pub capacity: usize,
    /// Samples older than this are purged before every re-fit.
    pub max_sample_age_ms: u64,
    /// Minimum samples before adaptation is trusted.
    pub min_samples: usize,
    /// Re-fit every N recorded samples.
    pub adaptation_frequency: usize,
    /// Fractional inflation applied to a freshly computed threshold.
    pub safety_margin: f64,
    /// Target speedup ratio for the high-value threshold.
    pub high_value_speedup: f64,
    /// Target speedup ratio for the conditional threshold.
    pub conditional_speedup: f64,
    /// Threshold pair used before any re-fit has happened.
    pub initial_high_value: usize,
    pub initial_conditional: usize,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            max_sample_age_ms: 300_000,
            min_samples: 10,
            adaptation_frequency: 10,
            safety_margin: 0.2,
            high_value_speedup: 2.0,
            conditional_speedup: 1.2,
            initial_high_value: 10_000,
            initial_conditional: 1_000,
        }
    }
}

/// One instrumented observation of both paths on the same input.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PerfSample {
    pub input_size: usize,
    pub reference_ms: f64,
    pub accelerated_ms: f64,
    pub recorded_at_ms: u64,
}

impl PerfSample {
    fn speedup(&self) -> f64 {
        if self.accelerated_ms <= 0.0 {
            f64::INFINITY
        } else {
            self.reference_ms / self.accelerated_ms
        }
    }
}

#[derive(Debug)]
struct AdaptiveState {
    samples: VecDeque<PerfSample>,
    high_value_threshold: usize,
    conditional_threshold: usize,
    samples_since_fit: usize,
    total_samples: u64,
    refit_count: u64,
}

/// Read-only view of the manager's state.
#[derive(Debug, Clone, Serialize)]
pub struct AdaptiveStats {
    pub sample_count: usize,
    pub total_samples: u64,
    pub refit_count: u64,
    pub high_value_threshold: usize,
    pub conditional_threshold: usize,
    pub trusted: bool,
}

pub struct AdaptiveThresholdManager {
    config: AdaptiveConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<AdaptiveState>,
}

impl AdaptiveThresholdManager {
    pub fn new(config: AdaptiveConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: AdaptiveConfig, clock: Arc<dyn Clock>) -> Self {
        let state = AdaptiveState {
            samples: VecDeque::with_capacity(config.capacity),
            high_value_threshold: config.initial_high_value,
            conditional_threshold: config
                .initial_conditional
                .min(config.initial_high_value / 2),
            samples_since_fit: 0,
            total_samples: 0,
            refit_count: 0,
        };
        Self {
            config,
            clock,
            state: Mutex::new(state),
        }
    }

    pub fn config(&self) -> &AdaptiveConfig {
        &self.config
    }

    /// Record one instrumented sample. Every `adaptation_frequency`-th call
    /// triggers a re-fit.
    pub fn add_sample(&self, input_size: usize, reference_ms: f64, accelerated_ms: f64) {
        let now = self.clock.now_ms();
        let mut state = self.state.lock().expect("adaptive state poisoned");

        if state.samples.len() >= self.config.capacity {
            state.samples.pop_front();
        }
        state.samples.push_back(PerfSample {
            input_size,
            reference_ms,
            accelerated_ms,
            recorded_at_ms: now,
        });
        state.total_samples += 1;
        state.samples_since_fit += 1;

        if state.samples_since_fit >= self.config.adaptation_frequency {
            state.samples_since_fit = 0;
            self.refit(&mut state, now);
        }
    }

    /// Force a re-fit regardless of the adaptation counter.
    pub fn refit_now(&self) {
        let now = self.clock.now_ms();
        let mut state = self.state.lock().expect("adaptive state poisoned");
        self.refit(&mut state, now);
    }

    fn refit(&self, state: &mut AdaptiveState, now_ms: u64) {
        let min_age = now_ms.saturating_sub(self.config.max_sample_age_ms);
        state.samples.retain(|s| s.recorded_at_ms >= min_age);

        if state.samples.len() < self.config.min_samples.max(2) {
            return;
        }

        let mut sorted: Vec<PerfSample> = state.samples.iter().copied().collect();
        sorted.sort_by_key(|s| s.input_size);

        let margin = 1.0 + self.config.safety_margin;
        if let Some(crossover) = crossover_size(&sorted, self.config.high_value_speedup) {
            state.high_value_threshold = inflate(crossover, margin);
        }
        if let Some(crossover) = crossover_size(&sorted, self.config.conditional_speedup) {
            state.conditional_threshold = inflate(crossover, margin);
        }
        // Invariant: conditional stays at or below half of high-value
        state.conditional_threshold = state
            .conditional_threshold
            .min(state.high_value_threshold / 2);
        state.refit_count += 1;

        debug!(
            high_value = state.high_value_threshold,
            conditional = state.conditional_threshold,
            samples = state.samples.len(),
            "adaptive thresholds re-fit"
        );
    }

    /// Size-only classification against the live thresholds.
    pub fn determine_tier(&self, input_size: usize) -> Tier {
        let state = self.state.lock().expect("adaptive state poisoned");
        if input_size >= state.high_value_threshold {
            Tier::HighValue
        } else if input_size >= state.conditional_threshold {
            Tier::Conditional
        } else {
            Tier::JsPreferred
        }
    }

    /// Whether enough samples have been seen for the thresholds to be trusted
    /// over the static defaults.
    pub fn trusted(&self) -> bool {
        let state = self.state.lock().expect("adaptive state poisoned");
        state.refit_count > 0 && state.total_samples >= self.config.min_samples as u64
    }

    pub fn thresholds(&self) -> (usize, usize) {
        let state = self.state.lock().expect("adaptive state poisoned");
        (state.high_value_threshold, state.conditional_threshold)
    }

    pub fn stats(&self) -> AdaptiveStats {
        let state = self.state.lock().expect("adaptive state poisoned");
        AdaptiveStats {
            sample_count: state.samples.len(),
            total_samples: state.total_samples,
            refit_count: state.refit_count,
            high_value_threshold: state.high_value_threshold,
            conditional_threshold: state.conditional_threshold,
            trusted: state.refit_count > 0
                && state.total_samples >= self.config.min_samples as u64,
        }
    }
}

fn inflate(size: usize, margin: f64) -> usize {
    ((size as f64) * margin).round() as usize
}

/// Find the input size at which measured speedup first crosses `target` from
/// below, by linear interpolation over consecutive size-sorted samples.
///
/// Already-above-target at the smallest size -> that smallest size. Never
/// above target -> `None` (caller keeps the previous threshold).
fn crossover_size(sorted: &[PerfSample], target: f64) -> Option<usize> {
    let first = sorted.first()?;
    if first.speedup() >= target {
        return Some(first.input_size);
    }

    for pair in sorted.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let (sa, sb) = (a.speedup(), b.speedup());
        if sa < target && sb >= target {
            if sb.is_infinite() || (sb - sa).abs() < f64::EPSILON || a.input_size == b.input_size {
                return Some(b.input_size);
            }
            let t = (target - sa) / (sb - sa);
            let size =
                a.input_size as f64 + t * (b.input_size as f64 - a.input_size as f64);
            return Some(size.round() as usize);
        }
    }

    None
}
