//! Advisory layer on top of the base characteristics.
//!
//! Derives a recommended processing strategy from a fixed decision table plus
//! multiplicative estimates of expected speedup and memory overhead. This is
//! advisory input to tiering, never authoritative: the dispatcher may ignore
//! all of it.

use serde::Serialize;
use serde_json::Value;

use super::{analyze, Characteristics, DataType, SizeCategory};

/// Floor applied to the speedup estimate. Below this the accelerated path is
/// assumed to cost more than it saves.
const SPEEDUP_FLOOR: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProcessingStrategy {
    /// Stay on the reference implementation.
    Js,
    /// Compiled kernel, single lane.
    Wasm,
    /// Vectorized kernel.
    Simd,
    /// Multi-threaded kernel.
    Parallel,
    /// Split the input between reference and accelerated paths.
    Hybrid,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnhancedCharacteristics {
    pub base: Characteristics,
    pub recommended: ProcessingStrategy,
    /// Estimated speedup of the accelerated path over the reference path.
    pub estimated_speedup: f64,
    /// Estimated memory overhead multiplier (1.0 = no extra allocation).
    pub estimated_memory_overhead: f64,
}

/// Analyze an input and derive strategy advice in one pass.
pub fn analyze_enhanced(input: &[Value]) -> EnhancedCharacteristics {
    enhance(analyze(input))
}

/// Derive strategy advice from already-computed base characteristics.
pub fn enhance(base: Characteristics) -> EnhancedCharacteristics {
    let recommended = recommend(&base);
    let estimated_speedup = estimate_speedup(&base);
    let estimated_memory_overhead = estimate_memory_overhead(&base, recommended);
    EnhancedCharacteristics {
        base,
        recommended,
        estimated_speedup,
        estimated_memory_overhead,
    }
}

/// Fixed decision table keyed on size category and dominant data type.
fn recommend(c: &Characteristics) -> ProcessingStrategy {
    use DataType::*;
    use SizeCategory::*;

    match (c.size_category, c.data_type) {
        // Crossing into a compiled kernel never pays for trivial inputs.
        (Empty | Tiny, _) => ProcessingStrategy::Js,

        (Small, Number) => ProcessingStrategy::Wasm,
        (Small, _) => ProcessingStrategy::Js,

        (Medium, Number) if c.homogeneous => ProcessingStrategy::Simd,
        (Medium, Number) => ProcessingStrategy::Wasm,
        (Medium, String | Boolean) => ProcessingStrategy::Wasm,
        (Medium, _) => ProcessingStrategy::Js,

        (Large, Number) if c.homogeneous => ProcessingStrategy::Simd,
        (Large, Mixed | Object) => ProcessingStrategy::Hybrid,
        (Large, _) => ProcessingStrategy::Wasm,

        (Huge, Number) => ProcessingStrategy::Parallel,
        (Huge, Mixed | Object) => ProcessingStrategy::Hybrid,
        (Huge, _) => ProcessingStrategy::Parallel,
    }
}

/// Multiplicative speedup estimate: base factor per size bucket, scaled by
/// type, homogeneity, and sortedness, floored at `SPEEDUP_FLOOR`.
fn estimate_speedup(c: &Characteristics) -> f64 {
    let size_factor: f64 = match c.size_category {
        SizeCategory::Empty | SizeCategory::Tiny => 0.5,
        SizeCategory::Small => 1.0,
        SizeCategory::Medium => 2.0,
        SizeCategory::Large => 4.0,
        SizeCategory::Huge => 8.0,
    };

    let type_factor = match c.data_type {
        DataType::Number => {
            if c.small_integers_only {
                1.8
            } else {
                1.5
            }
        }
        DataType::Boolean => 1.2,
        DataType::String => 0.8,
        DataType::Array | DataType::Object => 0.6,
        DataType::Mixed | DataType::Unknown => 0.5,
    };

    let homogeneity_factor = if c.homogeneous { 1.2 } else { 0.7 };
    // Pre-sorted numeric input lets kernels skip defensive comparisons.
    let sorted_factor = if c.is_sorted || c.is_reverse_sorted {
        1.1
    } else {
        1.0
    };

    (size_factor * type_factor * homogeneity_factor * sorted_factor).max(SPEEDUP_FLOOR)
}

/// Memory overhead of moving the input into the kernel's address space.
fn estimate_memory_overhead(c: &Characteristics, strategy: ProcessingStrategy) -> f64 {
    let strategy_factor = match strategy {
        ProcessingStrategy::Js => 1.0,
        ProcessingStrategy::Simd => 1.2,
        ProcessingStrategy::Parallel => 1.5,
        ProcessingStrategy::Hybrid => 1.6,
        // Linear-memory copy in plus result copy out.
        ProcessingStrategy::Wasm => 2.0,
    };

    // Small integers pack tighter than boxed values.
    let packing = if c.small_integers_only { 0.8 } else { 1.0 };

    strategy_factor * packing
}
