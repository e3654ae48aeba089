//! tiergate -- tiered acceleration decision engine.
//!
//! Decides, per call-site and per input, whether an operation should run
//! through a slow-but-always-available reference implementation or through a
//! compiled accelerated backend, and learns over time where that crossover
//! point lies. The engine is synchronous: tier determination, cache lookups,
//! and dispatch all happen inline on the caller's thread.

pub mod adaptive;
pub mod characteristics;
pub mod dispatch;
pub mod frequency;
pub mod hybrid;
pub mod registry;
pub mod report;
pub mod tier;

pub use adaptive::{AdaptiveConfig, AdaptiveStats, AdaptiveThresholdManager};
pub use characteristics::enhanced::{EnhancedCharacteristics, ProcessingStrategy};
pub use characteristics::{analyze, Characteristics};
pub use dispatch::{BaseDispatcher, CharacteristicsStrategy, TieringStrategy};
pub use frequency::{FrequencyConfig, FrequencyDetector, FrequencyStats};
pub use hybrid::{
    AcceleratedKernel, Accelerator, EngineConfig, HybridAccelerator, PerformanceProfile,
    PerformanceStats, ReferenceKernel,
};
pub use registry::AcceleratorRegistry;
pub use tier::{EngineError, OperationKey, StaticThresholds, Tier};
