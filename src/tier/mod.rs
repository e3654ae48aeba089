//! Core vocabulary for the tiering engine: operation keys, execution tiers,
//! and the shared error taxonomy.

pub mod clock;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifies one accelerated call-site: (domain, kind, operation).
///
/// Example: `("ds", "list", "map")` for the list-map operation of the
/// data-structures domain. Keys are exact-match only; there is no wildcard
/// or prefix matching anywhere in the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationKey {
    pub domain: String,
    pub kind: String,
    pub operation: String,
}

impl OperationKey {
    pub fn new(domain: &str, kind: &str, operation: &str) -> Self {
        Self {
            domain: domain.to_string(),
            kind: kind.to_string(),
            operation: operation.to_string(),
        }
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.domain, self.kind, self.operation)
    }
}

/// Execution tier chosen for one call.
///
/// Ordered by how strongly the accelerated path is preferred:
/// `JsPreferred < Conditional < HighValue`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Tier {
    /// The reference implementation wins (small input, cold call-site).
    JsPreferred,
    /// The accelerated path probably wins; worth the pipeline overhead.
    Conditional,
    /// The accelerated path clearly wins (hot call-site or large input).
    HighValue,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::JsPreferred => "js-preferred",
            Tier::Conditional => "conditional",
            Tier::HighValue => "high-value",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error taxonomy for the engine.
///
/// Nothing here is fatal: stage failures are absorbed at the hybrid boundary
/// and a registry miss is a reported condition, not a crash.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A required backend capability is absent. Callers should check
    /// `is_available()` before relying on the accelerated path.
    #[error("accelerator unavailable: {0}")]
    Unavailable(String),

    /// One of the prepare/run/finish stages failed. Always caught at the
    /// hybrid boundary and converted into a reference re-run.
    #[error("accelerated stage '{stage}' failed: {message}")]
    StageFailed {
        stage: &'static str,
        message: String,
    },

    /// Lookup of an unregistered key. Managers executing by key must surface
    /// this to the user rather than retry.
    #[error("no accelerator registered for {0}")]
    NotFound(OperationKey),
}

/// Static input-size thresholds used when neither the frequency detector nor
/// the adaptive manager has anything better to say.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StaticThresholds {
    /// Input size at or above which the accelerated path clearly wins.
    pub high_value: usize,
    /// Input size at or above which the accelerated path is worth trying.
    pub conditional: usize,
}

impl StaticThresholds {
    /// Build a threshold pair, clamping `conditional` to at most half of
    /// `high_value`.
    pub fn new(high_value: usize, conditional: usize) -> Self {
        Self {
            high_value,
            conditional: conditional.min(high_value / 2),
        }
    }

    /// Size-only classification. Monotone in input size.
    pub fn classify(&self, size: usize) -> Tier {
        if size >= self.high_value {
            Tier::HighValue
        } else if size >= self.conditional {
            Tier::Conditional
        } else {
            Tier::JsPreferred
        }
    }
}

impl Default for StaticThresholds {
    fn default() -> Self {
        Self::new(10_000, 1_000)
    }
}
