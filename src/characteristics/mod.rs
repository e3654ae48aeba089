//! Input characteristics analysis.
//!
//! `analyze` derives a classification (size bucket, element type, homogeneity,
//! sortedness, value range, density) from a bounded, evenly-strided sample of
//! the input. Every other component of the engine consumes this
//! classification; nothing here is persisted between calls.

pub mod enhanced;

use serde::Serialize;
use serde_json::Value;

/// Cap on how many elements the analyzer inspects per call. Inputs larger
/// than this are sampled with an even stride; only the sortedness scan walks
/// the full input.
pub const SAMPLE_CAP: usize = 1_000;

/// Largest magnitude that still counts as a "small" integer (fits in i32,
/// eligible for narrow SIMD lanes).
const SMALL_INT_MAX: i64 = i32::MAX as i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum SizeCategory {
    Empty,
    Tiny,   // < 10
    Small,  // < 100
    Medium, // < 1_000
    Large,  // < 100_000
    Huge,   // >= 100_000
}

impl SizeCategory {
    pub fn of(size: usize) -> Self {
        match size {
            0 => SizeCategory::Empty,
            1..=9 => SizeCategory::Tiny,
            10..=99 => SizeCategory::Small,
            100..=999 => SizeCategory::Medium,
            1_000..=99_999 => SizeCategory::Large,
            _ => SizeCategory::Huge,
        }
    }
}

/// Dominant element type over the sample. `Mixed` when elements disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DataType {
    Unknown,
    Number,
    String,
    Boolean,
    Object,
    Array,
    Mixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DensityCategory {
    Sparse,   // < 50% of sampled positions hold a value
    Moderate, // < 90%
    Dense,
}

/// `(max - min) / |mean|` of the sampled numeric values against fixed cutoffs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValueRange {
    Unknown,
    Narrow, // < 0.1
    Medium, // < 1.0
    Wide,
}

/// Per-call classification of one input collection.
#[derive(Debug, Clone, Serialize)]
pub struct Characteristics {
    pub size: usize,
    pub size_category: SizeCategory,
    pub data_type: DataType,
    pub homogeneous: bool,
    pub density: DensityCategory,
    pub value_range: ValueRange,
    pub integer_only: bool,
    pub small_integers_only: bool,
    pub is_sorted: bool,
    pub is_reverse_sorted: bool,
    /// NaN or an infinity was seen in the sample.
    pub has_special_values: bool,
}

impl Characteristics {
    /// Fixed classification for the empty input.
    pub fn trivial() -> Self {
        Self {
            size: 0,
            size_category: SizeCategory::Empty,
            data_type: DataType::Unknown,
            homogeneous: true,
            density: DensityCategory::Dense,
            value_range: ValueRange::Unknown,
            integer_only: false,
            small_integers_only: false,
            is_sorted: true,
            is_reverse_sorted: true,
            has_special_values: false,
        }
    }
}

fn type_of(value: &Value) -> DataType {
    match value {
        Value::Null => DataType::Unknown,
        Value::Bool(_) => DataType::Boolean,
        Value::Number(_) => DataType::Number,
        Value::String(_) => DataType::String,
        Value::Array(_) => DataType::Array,
        Value::Object(_) => DataType::Object,
    }
}

/// Classify one input collection. Pure; resamples on every call.
pub fn analyze(input: &[Value]) -> Characteristics {
    if input.is_empty() {
        return Characteristics::trivial();
    }

    let size = input.len();
    let stride = size.div_ceil(SAMPLE_CAP).max(1);

    let mut dominant: Option<DataType> = None;
    let mut homogeneous = true;
    let mut non_hole = 0usize;
    let mut sampled = 0usize;

    let mut numeric_min = f64::INFINITY;
    let mut numeric_max = f64::NEG_INFINITY;
    let mut numeric_sum = 0.0;
    let mut numeric_count = 0usize;

    let mut integer_only = true;
    let mut small_integers_only = true;
    let mut has_special_values = false;

    let mut idx = 0;
    while idx < size {
        let value = &input[idx];
        sampled += 1;

        if !value.is_null() {
            non_hole += 1;
            let ty = type_of(value);
            match dominant {
                None => dominant = Some(ty),
                Some(d) if d != ty => {
                    dominant = Some(DataType::Mixed);
                    homogeneous = false;
                }
                Some(_) => {}
            }
        }

        if let Some(n) = value.as_f64() {
            if n.is_nan() || n.is_infinite() {
                has_special_values = true;
            } else {
                numeric_min = numeric_min.min(n);
                numeric_max = numeric_max.max(n);
                numeric_sum += n;
                numeric_count += 1;
            }
            match value.as_i64() {
                Some(i) => {
                    // unsigned_abs: i64::MIN is a valid JSON number and must
                    // not overflow the magnitude check
                    if i.unsigned_abs() > SMALL_INT_MAX as u64 {
                        small_integers_only = false;
                    }
                }
                None => {
                    integer_only = false;
                    small_integers_only = false;
                }
            }
        } else if !value.is_null() {
            integer_only = false;
            small_integers_only = false;
        }

        idx += stride;
    }

    let data_type = dominant.unwrap_or(DataType::Unknown);
    if data_type != DataType::Number {
        integer_only = false;
        small_integers_only = false;
    }

    let density_frac = non_hole as f64 / sampled as f64;
    let density = if density_frac >= 0.9 {
        DensityCategory::Dense
    } else if density_frac >= 0.5 {
        DensityCategory::Moderate
    } else {
        DensityCategory::Sparse
    };

    let value_range = if numeric_count == 0 {
        ValueRange::Unknown
    } else {
        let mean = numeric_sum / numeric_count as f64;
        if mean.abs() < f64::EPSILON {
            ValueRange::Wide
        } else {
            let spread = (numeric_max - numeric_min) / mean.abs();
            if spread < 0.1 {
                ValueRange::Narrow
            } else if spread < 1.0 {
                ValueRange::Medium
            } else {
                ValueRange::Wide
            }
        }
    };

    // Sortedness is decided over the FULL input, not the sample, and only
    // for numeric collections.
    let (is_sorted, is_reverse_sorted) = if data_type == DataType::Number {
        sortedness(input)
    } else {
        (false, false)
    };

    Characteristics {
        size,
        size_category: SizeCategory::of(size),
        data_type,
        homogeneous,
        density,
        value_range,
        integer_only,
        small_integers_only,
        is_sorted,
        is_reverse_sorted,
        has_special_values,
    }
}

/// Full-input sortedness scan. Holes are skipped; NaN breaks both orders.
fn sortedness(input: &[Value]) -> (bool, bool) {
    let mut sorted = true;
    let mut reverse = true;
    let mut prev: Option<f64> = None;

    for value in input {
        if value.is_null() {
            continue;
        }
        let Some(n) = value.as_f64() else {
            return (false, false);
        };
        if n.is_nan() {
            return (false, false);
        }
        if let Some(p) = prev {
            if n < p {
                sorted = false;
            }
            if n > p {
                reverse = false;
            }
            if !sorted && !reverse {
                return (false, false);
            }
        }
        prev = Some(n);
    }

    (sorted, reverse)
}
