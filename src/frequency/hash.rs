//! Structural content hashing for call inputs.
//!
//! The frequency detector keys its result cache on a hash of the input's
//! structure and (sampled) contents. Large collections are hashed from a
//! head/mid/tail sample plus their length, so the hash stays O(1)-ish for
//! arbitrarily large inputs at the cost of a small collision window.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde_json::Value;

/// Arrays longer than this are hashed from a head/mid/tail sample.
const ARRAY_SAMPLE_THRESHOLD: usize = 100;
/// Elements taken from each of the head, middle, and tail regions.
const ARRAY_SAMPLE_SPAN: usize = 8;
/// Objects with more keys than this are hashed from a sorted-key sample.
const OBJECT_SAMPLE_THRESHOLD: usize = 20;
const OBJECT_SAMPLE_KEYS: usize = 16;

/// Hash a whole input collection.
pub fn hash_input(input: &[Value]) -> u64 {
    let mut hasher = DefaultHasher::new();
    hash_slice(input, &mut hasher);
    hasher.finish()
}

fn hash_slice(values: &[Value], hasher: &mut DefaultHasher) {
    values.len().hash(hasher);
    if values.len() > ARRAY_SAMPLE_THRESHOLD {
        let mid = values.len() / 2;
        for v in &values[..ARRAY_SAMPLE_SPAN] {
            hash_value(v, hasher);
        }
        for v in &values[mid..mid + ARRAY_SAMPLE_SPAN] {
            hash_value(v, hasher);
        }
        for v in &values[values.len() - ARRAY_SAMPLE_SPAN..] {
            hash_value(v, hasher);
        }
    } else {
        for v in values {
            hash_value(v, hasher);
        }
    }
}

fn hash_value(value: &Value, hasher: &mut DefaultHasher) {
    match value {
        Value::Null => 0u8.hash(hasher),
        Value::Bool(b) => {
            1u8.hash(hasher);
            b.hash(hasher);
        }
        Value::Number(n) => {
            2u8.hash(hasher);
            if let Some(i) = n.as_i64() {
                i.hash(hasher);
            } else if let Some(u) = n.as_u64() {
                u.hash(hasher);
            } else if let Some(f) = n.as_f64() {
                f.to_bits().hash(hasher);
            }
        }
        Value::String(s) => {
            3u8.hash(hasher);
            s.hash(hasher);
        }
        Value::Array(items) => {
            4u8.hash(hasher);
            hash_slice(items, hasher);
        }
        Value::Object(map) => {
            5u8.hash(hasher);
            map.len().hash(hasher);
            if map.len() > OBJECT_SAMPLE_THRESHOLD {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort_unstable();
                for key in keys.into_iter().take(OBJECT_SAMPLE_KEYS) {
                    key.hash(hasher);
                    hash_value(&map[key], hasher);
                }
            } else {
                for (key, v) in map {
                    key.hash(hasher);
                    hash_value(v, hasher);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hash_is_deterministic() {
        let a = vec![json!(1), json!("x"), json!(true)];
        let b = vec![json!(1), json!("x"), json!(true)];
        assert_eq!(hash_input(&a), hash_input(&b));
    }

    #[test]
    fn test_value_changes_change_hash() {
        let a = vec![json!(1), json!(2)];
        let b = vec![json!(1), json!(3)];
        assert_ne!(hash_input(&a), hash_input(&b));
    }

    #[test]
    fn test_length_distinguishes_sampled_arrays() {
        // Same head/mid/tail but different length must hash differently.
        let a: Vec<_> = (0..200).map(|i| json!(i % 10)).collect();
        let b: Vec<_> = (0..210).map(|i| json!(i % 10)).collect();
        assert_ne!(hash_input(&a), hash_input(&b));
    }

    #[test]
    fn test_large_array_mid_change_detected() {
        let a: Vec<_> = (0..500).map(|i| json!(i)).collect();
        let mut b = a.clone();
        b[250] = json!(-1);
        assert_ne!(hash_input(&a), hash_input(&b));
    }

    #[test]
    fn test_large_object_sampled_by_sorted_keys() {
        let mut obj_a = serde_json::Map::new();
        let mut obj_b = serde_json::Map::new();
        for i in 0..40 {
            obj_a.insert(format!("k{i:02}"), json!(i));
            obj_b.insert(format!("k{i:02}"), json!(i));
        }
        // Change a key inside the sampled (sorted) window
        obj_b.insert("k03".to_string(), json!(999));
        let a = vec![Value::Object(obj_a)];
        let b = vec![Value::Object(obj_b)];
        assert_ne!(hash_input(&a), hash_input(&b));
    }

    #[test]
    fn test_null_vs_zero_distinct() {
        assert_ne!(hash_input(&[Value::Null]), hash_input(&[json!(0)]));
    }
}
