//! Process-wide accelerator lookup.
//!
//! The registry is an explicit value owned by the host application, injected
//! into call-sites; there is no hidden singleton. Keys are exact-match only.
//! Clearing a whole domain is an explicit enumeration (`clear_domain`), not a
//! wildcard key.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use serde_json::Value;
use tracing::info;

use crate::hybrid::Accelerator;
use crate::tier::{EngineError, OperationKey};

#[derive(Default)]
pub struct AcceleratorRegistry {
    entries: RwLock<HashMap<OperationKey, Arc<dyn Accelerator>>>,
}

impl AcceleratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, silently overwriting any previous registration for the key.
    pub fn register(&self, accelerator: Arc<dyn Accelerator>) {
        let key = accelerator.key().clone();
        info!(%key, "registering accelerator");
        self.entries
            .write()
            .expect("registry lock poisoned")
            .insert(key, accelerator);
    }

    pub fn get(&self, key: &OperationKey) -> Option<Arc<dyn Accelerator>> {
        self.entries
            .read()
            .expect("registry lock poisoned")
            .get(key)
            .cloned()
    }

    pub fn has(&self, key: &OperationKey) -> bool {
        self.entries
            .read()
            .expect("registry lock poisoned")
            .contains_key(key)
    }

    /// Exact-key removal. Returns whether anything was removed.
    pub fn unregister(&self, key: &OperationKey) -> bool {
        self.entries
            .write()
            .expect("registry lock poisoned")
            .remove(key)
            .is_some()
    }

    /// Remove every registration in one domain. Returns how many went.
    pub fn clear_domain(&self, domain: &str) -> usize {
        let mut entries = self.entries.write().expect("registry lock poisoned");
        let before = entries.len();
        entries.retain(|key, _| key.domain != domain);
        before - entries.len()
    }

    pub fn clear_all(&self) {
        self.entries
            .write()
            .expect("registry lock poisoned")
            .clear();
    }

    pub fn keys(&self) -> Vec<OperationKey> {
        let mut keys: Vec<OperationKey> = self
            .entries
            .read()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        keys.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Execute by key. A miss is a reported error, never a retry or a panic.
    pub fn execute(&self, key: &OperationKey, input: &[Value]) -> Result<Value> {
        let accelerator = self
            .get(key)
            .ok_or_else(|| EngineError::NotFound(key.clone()))?;
        accelerator.execute(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hybrid::{AcceleratedKernel, HybridAccelerator};
    use serde_json::json;

    struct SumKernel;

    impl AcceleratedKernel<[Value], Value> for SumKernel {
        type Prepared = Vec<f64>;

        fn prepare(&self, input: &[Value]) -> Result<Vec<f64>> {
            Ok(input.iter().filter_map(|v| v.as_f64()).collect())
        }

        fn run(&self, prepared: Vec<f64>) -> Result<Value> {
            Ok(json!(prepared.iter().sum::<f64>()))
        }

        fn finish(&self, output: Value) -> Result<Value> {
            Ok(output)
        }
    }

    fn sum_reference(input: &[Value]) -> Result<Value> {
        Ok(json!(input.iter().filter_map(|v| v.as_f64()).sum::<f64>()))
    }

    fn make(domain: &str, kind: &str, operation: &str) -> Arc<dyn Accelerator> {
        Arc::new(HybridAccelerator::new(
            OperationKey::new(domain, kind, operation),
            SumKernel,
            sum_reference as fn(&[Value]) -> Result<Value>,
        ))
    }

    #[test]
    fn test_register_get_has_unregister() {
        let registry = AcceleratorRegistry::new();
        let key = OperationKey::new("ds", "list", "sum");
        assert!(!registry.has(&key));

        registry.register(make("ds", "list", "sum"));
        assert!(registry.has(&key));
        assert!(registry.get(&key).is_some());

        assert!(registry.unregister(&key));
        assert!(!registry.unregister(&key));
        assert!(registry.get(&key).is_none());
    }

    #[test]
    fn test_register_overwrites_silently() {
        let registry = AcceleratorRegistry::new();
        registry.register(make("ds", "list", "sum"));
        registry.register(make("ds", "list", "sum"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_no_wildcard_matching() {
        let registry = AcceleratorRegistry::new();
        registry.register(make("ds", "list", "sum"));
        let wildcard = OperationKey::new("*", "*", "*");
        assert!(!registry.has(&wildcard));
        assert!(!registry.unregister(&wildcard));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_clear_domain() {
        let registry = AcceleratorRegistry::new();
        registry.register(make("ds", "list", "sum"));
        registry.register(make("ds", "matrix", "mul"));
        registry.register(make("nlp", "tokens", "count"));

        assert_eq!(registry.clear_domain("ds"), 2);
        assert_eq!(registry.len(), 1);
        assert!(registry.has(&OperationKey::new("nlp", "tokens", "count")));

        registry.clear_all();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_execute_by_key_and_miss() {
        let registry = AcceleratorRegistry::new();
        registry.register(make("ds", "list", "sum"));

        let out = registry
            .execute(
                &OperationKey::new("ds", "list", "sum"),
                &[json!(1), json!(2), json!(3)],
            )
            .unwrap();
        assert_eq!(out, json!(6.0));

        let err = registry
            .execute(&OperationKey::new("ds", "list", "nope"), &[json!(1)])
            .unwrap_err();
        assert!(err.to_string().contains("no accelerator registered"));
    }
}
