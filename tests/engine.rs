//! End-to-end scenarios for the tiering engine.

use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Value};

use tiergate::tier::clock::{Clock, ManualClock};
use tiergate::{
    AcceleratedKernel, Accelerator, AcceleratorRegistry, AdaptiveConfig,
    AdaptiveThresholdManager, EngineConfig, FrequencyConfig, FrequencyDetector,
    HybridAccelerator, OperationKey, Tier,
};

struct MapKernel;

impl AcceleratedKernel<[Value], Value> for MapKernel {
    type Prepared = Vec<f64>;

    fn prepare(&self, input: &[Value]) -> Result<Vec<f64>> {
        Ok(input.iter().filter_map(|v| v.as_f64()).collect())
    }

    fn run(&self, prepared: Vec<f64>) -> Result<Value> {
        Ok(Value::Array(
            prepared.into_iter().map(|n| json!(n + 1.0)).collect(),
        ))
    }

    fn finish(&self, output: Value) -> Result<Value> {
        Ok(output)
    }
}

fn map_reference(input: &[Value]) -> Result<Value> {
    Ok(Value::Array(
        input
            .iter()
            .filter_map(|v| v.as_f64())
            .map(|n| json!(n + 1.0))
            .collect(),
    ))
}

fn input_of(size: usize) -> Vec<Value> {
    (0..size).map(|i| json!(i as f64)).collect()
}

/// Register ("ds","list","map"), call it 3x within 1s on a 20-element input
/// with a high-value frequency threshold of 2: the 4th call's tier is
/// HighValue.
#[test]
fn test_hot_call_site_promotes_to_high_value() {
    let clock = Arc::new(ManualClock::new(0));
    let key = OperationKey::new("ds", "list", "map");
    let detector = FrequencyDetector::with_clock(
        FrequencyConfig {
            high_frequency_threshold: 2.0,
            ..Default::default()
        },
        Arc::clone(&clock) as Arc<dyn Clock>,
    );

    let input = input_of(20);
    for _ in 0..3 {
        detector.record_call(&key, &input);
        clock.advance(200);
    }
    assert_eq!(detector.determine_tier(&key), Tier::HighValue);
}

/// Feed the learner (100, 10ms ref, 20ms accel) and (1000, 10ms ref, 4ms
/// accel) with target speedup 2.0: the high-value threshold lands strictly
/// between 100 and 1000 before the safety margin.
#[test]
fn test_crossover_learning_between_observed_sizes() {
    let config = AdaptiveConfig {
        min_samples: 2,
        adaptation_frequency: 2,
        high_value_speedup: 2.0,
        safety_margin: 0.2,
        ..Default::default()
    };
    let manager = AdaptiveThresholdManager::new(config);
    manager.add_sample(100, 10.0, 20.0);
    manager.add_sample(1_000, 10.0, 4.0);

    let (high, cond) = manager.thresholds();
    let uninflated = (high as f64 / 1.2).round() as usize;
    assert!(
        uninflated > 100 && uninflated < 1_000,
        "crossover {} not interpolated",
        uninflated
    );
    assert!(cond <= high / 2);
}

/// A kernel whose run stage always traps still produces the reference answer
/// through the full registry path, and the miss of an unregistered key is a
/// reported error.
#[test]
fn test_registry_execution_with_fallback() {
    struct TrapKernel;

    impl AcceleratedKernel<[Value], Value> for TrapKernel {
        type Prepared = ();

        fn prepare(&self, _input: &[Value]) -> Result<()> {
            Ok(())
        }

        fn run(&self, _prepared: ()) -> Result<Value> {
            anyhow::bail!("trap")
        }

        fn finish(&self, output: Value) -> Result<Value> {
            Ok(output)
        }
    }

    let registry = AcceleratorRegistry::new();
    let key = OperationKey::new("ds", "list", "map");
    registry.register(Arc::new(HybridAccelerator::new(
        key.clone(),
        TrapKernel,
        map_reference as fn(&[Value]) -> Result<Value>,
    )));

    let input = input_of(50_000);
    let out = registry.execute(&key, &input).unwrap();
    assert_eq!(out, map_reference(&input).unwrap());

    let stats = registry.get(&key).unwrap().performance_stats();
    assert_eq!(stats.fallbacks, 1);
    assert_eq!(stats.high_value.calls, 1);

    let err = registry
        .execute(&OperationKey::new("ds", "list", "missing"), &input)
        .unwrap_err();
    assert!(err.to_string().contains("ds.list.missing"));
}

/// Shadow execution learns real thresholds from an artificial gap between the
/// two paths, and the learned thresholds then drive tiering.
#[test]
fn test_shadow_execution_learns_and_redirects() {
    let clock = Arc::new(ManualClock::new(0));
    let key = OperationKey::new("demo", "list", "map");
    let config = EngineConfig {
        shadow_execution: true,
        adaptive: AdaptiveConfig {
            min_samples: 2,
            adaptation_frequency: 2,
            ..Default::default()
        },
        ..Default::default()
    };
    let acc = HybridAccelerator::with_clock(
        key,
        MapKernel,
        map_reference as fn(&[Value]) -> Result<Value>,
        config,
        Arc::clone(&clock) as Arc<dyn Clock>,
    );

    for size in [100, 2_000, 30_000, 60_000] {
        acc.execute(&input_of(size)).unwrap();
        clock.advance(2_000); // step past the decision debounce
    }

    let stats = acc.performance_stats();
    assert_eq!(stats.shadow_runs, 4);
    assert!(acc.adaptive_threshold_stats().total_samples >= 4);
}

/// The cache round-trips results through the whole execute path and the
/// report reflects the hit.
#[test]
fn test_cached_execution_and_report() {
    let registry = AcceleratorRegistry::new();
    let key = OperationKey::new("ds", "list", "map");
    let config = EngineConfig {
        frequency: FrequencyConfig {
            cache_enabled: true,
            ..Default::default()
        },
        ..Default::default()
    };
    registry.register(Arc::new(HybridAccelerator::with_config(
        key.clone(),
        MapKernel,
        map_reference as fn(&[Value]) -> Result<Value>,
        config,
    )));

    let input = input_of(32);
    let first = registry.execute(&key, &input).unwrap();
    let second = registry.execute(&key, &input).unwrap();
    assert_eq!(first, second);

    let report = tiergate::report::format_report(&registry);
    assert!(report.contains("## ds.list.map"));
    assert!(report.contains("hit rate"));
}
