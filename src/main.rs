use anyhow::Result;
use clap::{Parser, Subcommand};
use rand::Rng;
use serde_json::{json, Value};
use std::sync::Arc;

use tiergate::{
    AcceleratedKernel, Accelerator, AcceleratorRegistry, AdaptiveConfig, EngineConfig,
    FrequencyConfig, HybridAccelerator, OperationKey,
};

#[derive(Parser)]
#[command(
    name = "tiergate",
    about = "Tiered acceleration decision engine demo",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive a demo operation across input sizes and print timing numbers
    Demo {
        /// Calls per input size
        #[arg(long, default_value = "5")]
        iterations: usize,

        /// Enable shadow execution (runs both paths to feed the learner)
        #[arg(long)]
        shadow: bool,

        /// Enable the result cache for the demo operation
        #[arg(long)]
        cache: bool,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Run a short canned workload and print the markdown report
    Report,
}

/// Chunked summation standing in for a real compiled kernel. The point of the
/// demo is the dispatch decisions, not the arithmetic.
struct ChunkedSumKernel;

impl AcceleratedKernel<[Value], Value> for ChunkedSumKernel {
    type Prepared = Vec<f64>;

    fn prepare(&self, input: &[Value]) -> Result<Vec<f64>> {
        Ok(input.iter().filter_map(|v| v.as_f64()).collect())
    }

    fn run(&self, prepared: Vec<f64>) -> Result<Value> {
        let sum: f64 = prepared.chunks(8).map(|c| c.iter().sum::<f64>()).sum();
        Ok(json!(sum))
    }

    fn finish(&self, output: Value) -> Result<Value> {
        Ok(output)
    }
}

fn sum_reference(input: &[Value]) -> Result<Value> {
    let mut sum = 0.0;
    for v in input {
        sum += v.as_f64().unwrap_or(0.0);
    }
    Ok(json!(sum))
}

fn demo_input(size: usize) -> Vec<Value> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| json!(rng.gen_range(0..1_000))).collect()
}

fn build_registry(shadow: bool, cache: bool) -> AcceleratorRegistry {
    let config = EngineConfig {
        shadow_execution: shadow,
        frequency: FrequencyConfig {
            cache_enabled: cache,
            ..Default::default()
        },
        adaptive: AdaptiveConfig {
            min_samples: 4,
            adaptation_frequency: 4,
            ..Default::default()
        },
        ..Default::default()
    };

    let registry = AcceleratorRegistry::new();
    registry.register(Arc::new(HybridAccelerator::with_config(
        OperationKey::new("demo", "list", "sum"),
        ChunkedSumKernel,
        sum_reference as fn(&[Value]) -> Result<Value>,
        config,
    )));
    registry
}

fn run_demo(registry: &AcceleratorRegistry, iterations: usize, json_output: bool) -> Result<()> {
    let key = OperationKey::new("demo", "list", "sum");
    let accelerator = registry
        .get(&key)
        .ok_or_else(|| anyhow::anyhow!("demo operation missing"))?;

    let sizes = [10usize, 100, 1_000, 10_000, 100_000];

    if !json_output {
        println!("\ntiergate demo: {} iterations per size", iterations);
        println!("{:<10} | {:<13} | {:<12} | Output", "Size", "Tier", "Time");
        println!("{:-<10}-|-{:-<13}-|-{:-<12}-|-{:-<20}", "", "", "", "");
    }

    for size in sizes {
        for _ in 0..iterations {
            let input = demo_input(size);
            let tier = accelerator.determine_tier(&input);
            let started = std::time::Instant::now();
            let output = accelerator.execute(&input)?;
            let elapsed = started.elapsed().as_secs_f64() * 1_000.0;
            if !json_output {
                println!("{:<10} | {:<13} | {:>9.3}ms | {}", size, tier.to_string(), elapsed, output);
            }
        }
    }

    if json_output {
        let summary = json!({
            "stats": accelerator.performance_stats(),
            "adaptive": accelerator.adaptive_threshold_stats(),
            "frequency": accelerator.frequency_detection_stats(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        let stats = accelerator.performance_stats();
        println!("\nTier usage:");
        for (name, tier) in [
            ("high-value", stats.high_value),
            ("conditional", stats.conditional),
            ("js-preferred", stats.js_preferred),
        ] {
            if tier.calls > 0 {
                println!(
                    "  {:<13}: {} calls, avg {:.3}ms, sizes {}..{}",
                    name, tier.calls, tier.avg_time_ms, tier.min_input_size, tier.max_input_size
                );
            }
        }
        println!("  fallbacks    : {}", stats.fallbacks);
        if stats.shadow_runs > 0 {
            println!(
                "  shadow runs  : {} (+{:.3}ms)",
                stats.shadow_runs, stats.shadow_overhead_ms
            );
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Demo {
            iterations,
            shadow,
            cache,
            json,
        } => {
            tracing::info!(iterations, shadow, cache, "Running tiering demo");
            let registry = build_registry(shadow, cache);
            run_demo(&registry, iterations, json)?;
        }
        Commands::Report => {
            let registry = build_registry(true, true);
            run_demo(&registry, 3, true)?;
            println!("{}", tiergate::report::format_report(&registry));
        }
    }

    Ok(())
}
