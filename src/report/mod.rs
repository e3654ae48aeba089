//! Human-readable engine report.
//!
//! Free-form markdown summarizing, per registered operation, cache hit rate,
//! tier usage, learned thresholds, and a rough memory estimate. No format
//! stability is promised; this is for eyeballs, not parsers.

use crate::registry::AcceleratorRegistry;
use crate::tier::Tier;

/// Render the whole registry as a markdown report.
pub fn format_report(registry: &AcceleratorRegistry) -> String {
    let mut out = String::new();
    out.push_str("# Acceleration engine report\n\n");
    out.push_str(&format!(
        "Generated: {}\n\n",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    ));

    let keys = registry.keys();
    if keys.is_empty() {
        out.push_str("No accelerators registered.\n");
        return out;
    }

    let mut total_calls = 0u64;
    let mut total_fallbacks = 0u64;
    let mut total_memory = 0usize;

    for key in &keys {
        let Some(accelerator) = registry.get(key) else {
            continue;
        };
        let stats = accelerator.performance_stats();
        let adaptive = accelerator.adaptive_threshold_stats();

        out.push_str(&format!("## {}\n\n", key));
        out.push_str(&format!(
            "- available: {}\n",
            if accelerator.is_available() { "yes" } else { "no" }
        ));

        out.push_str("- tier usage: ");
        let mut parts = Vec::new();
        for tier in [Tier::HighValue, Tier::Conditional, Tier::JsPreferred] {
            let t = stats.tier(tier);
            if t.calls > 0 {
                parts.push(format!(
                    "{} x{} (avg {:.2}ms, sizes {}..{})",
                    tier, t.calls, t.avg_time_ms, t.min_input_size, t.max_input_size
                ));
            }
        }
        if parts.is_empty() {
            out.push_str("none yet\n");
        } else {
            out.push_str(&parts.join(", "));
            out.push('\n');
        }

        out.push_str(&format!("- fallbacks to reference: {}\n", stats.fallbacks));
        if stats.shadow_runs > 0 {
            out.push_str(&format!(
                "- shadow executions: {} ({:.2}ms extra)\n",
                stats.shadow_runs, stats.shadow_overhead_ms
            ));
        }
        out.push_str(&format!(
            "- adaptive thresholds: high-value {} / conditional {} ({}, {} samples, {} re-fits)\n",
            adaptive.high_value_threshold,
            adaptive.conditional_threshold,
            if adaptive.trusted { "trusted" } else { "warming up" },
            adaptive.total_samples,
            adaptive.refit_count,
        ));

        if let Some(freq) = accelerator.frequency_detection_stats() {
            let lookups = freq.cache_hits + freq.cache_misses;
            if lookups > 0 {
                out.push_str(&format!(
                    "- cache: {} entries, hit rate {:.1}% ({} hits / {} lookups)\n",
                    freq.cache_entries,
                    100.0 * freq.cache_hits as f64 / lookups as f64,
                    freq.cache_hits,
                    lookups,
                ));
            } else {
                out.push_str(&format!("- cache: {} entries, no lookups\n", freq.cache_entries));
            }
            out.push_str(&format!(
                "- call pattern: {:.2} calls/s, avg {:.2}ms over {} calls\n",
                freq.frequency, freq.avg_execution_ms, freq.total_calls
            ));
            out.push_str(&format!(
                "- memory estimate: {}\n",
                format_bytes(freq.approx_memory_bytes)
            ));
            total_memory += freq.approx_memory_bytes;
        }
        out.push('\n');

        total_calls += stats.total_calls();
        total_fallbacks += stats.fallbacks;
    }

    out.push_str("## Totals\n\n");
    out.push_str(&format!("- operations: {}\n", keys.len()));
    out.push_str(&format!("- calls: {}\n", total_calls));
    out.push_str(&format!("- fallbacks: {}\n", total_fallbacks));
    out.push_str(&format!("- memory estimate: {}\n", format_bytes(total_memory)));
    out
}

fn format_bytes(bytes: usize) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.2} MiB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}
