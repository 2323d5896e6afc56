//! Report module: per-case latency statistics and the printed comparison.

use crate::strategy::Strategy;
use std::time::Duration;

/// Samples collected for one strategy.
#[derive(Debug, Clone)]
pub struct CaseResult {
    pub strategy: Strategy,
    pub operations_per_invoke: usize,
    /// Wall time of each measured invocation (all operations together).
    pub invocation_durations: Vec<Duration>,
    /// Rows materialized by the last measured invocation.
    pub rows_last_invocation: usize,
}

impl CaseResult {
    pub fn new(strategy: Strategy, operations_per_invoke: usize) -> Self {
        Self {
            strategy,
            operations_per_invoke,
            invocation_durations: Vec::new(),
            rows_last_invocation: 0,
        }
    }

    pub fn add_sample(&mut self, elapsed: Duration, rows: usize) {
        self.invocation_durations.push(elapsed);
        self.rows_last_invocation = rows;
    }

    pub fn sample_count(&self) -> usize {
        self.invocation_durations.len()
    }

    /// Per-operation latency of every sample, in microseconds.
    fn per_op_us(&self) -> Vec<f64> {
        let ops = self.operations_per_invoke.max(1) as f64;
        self.invocation_durations
            .iter()
            .map(|d| d.as_secs_f64() * 1e6 / ops)
            .collect()
    }

    /// Mean per-operation latency in microseconds.
    pub fn mean_us(&self) -> f64 {
        let samples = self.per_op_us();
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f64>() / samples.len() as f64
    }

    /// Nearest-rank percentile of per-operation latency in microseconds.
    pub fn percentile_us(&self, pct: f64) -> f64 {
        let mut sorted = self.per_op_us();
        if sorted.is_empty() {
            return 0.0;
        }
        sorted.sort_by(f64::total_cmp);
        let idx = ((pct / 100.0) * (sorted.len() - 1) as f64).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    pub fn ops_per_sec(&self) -> f64 {
        let mean = self.mean_us();
        if mean <= 0.0 {
            return 0.0;
        }
        1_000_000.0 / mean
    }

    /// Mean latency as a multiple of `baseline`'s mean (1.0 = same speed).
    pub fn relative_to(&self, baseline: &CaseResult) -> f64 {
        let base = baseline.mean_us();
        if base <= 0.0 {
            return 0.0;
        }
        self.mean_us() / base
    }
}

/// Print a formatted report comparing all cases.
pub fn print_report(results: &[CaseResult]) {
    println!("\n{}", "=".repeat(80));
    println!("  SQL Server id-list parameter benchmark");
    println!("{}", "=".repeat(80));

    for result in results {
        println!("\n  Case: {}", result.strategy);
        println!("  {}", "-".repeat(60));
        println!("  Invocations:     {:>10}", result.sample_count());
        println!("  Ops/invocation:  {:>10}", result.operations_per_invoke);
        println!("  Rows (last):     {:>10}", result.rows_last_invocation);
        println!("  Mean op:         {:>10.1}µs", result.mean_us());
        println!("  p50:             {:>10.1}µs", result.percentile_us(50.0));
        println!("  p95:             {:>10.1}µs", result.percentile_us(95.0));
        println!("  p99:             {:>10.1}µs", result.percentile_us(99.0));
        println!("  Throughput:      {:>10.1} ops/s", result.ops_per_sec());
    }

    println!("\n{}", "=".repeat(80));

    if results.len() >= 2 {
        let baseline = results
            .iter()
            .find(|r| r.strategy == Strategy::StringSplit)
            .unwrap_or(&results[0]);

        println!("\n  Comparison Summary (baseline: {}):", baseline.strategy);
        println!(
            "  {:20} {:>12} {:>12} {:>12} {:>8}",
            "Case", "Mean (µs)", "p95 (µs)", "Ops/s", "vs base"
        );
        println!("  {}", "-".repeat(68));
        for r in results {
            println!(
                "  {:20} {:>12.1} {:>12.1} {:>12.1} {:>7.2}x",
                r.strategy.name(),
                r.mean_us(),
                r.percentile_us(95.0),
                r.ops_per_sec(),
                r.relative_to(baseline)
            );
        }
    }

    println!();
}
