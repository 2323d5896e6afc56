//! Standalone benchmark runner that prints the formatted report.
//!
//! Configuration comes from `TVPBENCH_*` environment variables (a `.env` file
//! in the working directory is honoured):
//!
//!   TVPBENCH_CONNECTION=server=tcp:localhost,1433;user id=sa;password=...;TrustServerCertificate=true
//!   TVPBENCH_PARALLEL=1     # one thread and connection per case
//!
//! Usage:
//!   cargo run --release -p tvp-bench

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::process;
use tvp_bench::config::BenchConfig;
use tvp_bench::connection::SqlConnection;
use tvp_bench::fixture;
use tvp_bench::report::print_report;
use tvp_bench::runner::{collect_parallel, run_suite, run_suite_parallel};

fn main() {
    let config = match BenchConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e:#}");
            process::exit(1);
        }
    };

    if let Err(e) = tvp_core::initialize_logger(config.log_level, config.log_file.as_deref()) {
        eprintln!("Failed to initialize logger: {e:#}. Exiting.");
        process::exit(1);
    }

    if let Err(e) = run(&config) {
        log::error!("Benchmark aborted: {e:#}");
        process::exit(1);
    }
}

fn run(config: &BenchConfig) -> Result<()> {
    println!("Running SQL Server id-list parameter benchmark...");
    println!("  Data rows:            {}", config.data_row_count);
    println!("  Ids per parameter:    {}", config.parameter_row_count);
    println!("  Parameter sets:       {}", config.parameter_count);
    println!("  Ops per invocation:   {}", config.operations_per_invoke);
    println!(
        "  Warmup / samples:     {} / {}",
        config.warmup_invocations, config.sample_invocations
    );

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut conn =
        SqlConnection::connect(&config.connection_string).context("connect for setup")?;

    if config.parallel {
        // Workers open their own sessions; the setup session is done.
        let fixture = fixture::build(&mut conn, config, &mut rng);
        let fixture = conn.close_after(fixture)?;
        let (results, status) = collect_parallel(run_suite_parallel(&fixture, config));
        print_report(&results);
        status
    } else {
        let outcome =
            fixture::build(&mut conn, config, &mut rng).and_then(|f| run_suite(&mut conn, &f, config));
        let results = conn.close_after(outcome)?;
        print_report(&results);
        Ok(())
    }
}
