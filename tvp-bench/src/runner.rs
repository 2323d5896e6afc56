//! Benchmark case runner.
//!
//! A [`BenchCase`] owns everything one strategy needs between operations: its
//! prepared SQL text and its own [`ParameterPool`]. Cases never share pools,
//! so running them one after another or on separate threads gives each the
//! same sequence of parameter values.

use crate::config::BenchConfig;
use crate::connection::SqlConnection;
use crate::fixture::{Fixture, ParameterPool};
use crate::report::CaseResult;
use crate::strategy::{self, Strategy};
use anyhow::{ensure, Context, Result};
use std::thread;
use std::time::{Duration, Instant};

/// One strategy, ready to execute against a connection in the scratch database.
#[derive(Debug, Clone)]
pub struct BenchCase {
    strategy: Strategy,
    sql: String,
    pool: ParameterPool,
}

/// Outcome of one measured invocation.
#[derive(Debug, Clone, Copy)]
pub struct Invocation {
    pub elapsed: Duration,
    pub operations: usize,
    pub rows: usize,
}

impl BenchCase {
    /// Prepares `strategy` over a fresh pool from `fixture`. Every set must
    /// hold exactly `parameter_row_count` ids, since the table-valued SQL binds
    /// that many parameters.
    pub fn new(strategy: Strategy, fixture: &Fixture, parameter_row_count: usize) -> Result<Self> {
        ensure!(
            !fixture.parameter_sets.is_empty(),
            "{strategy}: fixture has no parameter sets"
        );
        if let Some(set) = fixture
            .parameter_sets
            .iter()
            .find(|set| set.len() != parameter_row_count)
        {
            anyhow::bail!(
                "{strategy}: parameter set has {} ids, expected {parameter_row_count}",
                set.len()
            );
        }
        Ok(Self::with_pool(strategy, fixture.pool(), parameter_row_count))
    }

    fn with_pool(strategy: Strategy, pool: ParameterPool, parameter_row_count: usize) -> Self {
        Self {
            strategy,
            sql: strategy.sql(parameter_row_count),
            pool,
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn pool(&self) -> &ParameterPool {
        &self.pool
    }

    /// Pulls the next parameter value, runs the query, and returns every
    /// matching id.
    pub fn fetch_ids(&mut self, conn: &mut SqlConnection) -> Result<Vec<i64>> {
        let query = strategy::next_query(self.strategy, &self.sql, &mut self.pool);
        conn.query_ids(query)
    }

    /// One measured operation: [`fetch_ids`](Self::fetch_ids), keeping only
    /// the row count.
    pub fn run_once(&mut self, conn: &mut SqlConnection) -> Result<usize> {
        Ok(self.fetch_ids(conn)?.len())
    }

    /// Runs `operations` back-to-back and times them as one invocation.
    pub fn invoke(&mut self, conn: &mut SqlConnection, operations: usize) -> Result<Invocation> {
        let mut rows = 0;
        let start = Instant::now();
        for op in 0..operations {
            rows += self
                .run_once(conn)
                .with_context(|| format!("{} operation {op}", self.strategy))?;
        }
        Ok(Invocation {
            elapsed: start.elapsed(),
            operations,
            rows,
        })
    }
}

/// Warms `case` up, then records `config.sample_invocations` invocations.
pub fn run_case(
    conn: &mut SqlConnection,
    case: &mut BenchCase,
    config: &BenchConfig,
) -> Result<CaseResult> {
    let ops = config.operations_per_invoke;

    for _ in 0..config.warmup_invocations {
        case.invoke(conn, ops)?;
    }

    let mut result = CaseResult::new(case.strategy(), ops);
    for _ in 0..config.sample_invocations {
        let invocation = case.invoke(conn, ops)?;
        result.add_sample(invocation.elapsed, invocation.rows);
    }

    Ok(result)
}

/// Runs every strategy on `conn`, one after another. The first failing case
/// aborts the suite.
pub fn run_suite(
    conn: &mut SqlConnection,
    fixture: &Fixture,
    config: &BenchConfig,
) -> Result<Vec<CaseResult>> {
    let mut results = Vec::with_capacity(Strategy::ALL.len());
    for strategy in Strategy::ALL {
        println!("  Benchmarking {strategy}...");
        let mut case = BenchCase::new(strategy, fixture, config.parameter_row_count)?;
        let result = run_case(conn, &mut case, config)
            .with_context(|| format!("benchmark case {strategy}"))?;
        println!(
            "  {strategy} done ({:.1}µs mean per operation)",
            result.mean_us()
        );
        results.push(result);
    }
    Ok(results)
}

/// Runs every strategy on its own thread with its own connection and pool.
/// A failing case does not stop the others; its error is returned in place
/// of its result.
pub fn run_suite_parallel(
    fixture: &Fixture,
    config: &BenchConfig,
) -> Vec<(Strategy, Result<CaseResult>)> {
    thread::scope(|scope| {
        let handles: Vec<_> = Strategy::ALL
            .into_iter()
            .map(|strategy| {
                let handle = scope.spawn(move || run_isolated_case(strategy, fixture, config));
                (strategy, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(strategy, handle)| {
                let outcome = handle
                    .join()
                    .unwrap_or_else(|_| Err(anyhow::anyhow!("case thread panicked")));
                (strategy, outcome)
            })
            .collect()
    })
}

fn run_isolated_case(
    strategy: Strategy,
    fixture: &Fixture,
    config: &BenchConfig,
) -> Result<CaseResult> {
    log::info!("Starting {strategy} on its own connection");
    let mut conn = SqlConnection::connect_to(&config.connection_string, &config.database_name)
        .with_context(|| format!("open connection for {strategy}"))?;
    let outcome = BenchCase::new(strategy, fixture, config.parameter_row_count).and_then(|mut case| {
        run_case(&mut conn, &mut case, config)
            .with_context(|| format!("benchmark case {strategy}"))
    });
    let result = conn.close_after(outcome)?;
    println!(
        "  {strategy} done ({:.1}µs mean per operation)",
        result.mean_us()
    );
    Ok(result)
}

/// Splits parallel outcomes into the finished results and an overall status.
/// Failures are logged, and the status names every failed case so the caller
/// can still report the ones that finished.
pub fn collect_parallel(
    outcomes: Vec<(Strategy, Result<CaseResult>)>,
) -> (Vec<CaseResult>, Result<()>) {
    let mut results = Vec::new();
    let mut failed = Vec::new();
    for (strategy, outcome) in outcomes {
        match outcome {
            Ok(result) => results.push(result),
            Err(e) => {
                log::error!("{strategy} failed: {e:#}");
                failed.push(strategy.name());
            }
        }
    }

    let status = if failed.is_empty() {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "{} case(s) failed: {}",
            failed.len(),
            failed.join(", ")
        ))
    };
    (results, status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::ParameterSet;
    use crate::schema::TableType;

    fn fixture() -> Fixture {
        Fixture {
            parameter_sets: vec![ParameterSet::new([1, 2, 3]), ParameterSet::new([4, 5, 6])],
            seeded_rows: 10,
        }
    }

    #[test]
    fn case_prepares_sql_for_its_strategy() {
        let case =
            BenchCase::new(Strategy::TableValued(TableType::MemoryOpt), &fixture(), 3).unwrap();
        assert!(case.sql().contains("[dbo].[MemoryOptUDT]"));
        assert!(case.sql().contains("(@P3)"));
        assert_eq!(case.strategy().name(), "MemoryOptUDT");
    }

    #[test]
    fn cases_get_independent_pools() {
        let fixture = fixture();
        let mut a = BenchCase::new(Strategy::StringSplit, &fixture, 3).unwrap();
        let b = BenchCase::new(Strategy::TableValued(TableType::Simple), &fixture, 3).unwrap();
        a.pool.delimited.peek();
        assert_eq!(a.pool().delimited.cursor(), 1);
        assert_eq!(b.pool().delimited.cursor(), 0);
    }

    #[test]
    fn case_rejects_sets_of_the_wrong_size() {
        let fixture = Fixture {
            parameter_sets: vec![ParameterSet::new([1, 2, 3]), ParameterSet::new([4, 5])],
            seeded_rows: 10,
        };
        let err = BenchCase::new(Strategy::TableValued(TableType::Simple), &fixture, 3)
            .unwrap_err()
            .to_string();
        assert!(err.contains("has 2 ids, expected 3"), "{err}");

        assert!(BenchCase::new(Strategy::StringSplit, &self::fixture(), 4).is_err());
    }

    #[test]
    fn case_rejects_empty_fixture() {
        let fixture = Fixture {
            parameter_sets: Vec::new(),
            seeded_rows: 0,
        };
        assert!(BenchCase::new(Strategy::StringSplit, &fixture, 3).is_err());
    }

    #[test]
    fn collect_parallel_keeps_finished_cases() {
        let simple = Strategy::TableValued(TableType::Simple);
        let hash = Strategy::TableValued(TableType::MemoryOptHash);
        let mut split = CaseResult::new(Strategy::StringSplit, 10);
        split.add_sample(Duration::from_millis(5), 3);

        let outcomes = vec![
            (Strategy::StringSplit, Ok(split)),
            (simple, Err(anyhow::anyhow!("timeout"))),
            (hash, Ok(CaseResult::new(hash, 10))),
        ];
        let (results, status) = collect_parallel(outcomes);

        let names: Vec<&str> = results.iter().map(|r| r.strategy.name()).collect();
        assert_eq!(names, ["StringSplit", "MemoryOptHashUDT"]);
        assert_eq!(results[0].sample_count(), 1);
        let err = status.unwrap_err().to_string();
        assert_eq!(err, "1 case(s) failed: SimpleUDT");
    }

    #[test]
    fn collect_parallel_succeeds_when_every_case_finished() {
        let outcomes = Strategy::ALL
            .into_iter()
            .map(|strategy| (strategy, Ok(CaseResult::new(strategy, 1))))
            .collect();
        let (results, status) = collect_parallel(outcomes);
        assert_eq!(results.len(), 5);
        assert!(status.is_ok());
    }
}
