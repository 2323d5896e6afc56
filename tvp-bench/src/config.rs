//! Benchmark configuration.
//!
//! Defaults match the reference run (1000 rows, 3 ids per parameter set, 100
//! parameter sets, 1000 operations per measured invocation). Every field can
//! be overridden through a `TVPBENCH_*` environment variable.

use anyhow::{bail, ensure, Context, Result};
use log::LevelFilter;
use std::env;
use std::str::FromStr;

const DEFAULT_CONNECTION: &str = "server=tcp:localhost,1433;database=master;user id=sa;\
     password=yourStrong(!)Password;TrustServerCertificate=true";
const DEFAULT_DATABASE: &str = "TvpBench";
const DEFAULT_MOD_DIR: &str = "/var/opt/mssql/data";

/// Queries per measured invocation unless overridden.
pub const OPERATIONS_PER_INVOKE: usize = 1000;

pub const ENV_CONNECTION: &str = "TVPBENCH_CONNECTION";
const ENV_DATABASE: &str = "TVPBENCH_DATABASE";
const ENV_MOD_DIR: &str = "TVPBENCH_MOD_DIR";
const ENV_DATA_ROWS: &str = "TVPBENCH_DATA_ROWS";
const ENV_PARAMETER_ROWS: &str = "TVPBENCH_PARAMETER_ROWS";
const ENV_PARAMETER_COUNT: &str = "TVPBENCH_PARAMETER_COUNT";
const ENV_OPS_PER_INVOKE: &str = "TVPBENCH_OPS_PER_INVOKE";
const ENV_WARMUP: &str = "TVPBENCH_WARMUP";
const ENV_SAMPLES: &str = "TVPBENCH_SAMPLES";
const ENV_PARALLEL: &str = "TVPBENCH_PARALLEL";
const ENV_SEED: &str = "TVPBENCH_SEED";
const ENV_LOG: &str = "TVPBENCH_LOG";
const ENV_LOG_FILE: &str = "TVPBENCH_LOG_FILE";

/// Everything a benchmark session needs to know up front.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// ADO-style connection string for the server (any database; the scratch
    /// database is created from there).
    pub connection_string: String,
    /// Name of the scratch database. Dropped and recreated on every run.
    pub database_name: String,
    /// Server-side directory holding the memory-optimized container.
    pub memory_optimized_dir: String,
    /// Rows seeded into `TestData`.
    pub data_row_count: usize,
    /// Distinct ids per parameter set.
    pub parameter_row_count: usize,
    /// Parameter sets generated into each buffer.
    pub parameter_count: usize,
    /// Queries executed per measured invocation.
    pub operations_per_invoke: usize,
    pub warmup_invocations: usize,
    pub sample_invocations: usize,
    /// Run each case on its own thread and connection.
    pub parallel: bool,
    /// Fixed RNG seed; `None` seeds from entropy.
    pub seed: Option<u64>,
    pub log_level: LevelFilter,
    pub log_file: Option<String>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            connection_string: DEFAULT_CONNECTION.to_string(),
            database_name: DEFAULT_DATABASE.to_string(),
            memory_optimized_dir: DEFAULT_MOD_DIR.to_string(),
            data_row_count: 1000,
            parameter_row_count: 3,
            parameter_count: 100,
            operations_per_invoke: OPERATIONS_PER_INVOKE,
            warmup_invocations: 1,
            sample_invocations: 10,
            parallel: false,
            seed: None,
            log_level: LevelFilter::Info,
            log_file: None,
        }
    }
}

impl BenchConfig {
    /// Reads the process environment (after loading `.env`, if present).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup, starting from defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = non_empty(lookup(ENV_CONNECTION)) {
            config.connection_string = v;
        }
        if let Some(v) = non_empty(lookup(ENV_DATABASE)) {
            config.database_name = v;
        }
        if let Some(v) = non_empty(lookup(ENV_MOD_DIR)) {
            config.memory_optimized_dir = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_DATA_ROWS)? {
            config.data_row_count = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_PARAMETER_ROWS)? {
            config.parameter_row_count = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_PARAMETER_COUNT)? {
            config.parameter_count = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_OPS_PER_INVOKE)? {
            config.operations_per_invoke = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_WARMUP)? {
            config.warmup_invocations = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_SAMPLES)? {
            config.sample_invocations = v;
        }
        if let Some(v) = non_empty(lookup(ENV_PARALLEL)) {
            config.parallel = parse_flag(&v).with_context(|| format!("invalid {ENV_PARALLEL}"))?;
        }
        if let Some(v) = parse_var(&lookup, ENV_SEED)? {
            config.seed = Some(v);
        }
        if let Some(v) = parse_var(&lookup, ENV_LOG)? {
            config.log_level = v;
        }
        config.log_file = non_empty(lookup(ENV_LOG_FILE));

        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the fixture builder could not satisfy.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.data_row_count > 0, "data row count must be > 0");
        ensure!(self.parameter_row_count > 0, "parameter row count must be > 0");
        ensure!(self.parameter_count > 0, "parameter count must be > 0");
        ensure!(
            self.operations_per_invoke > 0,
            "operations per invoke must be > 0"
        );
        ensure!(self.sample_invocations > 0, "sample invocations must be > 0");
        // Ids are drawn from [0, data_row_count]; asking for more distinct ids
        // than that range holds would never terminate.
        ensure!(
            self.parameter_row_count <= self.data_row_count + 1,
            "parameter row count {} exceeds the {} distinct ids available",
            self.parameter_row_count,
            self.data_row_count + 1
        );
        ensure!(
            is_plain_identifier(&self.database_name),
            "database name {:?} must be a plain identifier",
            self.database_name
        );
        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup(key)) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid {key}={raw:?}: {e}")),
    }
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got {other:?}"),
    }
}

/// Letters, digits and underscores, starting with a letter. The name is
/// spliced into DDL, so nothing else is accepted.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_') && name.len() <= 128
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = BenchConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.data_row_count, 1000);
        assert_eq!(config.parameter_row_count, 3);
        assert_eq!(config.parameter_count, 100);
        assert_eq!(config.operations_per_invoke, 1000);
        assert_eq!(config.database_name, "TvpBench");
        assert!(!config.parallel);
        assert_eq!(config.seed, None);
        assert_eq!(config.log_level, LevelFilter::Info);
    }

    #[test]
    fn overrides_are_applied() {
        let config = BenchConfig::from_lookup(lookup_from(&[
            (ENV_DATA_ROWS, "50"),
            (ENV_PARAMETER_ROWS, "5"),
            (ENV_PARAMETER_COUNT, "7"),
            (ENV_OPS_PER_INVOKE, "20"),
            (ENV_PARALLEL, "yes"),
            (ENV_SEED, "42"),
            (ENV_LOG, "debug"),
            (ENV_DATABASE, "Scratch_1"),
        ]))
        .unwrap();
        assert_eq!(config.data_row_count, 50);
        assert_eq!(config.parameter_row_count, 5);
        assert_eq!(config.parameter_count, 7);
        assert_eq!(config.operations_per_invoke, 20);
        assert!(config.parallel);
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.log_level, LevelFilter::Debug);
        assert_eq!(config.database_name, "Scratch_1");
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config =
            BenchConfig::from_lookup(lookup_from(&[(ENV_DATA_ROWS, "  "), (ENV_LOG_FILE, "")]))
                .unwrap();
        assert_eq!(config.data_row_count, 1000);
        assert_eq!(config.log_file, None);
    }

    #[test]
    fn unparseable_number_is_an_error() {
        let err = BenchConfig::from_lookup(lookup_from(&[(ENV_DATA_ROWS, "lots")])).unwrap_err();
        assert!(err.to_string().contains(ENV_DATA_ROWS));
    }

    #[test]
    fn unparseable_flag_is_an_error() {
        assert!(BenchConfig::from_lookup(lookup_from(&[(ENV_PARALLEL, "maybe")])).is_err());
    }

    #[test]
    fn too_many_ids_per_set_is_rejected() {
        let config = BenchConfig {
            data_row_count: 2,
            parameter_row_count: 4,
            ..BenchConfig::default()
        };
        assert!(config.validate().is_err());

        // [0, 2] holds exactly three ids.
        let config = BenchConfig {
            data_row_count: 2,
            parameter_row_count: 3,
            ..BenchConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_counts_are_rejected() {
        for config in [
            BenchConfig {
                data_row_count: 0,
                ..BenchConfig::default()
            },
            BenchConfig {
                parameter_count: 0,
                ..BenchConfig::default()
            },
            BenchConfig {
                operations_per_invoke: 0,
                ..BenchConfig::default()
            },
            BenchConfig {
                parameter_row_count: 0,
                ..BenchConfig::default()
            },
            BenchConfig {
                sample_invocations: 0,
                ..BenchConfig::default()
            },
        ] {
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn database_name_must_be_plain() {
        assert!(is_plain_identifier("TvpBench"));
        assert!(is_plain_identifier("a_1"));
        assert!(!is_plain_identifier(""));
        assert!(!is_plain_identifier("1abc"));
        assert!(!is_plain_identifier("x]; DROP DATABASE y; --"));
        assert!(!is_plain_identifier("has space"));
    }
}
