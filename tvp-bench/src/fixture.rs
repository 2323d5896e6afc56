//! Fixture builder: provisions the scratch database, seeds `TestData`, and
//! prepares the parameter pool the measured loops draw from.
//!
//! Content is random (names, sampled ids) unless a seed is configured; the
//! shape is always the same for a given [`BenchConfig`].

use crate::config::BenchConfig;
use crate::connection::SqlConnection;
use crate::schema::{self, NAME_MAX_LEN, TEST_DATA_TABLE};
use crate::strategy::ID_DELIMITER;
use anyhow::{Context, Result};
use fake::faker::name::en::{FirstName, LastName};
use fake::Fake;
use rand::Rng;
use std::collections::HashSet;
use tiberius::Query;
use tvp_core::RecyclingBuffer;

/// Rows per seeding `INSERT`. One parameter per row, so each statement stays
/// under the engine's 2100-parameter limit.
const SEED_CHUNK_ROWS: usize = 500;

/// An ordered set of distinct `TestData` ids passed to one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSet {
    ids: Vec<i64>,
}

impl ParameterSet {
    /// Builds a set from ids, dropping repeats but keeping first-seen order.
    pub fn new<I: IntoIterator<Item = i64>>(ids: I) -> Self {
        let mut seen = HashSet::new();
        let ids = ids.into_iter().filter(|id| seen.insert(*id)).collect();
        Self { ids }
    }

    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// The flattened form consumed by `STRING_SPLIT`, e.g. `"4;17;802"`.
    pub fn to_delimited(&self) -> String {
        let mut out = String::with_capacity(self.ids.len() * 5);
        for (i, id) in self.ids.iter().enumerate() {
            if i > 0 {
                out.push(ID_DELIMITER);
            }
            out.push_str(&id.to_string());
        }
        out
    }

    /// Parses the flattened form back into a set.
    pub fn from_delimited(value: &str) -> Result<Self> {
        let ids = value
            .split(ID_DELIMITER)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.trim()
                    .parse::<i64>()
                    .with_context(|| format!("invalid id {part:?}"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(ids))
    }
}

/// Draws `parameter_count` sets of `parameter_row_count` distinct ids each.
///
/// Ids are sampled uniformly from `[0, data_row_count]` and redrawn until the
/// set reaches its size. The range is inclusive on both ends while seeded ids
/// run `1..=data_row_count`, so a set may name id 0, which never matches.
///
/// The caller guarantees `parameter_row_count <= data_row_count + 1`
/// (see [`BenchConfig::validate`]).
pub fn generate_parameter_sets<R: Rng + ?Sized>(
    rng: &mut R,
    data_row_count: usize,
    parameter_row_count: usize,
    parameter_count: usize,
) -> Vec<ParameterSet> {
    let upper = data_row_count as i64;
    let mut seen = HashSet::with_capacity(parameter_row_count);
    let mut sets = Vec::with_capacity(parameter_count);

    for _ in 0..parameter_count {
        let mut ids = Vec::with_capacity(parameter_row_count);
        while ids.len() < parameter_row_count {
            let id = rng.gen_range(0..=upper);
            if seen.insert(id) {
                ids.push(id);
            }
        }
        seen.clear();
        sets.push(ParameterSet { ids });
    }

    sets
}

/// Generates `count` plausible "First Last" names, capped at the column width.
pub fn generate_names<R: Rng + ?Sized>(rng: &mut R, count: usize) -> Vec<String> {
    (0..count)
        .map(|_| {
            let first: String = FirstName().fake_with_rng(rng);
            let last: String = LastName().fake_with_rng(rng);
            let name = format!("{first} {last}");
            if name.chars().count() > NAME_MAX_LEN {
                name.chars().take(NAME_MAX_LEN).collect()
            } else {
                name
            }
        })
        .collect()
}

/// Both representations of every parameter set, index-aligned: the value at
/// cursor `i` of `structured` and of `delimited` name the same ids.
#[derive(Debug, Clone)]
pub struct ParameterPool {
    pub structured: RecyclingBuffer<ParameterSet>,
    pub delimited: RecyclingBuffer<String>,
}

impl ParameterPool {
    /// # Panics
    ///
    /// Panics if `sets` is empty.
    pub fn from_sets(sets: &[ParameterSet]) -> Self {
        let delimited = sets.iter().map(ParameterSet::to_delimited).collect();
        Self {
            structured: RecyclingBuffer::new(sets.to_vec()),
            delimited: RecyclingBuffer::new(delimited),
        }
    }

    pub fn len(&self) -> usize {
        self.structured.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structured.is_empty()
    }
}

/// What setup produced: the sets behind the pool and the seeded row count.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub parameter_sets: Vec<ParameterSet>,
    pub seeded_rows: u64,
}

impl Fixture {
    /// A fresh pool over this fixture's sets, cursors at the start.
    pub fn pool(&self) -> ParameterPool {
        ParameterPool::from_sets(&self.parameter_sets)
    }
}

/// Drops and recreates the scratch database, then creates the table types
/// and `TestData`. Leaves `conn` in the scratch database.
pub fn provision_database(conn: &mut SqlConnection, config: &BenchConfig) -> Result<()> {
    let recreate =
        schema::recreate_database_batch(&config.database_name, &config.memory_optimized_dir);
    log::debug!("Recreating database:\n{recreate}");
    conn.execute_batch(&recreate)
        .with_context(|| format!("recreate database {}", config.database_name))?;

    let ddl = schema::create_schema_batch(&config.database_name);
    log::debug!("Creating schema:\n{ddl}");
    conn.execute_batch(&ddl).context("create table types and TestData")?;
    Ok(())
}

/// Inserts one `TestData` row per name, in chunks. Returns rows inserted.
pub fn seed_test_data(conn: &mut SqlConnection, names: &[String]) -> Result<u64> {
    let mut inserted = 0u64;
    for (chunk_index, chunk) in names.chunks(SEED_CHUNK_ROWS).enumerate() {
        let sql = seed_insert_sql(chunk.len());
        let mut query = Query::new(sql);
        for name in chunk {
            query.bind(name.as_str());
        }
        let rows = conn
            .execute(query)
            .with_context(|| format!("insert TestData chunk {chunk_index}"))?;
        log::debug!("Seeded chunk {chunk_index}: {rows} rows");
        inserted += rows;
    }
    Ok(inserted)
}

/// Number of rows currently in `TestData`.
pub fn count_test_data(conn: &mut SqlConnection) -> Result<i64> {
    conn.query_scalar(Query::new(format!(
        "SELECT COUNT_BIG(*) FROM {TEST_DATA_TABLE};"
    )))
}

fn seed_insert_sql(rows: usize) -> String {
    let values: Vec<String> = (1..=rows).map(|i| format!("(@P{i})")).collect();
    format!(
        "INSERT INTO {TEST_DATA_TABLE} (Name) VALUES {};",
        values.join(",")
    )
}

/// Runs the whole setup phase against `conn`. Any failure is fatal to the
/// session; nothing is retried.
pub fn build<R: Rng + ?Sized>(
    conn: &mut SqlConnection,
    config: &BenchConfig,
    rng: &mut R,
) -> Result<Fixture> {
    println!("Prepare database...");
    provision_database(conn, config)?;
    println!("Prepare database completed");

    println!("Prepare data...");
    let names = generate_names(rng, config.data_row_count);
    let seeded_rows = seed_test_data(conn, &names)?;
    log::info!("Seeded {seeded_rows} rows into {TEST_DATA_TABLE}");

    let parameter_sets = generate_parameter_sets(
        rng,
        config.data_row_count,
        config.parameter_row_count,
        config.parameter_count,
    );
    log::info!(
        "Generated {} parameter sets of {} ids",
        parameter_sets.len(),
        config.parameter_row_count
    );
    println!("Prepare data completed");

    Ok(Fixture {
        parameter_sets,
        seeded_rows,
    })
}
