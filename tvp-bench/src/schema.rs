//! DDL for the scratch database.
//!
//! Four table types share one column (`Id BIGINT`) and differ only in how
//! that column is keyed and where the engine keeps the rows:
//! - [`TableType::Simple`] — a heap, no key
//! - [`TableType::SimplePk`] — nonclustered primary key
//! - [`TableType::MemoryOpt`] — same declaration as `SimplePk`
//! - [`TableType::MemoryOptHash`] — memory-optimized with a hash index

use std::fmt;

/// Base table queried by every case.
pub const TEST_DATA_TABLE: &str = "TestData";

/// Upper bound of `TestData.Name`.
pub const NAME_MAX_LEN: usize = 256;

/// Structured-parameter shape used by a table-valued case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableType {
    Simple,
    SimplePk,
    MemoryOpt,
    MemoryOptHash,
}

impl TableType {
    pub const ALL: [TableType; 4] = [
        TableType::Simple,
        TableType::SimplePk,
        TableType::MemoryOpt,
        TableType::MemoryOptHash,
    ];

    /// Unqualified type name as created in `dbo`.
    pub fn type_name(self) -> &'static str {
        match self {
            TableType::Simple => "SimpleUDT",
            TableType::SimplePk => "SimplePKUDT",
            TableType::MemoryOpt => "MemoryOptUDT",
            TableType::MemoryOptHash => "MemoryOptHashUDT",
        }
    }

    /// Schema-qualified, bracketed name for use in `DECLARE`.
    pub fn qualified_name(self) -> String {
        format!("[dbo].[{}]", self.type_name())
    }

    pub fn is_memory_optimized(self) -> bool {
        matches!(self, TableType::MemoryOptHash)
    }

    pub fn create_statement(self) -> String {
        let body = match self {
            TableType::Simple => "(Id BIGINT)",
            TableType::SimplePk | TableType::MemoryOpt => "(Id BIGINT PRIMARY KEY NONCLUSTERED)",
            TableType::MemoryOptHash => {
                "(Id BIGINT PRIMARY KEY NONCLUSTERED HASH WITH (BUCKET_COUNT = 32))\n    \
                 WITH ( MEMORY_OPTIMIZED = ON )"
            }
        };
        format!("CREATE TYPE {} AS TABLE\n{};", self.type_name(), body)
    }
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Drops `database` if present, recreates it, and attaches the
/// memory-optimized filegroup that `MemoryOptHashUDT` needs.
///
/// `database` must already be validated as a plain identifier.
pub fn recreate_database_batch(database: &str, memory_optimized_dir: &str) -> String {
    let dir = memory_optimized_dir.trim_end_matches('/');
    format!(
        "USE master;

IF EXISTS (SELECT * FROM sys.databases WHERE name = '{database}')
    BEGIN
        ALTER DATABASE [{database}] SET SINGLE_USER WITH ROLLBACK IMMEDIATE;
        DROP DATABASE [{database}];
    END;

CREATE DATABASE [{database}];
ALTER DATABASE [{database}] ADD FILEGROUP [{database}_MOD]
    CONTAINS MEMORY_OPTIMIZED_DATA;
ALTER DATABASE [{database}] ADD FILE (
    name='{database}_MOD1', filename='{dir}/{database}_MOD1')
    TO FILEGROUP [{database}_MOD];",
        dir = escape_literal(dir),
    )
}

/// Creates the four table types and `TestData` inside `database`.
pub fn create_schema_batch(database: &str) -> String {
    let mut batch = format!("USE [{database}];\n");
    for table_type in TableType::ALL {
        batch.push('\n');
        batch.push_str(&table_type.create_statement());
        batch.push('\n');
    }
    batch.push_str(&format!(
        "\nCREATE TABLE {TEST_DATA_TABLE}\n(Id BIGINT PRIMARY KEY IDENTITY,\n Name nvarchar({NAME_MAX_LEN}));\n"
    ));
    batch
}

fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_are_distinct() {
        let mut names: Vec<&str> = TableType::ALL.iter().map(|t| t.type_name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 4);
    }

    #[test]
    fn only_hash_type_is_memory_optimized() {
        for table_type in TableType::ALL {
            let ddl = table_type.create_statement();
            assert_eq!(
                ddl.contains("MEMORY_OPTIMIZED = ON"),
                table_type.is_memory_optimized(),
                "{ddl}"
            );
        }
    }

    #[test]
    fn hash_type_declares_bucket_count() {
        let ddl = TableType::MemoryOptHash.create_statement();
        assert!(ddl.contains("HASH WITH (BUCKET_COUNT = 32)"));
        assert!(ddl.starts_with("CREATE TYPE MemoryOptHashUDT AS TABLE"));
    }

    #[test]
    fn simple_type_has_no_key() {
        let ddl = TableType::Simple.create_statement();
        assert_eq!(ddl, "CREATE TYPE SimpleUDT AS TABLE\n(Id BIGINT);");
    }

    #[test]
    fn qualified_name_is_bracketed() {
        assert_eq!(TableType::SimplePk.qualified_name(), "[dbo].[SimplePKUDT]");
    }

    #[test]
    fn recreate_batch_targets_database_and_filegroup() {
        let sql = recreate_database_batch("Bench", "/var/opt/mssql/data/");
        assert!(sql.contains("CREATE DATABASE [Bench];"));
        assert!(sql.contains("DROP DATABASE [Bench];"));
        assert!(sql.contains("CONTAINS MEMORY_OPTIMIZED_DATA"));
        assert!(sql.contains("filename='/var/opt/mssql/data/Bench_MOD1'"));
    }

    #[test]
    fn recreate_batch_escapes_quotes_in_directory() {
        let sql = recreate_database_batch("Bench", "/srv/o'brien");
        assert!(sql.contains("filename='/srv/o''brien/Bench_MOD1'"));
    }

    #[test]
    fn schema_batch_creates_types_then_table() {
        let sql = create_schema_batch("Bench");
        assert!(sql.starts_with("USE [Bench];"));
        let table_pos = sql.find("CREATE TABLE TestData").unwrap();
        for table_type in TableType::ALL {
            let pos = sql
                .find(&format!("CREATE TYPE {} ", table_type.type_name()))
                .unwrap();
            assert!(pos < table_pos);
        }
        assert!(sql.contains("Id BIGINT PRIMARY KEY IDENTITY"));
        assert!(sql.contains("Name nvarchar(256)"));
    }
}
