//! The five ways of getting a set of ids into `WHERE Id IN (...)`.
//!
//! Each strategy is a statically-declared SQL text plus a binding rule:
//! the split-string case binds one delimited `nvarchar`, the table-valued
//! cases bind one `BIGINT` per id and fill a table variable of their type.

use crate::fixture::ParameterPool;
use crate::schema::{TableType, TEST_DATA_TABLE};
use std::fmt;
use tiberius::Query;

/// Separator between ids in the delimited representation.
pub const ID_DELIMITER: char = ';';

/// Which buffer a strategy draws its parameter from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterShape {
    Delimited,
    Structured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    StringSplit,
    TableValued(TableType),
}

impl Strategy {
    /// Every case, in report order. The split-string case comes first and is
    /// the baseline for comparisons.
    pub const ALL: [Strategy; 5] = [
        Strategy::StringSplit,
        Strategy::TableValued(TableType::Simple),
        Strategy::TableValued(TableType::SimplePk),
        Strategy::TableValued(TableType::MemoryOpt),
        Strategy::TableValued(TableType::MemoryOptHash),
    ];

    pub fn name(self) -> &'static str {
        match self {
            Strategy::StringSplit => "StringSplit",
            Strategy::TableValued(table_type) => table_type.type_name(),
        }
    }

    pub fn parameter_shape(self) -> ParameterShape {
        match self {
            Strategy::StringSplit => ParameterShape::Delimited,
            Strategy::TableValued(_) => ParameterShape::Structured,
        }
    }

    /// SQL text for one operation when each parameter set holds
    /// `parameter_row_count` ids. Built once per case and reused.
    pub fn sql(self, parameter_row_count: usize) -> String {
        match self {
            Strategy::StringSplit => string_split_sql(),
            Strategy::TableValued(table_type) => table_valued_sql(table_type, parameter_row_count),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `STRING_SPLIT` over `@P1`, converted back to `BIGINT` server-side.
pub fn string_split_sql() -> String {
    format!(
        "SELECT t.Id FROM {TEST_DATA_TABLE} t \
         WHERE t.Id IN (SELECT CONVERT(BIGINT, s.value) FROM STRING_SPLIT(@P1, '{ID_DELIMITER}') s);"
    )
}

/// Declares a table variable of `table_type`, fills it from `@P1..@Pn`, and
/// selects through it.
pub fn table_valued_sql(table_type: TableType, row_count: usize) -> String {
    let mut sql = format!("DECLARE @ids {};\n", table_type.qualified_name());
    if row_count > 0 {
        let values: Vec<String> = (1..=row_count).map(|i| format!("(@P{i})")).collect();
        sql.push_str("INSERT INTO @ids (Id) VALUES ");
        sql.push_str(&values.join(","));
        sql.push_str(";\n");
    }
    sql.push_str(&format!(
        "SELECT t.Id FROM {TEST_DATA_TABLE} t WHERE t.Id IN (SELECT i.Id FROM @ids i);"
    ));
    sql
}

/// Pulls the next value from the buffer matching `strategy` and binds it to
/// `sql`. Advances exactly one cursor in `pool`.
pub fn next_query<'a>(strategy: Strategy, sql: &'a str, pool: &'a mut ParameterPool) -> Query<'a> {
    let mut query = Query::new(sql);
    match strategy.parameter_shape() {
        ParameterShape::Delimited => {
            query.bind(pool.delimited.peek().as_str());
        }
        ParameterShape::Structured => {
            for id in pool.structured.peek().ids() {
                query.bind(*id);
            }
        }
    }
    query
}
