//! Blocking SQL Server connection.
//!
//! `tiberius` is async-only. `SqlConnection` owns a current-thread tokio
//! runtime next to the client and drives every call to completion with
//! `block_on`, so callers see a plain synchronous API and no task ever runs
//! in the background.

use anyhow::{Context, Result};
use tiberius::{Client, Config, Query, Row};
use tokio::net::TcpStream;
use tokio::runtime::{Builder, Runtime};
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

type TdsClient = Client<Compat<TcpStream>>;

/// One exclusively-owned session with the server.
pub struct SqlConnection {
    runtime: Runtime,
    client: TdsClient,
}

impl SqlConnection {
    /// Opens a session using an ADO-style connection string.
    pub fn connect(connection_string: &str) -> Result<Self> {
        let config =
            Config::from_ado_string(connection_string).context("parse connection string")?;
        let runtime = Builder::new_current_thread()
            .enable_io()
            .build()
            .context("build tokio runtime")?;

        let addr = config.get_addr();
        let client = runtime.block_on(async {
            let tcp = TcpStream::connect(&addr)
                .await
                .with_context(|| format!("connect to {addr}"))?;
            tcp.set_nodelay(true)?;
            Client::connect(config, tcp.compat_write())
                .await
                .with_context(|| format!("log in to {addr}"))
        })?;

        log::debug!("Connected to SQL Server at {addr}");
        Ok(Self { runtime, client })
    }

    /// Opens a session and switches it to `database`.
    pub fn connect_to(connection_string: &str, database: &str) -> Result<Self> {
        let mut conn = Self::connect(connection_string)?;
        conn.use_database(database)?;
        Ok(conn)
    }

    /// Switches the session's current database. `database` must be a plain
    /// identifier.
    pub fn use_database(&mut self, database: &str) -> Result<()> {
        self.execute_batch(&format!("USE [{database}];"))
            .with_context(|| format!("switch to database {database}"))
    }

    /// Runs an unparameterized batch and drains every result set.
    pub fn execute_batch(&mut self, sql: &str) -> Result<()> {
        let Self { runtime, client } = self;
        runtime.block_on(async {
            client.simple_query(sql).await?.into_results().await?;
            Ok::<_, tiberius::error::Error>(())
        })?;
        Ok(())
    }

    /// Runs a parameterized statement and returns the affected row count.
    pub fn execute(&mut self, query: Query<'_>) -> Result<u64> {
        let Self { runtime, client } = self;
        let result = runtime.block_on(query.execute(client))?;
        Ok(result.total())
    }

    /// Runs a parameterized query and fully materializes its first result set.
    pub fn query_rows(&mut self, query: Query<'_>) -> Result<Vec<Row>> {
        let Self { runtime, client } = self;
        let rows = runtime.block_on(async {
            query.query(client).await?.into_first_result().await
        })?;
        Ok(rows)
    }

    /// Runs a parameterized query returning one `BIGINT` column.
    pub fn query_ids(&mut self, query: Query<'_>) -> Result<Vec<i64>> {
        self.query_rows(query)?
            .iter()
            .map(|row| {
                row.try_get::<i64, _>(0)?
                    .context("unexpected NULL id")
            })
            .collect()
    }

    /// Runs a query returning a single `BIGINT` scalar.
    pub fn query_scalar(&mut self, query: Query<'_>) -> Result<i64> {
        let rows = self.query_rows(query)?;
        let row = rows.first().context("scalar query returned no rows")?;
        row.try_get::<i64, _>(0)?
            .context("scalar query returned NULL")
    }

    /// Ends the session cleanly.
    pub fn close(self) -> Result<()> {
        let Self { runtime, client } = self;
        runtime.block_on(client.close()).context("close connection")?;
        Ok(())
    }

    /// Closes the session whether or not `outcome` succeeded, then returns
    /// `outcome`. A close error is only surfaced when `outcome` was `Ok`.
    pub fn close_after<T>(self, outcome: Result<T>) -> Result<T> {
        finish_with(outcome, || self.close())
    }
}

fn finish_with<T>(outcome: Result<T>, close: impl FnOnce() -> Result<()>) -> Result<T> {
    let closed = close();
    match outcome {
        Ok(value) => closed.map(|()| value),
        Err(err) => {
            if let Err(close_err) = closed {
                log::warn!("Failed to close connection after error: {close_err:#}");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::finish_with;
    use anyhow::{anyhow, Result};
    use std::cell::Cell;

    #[test]
    fn close_runs_on_success() {
        let calls = Cell::new(0);
        let out = finish_with(Ok(7), || {
            calls.set(calls.get() + 1);
            Ok(())
        });
        assert_eq!(out.unwrap(), 7);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn close_runs_when_the_work_failed() {
        let calls = Cell::new(0);
        let out: Result<u32> = finish_with(Err(anyhow!("query failed")), || {
            calls.set(calls.get() + 1);
            Ok(())
        });
        assert_eq!(out.unwrap_err().to_string(), "query failed");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn work_error_wins_over_close_error() {
        let out: Result<u32> =
            finish_with(Err(anyhow!("query failed")), || Err(anyhow!("socket gone")));
        assert_eq!(out.unwrap_err().to_string(), "query failed");
    }

    #[test]
    fn close_error_surfaces_after_success() {
        let out = finish_with(Ok(1), || Err(anyhow!("socket gone")));
        assert_eq!(out.unwrap_err().to_string(), "socket gone");
    }
}
