//! SQL Server id-list parameter benchmark
//!
//! Measures how fast SQL Server answers `SELECT Id FROM TestData WHERE Id IN
//! (...)` when the id list arrives in one of five shapes:
//! - **StringSplit**: one delimited string, split server-side
//! - **SimpleUDT**: table type without a key
//! - **SimplePKUDT**: table type with a nonclustered primary key
//! - **MemoryOptUDT**: table type declared like `SimplePKUDT`
//! - **MemoryOptHashUDT**: memory-optimized table type with a hash index
//!
//! Run the report: `cargo run --release -p tvp-bench`
//! Run benchmarks: `cargo bench -p tvp-bench`
//! Run tests: `cargo test` (live-database tests need `TVPBENCH_CONNECTION`)

pub mod config;
pub mod connection;
pub mod fixture;
pub mod report;
pub mod runner;
pub mod schema;
pub mod strategy;
