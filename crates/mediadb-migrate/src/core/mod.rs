//! Core abstractions shared by the stores and the migration engine.
//!
//! - [`value`]: owned SQL values and rows
//! - [`statement`]: declarative queries, scans and writes
//! - [`traits`]: source and target store capabilities
//!
//! Transcoders and the loader only see these types, so the engine runs the
//! same way against PostgreSQL and against the in-memory store used in tests.

pub mod statement;
pub mod traits;
pub mod value;

pub use statement::{ColumnDefault, ConflictAction, SourceQuery, Statement, TableScan, Update, Upsert};
pub use traits::{RowCursor, SourceStore, TargetStore, TargetTx};
pub use value::{Row, SqlValue};
