//! Store capability traits.
//!
//! The migration engine only needs a handful of operations from each side:
//!
//! - [`SourceStore`]: ordered cursors and row counts over the legacy schema
//! - [`TargetStore`]: table scans for key maps and transactional writes
//! - [`TargetTx`]: one atomic write unit
//!
//! The PostgreSQL implementation lives in [`crate::store::postgres`].

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::Result;

use super::statement::{SourceQuery, Statement, TableScan};
use super::value::{Row, SqlValue};

/// Forward-only, read-once sequence of rows.
pub type RowCursor = Pin<Box<dyn Stream<Item = Result<Row>> + Send>>;

/// Read access to the legacy database.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Round-trip check before any phase runs.
    async fn ping(&self) -> Result<()>;

    /// Number of rows the query would return.
    async fn count(&self, query: &SourceQuery) -> Result<u64>;

    /// Open a cursor over the query's rows, in its declared order.
    async fn open(&self, query: &SourceQuery) -> Result<RowCursor>;
}

/// Read and write access to the target database.
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Round-trip check before any phase runs.
    async fn ping(&self) -> Result<()>;

    /// Stream every row of a target table, projected to the scan's columns.
    async fn scan(&self, scan: &TableScan) -> Result<RowCursor>;

    /// Start a write unit.
    async fn begin(&self) -> Result<Box<dyn TargetTx>>;
}

/// A write unit on the target.
///
/// Dropping a transaction without calling [`TargetTx::commit`] discards its
/// writes.
#[async_trait]
pub trait TargetTx: Send {
    /// Execute one statement; returns the affected row count.
    async fn exec(&mut self, stmt: &Statement, params: &[SqlValue]) -> Result<u64>;

    /// Make all writes of the unit durable.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard all writes of the unit.
    async fn rollback(self: Box<Self>) -> Result<()>;
}
