//! In-memory stores for tests.
//!
//! [`MemorySource`] serves canned rows per source query name. [`MemoryTarget`]
//! keeps tables as column maps, applies [`Statement`] conflict rules the way
//! PostgreSQL would, and buffers each transaction on a private copy of the
//! tables until commit.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::core::{
    ConflictAction, Row, RowCursor, SourceQuery, SourceStore, SqlValue, Statement, TableScan,
    TargetStore, TargetTx, Update, Upsert,
};
use crate::error::{MigrateError, Result};

pub type MemRow = BTreeMap<&'static str, SqlValue>;

type Tables = HashMap<&'static str, Vec<MemRow>>;

/// Canned legacy rows keyed by [`SourceQuery::name`]. Unknown names are empty.
#[derive(Default)]
pub struct MemorySource {
    rows: HashMap<&'static str, Vec<Row>>,
    fail_after: HashMap<&'static str, usize>,
    stall_after: HashMap<&'static str, usize>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(mut self, query: &'static str, rows: Vec<Vec<SqlValue>>) -> Self {
        self.rows
            .insert(query, rows.into_iter().map(Row::new).collect());
        self
    }

    /// Make the cursor for `query` yield an error after `n` rows.
    pub fn failing_after(mut self, query: &'static str, n: usize) -> Self {
        self.fail_after.insert(query, n);
        self
    }

    /// Make the cursor for `query` hang forever after `n` rows.
    pub fn stalling_after(mut self, query: &'static str, n: usize) -> Self {
        self.stall_after.insert(query, n);
        self
    }
}

#[async_trait]
impl SourceStore for MemorySource {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn count(&self, query: &SourceQuery) -> Result<u64> {
        Ok(self.rows.get(query.name).map_or(0, |r| r.len() as u64))
    }

    async fn open(&self, query: &SourceQuery) -> Result<RowCursor> {
        let mut items: Vec<Result<Row>> = self
            .rows
            .get(query.name)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(Ok)
            .collect();
        if let Some(&n) = self.fail_after.get(query.name) {
            items.truncate(n);
            items.push(Err(MigrateError::transfer(query.name, "injected read failure")));
        }
        if let Some(&n) = self.stall_after.get(query.name) {
            items.truncate(n);
            let stalled = futures::stream::iter(items).chain(futures::stream::pending());
            return Ok(Box::pin(stalled));
        }
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

#[derive(Default)]
struct TargetState {
    tables: Tables,
    writes: u64,
    begins: u64,
    commits: u64,
    rollbacks: u64,
}

#[derive(Default)]
struct Faults {
    fail_on_write: Option<(&'static str, u64)>,
    cancel_after: Option<(CancellationToken, u64)>,
}

/// Target tables held in memory.
#[derive(Clone, Default)]
pub struct MemoryTarget {
    state: Arc<Mutex<TargetState>>,
    faults: Arc<Mutex<Faults>>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a table with rows given in `columns` order.
    pub fn with_rows(self, table: &'static str, columns: &[&'static str], rows: Vec<Vec<SqlValue>>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let target = state.tables.entry(table).or_default();
            for values in rows {
                target.push(columns.iter().copied().zip(values).collect());
            }
        }
        self
    }

    /// Make the `n`-th write (1-based) to `table` fail.
    pub fn fail_on_write(self, table: &'static str, n: u64) -> Self {
        self.faults.lock().unwrap().fail_on_write = Some((table, n));
        self
    }

    /// Cancel `token` once `n` writes have been executed.
    pub fn cancel_after_writes(self, token: CancellationToken, n: u64) -> Self {
        self.faults.lock().unwrap().cancel_after = Some((token, n));
        self
    }

    /// Committed rows of a table.
    pub fn rows(&self, table: &str) -> Vec<MemRow> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.rows(table).len()
    }

    /// First committed row whose `column` equals `value`.
    pub fn find(&self, table: &str, column: &str, value: SqlValue) -> Option<MemRow> {
        self.rows(table)
            .into_iter()
            .find(|r| r.get(column) == Some(&value))
    }

    /// Statements executed, including those later rolled back.
    pub fn writes(&self) -> u64 {
        self.state.lock().unwrap().writes
    }

    pub fn begins(&self) -> u64 {
        self.state.lock().unwrap().begins
    }

    pub fn commits(&self) -> u64 {
        self.state.lock().unwrap().commits
    }

    pub fn rollbacks(&self) -> u64 {
        self.state.lock().unwrap().rollbacks
    }
}

#[async_trait]
impl TargetStore for MemoryTarget {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn scan(&self, scan: &TableScan) -> Result<RowCursor> {
        let rows: Vec<Result<Row>> = self
            .rows(scan.table)
            .into_iter()
            .filter(|r| match scan.non_null {
                Some(col) => r.get(col).is_some_and(|v| !v.is_null()),
                None => true,
            })
            .map(|r| {
                Ok(Row::new(
                    scan.columns
                        .iter()
                        .map(|c| r.get(c).cloned().unwrap_or(SqlValue::Null))
                        .collect(),
                ))
            })
            .collect();
        Ok(Box::pin(futures::stream::iter(rows)))
    }

    async fn begin(&self) -> Result<Box<dyn TargetTx>> {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            state.begins += 1;
            state.tables.clone()
        };
        Ok(Box::new(MemoryTx {
            target: self.clone(),
            tables: snapshot,
            table_writes: HashMap::new(),
        }))
    }
}

struct MemoryTx {
    target: MemoryTarget,
    tables: Tables,
    table_writes: HashMap<&'static str, u64>,
}

#[async_trait]
impl TargetTx for MemoryTx {
    async fn exec(&mut self, stmt: &Statement, params: &[SqlValue]) -> Result<u64> {
        let total = {
            let mut state = self.target.state.lock().unwrap();
            state.writes += 1;
            state.writes
        };
        let n = self.table_writes.entry(stmt.table()).or_default();
        *n += 1;
        {
            let faults = self.target.faults.lock().unwrap();
            if let Some((table, at)) = faults.fail_on_write {
                if table == stmt.table() && *n == at {
                    return Err(MigrateError::transfer(table, "injected write failure"));
                }
            }
            if let Some((token, after)) = &faults.cancel_after {
                if total >= *after {
                    token.cancel();
                }
            }
        }

        if params.len() != stmt.param_count() {
            return Err(MigrateError::transfer(stmt.table(), "parameter count mismatch"));
        }
        let rows = self.tables.entry(stmt.table()).or_default();
        Ok(match stmt {
            Statement::Upsert(u) => apply_upsert(rows, u, params),
            Statement::Update(u) => apply_update(rows, u, params),
        })
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut state = self.target.state.lock().unwrap();
        state.tables = self.tables;
        state.commits += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.target.state.lock().unwrap().rollbacks += 1;
        Ok(())
    }
}

fn apply_upsert(rows: &mut Vec<MemRow>, u: &Upsert, params: &[SqlValue]) -> u64 {
    let mut incoming: MemRow = u.columns.iter().copied().zip(params.iter().cloned()).collect();
    for d in u.defaults {
        incoming.insert(d.column, SqlValue::Text(d.expr.to_string()));
    }

    // NULLs never collide on a unique constraint.
    let key: Option<Vec<&SqlValue>> = u
        .conflict
        .iter()
        .map(|c| incoming.get(c).filter(|v| !v.is_null()))
        .collect();
    let existing = key.and_then(|key| {
        rows.iter().position(|r| {
            u.conflict
                .iter()
                .zip(&key)
                .all(|(c, v)| r.get(c) == Some(*v))
        })
    });

    match existing {
        None => {
            if !incoming.contains_key("id") {
                let next = rows
                    .iter()
                    .filter_map(|r| r.get("id").and_then(SqlValue::as_i64))
                    .max()
                    .unwrap_or(0)
                    + 1;
                incoming.insert("id", SqlValue::I64(next));
            }
            rows.push(incoming);
            1
        }
        Some(idx) => {
            let row = &mut rows[idx];
            match u.action {
                ConflictAction::DoNothing => return 0,
                ConflictAction::Overwrite(cols) => {
                    for &c in cols {
                        row.insert(c, incoming.get(c).cloned().unwrap_or(SqlValue::Null));
                    }
                }
                ConflictAction::Widen(cols) => {
                    for &c in cols {
                        if let Some(v) = incoming.get(c).filter(|v| !v.is_null()) {
                            row.insert(c, v.clone());
                        }
                    }
                }
            }
            for d in u.defaults.iter().filter(|d| d.on_update) {
                row.insert(d.column, SqlValue::Text(d.expr.to_string()));
            }
            1
        }
    }
}

fn apply_update(rows: &mut [MemRow], u: &Update, params: &[SqlValue]) -> u64 {
    let (set, key) = params.split_at(u.set.len());
    let mut affected = 0;
    for row in rows.iter_mut() {
        if u.key.iter().zip(key).all(|(c, v)| row.get(c) == Some(v)) {
            for (&c, v) in u.set.iter().zip(set) {
                row.insert(c, v.clone());
            }
            affected += 1;
        }
    }
    affected
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENRE: Statement = Statement::Upsert(Upsert {
        table: "genre_ref",
        columns: &["name"],
        conflict: &["name"],
        action: ConflictAction::DoNothing,
        defaults: &[],
    });

    #[tokio::test]
    async fn test_upsert_assigns_ids_and_ignores_duplicates() {
        let target = MemoryTarget::new();
        let mut tx = target.begin().await.unwrap();
        assert_eq!(tx.exec(&GENRE, &["Drama".into()]).await.unwrap(), 1);
        assert_eq!(tx.exec(&GENRE, &["Comedy".into()]).await.unwrap(), 1);
        assert_eq!(tx.exec(&GENRE, &["Drama".into()]).await.unwrap(), 0);
        tx.commit().await.unwrap();

        let rows = target.rows("genre_ref");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("id"), Some(&SqlValue::I64(2)));
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let target = MemoryTarget::new();
        let mut tx = target.begin().await.unwrap();
        tx.exec(&GENRE, &["Drama".into()]).await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(target.row_count("genre_ref"), 0);
        assert_eq!(target.writes(), 1);
        assert_eq!(target.rollbacks(), 1);
    }

    #[tokio::test]
    async fn test_widen_keeps_existing_on_null() {
        const LANG: Statement = Statement::Upsert(Upsert {
            table: "language_ref",
            columns: &["name", "iso_code"],
            conflict: &["name"],
            action: ConflictAction::Widen(&["iso_code"]),
            defaults: &[],
        });
        let target = MemoryTarget::new().with_rows(
            "language_ref",
            &["id", "name", "iso_code"],
            vec![vec![SqlValue::I64(1), "English".into(), "en".into()]],
        );
        let mut tx = target.begin().await.unwrap();
        tx.exec(&LANG, &["English".into(), SqlValue::Null]).await.unwrap();
        tx.commit().await.unwrap();

        let row = target.find("language_ref", "name", "English".into()).unwrap();
        assert_eq!(row.get("iso_code"), Some(&SqlValue::Text("en".into())));
    }
}
