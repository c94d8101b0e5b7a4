//! PostgreSQL implementation of the store traits.
//!
//! One [`PgStore`] wraps a deadpool pool and serves as either the legacy
//! source or the target. Cursors hold their pooled connection until they are
//! exhausted or dropped.

use std::collections::HashMap;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use futures::StreamExt;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Config as PgConfig, NoTls, RowStream};
use tracing::{debug, info, warn};

use crate::config::redact_dsn;
use crate::core::{Row, RowCursor, SourceQuery, SourceStore, SqlValue, Statement, TableScan, TargetStore, TargetTx};
use crate::error::{MigrateError, Result};

/// PostgreSQL store backed by a connection pool.
pub struct PgStore {
    pool: Pool,
    label: &'static str,
}

impl PgStore {
    /// Create a pool for `dsn`. Connections are opened lazily; call
    /// [`SourceStore::ping`] or [`TargetStore::ping`] to verify reachability.
    ///
    /// `label` names the store in logs and errors ("old" or "new").
    pub fn connect(label: &'static str, dsn: &str, max_conns: usize) -> Result<Self> {
        let pg_config: PgConfig = dsn.parse().map_err(|e| MigrateError::Connection {
            store: label,
            message: format!("invalid DSN '{}': {}", redact_dsn(dsn), e),
        })?;

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(max_conns)
            .build()
            .map_err(|e| MigrateError::pool(e, format!("creating {} database pool", label)))?;

        debug!("Created {} database pool: {}", label, redact_dsn(dsn));
        Ok(Self { pool, label })
    }

    async fn client(&self, purpose: &str) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, format!("getting {} connection for {}", self.label, purpose)))
    }

    async fn ping_inner(&self) -> Result<()> {
        let client = self.pool.get().await.map_err(|e| MigrateError::Connection {
            store: self.label,
            message: e.to_string(),
        })?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::Connection {
                store: self.label,
                message: e.to_string(),
            })?;
        info!("Connected to {} database", self.label);
        Ok(())
    }

    async fn stream(&self, sql: &str, what: &'static str) -> Result<RowCursor> {
        let client = self.client(what).await?;
        let params: [&(dyn ToSql + Sync); 0] = [];
        let rows = client
            .query_raw(sql, params)
            .await
            .map_err(|e| MigrateError::database(format!("querying {}", what), e))?;
        Ok(cursor(client, rows, what))
    }
}

/// Keep the pooled client alive next to its row stream.
fn cursor(client: Object, rows: RowStream, what: &'static str) -> RowCursor {
    let state = (client, Box::pin(rows));
    Box::pin(futures::stream::unfold(state, move |(client, mut rows)| async move {
        let next = rows.next().await?;
        let item = next
            .map_err(|e| MigrateError::database(format!("reading {}", what), e))
            .and_then(|row| decode_row(&row));
        Some((item, (client, rows)))
    }))
}

fn decode_row(row: &tokio_postgres::Row) -> Result<Row> {
    let mut values = Vec::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        values.push(decode_value(row, idx, column.type_(), column.name())?);
    }
    Ok(Row::new(values))
}

fn decode_value(row: &tokio_postgres::Row, idx: usize, ty: &Type, name: &str) -> Result<SqlValue> {
    let decoded = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx).map(|v| v.map(SqlValue::Bool)),
        Type::INT2 => row.try_get::<_, Option<i16>>(idx).map(|v| v.map(SqlValue::I16)),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx).map(|v| v.map(SqlValue::I32)),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx).map(|v| v.map(SqlValue::I64)),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx).map(|v| v.map(SqlValue::F32)),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx).map(|v| v.map(SqlValue::F64)),
        Type::NUMERIC => row
            .try_get::<_, Option<rust_decimal::Decimal>>(idx)
            .map(|v| v.map(SqlValue::Decimal)),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => row
            .try_get::<_, Option<String>>(idx)
            .map(|v| v.map(SqlValue::Text)),
        Type::TIMESTAMP => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)
            .map(|v| v.map(SqlValue::DateTime)),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
            .map(|v| v.map(SqlValue::DateTimeUtc)),
        Type::DATE => row
            .try_get::<_, Option<chrono::NaiveDate>>(idx)
            .map(|v| v.map(SqlValue::Date)),
        _ => {
            return Err(MigrateError::Decode {
                column: idx,
                name: name.to_string(),
                message: format!("unsupported column type {}", ty),
            })
        }
    };

    decoded
        .map(|v| v.unwrap_or(SqlValue::Null))
        .map_err(|e| MigrateError::Decode {
            column: idx,
            name: name.to_string(),
            message: e.to_string(),
        })
}

#[async_trait]
impl SourceStore for PgStore {
    async fn ping(&self) -> Result<()> {
        self.ping_inner().await
    }

    async fn count(&self, query: &SourceQuery) -> Result<u64> {
        let client = self.client(query.name).await?;
        let row = client
            .query_one(query.count_sql, &[])
            .await
            .map_err(|e| MigrateError::database(format!("counting {}", query.name), e))?;
        let n: i64 = row
            .try_get(0)
            .map_err(|e| MigrateError::database(format!("counting {}", query.name), e))?;
        Ok(n.max(0) as u64)
    }

    async fn open(&self, query: &SourceQuery) -> Result<RowCursor> {
        self.stream(query.sql, query.name).await
    }
}

#[async_trait]
impl TargetStore for PgStore {
    async fn ping(&self) -> Result<()> {
        self.ping_inner().await
    }

    async fn scan(&self, scan: &TableScan) -> Result<RowCursor> {
        self.stream(&scan.to_sql(), scan.table).await
    }

    async fn begin(&self) -> Result<Box<dyn TargetTx>> {
        let client = self.client("write unit").await?;
        client
            .batch_execute("BEGIN")
            .await
            .map_err(|e| MigrateError::database("starting transaction", e))?;
        Ok(Box::new(PgTx {
            client: Some(client),
            prepared: HashMap::new(),
        }))
    }
}

/// An open transaction on one pooled connection.
struct PgTx {
    client: Option<Object>,
    prepared: HashMap<Statement, tokio_postgres::Statement>,
}

impl PgTx {
    fn client(&self) -> Result<&Object> {
        self.client
            .as_ref()
            .ok_or_else(|| MigrateError::State("transaction already finished".into()))
    }

    async fn finish(mut self: Box<Self>, sql: &'static str) -> Result<()> {
        let client = self
            .client
            .take()
            .ok_or_else(|| MigrateError::State("transaction already finished".into()))?;
        match client.batch_execute(sql).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // Never return a connection in an unknown transaction state.
                drop(Object::take(client));
                Err(MigrateError::database(format!("executing {}", sql), e))
            }
        }
    }
}

#[async_trait]
impl TargetTx for PgTx {
    async fn exec(&mut self, stmt: &Statement, params: &[SqlValue]) -> Result<u64> {
        if params.len() != stmt.param_count() {
            return Err(MigrateError::transfer(
                stmt.table(),
                format!(
                    "statement expects {} parameters, got {}",
                    stmt.param_count(),
                    params.len()
                ),
            ));
        }

        let prepared = match self.prepared.get(stmt) {
            Some(p) => p.clone(),
            None => {
                let p = self
                    .client()?
                    .prepare(&stmt.to_sql())
                    .await
                    .map_err(|e| MigrateError::database(format!("preparing write to {}", stmt.table()), e))?;
                self.prepared.insert(*stmt, p.clone());
                p
            }
        };

        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        self.client()?
            .execute(&prepared, &refs)
            .await
            .map_err(|e| MigrateError::database(format!("writing {}", stmt.table()), e))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for PgTx {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            // Closing the connection makes the server roll the transaction back.
            warn!("Write unit dropped without commit; discarding its connection");
            drop(Object::take(client));
        }
    }
}
