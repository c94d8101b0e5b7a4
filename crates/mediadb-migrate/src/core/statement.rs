//! Declarative read and write descriptions.
//!
//! Phases describe what they read and write with these types; the store turns
//! them into SQL. Keeping conflict handling in the description lets the
//! in-memory test store apply the same rules the database would.

/// A named, ordered query against the legacy database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceQuery {
    /// Stable name used in logs and by test stores.
    pub name: &'static str,
    /// SELECT returning rows in legacy primary-key order.
    pub sql: &'static str,
    /// SELECT COUNT(*) over the same row set.
    pub count_sql: &'static str,
}

/// A full scan of a target table, used to build natural-key maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableScan {
    pub table: &'static str,
    pub columns: &'static [&'static str],
    /// Only rows where this column is not NULL.
    pub non_null: Option<&'static str>,
}

impl TableScan {
    /// Render the scan as a SELECT ordered by the first column.
    pub fn to_sql(&self) -> String {
        let mut sql = format!(
            "SELECT {} FROM {}",
            self.columns.join(", "),
            self.table
        );
        if let Some(col) = self.non_null {
            sql.push_str(&format!(" WHERE {} IS NOT NULL", col));
        }
        if let Some(first) = self.columns.first() {
            sql.push_str(&format!(" ORDER BY {}", first));
        }
        sql
    }
}

/// What to do when an upsert hits an existing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictAction {
    /// Keep the existing row untouched.
    DoNothing,
    /// Replace these columns with the incoming values.
    Overwrite(&'static [&'static str]),
    /// Take the incoming value for these columns unless it is NULL.
    Widen(&'static [&'static str]),
}

/// A column filled by a server-side expression instead of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnDefault {
    pub column: &'static str,
    pub expr: &'static str,
    /// Also re-apply the expression when the conflict action updates the row.
    pub on_update: bool,
}

/// INSERT ... ON CONFLICT with one parameter per entry of `columns`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Upsert {
    pub table: &'static str,
    pub columns: &'static [&'static str],
    pub conflict: &'static [&'static str],
    pub action: ConflictAction,
    pub defaults: &'static [ColumnDefault],
}

/// UPDATE with parameters `set` followed by `key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Update {
    pub table: &'static str,
    pub set: &'static [&'static str],
    pub key: &'static [&'static str],
}

/// A write executed once per transcoded row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Statement {
    Upsert(Upsert),
    Update(Update),
}

impl Statement {
    /// Target table name.
    pub fn table(&self) -> &'static str {
        match self {
            Statement::Upsert(u) => u.table,
            Statement::Update(u) => u.table,
        }
    }

    /// Number of bind parameters the statement expects.
    pub fn param_count(&self) -> usize {
        match self {
            Statement::Upsert(u) => u.columns.len(),
            Statement::Update(u) => u.set.len() + u.key.len(),
        }
    }

    /// Render PostgreSQL SQL with `$n` placeholders.
    pub fn to_sql(&self) -> String {
        match self {
            Statement::Upsert(u) => upsert_sql(u),
            Statement::Update(u) => update_sql(u),
        }
    }
}

fn upsert_sql(u: &Upsert) -> String {
    let mut columns: Vec<&str> = u.columns.to_vec();
    let mut values: Vec<String> = (1..=u.columns.len()).map(|i| format!("${}", i)).collect();
    for d in u.defaults {
        columns.push(d.column);
        values.push(d.expr.to_string());
    }

    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) ",
        u.table,
        columns.join(", "),
        values.join(", "),
        u.conflict.join(", ")
    );

    let mut sets: Vec<String> = match u.action {
        ConflictAction::DoNothing => Vec::new(),
        ConflictAction::Overwrite(cols) => cols
            .iter()
            .map(|c| format!("{} = EXCLUDED.{}", c, c))
            .collect(),
        ConflictAction::Widen(cols) => cols
            .iter()
            .map(|c| format!("{} = COALESCE(EXCLUDED.{}, {}.{})", c, c, u.table, c))
            .collect(),
    };
    if !sets.is_empty() {
        sets.extend(
            u.defaults
                .iter()
                .filter(|d| d.on_update)
                .map(|d| format!("{} = {}", d.column, d.expr)),
        );
    }

    if sets.is_empty() {
        sql.push_str("DO NOTHING");
    } else {
        sql.push_str("DO UPDATE SET ");
        sql.push_str(&sets.join(", "));
    }
    sql
}

fn update_sql(u: &Update) -> String {
    let sets: Vec<String> = u
        .set
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ${}", c, i + 1))
        .collect();
    let keys: Vec<String> = u
        .key
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ${}", c, u.set.len() + i + 1))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE {}",
        u.table,
        sets.join(", "),
        keys.join(" AND ")
    )
}
