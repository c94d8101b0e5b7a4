//! Natural-key resolution between legacy and target surrogate ids.
//!
//! Reference tables get new ids in the target. To translate a legacy
//! reference id, the whole target table is loaded into a [`NaturalKeyMap`]
//! (normalized name or code -> new id), then the legacy table is scanned and
//! each legacy natural key looked up, giving a [`LegacyIdMap`].

use std::collections::HashMap;

use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::control::RunControl;
use crate::core::{RowCursor, SourceQuery, SourceStore, TableScan, TargetStore};
use crate::error::Result;

/// Trim and lower-case a natural key; blank keys are ignored.
pub fn normalize_key(raw: &str) -> Option<String> {
    let key = raw.trim();
    if key.is_empty() {
        None
    } else {
        Some(key.to_lowercase())
    }
}

/// Normalized natural key -> target id for one key column.
#[derive(Debug, Clone, Default)]
pub struct NaturalKeyMap {
    ids: HashMap<String, i64>,
    collisions: u64,
}

impl NaturalKeyMap {
    /// Insert a key. A repeated key keeps the last id seen.
    pub fn insert(&mut self, raw: &str, id: i64) {
        if let Some(key) = normalize_key(raw) {
            if self.ids.insert(key, id).is_some() {
                self.collisions += 1;
            }
        }
    }

    pub fn get(&self, raw: &str) -> Option<i64> {
        normalize_key(raw).and_then(|k| self.ids.get(&k).copied())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Keys that appeared more than once in the scanned table.
    pub fn collisions(&self) -> u64 {
        self.collisions
    }
}

/// Legacy id -> target id, plus how many legacy ids found no match.
#[derive(Debug, Clone, Default)]
pub struct LegacyIdMap {
    ids: HashMap<i64, i64>,
    missing: u64,
}

impl LegacyIdMap {
    pub fn get(&self, legacy_id: i64) -> Option<i64> {
        self.ids.get(&legacy_id).copied()
    }

    pub fn mapped(&self) -> usize {
        self.ids.len()
    }

    pub fn missing(&self) -> u64 {
        self.missing
    }
}

impl FromIterator<(i64, i64)> for LegacyIdMap {
    fn from_iter<I: IntoIterator<Item = (i64, i64)>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
            missing: 0,
        }
    }
}

/// How one legacy reference table lines up with its target table.
///
/// `target` scans `id` followed by key columns; `legacy` selects the legacy
/// id followed by the same key columns in the same order. Keys are tried in
/// order; a later key is consulted only when the earlier one is blank or
/// equals `sentinel`.
#[derive(Debug, Clone, Copy)]
pub struct Reference {
    pub name: &'static str,
    pub target: TableScan,
    pub legacy: SourceQuery,
    pub sentinel: Option<&'static str>,
}

async fn next_row(cursor: &mut RowCursor, control: &RunControl) -> Result<Option<crate::core::Row>> {
    control
        .guard(async { cursor.next().await.transpose() })
        .await
}

/// Load every row of `scan` into one map per key column.
pub async fn build_key_maps(
    target: &dyn TargetStore,
    scan: &TableScan,
    control: &RunControl,
) -> Result<Vec<NaturalKeyMap>> {
    let keys = scan.columns.len().saturating_sub(1);
    let mut maps = vec![NaturalKeyMap::default(); keys];

    let mut cursor = control.guard(target.scan(scan)).await?;
    while let Some(row) = next_row(&mut cursor, control).await? {
        let id = row.i64(0, "id")?;
        for (k, map) in maps.iter_mut().enumerate() {
            if let Some(key) = row.opt_text(k + 1, "key")? {
                map.insert(&key, id);
            }
        }
    }

    for (k, map) in maps.iter().enumerate() {
        if map.collisions() > 0 {
            warn!(
                "{}.{}: {} duplicate keys after normalization, last id wins",
                scan.table,
                scan.columns[k + 1],
                map.collisions()
            );
        }
    }
    debug!("Loaded {} keys from {}", maps.first().map_or(0, |m| m.len()), scan.table);
    Ok(maps)
}

/// Build the target key map for a single-key scan, e.g. `title(id, imdb_id)`.
pub async fn build_key_map(
    target: &dyn TargetStore,
    scan: &TableScan,
    control: &RunControl,
) -> Result<NaturalKeyMap> {
    Ok(build_key_maps(target, scan, control)
        .await?
        .into_iter()
        .next()
        .unwrap_or_default())
}

/// Translate every legacy id of `reference` to its target id.
///
/// Unmatched legacy ids are left out and counted; the first `log_limit` of
/// them are logged. Only store failures are errors.
pub async fn resolve_legacy(
    source: &dyn SourceStore,
    target: &dyn TargetStore,
    reference: &Reference,
    log_limit: usize,
    control: &RunControl,
) -> Result<LegacyIdMap> {
    let maps = build_key_maps(target, &reference.target, control).await?;

    let mut result = LegacyIdMap::default();
    let mut cursor = control.guard(source.open(&reference.legacy)).await?;
    while let Some(row) = next_row(&mut cursor, control).await? {
        let legacy_id = row.i64(0, "legacy id")?;
        let mut keys = Vec::with_capacity(maps.len());
        for k in 0..maps.len() {
            keys.push(row.opt_text(k + 1, "legacy key")?);
        }

        match lookup(&maps, &keys, reference.sentinel) {
            Some(id) => {
                result.ids.insert(legacy_id, id);
            }
            None => {
                if result.missing < log_limit as u64 {
                    warn!(
                        "{}: no target row for legacy id {} (keys {:?})",
                        reference.name, legacy_id, keys
                    );
                }
                result.missing += 1;
            }
        }
    }

    info!(
        "{} map: mapped {} legacy ids; {} missing",
        reference.name,
        result.mapped(),
        result.missing
    );
    Ok(result)
}

fn lookup(maps: &[NaturalKeyMap], keys: &[Option<String>], sentinel: Option<&str>) -> Option<i64> {
    for (map, key) in maps.iter().zip(keys) {
        let usable = key
            .as_deref()
            .and_then(normalize_key)
            .filter(|k| sentinel.map_or(true, |s| !k.eq_ignore_ascii_case(s)));
        if let Some(k) = usable {
            return map.get(&k);
        }
    }
    None
}
