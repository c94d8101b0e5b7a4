//! Batch loader: stream one source query through a transcoder into one
//! target table.
//!
//! A live load runs in a single write unit: either every transcoded row of
//! the table is committed or none is. Rows the transcoder skips are counted
//! per category and never abort the load.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::control::RunControl;
use crate::core::{Row, SourceQuery, SourceStore, Statement, TargetStore, TargetTx};
use crate::error::Result;
use crate::transcode::RowOutcome;

/// Upper bound for a rollback after an abort; an unfinished unit is then
/// dropped, which closes its connection.
const ROLLBACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Loader settings shared by every table of a run.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Read and transcode, but issue no writes.
    pub dry_run: bool,
    /// Progress line every N rows.
    pub progress_every: u64,
    /// Progress line at least this often.
    pub progress_interval: Duration,
    /// Detail lines logged per warning category.
    pub log_limit: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            progress_every: 50_000,
            progress_interval: Duration::from_secs(10),
            log_limit: 20,
        }
    }
}

/// One table load.
#[derive(Debug, Clone, Copy)]
pub struct LoadJob<'a> {
    /// Name used in logs and stats, usually the target table.
    pub label: &'static str,
    pub query: &'a SourceQuery,
    pub statement: &'a Statement,
}

/// Counts for one table load.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadStats {
    pub table: String,
    /// Source rows read.
    pub processed: u64,
    /// Statements executed against the target; always 0 in dry-run.
    pub written: u64,
    /// Rows dropped by the transcoder.
    pub skipped: u64,
    /// Skipped rows per category.
    pub skips: BTreeMap<String, u64>,
    /// Data-quality warnings per category; those rows are still written.
    pub warnings: BTreeMap<String, u64>,
    pub dry_run: bool,
    pub duration_ms: u64,
}

/// Data-quality warnings raised while transcoding a table.
///
/// Every warning is counted; only the first `limit` per category are logged.
#[derive(Debug)]
pub struct Warnings {
    table: &'static str,
    limit: usize,
    counts: BTreeMap<String, u64>,
}

impl Warnings {
    pub fn new(table: &'static str, limit: usize) -> Self {
        Self {
            table,
            limit,
            counts: BTreeMap::new(),
        }
    }

    pub fn warn(&mut self, category: &'static str, detail: impl std::fmt::Display) {
        let n = self.counts.entry(category.to_string()).or_insert(0);
        if (*n as usize) < self.limit {
            warn!("{}: {}: {}", self.table, category, detail);
        }
        *n += 1;
    }

    pub fn counts(&self) -> &BTreeMap<String, u64> {
        &self.counts
    }

    fn into_counts(self) -> BTreeMap<String, u64> {
        self.counts
    }
}

/// Emits a progress line every `every` rows or `interval`, whichever comes first.
struct Progress {
    label: &'static str,
    total: u64,
    every: u64,
    interval: Duration,
    last: Instant,
}

impl Progress {
    fn new(label: &'static str, total: u64, config: &TransferConfig) -> Self {
        Self {
            label,
            total,
            every: config.progress_every.max(1),
            interval: config.progress_interval,
            last: Instant::now(),
        }
    }

    fn tick(&mut self, processed: u64) {
        if processed % self.every == 0 || self.last.elapsed() >= self.interval {
            let pct = if self.total > 0 {
                processed as f64 * 100.0 / self.total as f64
            } else {
                100.0
            };
            info!(
                "{}: processed {}/{} rows ({:.1}%)",
                self.label, processed, self.total, pct
            );
            self.last = Instant::now();
        }
    }
}

/// Stream `job.query` through `transcode` into `job.statement`.
///
/// The count, the cursor open, every row fetch, every write and the commit
/// run under [`RunControl::guard`]. Any error rolls the write unit back and is
/// returned; skip outcomes are tallied.
pub async fn load<F>(
    source: &dyn SourceStore,
    target: &dyn TargetStore,
    job: LoadJob<'_>,
    config: &TransferConfig,
    control: &RunControl,
    mut transcode: F,
) -> Result<LoadStats>
where
    F: FnMut(&Row, &mut Warnings) -> Result<RowOutcome>,
{
    let start = Instant::now();
    let total = control.guard(source.count(job.query)).await?;
    info!(
        "Loading {} from {} ({} rows{})",
        job.label,
        job.query.name,
        total,
        if config.dry_run { ", dry-run" } else { "" }
    );

    let mut stats = LoadStats {
        table: job.label.to_string(),
        dry_run: config.dry_run,
        ..LoadStats::default()
    };
    let mut warnings = Warnings::new(job.label, config.log_limit);

    let mut tx = if config.dry_run {
        None
    } else {
        Some(control.guard(target.begin()).await?)
    };

    let outcome = drive(
        source,
        tx.as_deref_mut(),
        job,
        config,
        control,
        total,
        &mut stats,
        &mut warnings,
        &mut transcode,
    )
    .await;

    match (outcome, tx) {
        (Ok(()), Some(tx)) => {
            if let Err(e) = control.check() {
                rollback(tx, job.label).await;
                return Err(e);
            }
            control.guard(tx.commit()).await?;
        }
        (Ok(()), None) => {}
        (Err(e), Some(tx)) => {
            rollback(tx, job.label).await;
            return Err(e);
        }
        (Err(e), None) => return Err(e),
    }

    stats.warnings = warnings.into_counts();
    stats.duration_ms = start.elapsed().as_millis() as u64;
    report(&stats);
    Ok(stats)
}

#[allow(clippy::too_many_arguments)]
async fn drive<F>(
    source: &dyn SourceStore,
    mut tx: Option<&mut (dyn TargetTx + 'static)>,
    job: LoadJob<'_>,
    config: &TransferConfig,
    control: &RunControl,
    total: u64,
    stats: &mut LoadStats,
    warnings: &mut Warnings,
    transcode: &mut F,
) -> Result<()>
where
    F: FnMut(&Row, &mut Warnings) -> Result<RowOutcome>,
{
    let mut cursor = control.guard(source.open(job.query)).await?;
    let mut progress = Progress::new(job.label, total, config);

    loop {
        let row = match control.guard(async { cursor.next().await.transpose() }).await? {
            Some(row) => row,
            None => break,
        };
        stats.processed += 1;

        match transcode(&row, warnings)? {
            RowOutcome::Write(params) => {
                if let Some(tx) = tx.as_deref_mut() {
                    control.guard(tx.exec(job.statement, &params)).await?;
                    stats.written += 1;
                }
            }
            RowOutcome::Skip(category) => {
                stats.skipped += 1;
                *stats.skips.entry(category.to_string()).or_insert(0) += 1;
            }
        }

        progress.tick(stats.processed);
    }
    Ok(())
}

async fn rollback(tx: Box<dyn TargetTx>, label: &str) {
    match tokio::time::timeout(ROLLBACK_TIMEOUT, tx.rollback()).await {
        Ok(Ok(())) => debug!("{}: write unit rolled back", label),
        Ok(Err(e)) => warn!("{}: rollback failed: {}", label, e),
        Err(_) => warn!(
            "{}: rollback did not finish within {:?}; connection discarded",
            label, ROLLBACK_TIMEOUT
        ),
    }
}

fn report(stats: &LoadStats) {
    info!(
        "Done {}: processed {}, written {}, skipped {} in {}ms{}",
        stats.table,
        stats.processed,
        stats.written,
        stats.skipped,
        stats.duration_ms,
        if stats.dry_run { " (dry-run)" } else { "" }
    );
    for (category, n) in &stats.skips {
        info!("{}: skipped {} rows ({})", stats.table, n, category);
    }
    for (category, n) in &stats.warnings {
        warn!("{}: {} data-quality warnings ({})", stats.table, n, category);
    }
}
