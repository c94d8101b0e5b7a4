//! Phase orchestrator: runs a plan of phases in order, fail-fast.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

use crate::config::MigrationConfig;
use crate::control::RunControl;
use crate::core::{SourceStore, TargetStore};
use crate::error::Result;
use crate::phases::{PhaseContext, PhaseSelection};
use crate::state::{PhaseState, RunState};
use crate::store::PgStore;
use crate::transfer::TransferConfig;

/// Migration orchestrator.
pub struct Orchestrator {
    config: MigrationConfig,
    source: Arc<dyn SourceStore>,
    target: Arc<dyn TargetStore>,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Phase or composite name that was requested.
    pub phase: String,

    /// `completed`, `failed` or `cancelled`.
    pub status: String,

    pub dry_run: bool,

    pub started_at: DateTime<Utc>,

    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Every planned phase, in plan order.
    pub phases: Vec<PhaseState>,

    /// Source rows read across all tables.
    pub rows_processed: u64,

    /// Statements executed across all tables.
    pub rows_written: u64,

    /// Rows dropped by transcoders across all tables.
    pub rows_skipped: u64,

    /// Data-quality warnings across all tables.
    pub warnings: u64,

    /// Failure message, if the run did not complete.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MigrationResult {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Orchestrator {
    /// Validate `config`, open both stores and check they answer.
    pub async fn new(config: MigrationConfig) -> Result<Self> {
        config.validate()?;
        let source = PgStore::connect("old", &config.old_dsn, config.max_connections)?;
        let target = PgStore::connect("new", &config.new_dsn, config.max_connections)?;
        SourceStore::ping(&source).await?;
        TargetStore::ping(&target).await?;
        Ok(Self::with_stores(config, Arc::new(source), Arc::new(target)))
    }

    /// Orchestrator over already opened stores.
    pub fn with_stores(
        config: MigrationConfig,
        source: Arc<dyn SourceStore>,
        target: Arc<dyn TargetStore>,
    ) -> Self {
        Self {
            config,
            source,
            target,
        }
    }

    /// Run the configured phase selection.
    ///
    /// The result is built whether or not the run succeeds; the error, if
    /// any, is returned next to it.
    pub async fn run(&self, cancel: CancellationToken) -> (MigrationResult, Result<()>) {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!(
            "Starting migration run {} (phase {}{})",
            run_id,
            self.config.phase,
            if self.config.dry_run { ", dry-run" } else { "" }
        );

        let (state, outcome) = match PhaseSelection::parse(&self.config.phase).and_then(|s| s.plan()) {
            Ok(plan) => {
                let mut state = RunState::new(&plan);
                let outcome = self.execute(&mut state, cancel).await;
                (state, outcome)
            }
            Err(e) => (RunState::new(&[]), Err(e)),
        };

        let completed_at = Utc::now();
        let result = self.summarize(run_id, started_at, completed_at, state, &outcome);
        info!(
            "Migration {}: processed {}, written {}, skipped {} rows in {:.1}s",
            result.status,
            result.rows_processed,
            result.rows_written,
            result.rows_skipped,
            result.duration_seconds
        );
        (result, outcome)
    }

    async fn execute(&self, state: &mut RunState, cancel: CancellationToken) -> Result<()> {
        let ctx = PhaseContext {
            source: self.source.as_ref(),
            target: self.target.as_ref(),
            transfer: TransferConfig {
                dry_run: self.config.dry_run,
                progress_every: self.config.progress_every,
                progress_interval: self.config.progress_interval(),
                log_limit: self.config.missing_log_limit,
            },
            control: RunControl::new(cancel).with_max_duration(self.config.max_duration()),
        };

        let plan: Vec<_> = state.phases().iter().map(|p| p.phase).collect();
        for phase in plan {
            ctx.control.check()?;
            state.start(phase)?;

            let span = info_span!("phase", name = phase.name());
            match phase.run(&ctx).instrument(span).await {
                Ok(tables) => state.complete(phase, tables)?,
                Err(e) => {
                    let e = e.in_phase(phase.name());
                    error!("Phase {} failed: {}", phase, e);
                    state.fail(phase, &e)?;
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn summarize(
        &self,
        run_id: String,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        state: RunState,
        outcome: &Result<()>,
    ) -> MigrationResult {
        let status = match outcome {
            Ok(()) => "completed",
            Err(e) if e.is_abort() => "cancelled",
            Err(_) => "failed",
        };

        let phases = state.into_phases();
        let tables = phases.iter().flat_map(|p| p.tables.iter());
        let (mut processed, mut written, mut skipped, mut warnings) = (0, 0, 0, 0);
        for t in tables {
            processed += t.processed;
            written += t.written;
            skipped += t.skipped;
            warnings += t.warnings.values().sum::<u64>();
        }

        MigrationResult {
            run_id,
            phase: self.config.phase.clone(),
            status: status.to_string(),
            dry_run: self.config.dry_run,
            started_at,
            completed_at,
            duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
            phases,
            rows_processed: processed,
            rows_written: written,
            rows_skipped: skipped,
            warnings,
            error: outcome.as_ref().err().map(|e| e.to_string()),
        }
    }
}
