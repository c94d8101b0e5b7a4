//! In-memory run state: one status per planned phase.
//!
//! Nothing is persisted; a rerun starts from scratch and relies on the
//! idempotent upserts.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{MigrateError, Result};
use crate::phases::Phase;
use crate::transfer::LoadStats;

/// Phase lifecycle: `Pending -> Running -> {Completed, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl PhaseStatus {
    fn can_become(self, next: PhaseStatus) -> bool {
        matches!(
            (self, next),
            (PhaseStatus::Pending, PhaseStatus::Running)
                | (PhaseStatus::Running, PhaseStatus::Completed)
                | (PhaseStatus::Running, PhaseStatus::Failed)
        )
    }
}

/// State and counts of one planned phase.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseState {
    pub phase: Phase,
    pub status: PhaseStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub tables: Vec<LoadStats>,
    pub error: Option<String>,
}

impl PhaseState {
    fn new(phase: Phase) -> Self {
        Self {
            phase,
            status: PhaseStatus::Pending,
            started_at: None,
            completed_at: None,
            tables: Vec::new(),
            error: None,
        }
    }
}

/// Status of every phase in a plan, in plan order.
#[derive(Debug, Clone, Serialize)]
pub struct RunState {
    phases: Vec<PhaseState>,
}

impl RunState {
    pub fn new(plan: &[Phase]) -> Self {
        Self {
            phases: plan.iter().copied().map(PhaseState::new).collect(),
        }
    }

    pub fn phases(&self) -> &[PhaseState] {
        &self.phases
    }

    pub fn into_phases(self) -> Vec<PhaseState> {
        self.phases
    }

    pub fn status(&self, phase: Phase) -> Option<PhaseStatus> {
        self.phases.iter().find(|p| p.phase == phase).map(|p| p.status)
    }

    pub fn start(&mut self, phase: Phase) -> Result<()> {
        let state = self.transition(phase, PhaseStatus::Running)?;
        state.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn complete(&mut self, phase: Phase, tables: Vec<LoadStats>) -> Result<()> {
        let state = self.transition(phase, PhaseStatus::Completed)?;
        state.completed_at = Some(Utc::now());
        state.tables = tables;
        Ok(())
    }

    pub fn fail(&mut self, phase: Phase, error: &MigrateError) -> Result<()> {
        let state = self.transition(phase, PhaseStatus::Failed)?;
        state.completed_at = Some(Utc::now());
        state.error = Some(error.to_string());
        Ok(())
    }

    fn transition(&mut self, phase: Phase, next: PhaseStatus) -> Result<&mut PhaseState> {
        let state = self
            .phases
            .iter_mut()
            .find(|p| p.phase == phase)
            .ok_or_else(|| MigrateError::State(format!("phase {} is not in the plan", phase)))?;
        if !state.status.can_become(next) {
            return Err(MigrateError::State(format!(
                "phase {}: illegal transition {:?} -> {:?}",
                phase, state.status, next
            )));
        }
        state.status = next;
        Ok(state)
    }
}
