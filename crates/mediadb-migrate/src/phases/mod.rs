//! Phase catalog.
//!
//! A phase is one independently invocable unit of the migration. The
//! catalog order below is also the execution order: reference data, then
//! persons and titles, then the title junctions.
//!
//! Dependencies are an ordering contract between phases of one plan. They
//! are not checked against the target database; an operator running a
//! single phase is expected to have run its dependencies before.

mod alias;
mod junctions;
mod person;
pub mod refs;
mod title;

use std::fmt;

use serde::Serialize;

use crate::control::RunControl;
use crate::core::{SourceStore, TargetStore};
use crate::error::{MigrateError, Result};
use crate::transfer::{LoadStats, TransferConfig};

/// Everything a phase needs to run.
pub struct PhaseContext<'a> {
    pub source: &'a dyn SourceStore,
    pub target: &'a dyn TargetStore,
    pub transfer: TransferConfig,
    pub control: RunControl,
}

/// One unit of migration work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Refs,
    CorePerson,
    CoreTitle,
    JunctionsCountry,
    JunctionsLanguage,
    JunctionsGenre,
    JunctionsAlias,
    JunctionsCertificate,
}

impl Phase {
    /// Every phase in execution order.
    pub const ALL: [Phase; 8] = [
        Phase::Refs,
        Phase::CorePerson,
        Phase::CoreTitle,
        Phase::JunctionsCountry,
        Phase::JunctionsLanguage,
        Phase::JunctionsGenre,
        Phase::JunctionsAlias,
        Phase::JunctionsCertificate,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Phase::Refs => "refs",
            Phase::CorePerson => "core-person",
            Phase::CoreTitle => "core-title",
            Phase::JunctionsCountry => "junctions-country",
            Phase::JunctionsLanguage => "junctions-language",
            Phase::JunctionsGenre => "junctions-genre",
            Phase::JunctionsAlias => "junctions-alias",
            Phase::JunctionsCertificate => "junctions-certificate",
        }
    }

    /// Phases whose output this phase reads.
    pub fn dependencies(self) -> &'static [Phase] {
        match self {
            Phase::Refs | Phase::CorePerson | Phase::CoreTitle => &[],
            Phase::JunctionsCountry
            | Phase::JunctionsLanguage
            | Phase::JunctionsGenre
            | Phase::JunctionsCertificate => &[Phase::Refs, Phase::CoreTitle],
            // Resolved through title.imdb_id, not through a reference table.
            Phase::JunctionsAlias => &[Phase::CoreTitle],
        }
    }

    /// Execute the phase; returns per-table counts.
    pub async fn run(self, ctx: &PhaseContext<'_>) -> Result<Vec<LoadStats>> {
        match self {
            Phase::Refs => refs::run(ctx).await,
            Phase::CorePerson => person::run(ctx).await,
            Phase::CoreTitle => title::run(ctx).await,
            Phase::JunctionsCountry => junctions::run_country(ctx).await,
            Phase::JunctionsLanguage => junctions::run_language(ctx).await,
            Phase::JunctionsGenre => junctions::run_genre(ctx).await,
            Phase::JunctionsAlias => alias::run(ctx).await,
            Phase::JunctionsCertificate => junctions::run_certificate(ctx).await,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Phases chosen by name on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseSelection {
    name: String,
    phases: Vec<Phase>,
}

impl PhaseSelection {
    /// Names accepted by [`PhaseSelection::parse`], composites included.
    pub const NAMES: [&'static str; 10] = [
        "refs",
        "core",
        "core-person",
        "core-title",
        "junctions",
        "junctions-country",
        "junctions-language",
        "junctions-genre",
        "junctions-alias",
        "junctions-certificate",
    ];

    /// Resolve a phase or composite name.
    pub fn parse(name: &str) -> Result<Self> {
        let key = name.trim();
        let phases = match key {
            "core" => vec![Phase::CorePerson, Phase::CoreTitle],
            "junctions" => vec![
                Phase::JunctionsCountry,
                Phase::JunctionsLanguage,
                Phase::JunctionsGenre,
                Phase::JunctionsAlias,
                Phase::JunctionsCertificate,
            ],
            _ => match Phase::ALL.iter().find(|p| p.name() == key) {
                Some(p) => vec![*p],
                None => return Err(MigrateError::UnknownPhase(name.to_string())),
            },
        };
        Ok(Self {
            name: key.to_string(),
            phases,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Order the selected phases so every dependency inside the selection
    /// runs first; ties keep catalog order.
    pub fn plan(&self) -> Result<Vec<Phase>> {
        let mut pending: Vec<Phase> = self.phases.clone();
        pending.sort();
        pending.dedup();

        let mut plan = Vec::with_capacity(pending.len());
        while !pending.is_empty() {
            let ready = pending.iter().position(|p| {
                p.dependencies()
                    .iter()
                    .all(|d| !pending.contains(d) || plan.contains(d))
                    && !plan.contains(p)
            });
            match ready {
                Some(idx) => plan.push(pending.remove(idx)),
                None => {
                    return Err(MigrateError::State(format!(
                        "dependency cycle among phases {:?}",
                        pending
                    )))
                }
            }
        }
        Ok(plan)
    }
}
