//! Configuration validation.

use super::MigrationConfig;
use crate::error::{MigrateError, Result};
use crate::phases::PhaseSelection;

/// Validate the configuration. Runs before any connection attempt.
pub fn validate(config: &MigrationConfig) -> Result<()> {
    if config.old_dsn.trim().is_empty() {
        return Err(MigrateError::Config(
            "old database DSN is required (-old or OLD_DB_DSN)".into(),
        ));
    }
    if config.new_dsn.trim().is_empty() {
        return Err(MigrateError::Config(
            "new database DSN is required (-new or NEW_DB_DSN)".into(),
        ));
    }

    // Cannot migrate a database onto itself
    if config.old_dsn.trim() == config.new_dsn.trim() {
        return Err(MigrateError::Config(
            "old and new DSN point at the same database".into(),
        ));
    }

    PhaseSelection::parse(&config.phase)?;

    if config.progress_every == 0 {
        return Err(MigrateError::Config(
            "progress_every must be at least 1".into(),
        ));
    }
    if config.max_connections == 0 {
        return Err(MigrateError::Config(
            "max_connections must be at least 1".into(),
        ));
    }

    Ok(())
}
