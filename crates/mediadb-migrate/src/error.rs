//! Error types for the migration library.

use std::time::Duration;
use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (missing DSN, invalid YAML values, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Phase name not present in the catalog
    #[error("Unknown phase '{0}'. Use --list-phases to see the recognized names")]
    UnknownPhase(String),

    /// Store could not be opened or pinged
    #[error("Cannot connect to {store} database: {message}")]
    Connection {
        store: &'static str,
        message: String,
    },

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Query, exec or commit failure reported by the store
    #[error("Database error while {context}: {source}")]
    Database {
        context: String,
        #[source]
        source: tokio_postgres::Error,
    },

    /// A source value did not have the expected shape
    #[error("Cannot decode column {column} ({name}): {message}")]
    Decode {
        column: usize,
        name: String,
        message: String,
    },

    /// Row-level unrecoverable failure inside a table load
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// A phase aborted; wraps the underlying cause
    #[error("Phase {phase} failed")]
    Phase {
        phase: String,
        #[source]
        source: Box<MigrateError>,
    },

    /// Illegal phase state transition
    #[error("State error: {0}")]
    State(String),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,

    /// The operator-supplied upper bound for the invocation elapsed
    #[error("Migration exceeded its maximum duration of {0:?}")]
    DeadlineExceeded(Duration),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl std::fmt::Display, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Database error with context about the failing operation
    pub fn database(context: impl Into<String>, source: tokio_postgres::Error) -> Self {
        MigrateError::Database {
            context: context.into(),
            source,
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Wrap an error as the failure of a named phase.
    ///
    /// Cancellation and deadline errors are passed through unchanged so the
    /// caller can still tell an operator abort from a data failure.
    pub fn in_phase(self, phase: impl Into<String>) -> Self {
        match self {
            MigrateError::Cancelled | MigrateError::DeadlineExceeded(_) => self,
            MigrateError::Phase { .. } => self,
            other => MigrateError::Phase {
                phase: phase.into(),
                source: Box::new(other),
            },
        }
    }

    /// True when the run was stopped by the operator or the deadline.
    pub fn is_abort(&self) -> bool {
        matches!(
            self,
            MigrateError::Cancelled | MigrateError::DeadlineExceeded(_)
        )
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_)
            | MigrateError::UnknownPhase(_)
            | MigrateError::Yaml(_)
            | MigrateError::Json(_) => 1,
            MigrateError::Connection { .. } | MigrateError::Pool { .. } => 2,
            MigrateError::Cancelled => 4,
            MigrateError::DeadlineExceeded(_) => 5,
            MigrateError::Io(_) => 7,
            _ => 3,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
