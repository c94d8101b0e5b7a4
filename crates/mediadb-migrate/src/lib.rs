//! # mediadb-migrate
//!
//! Migration engine from the legacy `mediadb` PostgreSQL schema to the
//! normalized `movies` schema.
//!
//! The work is split into independently invocable phases:
//!
//! - **refs**: lookup tables (countries, languages, genres, ...) matched by name
//! - **core-person / core-title**: persons and titles, legacy ids carried over
//! - **junctions-\***: title junction tables, legacy reference ids resolved
//!   through natural keys
//!
//! Every table is loaded in one write unit, every write is an idempotent
//! upsert, and a dry-run reads and transcodes without writing.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mediadb_migrate::{MigrationConfig, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> mediadb_migrate::Result<()> {
//!     let config = MigrationConfig::load("migrate.yaml")?;
//!     let orchestrator = Orchestrator::new(config).await?;
//!     let (result, outcome) = orchestrator.run(CancellationToken::new()).await;
//!     outcome?;
//!     println!("Wrote {} rows", result.rows_written);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod control;
pub mod core;
pub mod error;
pub mod orchestrator;
pub mod phases;
pub mod resolve;
pub mod state;
pub mod store;
pub mod transcode;
pub mod transfer;

// Re-exports for convenient access
pub use config::MigrationConfig;
pub use control::RunControl;
pub use error::{MigrateError, Result};
pub use orchestrator::{MigrationResult, Orchestrator};
pub use phases::{Phase, PhaseSelection};
pub use transfer::{LoadStats, TransferConfig};
