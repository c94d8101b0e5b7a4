//! mediadb-migrate CLI - migrate the legacy mediadb schema into movies.

use clap::builder::BoolishValueParser;
use clap::Parser;
use mediadb_migrate::{MigrateError, MigrationConfig, MigrationResult, Orchestrator, Phase, PhaseSelection};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser, Debug)]
#[command(name = "mediadb-migrate")]
#[command(about = "Migrate the legacy mediadb schema into the movies schema, one phase at a time")]
#[command(version)]
struct Cli {
    /// Path to an optional YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Legacy (source) database DSN
    #[arg(long, env = "OLD_DB_DSN", hide_env_values = true)]
    old: Option<String>,

    /// Target database DSN
    #[arg(long, env = "NEW_DB_DSN", hide_env_values = true)]
    new: Option<String>,

    /// Phase or composite to run (see --list-phases)
    #[arg(long, env = "MIGRATION_PHASE")]
    phase: Option<String>,

    /// Read and transcode everything, write nothing
    #[arg(
        long,
        env = "DRY_RUN",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    dry_run: Option<bool>,

    /// Upper bound for the whole invocation in seconds (0 disables)
    #[arg(long)]
    max_duration_secs: Option<u64>,

    /// Log a progress line every N rows
    #[arg(long)]
    progress_every: Option<u64>,

    /// Print the phase catalog and exit
    #[arg(long)]
    list_phases: bool,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse_from(normalize_args(std::env::args()));

    if cli.list_phases {
        print_phases();
        return Ok(());
    }

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    let config = merge_config(&cli)?;
    config.validate()?;
    info!("Configuration: {:?}", config);

    let cancel_token = setup_signal_handler();
    let dry_run = config.dry_run;
    let orchestrator = Orchestrator::new(config).await?;
    let (result, outcome) = orchestrator.run(cancel_token).await;

    if cli.output_json {
        println!("{}", result.to_json()?);
    } else if outcome.is_ok() {
        print_summary(&result, dry_run);
    }
    outcome
}

/// Accept Go-style single-dash long flags (`-old`, `-dry-run=true`).
fn normalize_args<I: IntoIterator<Item = String>>(args: I) -> Vec<String> {
    args.into_iter()
        .enumerate()
        .map(|(i, arg)| {
            let single_dash_long = i > 0
                && arg.starts_with('-')
                && !arg.starts_with("--")
                && arg.len() > 2
                && arg[1..].starts_with(|c: char| c.is_ascii_alphabetic())
                && arg[1..].split('=').next().is_some_and(|name| name.len() > 1);
            if single_dash_long {
                format!("-{}", arg)
            } else {
                arg
            }
        })
        .collect()
}

/// Flag > environment > config file > default.
fn merge_config(cli: &Cli) -> Result<MigrationConfig, MigrateError> {
    let mut config = match &cli.config {
        Some(path) => {
            let config = MigrationConfig::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => MigrationConfig::default(),
    };

    if let Some(dsn) = &cli.old {
        config.old_dsn = dsn.clone();
    }
    if let Some(dsn) = &cli.new {
        config.new_dsn = dsn.clone();
    }
    if let Some(phase) = &cli.phase {
        config.phase = phase.clone();
    }
    if let Some(dry_run) = cli.dry_run {
        config.dry_run = dry_run;
    }
    if let Some(secs) = cli.max_duration_secs {
        config.max_duration_secs = secs;
    }
    if let Some(n) = cli.progress_every {
        config.progress_every = n;
    }
    Ok(config)
}

fn print_phases() {
    println!("Phases (in execution order):");
    for phase in Phase::ALL {
        let deps: Vec<_> = phase.dependencies().iter().map(|d| d.name()).collect();
        if deps.is_empty() {
            println!("  {}", phase);
        } else {
            println!("  {:<24} after {}", phase.name(), deps.join(", "));
        }
    }
    println!("Composites:");
    for name in PhaseSelection::NAMES {
        if let Ok(selection) = PhaseSelection::parse(name) {
            if selection.phases().len() > 1 {
                let members: Vec<_> = selection.phases().iter().map(|p| p.name()).collect();
                println!("  {:<24} {}", name, members.join(", "));
            }
        }
    }
}

fn print_summary(result: &MigrationResult, dry_run: bool) {
    let status_msg = if dry_run { "Dry run completed!" } else { "Migration completed!" };
    println!("\n{}", status_msg);
    println!("  Run ID: {}", result.run_id);
    println!("  Phase: {}", result.phase);
    println!("  Duration: {:.2}s", result.duration_seconds);
    for phase in &result.phases {
        for table in &phase.tables {
            println!(
                "  {:<32} processed {:>9}  written {:>9}  skipped {:>7}",
                table.table, table.processed, table.written, table.skipped
            );
            for (category, n) in &table.skips {
                println!("    skipped {} ({})", n, category);
            }
            for (category, n) in &table.warnings {
                println!("    warnings {} ({})", n, category);
            }
        }
    }
    println!(
        "  Rows: processed {}, written {}, skipped {}",
        result.rows_processed, result.rows_written, result.rows_skipped
    );
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(format!("unknown verbosity '{}'", other)),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("unknown log format '{}'", other)),
    }

    Ok(())
}

/// Cancel the run on SIGINT or SIGTERM; the engine stops at the next store
/// boundary and rolls back the open table.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        match signal(kind) {
            Ok(mut stream) => {
                tokio::spawn(async move {
                    stream.recv().await;
                    eprintln!("\nReceived {}. Stopping after the current statement...", name);
                    token.cancel();
                });
            }
            Err(e) => error!("Cannot install {} handler: {}", name, e),
        }
    }

    cancel_token
}

#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Stopping after the current statement...");
            token.cancel();
        }
    });

    cancel_token
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_single_dash_long_flags_normalized() {
        let out = normalize_args(args(&[
            "mediadb-migrate",
            "-old",
            "host=a",
            "-dry-run=true",
            "-c",
            "m.yaml",
            "--phase",
            "core",
        ]));
        assert_eq!(
            out,
            args(&[
                "mediadb-migrate",
                "--old",
                "host=a",
                "--dry-run=true",
                "-c",
                "m.yaml",
                "--phase",
                "core"
            ])
        );
    }

    #[test]
    fn test_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.yaml");
        std::fs::write(&path, "old_dsn: host=file\nphase: core\ndry_run: true\n").unwrap();

        let cli = Cli::parse_from([
            "mediadb-migrate",
            "--config",
            path.to_str().unwrap(),
            "--old",
            "host=flag",
            "--dry-run=false",
        ]);
        let config = merge_config(&cli).unwrap();
        assert_eq!(config.old_dsn, "host=flag");
        assert_eq!(config.phase, "core");
        assert!(!config.dry_run);
    }

    #[test]
    fn test_bare_dry_run_means_true() {
        let cli = Cli::parse_from(["mediadb-migrate", "--dry-run"]);
        assert_eq!(cli.dry_run, Some(true));
    }
}
