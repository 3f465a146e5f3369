mod config;
mod logging;
mod run_report;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;
use uuid::Uuid;

use config::{ConfigError, Overrides};
use logging::{LoggingError, init_logging};
use pasarport_core::Error as StoreError;
use pasarport_mysql::{MySqlSourceExtractor, MySqlTargetStore};
use pasarport_pipeline::{MigrationEngine, PipelineError, render_summary};
use run_report::{RunReport, write_report};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("logging error: {0}")]
    Logging(#[from] LoggingError),
    #[error("database error: {0}")]
    Store(#[from] StoreError),
    #[error("migration failed: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Parser, Debug)]
#[command(
    name = "pasarport",
    version,
    about = "Migrate a Marzneshin database into PasarGuard"
)]
struct Cli {
    /// TOML file with [source], [target] and [migration] sections.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Additional tables to skip (comma separated).
    #[arg(long, value_name = "TABLES", value_delimiter = ',')]
    exclude_tables: Vec<String>,
    /// Keep at most this many newest rows of large usage tables (0 = no cap).
    #[arg(long, value_name = "ROWS")]
    max_usage_rows: Option<u64>,
    /// Rows per INSERT statement.
    #[arg(long, value_name = "ROWS")]
    batch_size: Option<usize>,
    /// Skip the confirmation prompt.
    #[arg(short = 'y', long)]
    yes: bool,
    /// Load into the target without clearing it first.
    #[arg(long)]
    no_clear: bool,
    /// Do not write alembic_version after loading.
    #[arg(long)]
    skip_alembic: bool,
    /// Alembic revision stamped on the target.
    #[arg(long, value_name = "REVISION")]
    alembic_version: Option<String>,
    /// Write a JSON run report to this path.
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
    /// debug, info, warning or error.
    #[arg(long, default_value = "info")]
    log_level: String,
    /// Also append JSON log lines to this file.
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    init_logging(&cli.log_level, cli.log_file.as_deref())?;

    let overrides = Overrides {
        exclude_tables: cli.exclude_tables.clone(),
        max_usage_rows: cli.max_usage_rows,
        batch_size: cli.batch_size,
        no_clear: cli.no_clear,
        skip_alembic: cli.skip_alembic,
        alembic_version: cli.alembic_version.clone(),
    };
    let settings = config::load(
        cli.config.as_deref(),
        |key| std::env::var(key).ok(),
        &overrides,
    )?;

    tracing::info!(
        source = %settings.source,
        target = %settings.target,
        excluded = settings.migration.excluded_tables.len(),
        "configuration loaded"
    );

    if settings.migration.clear_target && !cli.yes && !confirm()? {
        tracing::info!("migration cancelled");
        return Ok(());
    }

    let run_id = Uuid::new_v4().to_string();
    let started_at = chrono::Utc::now();

    let mut source = MySqlSourceExtractor::connect(&settings.source.connect_options(), "marzneshin")
        .await?
        .with_max_usage_rows(settings.migration.max_usage_rows);
    let mut target =
        match MySqlTargetStore::connect(settings.target.connect_options(), "pasarguard").await {
            Ok(target) => target,
            Err(err) => {
                close_quietly("marzneshin", source.close().await);
                return Err(err.into());
            }
        };

    let engine = MigrationEngine::new(settings.migration.engine_options());
    let outcome = engine.run(&mut source, &mut target).await;

    close_quietly("marzneshin", source.close().await);
    close_quietly("pasarguard", target.close().await);

    let statistics = outcome?;
    println!("{}", render_summary(&statistics));

    if let Some(path) = &cli.report {
        let report = RunReport {
            run_id,
            started_at,
            finished_at: chrono::Utc::now(),
            source: settings.source.to_string(),
            target: settings.target.to_string(),
            options: &settings.migration,
            totals: statistics.totals(),
            statistics: &statistics,
        };
        write_report(path, &report)?;
        tracing::info!(path = %path.display(), "run report written");
    }

    Ok(())
}

fn confirm() -> io::Result<bool> {
    let mut stdout = io::stdout();
    write!(
        stdout,
        "This will delete ALL data in Pasarguard. Continue? [y/N] "
    )?;
    stdout.flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn close_quietly(label: &str, result: Result<(), StoreError>) {
    if let Err(err) = result {
        tracing::warn!(database = %label, error = %err, "closing connection failed");
    }
}
