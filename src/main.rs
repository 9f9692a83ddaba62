use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spending_signals::{
    get_runs, load_csv, record_run, run_once, setup_database, Diagnostics, PipelineConfig,
    Validator,
};

#[derive(Parser)]
#[command(name = "spending-signals")]
#[command(version, about = "Anomaly, network and trend analysis of public spending", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full analysis once and print the report as JSON
    Run {
        /// Spending records (CSV with header row)
        csv: PathBuf,

        /// TOML configuration; defaults plus SPENDING_SIGNALS_* otherwise
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Record the run in this SQLite database
        #[arg(long)]
        db: Option<PathBuf>,

        /// Run the analysis stages on separate threads
        #[arg(long)]
        parallel: bool,

        /// Also write every report table as CSV into this directory
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Only validate the table and print the validation report
    Validate {
        /// Spending records (CSV with header row)
        csv: PathBuf,
    },

    /// List recorded runs
    History {
        /// Run-history database
        #[arg(long)]
        db: PathBuf,

        /// Number of runs to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing (stderr, so stdout stays machine-readable)
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Run {
            csv,
            config,
            db,
            parallel,
            out,
        } => cmd_run(&csv, config.as_deref(), db.as_deref(), parallel, out.as_deref()),
        Commands::Validate { csv } => cmd_validate(&csv),
        Commands::History { db, limit } => cmd_history(&db, limit),
    }
}

fn cmd_run(
    csv: &Path,
    config_path: Option<&Path>,
    db_path: Option<&Path>,
    parallel: bool,
    out_dir: Option<&Path>,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::from_env()?,
    };
    config.parallel |= parallel;

    let table = load_csv(csv)?;
    let mut diag = Diagnostics::new();
    let outcome = run_once(&table, &config, &mut diag);

    if let Some(db_path) = db_path {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
        setup_database(&conn)?;
        record_run(&conn, &diag, &table, &outcome)?;
    }
    diag.flush();

    let report = outcome?;

    if let Some(dir) = out_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        for table in report.tables() {
            let path = dir.join(format!("{}.csv", table.name));
            std::fs::write(&path, table.to_csv()?)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        tracing::info!(dir = %dir.display(), "report tables written");
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_validate(csv: &Path) -> Result<()> {
    let table = load_csv(csv)?;
    let mut diag = Diagnostics::new();
    let report = Validator::new().validate(&table, &mut diag)?;
    diag.flush();

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_history(db_path: &Path, limit: usize) -> Result<()> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
    setup_database(&conn)?;

    let runs = get_runs(&conn, limit)?;
    if runs.is_empty() {
        println!("No runs recorded in {}", db_path.display());
    }
    for run in runs {
        println!("{}", run.summary());
    }
    Ok(())
}
