//! Stint - work-session lifecycle and time-budget enforcement engine.
//!
//! The binary hosts the HTTP trigger surface and one-shot CLI sweeps;
//! all engine logic lives in the library.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

use stint::config::{StintConfig, CONFIG_FILE};
use stint::diagnostics::Diagnostics;
use stint::notify::LogSink;
use stint::server::{self, AppState};
use stint::store::SqliteStore;
use stint::sweep::{OverrunDetector, Reconciler, SweepReport};
use stint::StintError;

#[derive(Parser)]
#[command(name = "stint")]
#[command(version = "0.1.0")]
#[command(about = "Work-session time-budget enforcement engine", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (defaults to ./stint.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path (overrides the config file)
    #[arg(long, global = true, env = "STINT_DB")]
    database: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP trigger surface
    Serve {
        /// Bind address (overrides the config file)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run one sweep and print its report as JSON
    Sweep {
        #[command(subcommand)]
        which: SweepCommand,
    },

    /// Print open-session snapshots without mutating anything
    Diagnose,
}

#[derive(Subcommand)]
enum SweepCommand {
    /// Enforce time budgets on open sessions
    Overrun,
    /// Close open sessions whose task is already completed
    Stale,
    /// Force-close sessions older than the hard ceiling
    Ceiling,
    /// Close one named session
    Session {
        /// Session id to close
        id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        "stint=debug,info"
    } else {
        "stint=info,warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Err(err) = run(cli).await {
        eprintln!("{} {err}", "Error:".red().bold());
        std::process::exit(err.exit_code());
    }
}

async fn run(cli: Cli) -> stint::Result<()> {
    let config_path = cli
        .config
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
    let mut config = StintConfig::load(&config_path)?.with_env_overrides();
    if let Some(database) = cli.database {
        config.database = Some(database);
    }
    config.validate()?;

    let store = Arc::new(SqliteStore::open(&config.database_path())?);
    let sink = Arc::new(LogSink);

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            let state = Arc::new(AppState {
                store,
                sink,
                config,
            });
            server::serve(state).await.map_err(StintError::from)?;
        }

        Commands::Sweep { which } => {
            let report = match which {
                SweepCommand::Overrun => {
                    OverrunDetector::new(store, sink, &config)
                        .detect_and_enforce()
                        .await?
                }
                SweepCommand::Stale => {
                    Reconciler::new(store, sink, &config)
                        .close_stale_sessions()
                        .await?
                }
                SweepCommand::Ceiling => {
                    Reconciler::new(store, sink, &config)
                        .close_over_ceiling()
                        .await?
                }
                SweepCommand::Session { id } => {
                    Reconciler::new(store, sink, &config).close_one(&id).await?
                }
            };
            print_report(&report)?;
        }

        Commands::Diagnose => {
            let diagnostics = Diagnostics::new(store, config.budget);
            let snapshots = diagnostics.open_sessions().await?;
            if snapshots.is_empty() {
                println!("{}", "No open sessions".green());
            } else {
                let over_budget = snapshots.iter().filter(|s| s.exceeds_limit).count();
                println!(
                    "{} {} open session(s), {} over budget",
                    "Diagnostics:".cyan().bold(),
                    snapshots.len(),
                    over_budget
                );
                println!("{}", serde_json::to_string_pretty(&snapshots)?);
            }
        }
    }

    Ok(())
}

fn print_report(report: &SweepReport) -> stint::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}
