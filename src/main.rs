//! # Harble CLI (`harble`)
//!
//! ## Usage
//!
//! ```bash
//! harble --config ./config/harble.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `harble serve` | Run the recurring check with an interactive console |
//! | `harble check` | Run one revision check and exit |
//! | `harble status` | Print last-checked revisions and cached artifacts |

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use harble::config::{self, LoggingConfig};
use harble::console::{self, CommandRegistry, ConsoleContext};
use harble::job::RevisionMonitorJob;
use harble::scheduler::JobScheduler;
use harble::status;

/// Harble: watches hotel client revisions and caches their message catalogs.
#[derive(Parser)]
#[command(name = "harble", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/harble.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the recurring revision check and the operator console.
    ///
    /// Console commands: `check`, `rc <cadence>`, `status`, `help`,
    /// `exit [wait]`.
    Serve {
        /// Skip the check normally run at startup.
        #[arg(long)]
        no_initial_check: bool,
    },

    /// Run one revision check and exit.
    Check,

    /// Show the last-checked revision per environment and the cache contents.
    Status,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if logging.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    init_tracing(&cfg.logging);

    match cli.command {
        Commands::Serve { no_initial_check } => {
            let job = Arc::new(RevisionMonitorJob::from_config(&cfg)?);
            let cadence = cfg.cadence()?;
            let scheduler = Arc::new(JobScheduler::start(job.clone(), cadence));

            let next = scheduler.next_fire_time().await?;
            println!(
                "Upcoming Revision Check: {}",
                next.format("%m/%d/%Y %H:%M:%S GMT")
            );
            if cfg.schedule.run_on_start && !no_initial_check {
                scheduler.run_once()?;
            }

            let ctx = ConsoleContext {
                scheduler: scheduler.clone(),
                state: job.state().clone(),
                cache: job.cache().clone(),
            };
            let registry = CommandRegistry::with_builtins();
            console::run_console(&registry, &ctx).await?;

            // Input closed without `exit`: let a running check finish.
            scheduler.shutdown(true).await;
            info!("bye");
        }
        Commands::Check => {
            let job = RevisionMonitorJob::from_config(&cfg)?;
            let report = job.run().await.context("revision check aborted")?;
            print!("{}", report);
            println!("ok");
        }
        Commands::Status => {
            status::run_status(&cfg)?;
        }
    }

    Ok(())
}
