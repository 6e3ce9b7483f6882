//! deskd - virtual desktop lifecycle daemon.
//!
//! Runs the schedule controller and the auto-termination sweeper, either
//! as a long-lived daemon (`deskd run`) or as one-shot invocations
//! (`deskd pass`, `deskd sweep`) for cron-style setups.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{LevelFilter, info};

use deskd::config::Settings;
use deskd::controller::LifecycleController;
use deskd::db::Database;
use deskd::executor::ActionExecutor;
use deskd::fleet::AwsCli;
use deskd::session::SessionRepository;
use deskd::sweeper::TerminationSweeper;
use deskd::telemetry::{RetryPolicy, TelemetryCollector};

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "Error: {err:?}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

#[tokio::main]
async fn try_main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let settings = Settings::load(cli.config.as_deref()).context("loading configuration")?;
    let daemon = Daemon::build(settings).await?;

    match cli.command {
        Command::Run => daemon.run().await,
        Command::Pass => {
            daemon.controller.run_pass().await?;
            Ok(())
        }
        Command::Sweep => {
            let terminated = daemon.sweeper.run_sweep().await?;
            info!("sweep finished, {terminated} session(s) terminated");
            Ok(())
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "deskd",
    author,
    version,
    about = "Virtual desktop lifecycle daemon - schedule-driven start, idle stop, and retention-based teardown."
)]
struct Cli {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true, env = "DESKD_CONFIG")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the controller and sweeper as a long-lived daemon
    Run,

    /// Run a single controller pass and exit
    Pass,

    /// Run a single auto-termination sweep and exit
    Sweep,
}

fn init_logging(cli: &Cli) {
    let level = if cli.quiet {
        LevelFilter::Error
    } else {
        match cli.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.filter_level(level);
    builder.try_init().ok();
}

/// Fully wired daemon components.
struct Daemon {
    controller: Arc<LifecycleController>,
    sweeper: Arc<TerminationSweeper>,
    pass_interval_secs: u64,
    sweep_interval_secs: u64,
}

impl Daemon {
    async fn build(settings: Settings) -> Result<Self> {
        let db_path = settings.resolved_database_path();
        info!("opening session database at {}", db_path.display());
        let database = Database::open(&db_path).await?;
        let store = Arc::new(SessionRepository::new(database.pool().clone()));

        let aws = Arc::new(AwsCli::new(
            settings.aws.binary.clone().unwrap_or_else(|| "aws".to_string()),
            settings.aws.region.clone(),
            settings.aws.profile.clone(),
        ));

        let executor = ActionExecutor::new(aws.clone(), store.clone());
        let collector = TelemetryCollector::new(
            aws,
            RetryPolicy {
                interval: Duration::from_secs(settings.poll_interval_secs),
                max_attempts: settings.poll_max_attempts,
            },
        );

        let controller = Arc::new(LifecycleController::new(
            store.clone(),
            executor.clone(),
            collector,
            settings.clone(),
        ));
        let sweeper = Arc::new(TerminationSweeper::new(store, executor, settings.clone()));

        Ok(Self {
            controller,
            sweeper,
            pass_interval_secs: settings.pass_interval_secs,
            sweep_interval_secs: settings.sweep_interval_secs,
        })
    }

    /// Run both periodic tasks until interrupted.
    async fn run(self) -> Result<()> {
        let controller_task = self.controller.start_schedule_task(self.pass_interval_secs);
        let sweeper_task = self.sweeper.start_sweep_task(self.sweep_interval_secs);

        tokio::signal::ctrl_c()
            .await
            .context("listening for shutdown signal")?;
        info!("shutdown signal received, stopping");

        controller_task.abort();
        sweeper_task.abort();
        Ok(())
    }
}
