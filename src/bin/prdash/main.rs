mod display;
mod opener;
mod tui;

use std::{fs::File, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result, bail};
use clap::Parser;
use prdash::{
    AccountsSource, Aggregator, EnvSecrets, GitHub, Scheduler, Settings, scheduler::NoticeLevel,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{display::display_snapshot, opener::SystemOpener};

// Human-readable build info (for clap version display)
const BUILD_INFO_HUMAN: &str = env!("BUILD_INFO_HUMAN");

const DEFAULT_LOG_FILE: &str = "prdash.log";

#[derive(Parser)]
#[command(name = "prdash")]
#[command(
    about = "Read-only dashboard of the GitHub pull requests that need you, across every account you use"
)]
#[command(long_version = BUILD_INFO_HUMAN)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short = 'c', long = "config", default_value = "config.toml")]
    config: PathBuf,

    /// Refresh interval in seconds (overrides the config file)
    #[arg(long = "interval", value_name = "SECS")]
    interval: Option<u64>,

    /// Fetch once, print the table and exit
    #[arg(long)]
    once: bool,

    /// Log file used by the interactive dashboard
    #[arg(long = "log-file", value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn init_tracing(cli: &Cli) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let default_level = if cli.debug { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if cli.once {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .with(filter)
            .init();
        return Ok(());
    }

    // The dashboard owns the terminal, so logs go to a file.
    let path = cli
        .log_file
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_LOG_FILE));
    let file = File::create(&path)
        .with_context(|| format!("failed to create log file {}", path.display()))?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file)),
        )
        .with(filter)
        .init();
    Ok(())
}

async fn run_once(aggregator: Aggregator<GitHub>, settings: &Settings) -> Result<()> {
    for warning in &settings.warnings {
        eprintln!("Warning: {warning}");
    }

    let snapshot = aggregator
        .gather(&settings.accounts)
        .await
        .context("no data could be fetched")?;

    display_snapshot(&snapshot, &mut std::io::stdout())
}

async fn run_dashboard(aggregator: Aggregator<GitHub>, settings: Settings) -> Result<()> {
    let source = Arc::new(AccountsSource::new(aggregator, settings.accounts));
    let (scheduler, state_rx) = Scheduler::new(source, settings.refresh_interval);
    for warning in &settings.warnings {
        scheduler.notify(NoticeLevel::Warning, format!("config: {warning}"));
    }

    let (trigger_tx, trigger_rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let scheduler_task = tokio::spawn(scheduler.run(trigger_rx, cancel.clone()));

    let result = tui::run_tui(state_rx, trigger_tx, &SystemOpener).await;

    cancel.cancel();
    if let Err(e) = scheduler_task.await {
        tracing::warn!(error = %e, "scheduler task ended abnormally");
    }

    result
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    let mut settings = Settings::load(&cli.config, &EnvSecrets)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;

    if let Some(secs) = cli.interval {
        if secs == 0 {
            bail!("--interval must be at least 1 second");
        }
        settings.refresh_interval = Duration::from_secs(secs);
    }

    let forge = Arc::new(
        GitHub::new(settings.request_timeout).context("failed to initialise HTTP client")?,
    );
    let aggregator = Aggregator::new(forge, settings.max_concurrent_checks);

    if cli.once {
        run_once(aggregator, &settings).await
    } else {
        run_dashboard(aggregator, settings).await
    }
}
