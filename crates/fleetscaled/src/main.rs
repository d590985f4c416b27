//! fleetscaled — the fleetscale daemon.
//!
//! Runs the autoscaling control loop against a Kubernetes deployment:
//! - `run`: one check, the cron job entry point
//! - `watch`: checks at a fixed cadence until Ctrl-C
//! - `observe`: print the current observation, change nothing
//! - `history`: print recent checks
//!
//! # Usage
//!
//! ```text
//! fleetscaled --config /etc/fleetscale/fleetscale.toml run
//! NAMESPACE=batch DEPLOYMENT_NAME=matrix-multiply fleetscaled watch --every 60
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use fleetscale_actuator::KubernetesOrchestrator;
use fleetscale_autoscale::ControlLoop;
use fleetscale_core::{FleetscaleConfig, PolicyStrategy};
use fleetscale_ledger::HistoryLedger;
use fleetscale_ledger::history::check_key;

#[derive(Parser)]
#[command(name = "fleetscaled", about = "fleetscale autoscaling daemon")]
struct Cli {
    /// Path to fleetscale.toml. Built-in defaults apply without one.
    #[arg(long, env = "FLEETSCALE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Namespace of the scaled deployment.
    #[arg(long, env = "NAMESPACE", global = true)]
    namespace: Option<String>,

    /// Name of the scaled deployment.
    #[arg(long, env = "DEPLOYMENT_NAME", global = true)]
    deployment: Option<String>,

    /// Decision strategy: local or delegated.
    #[arg(long, global = true)]
    strategy: Option<PolicyStrategy>,

    /// Log output format.
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Perform exactly one check.
    Run,

    /// Perform checks at a fixed cadence until interrupted.
    Watch {
        /// Seconds between checks. Defaults to samples.interval_secs.
        #[arg(long)]
        every: Option<u64>,
    },

    /// Aggregate the pending samples and print the observation as JSON.
    Observe,

    /// Print the most recent checks.
    History {
        #[arg(long, default_value = "10")]
        last: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = load_config(&cli)?;

    match cli.command {
        Command::Run => run_once(&config).await,
        Command::Watch { every } => {
            let interval = every.map(Duration::from_secs).unwrap_or(config.interval());
            run_watch(&config, interval).await
        }
        Command::Observe => observe(&config).await,
        Command::History { last } => print_history(&config, last),
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,fleetscale=debug,fleetscaled=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Read the config file (if any), apply CLI/env overrides, and validate.
fn load_config(cli: &Cli) -> anyhow::Result<FleetscaleConfig> {
    let mut config = match &cli.config {
        Some(path) => FleetscaleConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => FleetscaleConfig::default(),
    };

    if let Some(namespace) = &cli.namespace {
        config.fleet.namespace = namespace.clone();
    }
    if let Some(deployment) = &cli.deployment {
        config.fleet.deployment = deployment.clone();
    }
    if let Some(strategy) = cli.strategy {
        config.policy.strategy = strategy;
    }

    config.validate()?;
    Ok(config)
}

fn control_loop(config: &FleetscaleConfig) -> anyhow::Result<ControlLoop<KubernetesOrchestrator>> {
    let orchestrator = KubernetesOrchestrator::from_config(config)?;
    Ok(ControlLoop::new(config, orchestrator)?)
}

async fn run_once(config: &FleetscaleConfig) -> anyhow::Result<()> {
    let control = control_loop(config)?;
    let report = control.run_once().await?;
    info!(
        check = report.entry.check_number,
        action = %report.entry.decision,
        samples = report.metrics.sample_count,
        archived = report.archive.moved,
        "check complete"
    );
    Ok(())
}

async fn run_watch(config: &FleetscaleConfig, interval: Duration) -> anyhow::Result<()> {
    anyhow::ensure!(!interval.is_zero(), "--every must be positive");
    let control = control_loop(config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => error!(error = %e, "failed to listen for Ctrl-C"),
        }
        let _ = shutdown_tx.send(true);
    });

    control.run(interval, shutdown_rx).await;
    info!("fleetscaled stopped");
    Ok(())
}

async fn observe(config: &FleetscaleConfig) -> anyhow::Result<()> {
    let control = control_loop(config)?;
    let snapshot = control.observe().await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

fn print_history(config: &FleetscaleConfig, last: usize) -> anyhow::Result<()> {
    let history = HistoryLedger::new(config.samples.history_path()).load();
    let mut recent = serde_json::Map::new();
    for entry in history.recent(last) {
        recent.insert(check_key(entry.check_number), serde_json::to_value(&entry)?);
    }
    println!("{}", serde_json::to_string_pretty(&recent)?);
    Ok(())
}
