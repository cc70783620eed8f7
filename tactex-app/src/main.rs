//! Tactile threshold experiment runner (tactex)
//!
//! Drives the actuator over a serial link, reads the force sensor on the same
//! link, and runs the adaptive two-tap discrimination session from the
//! terminal.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tactex_experiment::{SamplingMode, TrialOrder};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod app;
mod input;

use app::App;

/// Command-line arguments for tactex
#[derive(Parser, Debug)]
#[command(name = "tactex")]
#[command(about = "Adaptive tactile threshold experiment")]
#[command(version)]
pub struct Args {
    /// Serial device of the actuator and force sensor; runs without hardware when absent
    #[arg(short, long, env = "TACTEX_PORT")]
    pub port: Option<PathBuf>,

    /// Experiment config (TOML); built-in defaults when absent
    #[arg(short, long, env = "TACTEX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Participant name; prompted for when absent
    #[arg(long)]
    pub participant: Option<String>,

    /// Directory for the outcome, force and summary files
    #[arg(short, long, default_value = "./data", env = "TACTEX_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Trial ordering, overriding the config
    #[arg(long, value_enum)]
    pub order: Option<OrderArg>,

    /// Force sampling mode, overriding the config
    #[arg(long, value_enum)]
    pub sampling: Option<SamplingArg>,

    /// Seed for the trial order, overriding the config
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum OrderArg {
    FullShuffle,
    ShuffledConditions,
}

impl From<OrderArg> for TrialOrder {
    fn from(arg: OrderArg) -> Self {
        match arg {
            OrderArg::FullShuffle => TrialOrder::FullShuffle,
            OrderArg::ShuffledConditions => TrialOrder::ShuffledConditions,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum SamplingArg {
    Inline,
    Background,
}

impl From<SamplingArg> for SamplingMode {
    fn from(arg: SamplingArg) -> Self {
        match arg {
            SamplingArg::Inline => SamplingMode::Inline,
            SamplingArg::Background => SamplingMode::Background,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tactex=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    info!(
        platform = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        "starting tactex"
    );

    let interrupt = Arc::new(AtomicBool::new(false));
    tokio::spawn(interrupt_on_signal(interrupt.clone()));

    let report = tokio::task::spawn_blocking(move || App::new(args, interrupt)?.run())
        .await
        .context("session task panicked")??;

    info!(
        end = ?report.end,
        trials = report.trials_run,
        rows = report.rows_written,
        "session finished"
    );
    Ok(())
}

/// Raise the interrupt flag on Ctrl+C or SIGTERM; the session polls it.
async fn interrupt_on_signal(interrupt: Arc<AtomicBool>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, stopping after the current step"),
        _ = terminate => info!("received terminate signal, stopping after the current step"),
    }
    interrupt.store(true, Ordering::SeqCst);
}
