use std::fs::OpenOptions;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tactex_device::{spawn_reader, ActuatorChannel, ForceSampler};
use tactex_experiment::{
    ExperimentConfig, ForceLog, ForceProbe, OutcomeRecorder, Sequencer, SessionContext,
    SessionReport,
};
use tactex_timing::HighPrecisionTimer;
use tracing::{error, info, warn};

use crate::input::spawn_key_reader;
use crate::Args;

const UNKNOWN_PARTICIPANT: &str = "unknown_participant";

/// Where one session's files go
#[derive(Debug, Clone, PartialEq)]
pub struct SessionPaths {
    pub outcomes: PathBuf,
    /// Shared by every session of the participant; appended to
    pub force: PathBuf,
    pub summary: PathBuf,
}

impl SessionPaths {
    pub fn new(data_dir: &Path, participant: &str, stamp: &str) -> Self {
        let session = format!("participant_{participant}_{stamp}");
        Self {
            outcomes: data_dir.join(format!("{session}.csv")),
            force: data_dir.join(format!("{participant}_tap_force_data.csv")),
            summary: data_dir.join(format!("{session}_summary.json")),
        }
    }
}

/// Keep names filesystem-safe: letters, digits, `-` and `_` survive.
pub fn sanitize_participant(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        UNKNOWN_PARTICIPANT.to_string()
    } else {
        cleaned
    }
}

pub struct App {
    config: ExperimentConfig,
    participant: String,
    paths: SessionPaths,
    port: Option<PathBuf>,
    interrupt: Arc<AtomicBool>,
}

impl App {
    pub fn new(args: Args, interrupt: Arc<AtomicBool>) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => ExperimentConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => ExperimentConfig::default(),
        };
        if let Some(order) = args.order {
            config.order = order.into();
        }
        if let Some(mode) = args.sampling {
            config.sampling.mode = mode.into();
        }
        if args.seed.is_some() {
            config.seed = args.seed;
        }
        config.validate().context("Invalid experiment config")?;

        let participant = match args.participant {
            Some(name) => sanitize_participant(&name),
            None => prompt_participant().context("Failed to read participant name")?,
        };
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
        let paths = SessionPaths::new(&args.data_dir, &participant, &stamp);
        info!(
            %participant,
            outcomes = %paths.outcomes.display(),
            total_trials = config.total_trials(),
            "session prepared"
        );

        Ok(Self {
            config,
            participant,
            paths,
            port: args.port,
            interrupt,
        })
    }

    /// Run the session to completion or interrupt, then write the summary.
    pub fn run(self) -> Result<SessionReport> {
        let (actuator, sampler) = self.open_device();
        let force = ForceProbe::new(
            sampler,
            &self.config.sampling,
            self.config.timing.inter_tap_gap(),
        )
        .context("Failed to start force sampling")?;
        let outcomes = OutcomeRecorder::create(&self.paths.outcomes, self.config.labels)
            .context("Failed to create outcome log")?;
        let force_log = match ForceLog::append(&self.paths.force) {
            Ok(log) => Some(log),
            Err(e) => {
                warn!(error = %e, "force log unavailable; taps will not be recorded");
                None
            }
        };
        let context = SessionContext {
            actuator,
            force,
            outcomes,
            force_log,
        };

        let keys = spawn_key_reader(BufReader::new(io::stdin()), self.interrupt.clone())
            .context("Failed to start key reader")?;
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        println!("=== TACTILE THRESHOLD EXPERIMENT ===");
        println!("Answer each tap pair with l (first) or r (second), then Enter.");
        println!("In the back-and-forth condition, press u when ready to move back.");
        println!("Press Ctrl+C to stop; data so far is kept.\n");

        let session = Sequencer::with_quest(
            self.config,
            self.participant,
            HighPrecisionTimer::new(),
            keys,
            context,
            &mut rng,
        )
        .context("Failed to set up session")?;
        let report = session.run();

        match report.summary.write(&self.paths.summary) {
            Ok(()) => info!(path = %self.paths.summary.display(), "summary written"),
            Err(e) => error!(error = %e, "failed to write session summary"),
        }
        Ok(report)
    }

    /// Open the serial link for both directions, or run without hardware.
    fn open_device(&self) -> (ActuatorChannel, ForceSampler) {
        let policy = self.config.sampling.mode.policy();
        let disconnected = || (ActuatorChannel::disconnected(), ForceSampler::disconnected(policy));

        let Some(port) = &self.port else {
            warn!("no serial port given; running without hardware");
            return disconnected();
        };
        let file = match OpenOptions::new().read(true).write(true).open(port) {
            Ok(file) => file,
            Err(e) => {
                warn!(port = %port.display(), error = %e, "could not open serial port; running without hardware");
                return disconnected();
            }
        };
        let lines = match file.try_clone().and_then(spawn_reader) {
            Ok(lines) => lines,
            Err(e) => {
                warn!(error = %e, "could not read from serial port; force data disabled");
                return (ActuatorChannel::new(Box::new(file)), ForceSampler::disconnected(policy));
            }
        };
        info!(port = %port.display(), "serial link open");
        (
            ActuatorChannel::new(Box::new(file)),
            ForceSampler::new(Box::new(lines), policy, self.config.timing.poll_interval()),
        )
    }
}

fn prompt_participant() -> io::Result<String> {
    print!("Enter participant name: ");
    io::stdout().flush()?;
    let mut name = String::new();
    io::stdin().lock().read_line(&mut name)?;
    Ok(sanitize_participant(&name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_made_safe() {
        assert_eq!(sanitize_participant("  Ada L. "), "Ada_L_");
        assert_eq!(sanitize_participant("p-01_b"), "p-01_b");
        assert_eq!(sanitize_participant("../x"), "___x");
        assert_eq!(sanitize_participant("   "), UNKNOWN_PARTICIPANT);
    }

    #[test]
    fn session_files_share_the_data_dir() {
        let paths = SessionPaths::new(Path::new("data"), "p01", "20240102-030405");
        assert_eq!(
            paths.outcomes,
            Path::new("data/participant_p01_20240102-030405.csv")
        );
        assert_eq!(paths.force, Path::new("data/p01_tap_force_data.csv"));
        assert_eq!(
            paths.summary,
            Path::new("data/participant_p01_20240102-030405_summary.json")
        );
    }
}
