use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tactex_core::{BlockKey, Key, Motion, OutcomeResponse, Response, Trial, TrialOutcome};
use tactex_device::{ActuatorChannel, Command, ForceReading, ForceSampler, SamplingWorker, TapPhase};
use tactex_timing::{unix_timestamp, HighPrecisionTimer, Timer};
use tracing::{debug, error, info, warn};

use crate::config::{ExperimentConfig, SamplingConfig, SamplingMode};
use crate::quest::{Estimator, Quest};
use crate::recorder::{ForceLog, OutcomeRecorder, TapRecord};
use crate::response::ResponseSource;
use crate::summary::SessionSummary;
use crate::trial::generate_trials;
use crate::{EstimatorError, ResponseError, SessionError};

/// How force is read around each tap
pub enum ForceProbe<T: Timer = HighPrecisionTimer> {
    /// Blocking window right after the tap settles
    Inline {
        sampler: ForceSampler<T>,
        window: Duration,
    },
    /// Worker samples while the loop waits out the inter-tap gap
    Background {
        worker: SamplingWorker,
        window: Duration,
        gap: Duration,
    },
}

impl<T: Timer + 'static> ForceProbe<T> {
    pub fn new(
        sampler: ForceSampler<T>,
        sampling: &SamplingConfig,
        inter_tap_gap: Duration,
    ) -> Result<Self, SessionError> {
        let window = sampling.window();
        Ok(match sampling.mode {
            SamplingMode::Inline => ForceProbe::Inline { sampler, window },
            SamplingMode::Background => ForceProbe::Background {
                worker: SamplingWorker::spawn(sampler)?,
                window,
                gap: inter_tap_gap,
            },
        })
    }

    pub fn connected(&self) -> bool {
        match self {
            ForceProbe::Inline { sampler, .. } => sampler.connected(),
            ForceProbe::Background { worker, .. } => worker.connected(),
        }
    }

    fn clear_input(&mut self) {
        match self {
            ForceProbe::Inline { sampler, .. } => sampler.clear_input(),
            ForceProbe::Background { worker, .. } => {
                if let Err(e) = worker.clear_input() {
                    warn!(error = %e, "could not clear sensor input");
                }
            }
        }
    }
}

/// Everything a session talks to: the device link and the logs
pub struct SessionContext<T: Timer = HighPrecisionTimer> {
    pub actuator: ActuatorChannel,
    pub force: ForceProbe<T>,
    pub outcomes: OutcomeRecorder,
    pub force_log: Option<ForceLog>,
}

impl<T: Timer> SessionContext<T> {
    /// Flush and close the logs and release the device link.
    pub fn close(&mut self) {
        match self.outcomes.close() {
            Ok(()) => info!(rows = self.outcomes.rows(), "outcome log closed"),
            Err(e) => error!(error = %e, "failed to close outcome log"),
        }
        if let Some(log) = self.force_log.as_mut() {
            if let Err(e) = log.close() {
                error!(error = %e, "failed to close force log");
            }
        }
        self.actuator.close();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEnd {
    Completed,
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub end: SessionEnd,
    pub trials_run: usize,
    pub rows_written: usize,
    pub summary: SessionSummary,
}

/// Raised inside a trial when the participant or operator stops the session
struct Interrupted;

/// Runs the trial list one trial at a time
pub struct Sequencer<T, K, E>
where
    T: Timer,
    K: ResponseSource,
    E: Estimator,
{
    pub config: ExperimentConfig,
    pub participant: String,
    pub timer: T,
    pub keys: K,
    context: SessionContext<T>,
    trials: Vec<Trial>,
    estimators: BTreeMap<BlockKey, E>,
    specific_counters: HashMap<BlockKey, usize>,
    trials_run: usize,
}

impl<T, K> Sequencer<T, K, Quest>
where
    T: Timer + 'static,
    K: ResponseSource,
{
    /// A session with one QUEST estimator per block, built from `config.quest`.
    pub fn with_quest<R: Rng + ?Sized>(
        config: ExperimentConfig,
        participant: impl Into<String>,
        timer: T,
        keys: K,
        context: SessionContext<T>,
        rng: &mut R,
    ) -> Result<Self, SessionError> {
        let params = config.quest.clone();
        Self::new(config, participant, timer, keys, context, rng, |_| {
            Quest::new(params.clone())
        })
    }
}

impl<T, K, E> Sequencer<T, K, E>
where
    T: Timer + 'static,
    K: ResponseSource,
    E: Estimator,
{
    pub fn new<R, F>(
        config: ExperimentConfig,
        participant: impl Into<String>,
        timer: T,
        keys: K,
        context: SessionContext<T>,
        rng: &mut R,
        mut estimator_for: F,
    ) -> Result<Self, SessionError>
    where
        R: Rng + ?Sized,
        F: FnMut(&BlockKey) -> Result<E, EstimatorError>,
    {
        config.validate()?;

        let trials = generate_trials(
            &config.conditions,
            config.blocks_per_condition,
            config.trials_per_block,
            config.order,
            rng,
        );

        let mut estimators = BTreeMap::new();
        for condition in &config.conditions {
            for block in 1..=config.blocks_per_condition {
                let key = BlockKey {
                    condition: condition.id,
                    block,
                };
                estimators.insert(key, estimator_for(&key)?);
            }
        }
        info!(
            total = trials.len(),
            blocks = estimators.len(),
            order = ?config.order,
            "trials generated"
        );

        Ok(Self {
            config,
            participant: participant.into(),
            timer,
            keys,
            context,
            trials,
            estimators,
            specific_counters: HashMap::new(),
            trials_run: 0,
        })
    }

    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    pub fn estimator(&self, key: &BlockKey) -> Option<&E> {
        self.estimators.get(key)
    }

    /// Run every trial in order, then close the logs and the device link.
    ///
    /// Only an interrupt (or the input device going away) stops the session
    /// early; every other failure is absorbed per trial.
    pub fn run(mut self) -> SessionReport {
        info!(
            participant = %self.participant,
            total = self.trials.len(),
            actuator = self.context.actuator.connected(),
            sensor = self.context.force.connected(),
            "starting experimental trials"
        );

        let mut end = SessionEnd::Completed;
        for index in 0..self.trials.len() {
            if self.keys.interrupted() || self.run_trial(index).is_err() {
                end = SessionEnd::Interrupted;
                break;
            }
        }

        match end {
            SessionEnd::Completed => info!(trials = self.trials_run, "all trials completed"),
            SessionEnd::Interrupted => {
                warn!(trials = self.trials_run, "experiment interrupted")
            }
        }
        self.context.close();

        let summary =
            SessionSummary::new(&self.participant, end, self.trials_run, &self.estimators);
        SessionReport {
            end,
            trials_run: self.trials_run,
            rows_written: self.context.outcomes.rows(),
            summary,
        }
    }

    fn run_trial(&mut self, index: usize) -> Result<(), Interrupted> {
        let trial = self.trials[index];
        let overall = index + 1;
        let condition = trial.condition.id;
        let reference = self.config.reference_intensity;
        let probe = self.next_probe(&trial.key);
        let specific = {
            let counter = self.specific_counters.entry(trial.key).or_default();
            *counter += 1;
            *counter
        };
        info!(
            overall,
            condition,
            block = trial.block,
            specific,
            distance_cm = trial.distance_cm,
            speed_cm_s = trial.speed_cm_s,
            reference,
            probe,
            "trial started"
        );

        let timing = self.config.timing.clone();
        let started = self.timer.now();
        let response = match trial.condition.motion {
            Motion::Movement {
                distance_cm,
                speed_cm_s,
            } => {
                self.send(&Command::Move {
                    distance_cm,
                    speed_cm_s,
                });
                self.timer.sleep(timing.move_settle());
                self.tap_pair(overall, condition, reference, probe);
                self.timer.sleep(timing.pre_return());
                self.send(&Command::MoveReturn {
                    distance_cm,
                    speed_cm_s,
                });
                self.timer.sleep(timing.post_return());
                self.collect_response(&trial.key, probe)?
            }
            Motion::Baseline => {
                self.tap_pair(overall, condition, reference, probe);
                self.collect_response(&trial.key, probe)?
            }
            Motion::BackAndForth {
                distance_cm,
                out_speed_cm_s,
                return_speed_cm_s,
            } => {
                self.send(&Command::Move {
                    distance_cm,
                    speed_cm_s: out_speed_cm_s,
                });
                self.timer.sleep(timing.move_settle());
                self.tap_pair(overall, condition, reference, probe);
                // The participant answers while still held out.
                let response = self.collect_response(&trial.key, probe)?;
                let confirmed = self.await_confirmation();
                if confirmed.is_err() {
                    warn!(condition, "stopped while held out; returning platform before shutdown");
                }
                self.send(&Command::Continue);
                self.send(&Command::MoveReturn {
                    distance_cm,
                    speed_cm_s: return_speed_cm_s,
                });
                confirmed?;
                self.timer.sleep(timing.post_return());
                response
            }
        };
        let duration = self.timer.elapsed(started);
        self.trials_run += 1;

        let outcome = TrialOutcome {
            participant: self.participant.clone(),
            condition,
            block: trial.block,
            overall_trial: overall,
            specific_trial: specific,
            reference_level: reference,
            probe_level: probe,
            response,
            duration,
        };
        match self.context.outcomes.record(&outcome) {
            Ok(()) => debug!(overall, "trial data written"),
            Err(e) => error!(overall, error = %e, "failed to write trial data"),
        }
        Ok(())
    }

    /// Next probe level for `key`, as a whole level within bounds.
    fn next_probe(&mut self, key: &BlockKey) -> u8 {
        let fallback = self.config.fallback_intensity;
        let level = match self.estimators.get_mut(key) {
            Some(estimator) => estimator.next_intensity().unwrap_or_else(|e| {
                warn!(%key, error = %e, fallback, "could not get next intensity; using fallback");
                f64::from(fallback)
            }),
            None => {
                warn!(%key, fallback, "no estimator for block; using fallback");
                f64::from(fallback)
            }
        };
        level.round().clamp(self.config.quest.min, self.config.quest.max) as u8
    }

    fn send(&mut self, command: &Command) {
        if let Err(e) = self.context.actuator.send(command) {
            error!(%command, error = %e, "failed to send command");
        }
    }

    /// Reference tap then probe tap, each followed by a force window.
    fn tap_pair(&mut self, overall: usize, condition: u8, reference: u8, probe: u8) {
        self.context.force.clear_input();
        for (phase, intensity) in [(TapPhase::Reference, reference), (TapPhase::Probe, probe)] {
            let timestamp = unix_timestamp();
            self.send(&Command::Tap {
                phase,
                condition,
                reference,
                probe,
            });
            let force = self.sample_after_tap(phase);
            debug!(?phase, intensity, force = ?force, "tap complete");

            if let Some(log) = self.context.force_log.as_mut() {
                let tap = TapRecord {
                    trial: overall,
                    condition,
                    phase,
                    intensity,
                    timestamp,
                    force,
                };
                if let Err(e) = log.record(&tap) {
                    error!(overall, error = %e, "failed to write force data");
                }
            }
        }
    }

    fn sample_after_tap(&mut self, phase: TapPhase) -> Option<ForceReading> {
        let settle = self.config.timing.tap_settle();
        match &mut self.context.force {
            ForceProbe::Inline { sampler, window } => {
                self.timer.sleep(settle);
                sampler.sample(*window)
            }
            ForceProbe::Background {
                worker,
                window,
                gap,
            } => {
                // The reference window must close before the probe tap goes
                // out, so it only spans the settle and the inter-tap gap.
                let (window, gap) = match phase {
                    TapPhase::Reference => ((*window).min(settle + *gap), *gap),
                    TapPhase::Probe => (*window, Duration::ZERO),
                };
                let started = worker.start(window);
                self.timer.sleep(settle);
                self.timer.sleep(gap);
                if let Err(e) = started {
                    warn!(error = %e, "could not start force sampling");
                    return None;
                }
                worker.join().unwrap_or_else(|e| {
                    warn!(error = %e, "force sampling failed");
                    None
                })
            }
        }
    }

    fn collect_response(
        &mut self,
        key: &BlockKey,
        probe: u8,
    ) -> Result<OutcomeResponse, Interrupted> {
        let labels = self.config.labels;
        info!("waiting for response ({})", labels.prompt());
        match self.await_response() {
            Ok(response) => {
                info!(response = labels.label(response), "response received");
                if let Some(estimator) = self.estimators.get_mut(key) {
                    estimator.add_response(f64::from(probe), response.is_positive());
                }
                Ok(OutcomeResponse::Answered(response))
            }
            Err(e @ (ResponseError::Interrupted | ResponseError::Closed)) => {
                warn!(reason = %e, "response wait ended");
                Err(Interrupted)
            }
            Err(e) => {
                error!(error = %e, "error during response collection");
                Ok(OutcomeResponse::Error)
            }
        }
    }

    fn await_response(&mut self) -> Result<Response, ResponseError> {
        loop {
            let key = self.keys.next_key()?;
            match Response::from_key(key) {
                Some(response) => return Ok(response),
                None => debug!(?key, "ignoring key while waiting for a response"),
            }
        }
    }

    fn await_confirmation(&mut self) -> Result<(), Interrupted> {
        info!("waiting for Up to move back to the wall");
        loop {
            match self.keys.next_key() {
                Ok(Key::Up) => return Ok(()),
                Ok(key) => debug!(?key, "ignoring key while waiting for confirmation"),
                Err(e @ (ResponseError::Interrupted | ResponseError::Closed)) => {
                    warn!(reason = %e, "confirmation wait ended");
                    return Err(Interrupted);
                }
                Err(e) => {
                    error!(error = %e, "confirmation failed; returning platform");
                    return Ok(());
                }
            }
        }
    }
}
