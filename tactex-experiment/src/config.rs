use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tactex_core::{Condition, ResponseLabels};
use tactex_device::SamplePolicy;
use tracing::warn;

use crate::quest::QuestParams;
use crate::trial::TrialOrder;
use crate::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub conditions: Vec<Condition>,
    pub blocks_per_condition: u32,
    pub trials_per_block: usize,
    pub reference_intensity: u8,
    /// Used whenever an estimator cannot produce a level
    pub fallback_intensity: u8,
    pub order: TrialOrder,
    pub labels: ResponseLabels,
    pub quest: QuestParams,
    pub timing: TimingConfig,
    pub sampling: SamplingConfig,
    pub seed: Option<u64>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            conditions: Condition::standard_set(),
            blocks_per_condition: 2,
            trials_per_block: 20,
            reference_intensity: 4,
            fallback_intensity: 4,
            order: TrialOrder::FullShuffle,
            labels: ResponseLabels::FirstSecond,
            quest: QuestParams::default(),
            timing: TimingConfig::default(),
            sampling: SamplingConfig::default(),
            seed: None,
        }
    }
}

/// Fixed delays around actuator commands, in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub move_settle_ms: u64,
    pub tap_settle_ms: u64,
    pub pre_return_ms: u64,
    pub post_return_ms: u64,
    pub poll_interval_ms: u64,
    pub inter_tap_gap_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            move_settle_ms: 500,
            tap_settle_ms: 100,
            pre_return_ms: 1000,
            post_return_ms: 500,
            poll_interval_ms: 50,
            inter_tap_gap_ms: 1000,
        }
    }
}

impl TimingConfig {
    /// All delays zero; for dry runs and tests.
    pub fn immediate() -> Self {
        Self {
            move_settle_ms: 0,
            tap_settle_ms: 0,
            pre_return_ms: 0,
            post_return_ms: 0,
            poll_interval_ms: 1,
            inter_tap_gap_ms: 0,
        }
    }

    pub fn move_settle(&self) -> Duration {
        Duration::from_millis(self.move_settle_ms)
    }
    pub fn tap_settle(&self) -> Duration {
        Duration::from_millis(self.tap_settle_ms)
    }
    pub fn pre_return(&self) -> Duration {
        Duration::from_millis(self.pre_return_ms)
    }
    pub fn post_return(&self) -> Duration {
        Duration::from_millis(self.post_return_ms)
    }
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
    pub fn inter_tap_gap(&self) -> Duration {
        Duration::from_millis(self.inter_tap_gap_ms)
    }
}

/// Where force windows are read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode {
    /// Blocking peak read right after each tap
    #[default]
    Inline,
    /// Worker thread records the full series while the loop keeps time
    Background,
}

impl SamplingMode {
    pub fn policy(self) -> SamplePolicy {
        match self {
            SamplingMode::Inline => SamplePolicy::PeakFailFast,
            SamplingMode::Background => SamplePolicy::SeriesBestEffort,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub mode: SamplingMode,
    pub inline_window_ms: u64,
    pub background_window_ms: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            mode: SamplingMode::Inline,
            inline_window_ms: 500,
            background_window_ms: 3000,
        }
    }
}

impl SamplingConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(match self.mode {
            SamplingMode::Inline => self.inline_window_ms,
            SamplingMode::Background => self.background_window_ms,
        })
    }
}

impl ExperimentConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn total_trials(&self) -> usize {
        self.conditions.len() * self.blocks_per_condition as usize * self.trials_per_block
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.conditions.is_empty() {
            return Err(ConfigError::Invalid("no conditions defined".into()));
        }
        for (i, condition) in self.conditions.iter().enumerate() {
            condition.validate()?;
            if self.conditions[..i].iter().any(|c| c.id == condition.id) {
                return Err(ConfigError::Invalid(format!(
                    "condition {} defined twice",
                    condition.id
                )));
            }
        }
        if self.blocks_per_condition == 0 || self.trials_per_block == 0 {
            return Err(ConfigError::Invalid(
                "blocks_per_condition and trials_per_block must be positive".into(),
            ));
        }

        self.quest.validate()?;
        let (min, max) = (self.quest.min, self.quest.max);
        if min.fract() != 0.0 || max.fract() != 0.0 || min < 0.0 || max > 9.0 {
            return Err(ConfigError::Invalid(format!(
                "intensity bounds [{min}, {max}] must be whole single-digit levels"
            )));
        }
        for (name, level) in [
            ("reference_intensity", self.reference_intensity),
            ("fallback_intensity", self.fallback_intensity),
        ] {
            if !(min..=max).contains(&f64::from(level)) {
                return Err(ConfigError::Invalid(format!(
                    "{name} {level} outside [{min}, {max}]"
                )));
            }
        }

        if self.trials_per_block > self.quest.trials {
            warn!(
                trials_per_block = self.trials_per_block,
                budget = self.quest.trials,
                "blocks run past the estimator's design trial budget"
            );
        }
        if self.timing.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be positive".into()));
        }
        Ok(())
    }
}
