pub mod config;
pub mod quest;
pub mod recorder;
pub mod response;
pub mod sequencer;
pub mod summary;
pub mod trial;

pub use config::{ExperimentConfig, SamplingConfig, SamplingMode, TimingConfig};
pub use quest::{EstimateMethod, Estimator, EstimatorState, Quest, QuestParams, ThresholdEstimate};
pub use recorder::{ForceLog, OutcomeRecorder, TapRecord};
pub use response::{ChannelKeys, ResponseSource};
pub use sequencer::{ForceProbe, Sequencer, SessionContext, SessionEnd, SessionReport};
pub use summary::{BlockSummary, SessionSummary};
pub use trial::{generate_trials, TrialOrder};

use std::path::PathBuf;

use tactex_core::CoreError;
use tactex_device::WorkerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EstimatorError {
    #[error("invalid estimator parameters: {0}")]
    InvalidParams(String),

    #[error("posterior collapsed; no estimate available")]
    Degenerate,

    #[error("estimate is not finite: {0}")]
    NonFinite(f64),
}

#[derive(Error, Debug)]
pub enum ResponseError {
    #[error("response collection interrupted")]
    Interrupted,

    #[error("input device closed")]
    Closed,

    #[error("input device error: {0}")]
    Device(String),
}

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("cannot create {path}: {source}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("log already closed")]
    Closed,

    #[error("summary serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Condition(#[from] CoreError),

    #[error(transparent)]
    Quest(#[from] EstimatorError),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Estimator(#[from] EstimatorError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Worker(#[from] WorkerError),
}
