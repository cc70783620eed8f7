use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Condition, Response, ResponseLabels};

/// Identifies one estimator: a repetition block of one condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockKey {
    pub condition: u8,
    pub block: u32,
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_set{}", self.condition, self.block)
    }
}

/// A scheduled trial, fixed once the session is set up
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trial {
    pub condition: Condition,
    pub block: u32,
    pub distance_cm: f64,
    pub speed_cm_s: f64,
    pub key: BlockKey,
}

impl Trial {
    pub fn new(condition: Condition, block: u32) -> Self {
        Self {
            condition,
            block,
            distance_cm: condition.distance_cm(),
            speed_cm_s: condition.speed_cm_s(),
            key: BlockKey {
                condition: condition.id,
                block,
            },
        }
    }
}

/// Response column of an outcome row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeResponse {
    Answered(Response),
    /// Collection failed; the trial is not retried
    Error,
}

impl OutcomeResponse {
    pub fn label(&self, labels: ResponseLabels) -> &'static str {
        match self {
            OutcomeResponse::Answered(response) => labels.label(*response),
            OutcomeResponse::Error => "Error",
        }
    }
}

/// Recorded result per trial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialOutcome {
    pub participant: String,
    pub condition: u8,
    pub block: u32,
    pub overall_trial: usize,
    pub specific_trial: usize,
    pub reference_level: u8,
    pub probe_level: u8,
    pub response: OutcomeResponse,
    pub duration: Duration,
}

impl TrialOutcome {
    pub fn condition_label(&self) -> String {
        format!("Condition {}", self.condition)
    }

    /// Seconds rounded to the millisecond
    pub fn duration_secs(&self) -> String {
        format!("{:.3}", self.duration.as_secs_f64())
    }
}
