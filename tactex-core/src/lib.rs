pub mod condition;
pub mod response;
pub mod trial;

pub use condition::{Condition, Motion};
pub use response::{Key, Response, ResponseLabels};
pub use trial::{BlockKey, OutcomeResponse, Trial, TrialOutcome};

use thiserror::Error;

/// Errors raised while validating domain definitions
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid condition {id}: {reason}")]
    InvalidCondition { id: u8, reason: String },
}
