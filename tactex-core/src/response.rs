use serde::{Deserialize, Serialize};

/// Participant input events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Left,
    Right,
    /// Confirmation, only meaningful in the back-and-forth condition
    Up,
}

/// Which of the two taps the participant picked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    First,
    Second,
}

impl Response {
    /// Left selects the first tap, right the second. Other keys are not answers.
    pub fn from_key(key: Key) -> Option<Self> {
        match key {
            Key::Left => Some(Response::First),
            Key::Right => Some(Response::Second),
            Key::Up => None,
        }
    }

    /// The answer the estimator counts as a detection.
    pub fn is_positive(self) -> bool {
        matches!(self, Response::Second)
    }
}

/// Per-study wording for the two answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseLabels {
    #[default]
    FirstSecond,
    YesNo,
}

impl ResponseLabels {
    pub fn label(self, response: Response) -> &'static str {
        match (self, response) {
            (ResponseLabels::FirstSecond, Response::First) => "First",
            (ResponseLabels::FirstSecond, Response::Second) => "Second",
            (ResponseLabels::YesNo, Response::First) => "No",
            (ResponseLabels::YesNo, Response::Second) => "Yes",
        }
    }

    pub fn prompt(self) -> String {
        format!(
            "Right for '{}', Left for '{}'",
            self.label(Response::Second),
            self.label(Response::First)
        )
    }
}
