use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Stepper distances used by the movement conditions, in cm
pub const DISTANCES_CM: [f64; 3] = [0.5, 1.5, 3.0];
/// Slow and fast platform speeds, in cm/s
pub const SPEEDS_CM_S: [f64; 2] = [1.0, 3.0];

/// What the platform does around the tap pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Motion {
    /// Move out, tap, return at the same speed
    Movement { distance_cm: f64, speed_cm_s: f64 },
    /// No movement, taps only
    Baseline,
    /// Move out, tap, hold for the participant's answer and confirmation, then return
    BackAndForth {
        distance_cm: f64,
        out_speed_cm_s: f64,
        return_speed_cm_s: f64,
    },
}

/// One fixed experimental configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub id: u8,
    pub motion: Motion,
}

impl Condition {
    pub fn new(id: u8, motion: Motion) -> Self {
        Self { id, motion }
    }

    /// The eight conditions of the standard study: six distance/speed
    /// movements, a baseline, and the back-and-forth condition.
    pub fn standard_set() -> Vec<Condition> {
        let mut conditions = Vec::with_capacity(8);
        for distance_cm in DISTANCES_CM {
            for speed_cm_s in SPEEDS_CM_S {
                let id = conditions.len() as u8 + 1;
                conditions.push(Condition::new(
                    id,
                    Motion::Movement {
                        distance_cm,
                        speed_cm_s,
                    },
                ));
            }
        }
        conditions.push(Condition::new(7, Motion::Baseline));
        conditions.push(Condition::new(
            8,
            Motion::BackAndForth {
                distance_cm: 3.0,
                out_speed_cm_s: 1.0,
                return_speed_cm_s: 2.0,
            },
        ));
        conditions
    }

    /// Conditions that hold the platform out until the participant confirms.
    pub fn is_special(&self) -> bool {
        matches!(self.motion, Motion::BackAndForth { .. })
    }

    pub fn distance_cm(&self) -> f64 {
        match self.motion {
            Motion::Movement { distance_cm, .. } => distance_cm,
            Motion::Baseline => 0.0,
            Motion::BackAndForth { distance_cm, .. } => distance_cm,
        }
    }

    /// Outbound speed; zero for the baseline.
    pub fn speed_cm_s(&self) -> f64 {
        match self.motion {
            Motion::Movement { speed_cm_s, .. } => speed_cm_s,
            Motion::Baseline => 0.0,
            Motion::BackAndForth { out_speed_cm_s, .. } => out_speed_cm_s,
        }
    }

    pub fn label(&self) -> String {
        format!("Condition {}", self.id)
    }

    /// The id is sent as a single digit inside tap commands.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(1..=9).contains(&self.id) {
            return Err(CoreError::InvalidCondition {
                id: self.id,
                reason: "id must be a single non-zero digit".into(),
            });
        }
        let (distance, speeds) = match self.motion {
            Motion::Movement {
                distance_cm,
                speed_cm_s,
            } => (distance_cm, vec![speed_cm_s]),
            Motion::Baseline => return Ok(()),
            Motion::BackAndForth {
                distance_cm,
                out_speed_cm_s,
                return_speed_cm_s,
            } => (distance_cm, vec![out_speed_cm_s, return_speed_cm_s]),
        };
        if !(distance.is_finite() && distance > 0.0) {
            return Err(CoreError::InvalidCondition {
                id: self.id,
                reason: format!("distance {distance} cm is not positive"),
            });
        }
        if let Some(speed) = speeds.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(CoreError::InvalidCondition {
                id: self.id,
                reason: format!("speed {speed} cm/s is not positive"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_set_matches_study_layout() {
        let set = Condition::standard_set();
        assert_eq!(set.len(), 8);
        let ids: Vec<u8> = set.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6, 7, 8]);

        assert_eq!(set[0].distance_cm(), 0.5);
        assert_eq!(set[0].speed_cm_s(), 1.0);
        assert_eq!(set[1].speed_cm_s(), 3.0);
        assert_eq!(set[3].distance_cm(), 1.5);
        assert_eq!(set[5].distance_cm(), 3.0);
        assert_eq!(set[5].speed_cm_s(), 3.0);

        assert_eq!(set[6].motion, Motion::Baseline);
        assert_eq!(set[6].distance_cm(), 0.0);

        let special: Vec<u8> = set.iter().filter(|c| c.is_special()).map(|c| c.id).collect();
        assert_eq!(special, vec![8]);
        assert_eq!(set[7].label(), "Condition 8");
    }

    #[test]
    fn rejects_multi_digit_and_zero_ids() {
        assert!(Condition::new(0, Motion::Baseline).validate().is_err());
        assert!(Condition::new(10, Motion::Baseline).validate().is_err());
        assert!(Condition::new(9, Motion::Baseline).validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_motion() {
        let stalled = Condition::new(
            2,
            Motion::Movement {
                distance_cm: 1.0,
                speed_cm_s: 0.0,
            },
        );
        assert!(stalled.validate().is_err());

        let nowhere = Condition::new(
            8,
            Motion::BackAndForth {
                distance_cm: -3.0,
                out_speed_cm_s: 1.0,
                return_speed_cm_s: 2.0,
            },
        );
        assert!(nowhere.validate().is_err());
    }
}
