use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tactex_core::{Condition, Trial};

/// Randomization policy for the session's trial list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialOrder {
    /// Shuffle every trial of every block together
    #[default]
    FullShuffle,
    /// Shuffle the condition order once; blocks and slots then run in order
    ShuffledConditions,
}

/// Build the full condition × block × slot list in the order it will run.
pub fn generate_trials<R: Rng + ?Sized>(
    conditions: &[Condition],
    blocks: u32,
    trials_per_block: usize,
    order: TrialOrder,
    rng: &mut R,
) -> Vec<Trial> {
    let mut conditions = conditions.to_vec();
    if order == TrialOrder::ShuffledConditions {
        conditions.shuffle(rng);
    }

    let mut trials = Vec::with_capacity(conditions.len() * blocks as usize * trials_per_block);
    for condition in &conditions {
        for block in 1..=blocks {
            trials.extend(std::iter::repeat_n(Trial::new(*condition, block), trials_per_block));
        }
    }

    if order == TrialOrder::FullShuffle {
        trials.shuffle(rng);
    }
    trials
}
