use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tactex_core::BlockKey;

use crate::quest::Estimator;
use crate::sequencer::SessionEnd;
use crate::RecordError;

/// Final state of one block's estimator
#[derive(Debug, Clone, Serialize)]
pub struct BlockSummary {
    pub key: String,
    pub condition: u8,
    pub block: u32,
    pub trials: usize,
    pub threshold_mean: Option<f64>,
    pub threshold_sd: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub participant: String,
    pub end: SessionEnd,
    pub trials_completed: usize,
    pub blocks: Vec<BlockSummary>,
}

impl SessionSummary {
    pub fn new<E: Estimator>(
        participant: &str,
        end: SessionEnd,
        trials_completed: usize,
        estimators: &BTreeMap<BlockKey, E>,
    ) -> Self {
        let blocks = estimators
            .iter()
            .map(|(key, estimator)| {
                let threshold = estimator.threshold();
                BlockSummary {
                    key: key.to_string(),
                    condition: key.condition,
                    block: key.block,
                    trials: estimator.trial_count(),
                    threshold_mean: threshold.map(|t| t.mean),
                    threshold_sd: threshold.map(|t| t.sd),
                }
            })
            .collect();
        Self {
            participant: participant.to_string(),
            end,
            trials_completed,
            blocks,
        }
    }

    pub fn block(&self, key: &BlockKey) -> Option<&BlockSummary> {
        let name = key.to_string();
        self.blocks.iter().find(|b| b.key == name)
    }

    pub fn write(&self, path: &Path) -> Result<(), RecordError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| RecordError::Create {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::{Quest, QuestParams};

    #[test]
    fn summarises_each_block() {
        let mut estimators = BTreeMap::new();
        for block in 1..=2 {
            let mut quest = Quest::new(QuestParams::default()).unwrap();
            for _ in 0..block {
                quest.add_response(4.0, true);
            }
            estimators.insert(BlockKey { condition: 5, block }, quest);
        }

        let summary = SessionSummary::new("p01", SessionEnd::Completed, 3, &estimators);
        assert_eq!(summary.blocks.len(), 2);
        let second = summary.block(&BlockKey { condition: 5, block: 2 }).unwrap();
        assert_eq!(second.key, "5_set2");
        assert_eq!(second.trials, 2);
        assert!(second.threshold_mean.unwrap() < 4.0);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["end"], "completed");
        assert_eq!(json["blocks"][0]["key"], "5_set1");
    }

    #[test]
    fn writes_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        let summary = SessionSummary::new(
            "p02",
            SessionEnd::Interrupted,
            0,
            &BTreeMap::<BlockKey, Quest>::new(),
        );
        summary.write(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"interrupted\""));
    }
}
