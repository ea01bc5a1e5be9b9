// Store snapshots handed to the persistence collaborator
// Plain data only: no device handles, timers or callbacks.

use crate::sequencer::model::Sequence;
use serde::{Deserialize, Serialize};

/// Snapshot error types
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid snapshot: {0}")]
    InvalidStructure(String),
}

/// Serializable copy of the sequence store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub sequences: Vec<Sequence>,
}

impl StoreSnapshot {
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and validate a snapshot
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: StoreSnapshot = serde_json::from_str(json)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Check the structural invariants the sequencer relies on
    pub fn validate(&self) -> Result<(), SnapshotError> {
        for sequence in &self.sequences {
            if sequence.patterns.is_empty() {
                return Err(SnapshotError::InvalidStructure(format!(
                    "sequence '{}' has no pattern",
                    sequence.name
                )));
            }
            if let Some(index) = sequence.patterns.iter().position(|p| p.pages.is_empty()) {
                return Err(SnapshotError::InvalidStructure(format!(
                    "pattern {} of sequence '{}' has no page",
                    index, sequence.name
                )));
            }
            if sequence.current_pattern_index >= sequence.patterns.len() {
                return Err(SnapshotError::InvalidStructure(format!(
                    "sequence '{}' points at missing pattern {}",
                    sequence.name, sequence.current_pattern_index
                )));
            }
            if sequence.n_steps == 0 || sequence.step_length == 0 {
                return Err(SnapshotError::InvalidStructure(format!(
                    "sequence '{}' has a zero step count or step length",
                    sequence.name
                )));
            }
        }
        Ok(())
    }
}
