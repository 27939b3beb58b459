//! Harvest state shared between the orchestrator and persistence.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::query::SearchQuery;

/// Harvest state of one dataset, or of a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarvestStatus {
    #[default]
    Created,
    Harvesting,
    Paused,
    Completed,
    Failed,
}

impl HarvestStatus {
    /// `Completed` or `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, HarvestStatus::Completed | HarvestStatus::Failed)
    }
}

impl fmt::Display for HarvestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HarvestStatus::Created => "CREATED",
            HarvestStatus::Harvesting => "HARVESTING",
            HarvestStatus::Paused => "PAUSED",
            HarvestStatus::Completed => "COMPLETED",
            HarvestStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// How much of each dataset a run collects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HarvestKind {
    /// Dataset records only.
    #[default]
    Datasets,
    /// Dataset records and their file lists.
    Files,
}

impl fmt::Display for HarvestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HarvestKind::Datasets => f.write_str("datasets"),
            HarvestKind::Files => f.write_str("files"),
        }
    }
}

/// A point-in-time copy of a harvest run's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub run_id: String,
    pub query: SearchQuery,
    pub kind: HarvestKind,
    pub status: HarvestStatus,
    /// Per-dataset status keyed by instance id.
    pub datasets: BTreeMap<String, HarvestStatus>,
    pub total: usize,
    pub processed: usize,
    /// Set once the run completes with at least one failed dataset.
    pub any_failed: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunSnapshot {
    /// Number of datasets currently in `status`.
    pub fn count(&self, status: HarvestStatus) -> usize {
        self.datasets.values().filter(|s| **s == status).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(HarvestStatus::Completed.is_terminal());
        assert!(HarvestStatus::Failed.is_terminal());
        assert!(!HarvestStatus::Paused.is_terminal());
        assert!(!HarvestStatus::Harvesting.is_terminal());
        assert!(!HarvestStatus::Created.is_terminal());
    }

    #[test]
    fn status_wire_form() {
        assert_eq!(
            serde_json::to_string(&HarvestStatus::Harvesting).unwrap(),
            "\"HARVESTING\""
        );
        assert_eq!(HarvestStatus::Failed.to_string(), "FAILED");
    }
}
