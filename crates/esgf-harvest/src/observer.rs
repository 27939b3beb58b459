//! Run progress notifications.

use esgf_core::{Error, HarvestStatus, RunSnapshot};

/// One dataset state transition within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub run_id: String,
    pub instance_id: String,
    pub status: HarvestStatus,
    pub processed: usize,
    pub total: usize,
}

/// Receives run notifications.
///
/// Callbacks run synchronously on the task that made the transition, after
/// the run lock has been released, so they must return quickly.
pub trait HarvestObserver: Send + Sync {
    fn on_progress(&self, _progress: &Progress) {}

    /// Called exactly once when every dataset of a run reached a terminal state.
    fn on_completed(&self, _snapshot: &RunSnapshot) {}

    /// Called once when discovery fails and the run becomes `FAILED`.
    fn on_error(&self, _snapshot: &RunSnapshot, _error: &Error) {}
}
