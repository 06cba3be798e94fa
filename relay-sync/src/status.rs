//! Run-scoped job state and its read-only snapshot.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of the bulk sync job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    #[default]
    NotStarted,
    Disabled,
    NoData,
    Running,
    Stopping,
    Stopped,
    Completed,
    Failed,
}

impl SyncStatus {
    /// Statuses a run can end in.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SyncStatus::NoData | SyncStatus::Stopped | SyncStatus::Completed | SyncStatus::Failed
        )
    }

    /// Statuses allowed while the single-flight guard is held.
    pub fn is_active(self) -> bool {
        matches!(self, SyncStatus::Running | SyncStatus::Stopping)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStatus::NotStarted => "NOT_STARTED",
            SyncStatus::Disabled => "DISABLED",
            SyncStatus::NoData => "NO_DATA",
            SyncStatus::Running => "RUNNING",
            SyncStatus::Stopping => "STOPPING",
            SyncStatus::Stopped => "STOPPED",
            SyncStatus::Completed => "COMPLETED",
            SyncStatus::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Immutable snapshot of the engine's job state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SyncJob {
    pub running: bool,
    pub status: SyncStatus,
    /// Records enqueued on the broker during the current or last run.
    pub processed: u64,
    /// Unsynced records counted at the start of the run.
    pub total: u64,
    pub message: String,
}

impl SyncJob {
    pub(crate) fn started() -> Self {
        Self {
            running: true,
            status: SyncStatus::Running,
            processed: 0,
            total: 0,
            message: "starting synchronization".to_string(),
        }
    }

    pub(crate) fn finish(&mut self, status: SyncStatus, message: impl Into<String>) {
        self.running = false;
        self.status = status;
        self.message = message.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_snapshot_is_not_started() {
        let job = SyncJob::default();
        assert!(!job.running);
        assert_eq!(job.status, SyncStatus::NotStarted);
        assert_eq!(job.processed, 0);
        assert!(job.message.is_empty());
    }

    #[test]
    fn status_serializes_as_screaming_snake_case() {
        let json = serde_json::to_string(&SyncStatus::NoData).unwrap();
        assert_eq!(json, "\"NO_DATA\"");
        assert_eq!(SyncStatus::NotStarted.to_string(), "NOT_STARTED");
    }

    #[test]
    fn finish_clears_running() {
        let mut job = SyncJob::started();
        assert!(job.running && job.status.is_active());
        job.finish(SyncStatus::Completed, "done");
        assert!(!job.running);
        assert!(job.status.is_terminal());
    }
}
