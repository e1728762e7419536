//! Run status, events and the observable run state.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Completed,
    Failed,
    Aborted,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Aborted
        )
    }

    /// Running or paused: a worker owns the run.
    pub fn is_active(self) -> bool {
        matches!(self, RunStatus::Running | RunStatus::Paused)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Idle => "idle",
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Aborted => "aborted",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notifications sent to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    StatusChanged { from: RunStatus, to: RunStatus },
    PointRecorded { index: usize, time: f64 },
    Progress(f64),
    /// Sent before the switch to `Failed`.
    Failed { error: String },
    /// Sent before the switch to `Completed`.
    Completed { elapsed: Duration },
}

/// Copy of a run's mutable state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunState {
    pub status: RunStatus,
    pub time: f64,
    pub states: Vec<f64>,
    pub algebraic: Vec<f64>,
    pub step_count: u64,
    pub progress: f64,
}
