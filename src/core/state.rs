//! Execution status of a workflow session

use serde::{Deserialize, Serialize};
use std::fmt;

/// Externally tracked status of a session's latest run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// No run in flight; the last one (if any) completed
    #[default]
    Idle,

    /// A run is streaming
    Running,

    /// The run stopped with approval requests outstanding
    WaitingApproval,

    /// The last run failed or an approval was rejected
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Idle => "idle",
            ExecutionStatus::Running => "running",
            ExecutionStatus::WaitingApproval => "waiting_approval",
            ExecutionStatus::Failed => "failed",
        }
    }

    /// Whether a run for this session may be resumed
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::WaitingApproval | ExecutionStatus::Failed
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, ExecutionStatus::Running)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
