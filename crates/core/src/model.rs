use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CopyErrorPolicy {
    /// Stop the whole run at the first failed copy.
    #[default]
    Abort,
    /// Record the failure and move on to the next combination.
    Skip,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    /// Every combination was visited. Under `CopyErrorPolicy::Skip` some of
    /// them may have failed; see `RunOutcome::failures`.
    Completed,
    Cancelled,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Started,
    Materialized,
    CopyFailed,
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunEvent {
    pub seq: u64,
    pub run_id: String,
    pub phase: RunPhase,
    /// 1-based index of the combination a `Materialized`, `CopyFailed` or
    /// `Failed` event refers to; 0 on `Started`. `Completed` and `Cancelled`
    /// carry the number of combinations materialized instead.
    pub combination_index: u64,
    pub total_combinations: u128,
    pub output_unit: Option<PathBuf>,
    /// Bytes of the current combination.
    pub combination_bytes: u64,
    pub formatted_size: String,
    pub message: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CopyFailure {
    pub combination_index: u64,
    pub file: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunOutcome {
    pub run_id: String,
    pub status: RunStatus,
    pub total_combinations: u128,
    pub materialized: u64,
    pub output_units: Vec<PathBuf>,
    pub failures: Vec<CopyFailure>,
    pub bytes_copied: u64,
    pub elapsed_ms: u64,
}
