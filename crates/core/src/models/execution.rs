//! Execution Job Model
//!
//! One run of a scenario document against the target site, as reported by
//! `GET /api/tests/{id}`.

use serde::{Deserialize, Serialize};

/// Server-assigned execution job identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionJobId(pub i64);

impl std::fmt::Display for ExecutionJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Remote lifecycle status of an execution job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Generating,
    Review,
    Queued,
    Running,
    Done,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Done | ExecutionStatus::Failed)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionStatus::Generating => "generating",
            ExecutionStatus::Review => "review",
            ExecutionStatus::Queued => "queued",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Done => "done",
            ExecutionStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// How a job created through `POST /api/tests` proceeds after generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Stop in `review` after generation and wait for approval.
    Review,
    /// Generate and execute without stopping.
    #[default]
    Auto,
}

/// A single execution run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionJob {
    pub id: ExecutionJobId,
    pub target_url: String,
    pub status: ExecutionStatus,
    #[serde(default, rename = "scenario_yaml")]
    pub document: Option<String>,
    #[serde(default)]
    pub steps_total: u32,
    #[serde(default)]
    pub steps_completed: u32,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub result_json: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}
