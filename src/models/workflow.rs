//! Workflow Models
//!
//! Top-level phases of the testing workflow and the operator actions that
//! move between them.

use serde::{Deserialize, Serialize};

/// Top-level workflow phase.
///
/// Scan path: idle → scanning → plan → ready → executing → done.
/// Generation path: idle → generating → review → executing → done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowPhase {
    #[default]
    Idle,
    Scanning,
    /// A plan is loaded and the operator is choosing tests.
    Plan,
    /// A composed document is waiting to be executed.
    Ready,
    Generating,
    Review,
    Executing,
    Done,
}

impl WorkflowPhase {
    pub fn is_terminal(&self) -> bool {
        *self == WorkflowPhase::Done
    }
}

impl std::fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowPhase::Idle => write!(f, "idle"),
            WorkflowPhase::Scanning => write!(f, "scanning"),
            WorkflowPhase::Plan => write!(f, "plan"),
            WorkflowPhase::Ready => write!(f, "ready"),
            WorkflowPhase::Generating => write!(f, "generating"),
            WorkflowPhase::Review => write!(f, "review"),
            WorkflowPhase::Executing => write!(f, "executing"),
            WorkflowPhase::Done => write!(f, "done"),
        }
    }
}

/// How a finished workflow ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Passed,
    Failed,
    /// Stopped by the operator. Counts as a failure.
    Cancelled,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        *self == Outcome::Passed
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Passed => write!(f, "passed"),
            Outcome::Failed => write!(f, "failed"),
            Outcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Operator-initiated action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    StartScan,
    ConvertPrompt,
    EditSelection,
    Compose,
    Execute,
    StartGeneration,
    UpdateDocument,
    Approve,
    Cancel,
    Reset,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::StartScan => write!(f, "start a scan"),
            Action::ConvertPrompt => write!(f, "convert a prompt"),
            Action::EditSelection => write!(f, "edit the test selection"),
            Action::Compose => write!(f, "compose scenarios"),
            Action::Execute => write!(f, "execute"),
            Action::StartGeneration => write!(f, "start generation"),
            Action::UpdateDocument => write!(f, "update the scenario document"),
            Action::Approve => write!(f, "approve"),
            Action::Cancel => write!(f, "cancel"),
            Action::Reset => write!(f, "reset"),
        }
    }
}
