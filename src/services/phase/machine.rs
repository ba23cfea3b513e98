//! Workflow State Machine
//!
//! Which phase may follow which, and which operator action each phase
//! accepts.

use crate::models::workflow::{Action, WorkflowPhase};
use crate::utils::error::{AppError, AppResult};

pub fn allowed_transitions(from: WorkflowPhase) -> Vec<WorkflowPhase> {
    use WorkflowPhase::*;
    match from {
        Idle => vec![Scanning, Ready, Generating],
        Scanning => vec![Plan, Done],
        Plan => vec![Ready, Done],
        Ready => vec![Executing, Done],
        Generating => vec![Review, Executing, Done],
        Review => vec![Executing, Done],
        Executing => vec![Done],
        Done => vec![Idle, Scanning, Generating],
    }
}

/// Staying in the same phase is always allowed.
pub fn validate_transition(from: WorkflowPhase, to: WorkflowPhase) -> AppResult<()> {
    if from == to || allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(AppError::internal(format!(
            "Illegal workflow transition: {} -> {}",
            from, to
        )))
    }
}

pub fn legal_actions(phase: WorkflowPhase) -> Vec<Action> {
    use Action::*;
    match phase {
        WorkflowPhase::Idle => vec![StartScan, ConvertPrompt, Compose, StartGeneration],
        WorkflowPhase::Scanning => vec![Cancel],
        WorkflowPhase::Plan => vec![EditSelection, ConvertPrompt, Compose, Cancel],
        WorkflowPhase::Ready => vec![Execute, Compose, Cancel],
        WorkflowPhase::Generating => vec![Cancel],
        WorkflowPhase::Review => vec![UpdateDocument, Approve, Cancel],
        WorkflowPhase::Executing => vec![Cancel],
        WorkflowPhase::Done => vec![Reset, StartScan, StartGeneration],
    }
}

pub fn is_legal(phase: WorkflowPhase, action: Action) -> bool {
    legal_actions(phase).contains(&action)
}

pub fn validate_action(phase: WorkflowPhase, action: Action) -> AppResult<()> {
    if is_legal(phase, action) {
        Ok(())
    } else {
        Err(AppError::invalid_transition(phase, action))
    }
}
