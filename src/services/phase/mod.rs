//! Workflow Phase Control
//!
//! The top-level state machine and the controller that sequences scan,
//! plan selection, composition, execution and validation.

pub mod controller;
pub mod machine;
pub mod snapshot;

pub use controller::PhaseController;
pub use machine::{allowed_transitions, is_legal, legal_actions, validate_action, validate_transition};
pub use snapshot::{DocumentView, ExecutionView, ScanView, SelectionView, WorkflowSnapshot};
