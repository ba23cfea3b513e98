//! WebTest Orchestrator
//!
//! Orchestration controller for a remote, AI-assisted web testing service.
//! It includes:
//! - Scan coordination (push channel plus status polling, one plan request)
//! - Test plan selection and field collection
//! - Scenario composition and prompt conversion
//! - Step-level execution monitoring with reconnects
//! - Validation grading
//! - The top-level workflow state machine
//! - Configuration storage and the `webtest` command-line runner

pub mod cli;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

pub use models::settings::{OrchestratorConfig, SettingsUpdate};
pub use models::workflow::{Action, Outcome, WorkflowPhase};
pub use services::phase::{PhaseController, WorkflowSnapshot};
pub use services::progress::ProgressUpdate;
pub use storage::ConfigService;
pub use utils::error::{AppError, AppResult};
