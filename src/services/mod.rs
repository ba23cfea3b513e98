//! Services
//!
//! Workflow services. Each owns one concern of the testing workflow; the
//! phase controller composes them.

pub mod composer;
pub mod execution;
pub mod phase;
pub mod plan;
pub mod progress;
pub mod scan;
pub mod validation;

pub use composer::{ScenarioComposer, ScenarioDocument};
pub use execution::{ExecutionMonitor, ExecutionWatcher};
pub use phase::PhaseController;
pub use plan::PlanSelector;
pub use progress::{ProgressSender, ProgressUpdate};
pub use scan::{ScanCoordinator, ScanRecord};
