//! Wire Data Model
//!
//! Types exchanged with the remote testing service.

pub mod execution;
pub mod plan;
pub mod scan;
pub mod validation;

pub use execution::{ExecutionJob, ExecutionJobId, ExecutionMode, ExecutionStatus};
pub use plan::{FieldDescriptor, Priority, TestCategory, TestPlan, TestPlanItem};
pub use scan::{LogLevel, ScanId, ScanJob, ScanLogEntry, ScanStatus, ScanSummary, SiteType};
pub use validation::{ValidationItem, ValidationStatus, ValidationSummary};
