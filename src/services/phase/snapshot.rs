//! Workflow Snapshot
//!
//! Serialisable read-only view of the whole workflow for display or
//! export.

use serde::{Deserialize, Serialize};
use webtest_core::{ExecutionJobId, ScanId, ScanStatus, ScanSummary};

use crate::models::workflow::{Action, Outcome, WorkflowPhase};
use crate::services::execution::{ExecutionMonitor, MonitorPhase, StepState};
use crate::services::scan::ScanRecord;
use crate::services::validation::ValidationReport;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanView {
    pub scan_id: ScanId,
    pub status: ScanStatus,
    pub pages_scanned: u32,
    pub progress_percent: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ScanSummary>,
    pub log_entries: usize,
}

impl From<&ScanRecord> for ScanView {
    fn from(record: &ScanRecord) -> Self {
        Self {
            scan_id: record.job().id,
            status: record.status(),
            pages_scanned: record.pages_scanned(),
            progress_percent: record.progress_percent(),
            summary: record.summary().cloned(),
            log_entries: record.log().len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionView {
    pub categories: usize,
    pub tests: usize,
    pub selected: usize,
    /// Seconds.
    pub estimated_duration: u32,
    pub missing_required_fields: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentView {
    pub scenarios: u32,
    pub steps: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_job_id: Option<ExecutionJobId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionView {
    pub job_id: ExecutionJobId,
    pub phase: MonitorPhase,
    pub steps_total: u32,
    pub steps_completed: u32,
    pub progress_percent: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<u32>,
    pub steps: Vec<StepState>,
}

impl From<&ExecutionMonitor> for ExecutionView {
    fn from(monitor: &ExecutionMonitor) -> Self {
        Self {
            job_id: monitor.job_id(),
            phase: monitor.phase(),
            steps_total: monitor.steps_total(),
            steps_completed: monitor.steps_completed(),
            progress_percent: monitor.progress_percent(),
            current_step: monitor.current_step(),
            steps: monitor.steps().to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub phase: WorkflowPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan: Option<ScanView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<SelectionView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionView>,
    pub legal_actions: Vec<Action>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}
