//! Progress Event Types
//!
//! Closed tagged union over every message the remote service pushes on a
//! job's event channel. Scan jobs and execution jobs share the same wire
//! shape (`{"type": ..., ...}`), so both families live in one enum and each
//! consumer ignores the variants that don't concern it.

use serde::{Deserialize, Serialize};

use crate::models::ScanSummary;

/// Push event for a scan or execution job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    // ── Scan side ─────────────────────────────────────────────────────
    /// Crawler accepted the job.
    ScanStart {
        #[serde(default)]
        target_url: Option<String>,
        #[serde(default)]
        max_pages: Option<u32>,
    },

    /// One page was crawled.
    PageScanned {
        #[serde(default)]
        url: String,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        pages_scanned: u32,
        #[serde(default)]
        max_pages: Option<u32>,
        #[serde(default)]
        links_found: u32,
        #[serde(default)]
        forms_found: u32,
        #[serde(default)]
        buttons_found: u32,
        #[serde(default)]
        features: Vec<String>,
        #[serde(default)]
        observations_count: u32,
    },

    FeatureDetected {
        feature: String,
        #[serde(default)]
        confidence: Option<f64>,
    },

    ScanLog {
        #[serde(default)]
        phase: String,
        #[serde(default)]
        level: crate::models::LogLevel,
        #[serde(default)]
        message: String,
    },

    ScanComplete {
        #[serde(default)]
        summary: Option<ScanSummary>,
    },

    ScanError {
        #[serde(default)]
        error: Option<String>,
    },

    // ── Execution side ────────────────────────────────────────────────
    /// Work on the job began. `phase == "generate"` marks the generation
    /// phase of a review/auto job; otherwise execution is underway.
    TestStart {
        #[serde(default)]
        test_id: Option<i64>,
        #[serde(default)]
        phase: Option<String>,
    },

    ScenariosGenerated {
        #[serde(default)]
        count: u32,
        #[serde(default)]
        steps_total: u32,
    },

    /// Generation finished and the job is waiting for approval.
    ScenariosReady {
        #[serde(default)]
        scenario_yaml: Option<String>,
        #[serde(default)]
        steps_total: u32,
    },

    StepStart {
        #[serde(default)]
        step: u32,
        #[serde(default)]
        total: Option<u32>,
        #[serde(default)]
        description: Option<String>,
    },

    StepDone {
        #[serde(default)]
        step: u32,
        #[serde(default)]
        status: Option<String>,
        #[serde(default)]
        elapsed_ms: Option<u64>,
    },

    StepFail {
        #[serde(default)]
        step: u32,
        #[serde(default)]
        status: Option<String>,
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },

    TestComplete {
        #[serde(default)]
        test_id: Option<i64>,
        #[serde(default)]
        passed: Option<bool>,
    },

    TestFail {
        #[serde(default)]
        test_id: Option<i64>,
        #[serde(default)]
        error: Option<String>,
    },

    /// Live browser frame. Never recorded in the event log.
    Screenshot {
        #[serde(default)]
        step: Option<u32>,
        #[serde(default)]
        timing: Option<String>,
        #[serde(default)]
        image: String,
    },

    /// Any `type` this client does not know about.
    #[serde(other)]
    Unknown,
}

impl ProgressEvent {
    /// Decode one channel message. Malformed payloads and unknown types both
    /// become [`ProgressEvent::Unknown`]; decoding never fails.
    pub fn parse(text: &str) -> Self {
        serde_json::from_str(text).unwrap_or(ProgressEvent::Unknown)
    }

    /// Decode an already-parsed JSON value.
    pub fn from_value(value: serde_json::Value) -> Self {
        serde_json::from_value(value).unwrap_or(ProgressEvent::Unknown)
    }

    /// Wire tag of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            ProgressEvent::ScanStart { .. } => "scan_start",
            ProgressEvent::PageScanned { .. } => "page_scanned",
            ProgressEvent::FeatureDetected { .. } => "feature_detected",
            ProgressEvent::ScanLog { .. } => "scan_log",
            ProgressEvent::ScanComplete { .. } => "scan_complete",
            ProgressEvent::ScanError { .. } => "scan_error",
            ProgressEvent::TestStart { .. } => "test_start",
            ProgressEvent::ScenariosGenerated { .. } => "scenarios_generated",
            ProgressEvent::ScenariosReady { .. } => "scenarios_ready",
            ProgressEvent::StepStart { .. } => "step_start",
            ProgressEvent::StepDone { .. } => "step_done",
            ProgressEvent::StepFail { .. } => "step_fail",
            ProgressEvent::TestComplete { .. } => "test_complete",
            ProgressEvent::TestFail { .. } => "test_fail",
            ProgressEvent::Screenshot { .. } => "screenshot",
            ProgressEvent::Unknown => "unknown",
        }
    }

    pub fn is_scan_event(&self) -> bool {
        matches!(
            self,
            ProgressEvent::ScanStart { .. }
                | ProgressEvent::PageScanned { .. }
                | ProgressEvent::FeatureDetected { .. }
                | ProgressEvent::ScanLog { .. }
                | ProgressEvent::ScanComplete { .. }
                | ProgressEvent::ScanError { .. }
        )
    }

    pub fn is_execution_event(&self) -> bool {
        !self.is_scan_event() && !matches!(self, ProgressEvent::Unknown)
    }
}
