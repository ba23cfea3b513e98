//! Validation Model
//!
//! Per-step target verification results returned alongside generated
//! scenario documents.

use serde::{Deserialize, Serialize};

/// Whether a step's target text was found on the real page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Verified,
    Unverified,
}

/// Confidence judgment for a single scenario step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationItem {
    #[serde(rename = "scenario_idx", default)]
    pub scenario_index: usize,
    #[serde(rename = "step", default)]
    pub step_number: u32,
    pub status: ValidationStatus,
    #[serde(default)]
    pub target_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closest_match: Option<String>,
}

impl ValidationItem {
    pub fn is_verified(&self) -> bool {
        self.status == ValidationStatus::Verified
    }
}

/// Verified/total counts. `percent` is only meaningful when `total > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub verified: usize,
    pub total: usize,
    pub percent: u32,
}
