//! Validation Aggregator
//!
//! Reduces per-step target verification results to counts and a quality
//! grade the operator can check before committing to a run.

use serde::{Deserialize, Serialize};
use webtest_core::{ValidationItem, ValidationSummary};

/// Quality grade derived from the verified percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationQuality {
    /// At least 70% verified.
    Good,
    /// 50% to 69% verified.
    Marginal,
    /// Below 50% verified.
    Poor,
}

impl ValidationQuality {
    pub fn from_percent(percent: u32) -> Self {
        match percent {
            70.. => ValidationQuality::Good,
            50..=69 => ValidationQuality::Marginal,
            _ => ValidationQuality::Poor,
        }
    }

    /// Operator-facing warning, if the grade warrants one.
    pub fn warning(&self) -> Option<&'static str> {
        match self {
            ValidationQuality::Good => None,
            ValidationQuality::Marginal => {
                Some("Some step targets could not be found on the page; results may be unreliable")
            }
            ValidationQuality::Poor => Some(
                "Most step targets could not be found on the page; review the scenarios manually before running",
            ),
        }
    }
}

impl std::fmt::Display for ValidationQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationQuality::Good => write!(f, "good"),
            ValidationQuality::Marginal => write!(f, "marginal"),
            ValidationQuality::Poor => write!(f, "poor"),
        }
    }
}

/// An unverified step and what the page offered instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnverifiedHint {
    pub scenario_index: usize,
    pub step_number: u32,
    pub target_text: String,
    pub closest_match: Option<String>,
}

/// Summary plus grade, ready for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub summary: ValidationSummary,
    pub quality: ValidationQuality,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub hints: Vec<UnverifiedHint>,
}

/// `None` when there is nothing to grade.
pub fn summarize(items: &[ValidationItem]) -> Option<ValidationSummary> {
    let total = items.len();
    if total == 0 {
        return None;
    }
    let verified = items.iter().filter(|i| i.is_verified()).count();
    let percent = ((verified as f64 / total as f64) * 100.0).round() as u32;
    Some(ValidationSummary {
        verified,
        total,
        percent,
    })
}

pub fn unverified_hints(items: &[ValidationItem]) -> Vec<UnverifiedHint> {
    items
        .iter()
        .filter(|i| !i.is_verified())
        .map(|i| UnverifiedHint {
            scenario_index: i.scenario_index,
            step_number: i.step_number,
            target_text: i.target_text.clone(),
            closest_match: i.closest_match.clone(),
        })
        .collect()
}

/// Summarize and grade. The local reduction is authoritative even when the
/// remote also sent a summary.
pub fn report(items: &[ValidationItem]) -> Option<ValidationReport> {
    let summary = summarize(items)?;
    let quality = ValidationQuality::from_percent(summary.percent);
    if let Some(w) = quality.warning() {
        tracing::warn!(
            verified = summary.verified,
            total = summary.total,
            percent = summary.percent,
            "{}",
            w
        );
    }
    Some(ValidationReport {
        summary,
        quality,
        warning: quality.warning().map(str::to_string),
        hints: unverified_hints(items),
    })
}
