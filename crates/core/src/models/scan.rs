//! Scan Job Model
//!
//! A crawl task against a target site, as reported by `GET /api/scan/{id}`
//! and enriched locally with the structured progress log.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server-assigned scan identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanId(pub i64);

impl std::fmt::Display for ScanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a scan job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Scanning,
    Completed,
    Planning,
    Planned,
    Failed,
    Cancelled,
}

impl ScanStatus {
    /// The crawl itself is over (successfully or not).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanStatus::Completed
                | ScanStatus::Planning
                | ScanStatus::Planned
                | ScanStatus::Failed
                | ScanStatus::Cancelled
        )
    }

    /// Crawl finished successfully; plan generation may proceed.
    pub fn is_completed(&self) -> bool {
        matches!(
            self,
            ScanStatus::Completed | ScanStatus::Planning | ScanStatus::Planned
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ScanStatus::Failed | ScanStatus::Cancelled)
    }

    /// Position along the forward path. Failure states rank highest so that
    /// nothing can move a job out of them.
    pub fn rank(&self) -> u8 {
        match self {
            ScanStatus::Scanning => 0,
            ScanStatus::Completed => 1,
            ScanStatus::Planning => 2,
            ScanStatus::Planned => 3,
            ScanStatus::Failed | ScanStatus::Cancelled => 4,
        }
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScanStatus::Scanning => "scanning",
            ScanStatus::Completed => "completed",
            ScanStatus::Planning => "planning",
            ScanStatus::Planned => "planned",
            ScanStatus::Failed => "failed",
            ScanStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Site-type classification produced by the crawler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteType {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub confidence: f64,
}

/// Structural statistics of a crawled site.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub total_links: u32,
    #[serde(default)]
    pub total_forms: u32,
    #[serde(default)]
    pub total_buttons: u32,
    #[serde(default)]
    pub total_nav_menus: u32,
    #[serde(default)]
    pub broken_links: u32,
    #[serde(default)]
    pub detected_features: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_type: Option<SiteType>,
    #[serde(default)]
    pub total_observations: u32,
    /// Last page reported by the crawler. Local only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_url: Option<String>,
}

/// Severity of a scan log entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
}

/// One structured line of crawler progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanLogEntry {
    pub phase: String,
    pub message: String,
    pub level: LogLevel,
    pub received_at: DateTime<Utc>,
}

/// A crawl job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanJob {
    pub id: ScanId,
    pub target_url: String,
    pub status: ScanStatus,
    #[serde(default)]
    pub summary: Option<ScanSummary>,
    #[serde(default)]
    pub detected_features: Vec<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    /// Ordered, append-only progress log. Never sent by the server.
    #[serde(default, skip_serializing_if = "VecDeque::is_empty")]
    pub log: VecDeque<ScanLogEntry>,
}

impl ScanJob {
    /// Fresh job in the `scanning` state.
    pub fn new(id: ScanId, target_url: impl Into<String>) -> Self {
        Self {
            id,
            target_url: target_url.into(),
            status: ScanStatus::Scanning,
            summary: None,
            detected_features: Vec::new(),
            error_message: None,
            created_at: None,
            completed_at: None,
            log: VecDeque::new(),
        }
    }
}
