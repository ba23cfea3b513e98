//! WebTest Core
//!
//! Shared types for the WebTest orchestrator workspace: error types, the
//! progress event union pushed by the remote testing service, the wire data
//! model, and proxy settings. This crate has no dependency on networking or
//! on the orchestrator itself.
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `events` - Push channel messages (`ProgressEvent`)
//! - `models` - Scan jobs, test plans, execution jobs, validation results
//! - `proxy` - Proxy configuration for the HTTP client

pub mod error;
pub mod events;
pub mod models;
pub mod proxy;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Events ─────────────────────────────────────────────────────────────
pub use events::ProgressEvent;

// ── Wire Model ─────────────────────────────────────────────────────────
pub use models::{
    ExecutionJob, ExecutionJobId, ExecutionMode, ExecutionStatus, FieldDescriptor, LogLevel,
    Priority, ScanId, ScanJob, ScanLogEntry, ScanStatus, ScanSummary, SiteType, TestCategory,
    TestPlan, TestPlanItem, ValidationItem, ValidationStatus, ValidationSummary,
};

// ── Proxy Types ────────────────────────────────────────────────────────
pub use proxy::{ProxyConfig, ProxyProtocol};
