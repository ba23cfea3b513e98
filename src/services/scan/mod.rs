//! Scan Coordination
//!
//! One crawl job's lifecycle: two progress sources, one reducer, one plan
//! request.

pub mod coordinator;
pub mod record;

pub use coordinator::{ScanCoordinator, ScanOutcome, ScanSettings};
pub use record::{ScanEffect, ScanRecord};
