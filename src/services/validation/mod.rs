//! Step Target Validation

pub mod aggregator;

pub use aggregator::{
    report, summarize, unverified_hints, UnverifiedHint, ValidationQuality, ValidationReport,
};
