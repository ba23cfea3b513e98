//! Data Models
//!
//! Orchestrator-side data structures. Wire types shared with the service
//! live in `webtest-core`.

pub mod settings;
pub mod workflow;

pub use settings::*;
pub use workflow::*;
