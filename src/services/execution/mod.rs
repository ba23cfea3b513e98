//! Execution Monitoring
//!
//! Step-level tracking of one execution job over its push channel.

pub mod monitor;
pub mod watcher;

pub use monitor::{
    is_timeout_error, EventLogEntry, ExecutionMonitor, Frame, MonitorEffect, MonitorPhase,
    MonitorSettings, StepState, StepStatus,
};
pub use watcher::{ExecutionWatcher, WatchExit};
