//! Progress Updates
//!
//! Live updates from the long-running workflow calls. A caller that wants
//! them hands a channel sender to the controller; every applied scan event,
//! poll result and execution event is then published as it happens.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;
use webtest_core::{ExecutionJobId, ScanLogEntry};

use crate::models::workflow::{Outcome, WorkflowPhase};
use crate::services::execution::Frame;
use crate::services::phase::snapshot::{ExecutionView, ScanView};

/// One live update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressUpdate {
    Phase {
        phase: WorkflowPhase,
        #[serde(skip_serializing_if = "Option::is_none")]
        outcome: Option<Outcome>,
    },
    Scan(ScanView),
    ScanLog(ScanLogEntry),
    Execution(ExecutionView),
    Frame { job_id: ExecutionJobId, frame: Frame },
}

/// Optional sending half of the progress channel.
///
/// Without a sender every publish is a no-op. A dropped receiver is not an
/// error; the workflow carries on unobserved.
#[derive(Debug, Clone, Default)]
pub struct ProgressSender {
    event_tx: Option<mpsc::Sender<ProgressUpdate>>,
}

impl ProgressSender {
    pub fn new(event_tx: Option<mpsc::Sender<ProgressUpdate>>) -> Self {
        Self { event_tx }
    }

    pub fn is_enabled(&self) -> bool {
        self.event_tx.is_some()
    }

    /// Send and wait for channel capacity.
    pub async fn send(&self, update: ProgressUpdate) {
        if let Some(tx) = &self.event_tx {
            if tx.send(update).await.is_err() {
                debug!("progress receiver dropped");
            }
        }
    }

    /// Send without waiting, for synchronous call sites. Dropped when the
    /// channel is full.
    pub fn try_send(&self, update: ProgressUpdate) {
        if let Some(tx) = &self.event_tx {
            if let Err(e) = tx.try_send(update) {
                debug!(error = %e, "progress update not delivered");
            }
        }
    }
}
