//! Push Channel Abstraction
//!
//! One subscription per job identity. A subscription is a stream of
//! [`ProgressEvent`]s that ends when the connection closes, for whatever
//! reason; deciding whether a closed stream is recoverable is the
//! subscriber's job, not the transport's.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use webtest_core::{ExecutionJobId, ProgressEvent, ScanId};

use crate::error::ApiResult;

/// Events in delivery order. `None` from the stream means disconnected.
pub type EventStream = Pin<Box<dyn Stream<Item = ProgressEvent> + Send>>;

/// Identity of the job a subscription reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobRef {
    Scan(ScanId),
    Execution(ExecutionJobId),
}

impl JobRef {
    /// Channel path relative to the push base URL.
    pub fn channel_path(&self) -> String {
        match self {
            JobRef::Scan(id) => format!("/api/scan/{}/ws", id),
            JobRef::Execution(id) => format!("/api/tests/{}/ws", id),
        }
    }
}

impl std::fmt::Display for JobRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobRef::Scan(id) => write!(f, "scan:{}", id),
            JobRef::Execution(id) => write!(f, "test:{}", id),
        }
    }
}

/// Opens push subscriptions.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Connect to the job's channel. An `Err` means the connection could not
    /// be opened at all; a stream that ends immediately is also possible.
    async fn subscribe(&self, job: JobRef) -> ApiResult<EventStream>;
}
