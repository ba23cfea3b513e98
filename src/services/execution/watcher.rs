//! Execution Watcher
//!
//! Connection handling for [`ExecutionMonitor`]: subscribe, feed events,
//! and on disconnect either wait and reconnect or stop, as the monitor
//! decides.
//!
//! The push channel has no replay, so every session starts by reading the
//! job record, and the record is re-read on the poll interval while the
//! channel stays open. A job that finished before or between pushes is
//! therefore still seen.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webtest_client::{EventSource, JobRef, TestingApi};
use webtest_core::ProgressEvent;

use crate::services::execution::monitor::{ExecutionMonitor, MonitorEffect};
use crate::services::phase::snapshot::ExecutionView;
use crate::services::progress::{ProgressSender, ProgressUpdate};

/// Why a watch session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchExit {
    Finished { passed: bool },
    /// Generation is done and the job waits in review.
    AwaitingReview,
    Lost(String),
    Cancelled,
}

impl WatchExit {
    fn from_effect(effect: MonitorEffect) -> Option<Self> {
        match effect {
            MonitorEffect::Finished { passed } => Some(WatchExit::Finished { passed }),
            MonitorEffect::AwaitingReview => Some(WatchExit::AwaitingReview),
            MonitorEffect::Lost(message) => Some(WatchExit::Lost(message)),
            MonitorEffect::ScheduleReconnect(_) => None,
        }
    }
}

pub struct ExecutionWatcher {
    api: Arc<dyn TestingApi>,
    events: Arc<dyn EventSource>,
    progress: ProgressSender,
}

impl ExecutionWatcher {
    pub fn new(api: Arc<dyn TestingApi>, events: Arc<dyn EventSource>) -> Self {
        Self {
            api,
            events,
            progress: ProgressSender::default(),
        }
    }

    /// Publish the execution view (or the latest frame) after every change.
    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = progress;
        self
    }

    /// Follow the monitor's job until it finishes, pauses for review, is
    /// lost, or `cancel` fires.
    pub async fn watch(
        &self,
        monitor: &mut ExecutionMonitor,
        cancel: &CancellationToken,
    ) -> WatchExit {
        self.watch_with(monitor, cancel, |_| None).await
    }

    /// [`Self::watch`], calling `observe` after every change to the monitor.
    /// An update it returns is published ahead of the execution view.
    pub async fn watch_with<F>(
        &self,
        monitor: &mut ExecutionMonitor,
        cancel: &CancellationToken,
        mut observe: F,
    ) -> WatchExit
    where
        F: FnMut(&ExecutionMonitor) -> Option<ProgressUpdate>,
    {
        let job = JobRef::Execution(monitor.job_id());
        let period = monitor.settings().poll_interval;

        loop {
            monitor.on_connecting();
            match self.events.subscribe(job).await {
                Ok(mut stream) => {
                    debug!(job = %job, "execution channel open");
                    if let Some(exit) = self.reconcile(monitor, &mut observe).await {
                        return exit;
                    }

                    let mut ticker = interval_at(Instant::now() + period, period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => return WatchExit::Cancelled,
                            event = stream.next() => match event {
                                Some(event) => {
                                    let effect = monitor.apply_event(&event);
                                    self.publish(monitor, Some(&event), &mut observe).await;
                                    if let Some(exit) = effect.and_then(WatchExit::from_effect) {
                                        if let WatchExit::Finished { passed } = exit {
                                            info!(job = %job, passed, "execution finished");
                                        }
                                        return exit;
                                    }
                                }
                                None => break,
                            },
                            _ = ticker.tick() => {
                                if let Some(exit) = self.reconcile(monitor, &mut observe).await {
                                    return exit;
                                }
                            }
                        }
                    }
                }
                Err(e) if !e.is_transient() => {
                    let message = format!("Cannot subscribe to test progress: {}", e);
                    monitor.fail(message.clone());
                    return WatchExit::Lost(message);
                }
                Err(e) => {
                    warn!(job = %job, error = %e, "execution channel connect failed");
                }
            }

            match monitor.on_disconnect() {
                MonitorEffect::ScheduleReconnect(delay) => {
                    tokio::select! {
                        _ = cancel.cancelled() => return WatchExit::Cancelled,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                effect => {
                    self.publish(monitor, None, &mut observe).await;
                    if let Some(exit) = WatchExit::from_effect(effect) {
                        return exit;
                    }
                }
            }
        }
    }

    /// Fold the job record into the monitor. Returns an exit when the record
    /// shows the job already settled.
    async fn reconcile<F>(&self, monitor: &mut ExecutionMonitor, observe: &mut F) -> Option<WatchExit>
    where
        F: FnMut(&ExecutionMonitor) -> Option<ProgressUpdate>,
    {
        let job_id = monitor.job_id();
        match self.api.get_execution_job(job_id).await {
            Ok(job) => {
                monitor.apply_job_snapshot(&job);
                self.publish(monitor, None, observe).await;
                let exit = monitor.settled().and_then(WatchExit::from_effect);
                if let Some(WatchExit::Finished { passed }) = exit {
                    info!(job_id = %job_id, passed, status = %job.status, "execution finished per job record");
                }
                exit
            }
            Err(e) => {
                debug!(job_id = %job_id, error = %e, "job record unavailable; relying on push events");
                None
            }
        }
    }

    async fn publish<F>(&self, monitor: &ExecutionMonitor, event: Option<&ProgressEvent>, observe: &mut F)
    where
        F: FnMut(&ExecutionMonitor) -> Option<ProgressUpdate>,
    {
        if let Some(update) = observe(monitor) {
            self.progress.send(update).await;
        }
        if !self.progress.is_enabled() {
            return;
        }
        let update = match (event, monitor.latest_frame()) {
            (Some(ProgressEvent::Screenshot { .. }), Some(frame)) => ProgressUpdate::Frame {
                job_id: monitor.job_id(),
                frame: frame.clone(),
            },
            _ => ProgressUpdate::Execution(ExecutionView::from(monitor)),
        };
        self.progress.send(update).await;
    }
}
