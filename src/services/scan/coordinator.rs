//! Scan Coordinator
//!
//! Drives one scan job from creation to a generated test plan. The job's
//! push subscription and a fixed-interval status poll run side by side in a
//! single `select!` loop; both feed [`ScanRecord`], and the effects it
//! returns are carried out here.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use webtest_client::{EventSource, EventStream, JobRef, StartScanRequest, TestingApi};
use webtest_core::{ProgressEvent, TestPlan};

use crate::models::settings::OrchestratorConfig;
use crate::services::phase::snapshot::ScanView;
use crate::services::progress::{ProgressSender, ProgressUpdate};
use crate::services::scan::record::{ScanEffect, ScanRecord};
use crate::utils::error::{AppError, AppResult};

/// Timing and sizing knobs for scan coordination.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub poll_interval: Duration,
    pub log_capacity: usize,
    pub language: String,
}

impl From<&OrchestratorConfig> for ScanSettings {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            log_capacity: config.scan_log_capacity,
            language: config.language.clone(),
        }
    }
}

/// How a driven scan ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    /// The crawl completed and the plan came back.
    Planned(TestPlan),
    Failed(String),
    Cancelled,
}

/// Owns the scan-side remote calls and the two progress sources.
pub struct ScanCoordinator {
    api: Arc<dyn TestingApi>,
    events: Arc<dyn EventSource>,
    settings: ScanSettings,
    progress: ProgressSender,
}

impl ScanCoordinator {
    pub fn new(
        api: Arc<dyn TestingApi>,
        events: Arc<dyn EventSource>,
        settings: ScanSettings,
    ) -> Self {
        Self {
            api,
            events,
            settings,
            progress: ProgressSender::default(),
        }
    }

    /// Publish scan progress and new log lines while [`Self::run`] follows a job.
    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = progress;
        self
    }

    /// Create the remote scan job.
    pub async fn start_scan(
        &self,
        target_url: &str,
        max_pages: u32,
        max_depth: u32,
    ) -> AppResult<ScanRecord> {
        validate_target_url(target_url)?;
        if max_pages == 0 {
            return Err(AppError::validation("max_pages must be greater than 0"));
        }

        let job = self
            .api
            .start_scan(StartScanRequest {
                target_url: target_url.to_string(),
                max_pages,
                max_depth,
            })
            .await?;
        info!(scan_id = %job.id, url = %target_url, max_pages, max_depth, "scan started");
        Ok(ScanRecord::new(job, max_pages, self.settings.log_capacity))
    }

    /// Follow the job until it fails, is cancelled, or completes and its
    /// plan has been generated.
    pub async fn run(
        &self,
        record: &mut ScanRecord,
        cancel: &CancellationToken,
    ) -> AppResult<ScanOutcome> {
        let scan_id = record.job().id;

        let mut subscription = match self.events.subscribe(JobRef::Scan(scan_id)).await {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!(scan_id = %scan_id, error = %e, "scan channel unavailable; polling only");
                record.subscription_lost();
                None
            }
        };

        let mut published_log = record.dropped_log_entries() + record.log().len();
        let period = self.settings.poll_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let effects = tokio::select! {
                _ = cancel.cancelled() => {
                    record.mark_cancelled();
                    info!(scan_id = %scan_id, "scan cancelled");
                    return Ok(ScanOutcome::Cancelled);
                }
                event = next_event(&mut subscription) => match event {
                    Some(event) => record.apply_event(&event),
                    None => {
                        // not terminal: the poll may still observe completion
                        warn!(scan_id = %scan_id, "scan channel dropped; continuing with polling");
                        subscription = None;
                        record.subscription_lost();
                        Vec::new()
                    }
                },
                _ = ticker.tick(), if record.is_polling() => {
                    match self.api.get_scan(scan_id).await {
                        Ok(job) => record.apply_poll(&job),
                        Err(e) => {
                            warn!(scan_id = %scan_id, error = %e, "scan poll failed; retrying next tick");
                            Vec::new()
                        }
                    }
                }
            };
            self.publish(record, &mut published_log).await;

            let mut trigger_plan = false;
            for effect in effects {
                match effect {
                    ScanEffect::TriggerPlan => trigger_plan = true,
                    ScanEffect::StopPolling => {}
                    ScanEffect::CloseSubscription => subscription = None,
                    ScanEffect::Failed(message) => {
                        error!(scan_id = %scan_id, error = %message, "scan failed");
                        return Ok(ScanOutcome::Failed(message));
                    }
                }
            }

            if trigger_plan {
                let plan = self.generate_plan(record).await?;
                self.publish(record, &mut published_log).await;
                return Ok(ScanOutcome::Planned(plan));
            }
        }
    }

    /// Send log lines appended since the last publish, then the scan view.
    async fn publish(&self, record: &ScanRecord, published_log: &mut usize) {
        if !self.progress.is_enabled() {
            return;
        }
        let log = record.log();
        let appended = record.dropped_log_entries() + log.len();
        let fresh = appended.saturating_sub(*published_log).min(log.len());
        for entry in log.iter().skip(log.len() - fresh) {
            self.progress.send(ProgressUpdate::ScanLog(entry.clone())).await;
        }
        *published_log = appended;
        self.progress.send(ProgressUpdate::Scan(ScanView::from(record))).await;
    }

    async fn generate_plan(&self, record: &mut ScanRecord) -> AppResult<TestPlan> {
        let scan_id = record.job().id;
        record.mark_planning();
        info!(scan_id = %scan_id, language = %self.settings.language, "generating test plan");
        let plan = self
            .api
            .generate_plan(scan_id, &self.settings.language)
            .await
            .map_err(|e| {
                error!(scan_id = %scan_id, error = %e, "plan generation failed");
                AppError::from(e)
            })?;
        record.mark_planned();
        info!(
            scan_id = %scan_id,
            categories = plan.categories.len(),
            tests = plan.item_count(),
            "test plan ready"
        );
        Ok(plan)
    }
}

async fn next_event(subscription: &mut Option<EventStream>) -> Option<ProgressEvent> {
    match subscription {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

/// Scans and conversions only make sense against an http(s) URL.
pub(crate) fn validate_target_url(target_url: &str) -> AppResult<()> {
    let parsed = url::Url::parse(target_url)
        .map_err(|e| AppError::validation(format!("Invalid target URL {}: {}", target_url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AppError::validation(format!(
            "Invalid target URL {}: scheme must be http or https",
            target_url
        )));
    }
    Ok(())
}
