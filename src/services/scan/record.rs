//! Scan Record Reducer
//!
//! In-memory state of one scan job. The push subscription and the polling
//! timer both feed this record through the same merge functions, which are
//! idempotent and monotonic: counters only grow, feature tags only
//! accumulate, and status never moves backwards. Side effects are not
//! performed here; each call returns the [`ScanEffect`]s the driver must
//! carry out.

use std::collections::VecDeque;

use chrono::Utc;
use tracing::{debug, info};
use webtest_core::{LogLevel, ProgressEvent, ScanJob, ScanLogEntry, ScanStatus, ScanSummary};

/// Side effect requested by the reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEffect {
    /// Request plan generation. Emitted at most once per record.
    TriggerPlan,
    StopPolling,
    CloseSubscription,
    /// The job failed; both sources must stop.
    Failed(String),
}

/// One scan job plus the local bookkeeping around it.
#[derive(Debug, Clone)]
pub struct ScanRecord {
    job: ScanJob,
    max_pages: u32,
    pages_scanned: u32,
    log_capacity: usize,
    dropped_log_entries: usize,
    plan_requested: bool,
    polling: bool,
    subscribed: bool,
}

impl ScanRecord {
    /// Wrap a freshly started job. A new record always starts with the plan
    /// latch cleared.
    pub fn new(job: ScanJob, max_pages: u32, log_capacity: usize) -> Self {
        Self {
            job,
            max_pages,
            pages_scanned: 0,
            log_capacity: log_capacity.max(1),
            dropped_log_entries: 0,
            plan_requested: false,
            polling: true,
            subscribed: true,
        }
    }

    pub fn job(&self) -> &ScanJob {
        &self.job
    }

    pub fn into_job(self) -> ScanJob {
        self.job
    }

    pub fn status(&self) -> ScanStatus {
        self.job.status
    }

    pub fn summary(&self) -> Option<&ScanSummary> {
        self.job.summary.as_ref()
    }

    pub fn log(&self) -> &VecDeque<ScanLogEntry> {
        &self.job.log
    }

    /// Entries evicted because the log hit its capacity.
    pub fn dropped_log_entries(&self) -> usize {
        self.dropped_log_entries
    }

    pub fn plan_requested(&self) -> bool {
        self.plan_requested
    }

    pub fn is_polling(&self) -> bool {
        self.polling
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    pub fn pages_scanned(&self) -> u32 {
        self.pages_scanned
    }

    /// Crawl progress as `pages_scanned / max_pages`, capped at 100.
    pub fn progress_percent(&self) -> u32 {
        if self.job.status.is_completed() {
            return 100;
        }
        if self.max_pages == 0 {
            return 0;
        }
        let pct = (self.pages_scanned as f64 / self.max_pages as f64 * 100.0).round() as u32;
        pct.min(100)
    }

    /// Apply one push event.
    pub fn apply_event(&mut self, event: &ProgressEvent) -> Vec<ScanEffect> {
        debug!(scan_id = %self.job.id, event = event.kind(), "scan event");
        match event {
            ProgressEvent::ScanStart { max_pages, .. } => {
                if let Some(max) = max_pages {
                    self.max_pages = *max;
                }
                Vec::new()
            }
            ProgressEvent::PageScanned {
                url,
                pages_scanned,
                max_pages,
                links_found,
                forms_found,
                buttons_found,
                features,
                observations_count,
                ..
            } => {
                if let Some(max) = max_pages {
                    self.max_pages = *max;
                }
                self.pages_scanned = self.pages_scanned.max(*pages_scanned);
                let pages = self.pages_scanned;
                let summary = self.summary_mut();
                summary.total_pages = summary.total_pages.max(pages);
                summary.total_links = summary.total_links.max(*links_found);
                summary.total_forms = summary.total_forms.max(*forms_found);
                summary.total_buttons = summary.total_buttons.max(*buttons_found);
                summary.total_observations = summary.total_observations.max(*observations_count);
                if !url.is_empty() {
                    summary.current_url = Some(url.clone());
                }
                self.union_features(features.iter());
                Vec::new()
            }
            ProgressEvent::FeatureDetected { feature, .. } => {
                self.union_features(std::iter::once(feature));
                Vec::new()
            }
            ProgressEvent::ScanLog {
                phase,
                level,
                message,
            } => {
                self.append_log(phase, *level, message);
                Vec::new()
            }
            ProgressEvent::ScanComplete { summary } => {
                if let Some(summary) = summary {
                    self.merge_summary(summary);
                }
                self.observe_status(ScanStatus::Completed, None)
            }
            ProgressEvent::ScanError { error } => {
                let message = error.clone().unwrap_or_else(|| "Scan failed".to_string());
                self.observe_status(ScanStatus::Failed, Some(message))
            }
            _ => Vec::new(),
        }
    }

    /// Apply one polled snapshot of the job.
    pub fn apply_poll(&mut self, polled: &ScanJob) -> Vec<ScanEffect> {
        if polled.id != self.job.id {
            return Vec::new();
        }
        debug!(scan_id = %self.job.id, status = %polled.status, "scan poll");
        if let Some(summary) = &polled.summary {
            self.merge_summary(summary);
        }
        self.union_features(polled.detected_features.iter());
        if self.job.completed_at.is_none() {
            self.job.completed_at = polled.completed_at.clone();
        }
        self.observe_status(polled.status, polled.error_message.clone())
    }

    /// Record the local move to `planning` once the plan request is in flight.
    pub fn mark_planning(&mut self) {
        self.advance_status(ScanStatus::Planning);
    }

    pub fn mark_planned(&mut self) {
        self.advance_status(ScanStatus::Planned);
    }

    /// Local cancellation: terminal regardless of what the sources say later.
    pub fn mark_cancelled(&mut self) -> Vec<ScanEffect> {
        if self.job.status.is_failure() {
            return Vec::new();
        }
        self.job.status = ScanStatus::Cancelled;
        self.stop_sources()
    }

    fn observe_status(&mut self, status: ScanStatus, error: Option<String>) -> Vec<ScanEffect> {
        if self.job.status.is_failure() {
            return Vec::new();
        }
        if status.is_completed() {
            self.advance_status(status);
            return self.on_completed();
        }
        if status.is_failure() {
            return self.on_failed(status, error);
        }
        Vec::new()
    }

    fn on_completed(&mut self) -> Vec<ScanEffect> {
        let mut effects = Vec::new();
        if !self.plan_requested {
            self.plan_requested = true;
            info!(scan_id = %self.job.id, pages = self.pages_scanned, "scan completed");
            effects.push(ScanEffect::TriggerPlan);
        }
        effects.extend(self.stop_sources());
        effects
    }

    fn on_failed(&mut self, status: ScanStatus, error: Option<String>) -> Vec<ScanEffect> {
        // completion is sticky, and a failure is only reported once
        if self.job.status.is_completed() || self.job.status.is_failure() {
            return Vec::new();
        }
        self.job.status = status;
        let message = error.unwrap_or_else(|| format!("Scan {}", status));
        self.job.error_message = Some(message.clone());
        self.append_log("error", LogLevel::Error, &message);
        let mut effects = self.stop_sources();
        effects.push(ScanEffect::Failed(message));
        effects
    }

    fn stop_sources(&mut self) -> Vec<ScanEffect> {
        let mut effects = Vec::new();
        if self.polling {
            self.polling = false;
            effects.push(ScanEffect::StopPolling);
        }
        if self.subscribed {
            self.subscribed = false;
            effects.push(ScanEffect::CloseSubscription);
        }
        effects
    }

    /// Note that the subscription went away without an explicit terminal event.
    pub fn subscription_lost(&mut self) {
        self.subscribed = false;
    }

    fn advance_status(&mut self, status: ScanStatus) {
        let current = self.job.status;
        if current.is_failure() {
            return;
        }
        if status.rank() > current.rank() {
            self.job.status = status;
        }
    }

    fn summary_mut(&mut self) -> &mut ScanSummary {
        self.job.summary.get_or_insert_with(ScanSummary::default)
    }

    fn merge_summary(&mut self, incoming: &ScanSummary) {
        let summary = self.summary_mut();
        summary.total_pages = summary.total_pages.max(incoming.total_pages);
        summary.total_links = summary.total_links.max(incoming.total_links);
        summary.total_forms = summary.total_forms.max(incoming.total_forms);
        summary.total_buttons = summary.total_buttons.max(incoming.total_buttons);
        summary.total_nav_menus = summary.total_nav_menus.max(incoming.total_nav_menus);
        summary.broken_links = summary.broken_links.max(incoming.broken_links);
        summary.total_observations = summary.total_observations.max(incoming.total_observations);
        if incoming.site_type.is_some() {
            summary.site_type = incoming.site_type.clone();
        }
        if incoming.current_url.is_some() {
            summary.current_url = incoming.current_url.clone();
        }
        let pages = summary.total_pages;
        let features = incoming.detected_features.clone();
        self.pages_scanned = self.pages_scanned.max(pages);
        self.union_features(features.iter());
    }

    fn union_features<'a>(&mut self, features: impl Iterator<Item = &'a String>) {
        for feature in features {
            if !self.job.detected_features.contains(feature) {
                self.job.detected_features.push(feature.clone());
            }
            let summary = self.summary_mut();
            if !summary.detected_features.contains(feature) {
                summary.detected_features.push(feature.clone());
            }
        }
    }

    fn append_log(&mut self, phase: &str, level: LogLevel, message: &str) {
        if self.job.log.len() >= self.log_capacity {
            self.job.log.pop_front();
            self.dropped_log_entries += 1;
        }
        self.job.log.push_back(ScanLogEntry {
            phase: phase.to_string(),
            message: message.to_string(),
            level,
            received_at: Utc::now(),
        });
    }
}
