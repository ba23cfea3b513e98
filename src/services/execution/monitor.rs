//! Execution Monitor
//!
//! State of one execution job as seen through its push channel: the scalar
//! monitor phase, per-step status, the latest browser frame and an event
//! history. Everything here is synchronous; the connection handling lives
//! in [`super::watcher`].

use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use webtest_core::{ExecutionJob, ExecutionJobId, ExecutionStatus, ProgressEvent};

use crate::models::settings::OrchestratorConfig;

/// Scalar lifecycle of a monitored execution job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorPhase {
    Connecting,
    /// Channel dropped before any work was observed; a reconnect is pending.
    Waiting,
    Generating,
    /// Scenarios generated; the job waits for approval.
    Review,
    Running,
    Passed,
    Failed,
}

impl MonitorPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MonitorPhase::Passed | MonitorPhase::Failed)
    }
}

impl std::fmt::Display for MonitorPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorPhase::Connecting => write!(f, "connecting"),
            MonitorPhase::Waiting => write!(f, "waiting"),
            MonitorPhase::Generating => write!(f, "generating"),
            MonitorPhase::Review => write!(f, "review"),
            MonitorPhase::Running => write!(f, "running"),
            MonitorPhase::Passed => write!(f, "passed"),
            MonitorPhase::Failed => write!(f, "failed"),
        }
    }
}

/// Status of a single scenario step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Passed,
    Failed,
    Timeout,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Passed | StepStatus::Failed | StepStatus::Timeout
        )
    }
}

/// Per-step state. Step numbers are 1-based.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepState {
    pub number: u32,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

/// Most recent browser frame. Replaced on every `screenshot` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub step: Option<u32>,
    pub timing: Option<String>,
    /// Base64 image payload as sent by the service.
    pub image: String,
    pub received_at: DateTime<Utc>,
}

/// One line of execution history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// What the connection driver must do after a state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEffect {
    ScheduleReconnect(Duration),
    AwaitingReview,
    Finished { passed: bool },
    /// Execution was underway and the channel went silent, or the reconnect
    /// budget ran out.
    Lost(String),
}

/// Largest step table a job may declare. Larger totals are clamped.
pub const MAX_STEPS: u32 = 1000;

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
    /// How often the job record is re-read while the channel is open.
    pub poll_interval: Duration,
}

impl From<&OrchestratorConfig> for MonitorSettings {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            reconnect_delay: config.reconnect_delay(),
            max_reconnect_attempts: config.max_reconnect_attempts,
            poll_interval: config.poll_interval(),
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from(&OrchestratorConfig::default())
    }
}

fn timeout_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)timeout|timed out").ok())
        .as_ref()
}

/// Whether a step failure message describes a timeout.
pub fn is_timeout_error(message: &str) -> bool {
    match timeout_pattern() {
        Some(re) => re.is_match(message),
        None => {
            let lower = message.to_lowercase();
            lower.contains("timeout") || lower.contains("timed out")
        }
    }
}

/// Local view of one execution job.
#[derive(Debug, Clone)]
pub struct ExecutionMonitor {
    job_id: ExecutionJobId,
    phase: MonitorPhase,
    started: bool,
    /// Set once the job left review; a stale review record cannot pause it again.
    approved: bool,
    steps: Vec<StepState>,
    remote_completed: u32,
    document: Option<String>,
    latest_frame: Option<Frame>,
    log: Vec<EventLogEntry>,
    error: Option<String>,
    reconnect_attempts: u32,
    settings: MonitorSettings,
}

impl ExecutionMonitor {
    pub fn new(job_id: ExecutionJobId, steps_total: u32, settings: MonitorSettings) -> Self {
        let mut monitor = Self {
            job_id,
            phase: MonitorPhase::Connecting,
            started: false,
            approved: false,
            steps: Vec::new(),
            remote_completed: 0,
            document: None,
            latest_frame: None,
            log: Vec::new(),
            error: None,
            reconnect_attempts: 0,
            settings,
        };
        monitor.declare_total(steps_total);
        monitor
    }

    pub fn job_id(&self) -> ExecutionJobId {
        self.job_id
    }

    pub fn phase(&self) -> MonitorPhase {
        self.phase
    }

    /// A `test_start` (or later execution progress) has been observed.
    pub fn started(&self) -> bool {
        self.started
    }

    pub fn steps(&self) -> &[StepState] {
        &self.steps
    }

    pub fn steps_total(&self) -> u32 {
        self.steps.len() as u32
    }

    pub fn steps_completed(&self) -> u32 {
        let local = self.steps.iter().filter(|s| s.status.is_terminal()).count() as u32;
        local.max(self.remote_completed).min(self.steps_total())
    }

    /// Number of the step currently running, if any.
    pub fn current_step(&self) -> Option<u32> {
        self.steps
            .iter()
            .find(|s| s.status == StepStatus::Running)
            .map(|s| s.number)
    }

    pub fn document(&self) -> Option<&str> {
        self.document.as_deref()
    }

    pub fn latest_frame(&self) -> Option<&Frame> {
        self.latest_frame.as_ref()
    }

    pub fn log(&self) -> &[EventLogEntry] {
        &self.log
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// The effect that ends a watch session in the current phase, if any.
    pub fn settled(&self) -> Option<MonitorEffect> {
        match self.phase {
            MonitorPhase::Passed => Some(MonitorEffect::Finished { passed: true }),
            MonitorPhase::Failed => Some(MonitorEffect::Finished { passed: false }),
            MonitorPhase::Review => Some(MonitorEffect::AwaitingReview),
            _ => None,
        }
    }

    pub fn has_failed_steps(&self) -> bool {
        self.steps
            .iter()
            .any(|s| matches!(s.status, StepStatus::Failed | StepStatus::Timeout))
    }

    /// `round(current / total * 100)` while running, 100 once terminal.
    /// The current position is the furthest step reached.
    pub fn progress_percent(&self) -> u32 {
        if self.phase.is_terminal() {
            return 100;
        }
        let total = self.steps_total();
        if total == 0 {
            return 0;
        }
        let reached = self
            .steps
            .iter()
            .filter(|s| s.status != StepStatus::Pending)
            .map(|s| s.number)
            .max()
            .unwrap_or(0)
            .max(self.steps_completed());
        (reached as f64 / total as f64 * 100.0).round() as u32
    }

    /// A new connection attempt is being made.
    pub fn on_connecting(&mut self) {
        if self.phase == MonitorPhase::Waiting {
            self.phase = MonitorPhase::Connecting;
        }
    }

    /// Apply one push event.
    pub fn apply_event(&mut self, event: &ProgressEvent) -> Option<MonitorEffect> {
        match self.phase {
            MonitorPhase::Failed => return None,
            // only an authoritative completion may still turn an inferred pass into a failure
            MonitorPhase::Passed
                if !matches!(
                    event,
                    ProgressEvent::TestComplete { .. } | ProgressEvent::TestFail { .. }
                ) =>
            {
                return None
            }
            _ => {}
        }
        debug!(job_id = %self.job_id, event = event.kind(), phase = %self.phase, "execution event");

        if event.is_execution_event() && !matches!(event, ProgressEvent::Screenshot { .. }) {
            self.record(event);
            // any execution traffic resets the reconnect budget
            self.reconnect_attempts = 0;
        }

        match event {
            ProgressEvent::TestStart { phase, .. } => {
                self.started = true;
                let next = if phase.as_deref() == Some("generate") {
                    MonitorPhase::Generating
                } else {
                    MonitorPhase::Running
                };
                self.set_phase(next);
                None
            }
            ProgressEvent::ScenariosGenerated { steps_total, .. } => {
                self.started = true;
                self.declare_total(*steps_total);
                None
            }
            ProgressEvent::ScenariosReady {
                scenario_yaml,
                steps_total,
            } => {
                self.declare_total(*steps_total);
                if scenario_yaml.is_some() {
                    self.document = scenario_yaml.clone();
                }
                self.set_phase(MonitorPhase::Review);
                Some(MonitorEffect::AwaitingReview)
            }
            ProgressEvent::StepStart {
                step,
                total,
                description,
            } => {
                self.started = true;
                // the job record and generation events own the total; a step
                // event may only supply one that is still unknown
                match total {
                    Some(total) if self.steps.is_empty() => self.declare_total(*total),
                    Some(total) if *total > self.steps_total() => {
                        debug!(job_id = %self.job_id, total, declared = self.steps_total(), "ignoring step total beyond declared");
                    }
                    _ => {}
                }
                self.set_phase(MonitorPhase::Running);
                if let Some(state) = self.step_mut(*step) {
                    if !state.status.is_terminal() {
                        state.status = StepStatus::Running;
                    }
                    if description.is_some() {
                        state.description = description.clone();
                    }
                }
                None
            }
            ProgressEvent::StepDone {
                step, elapsed_ms, ..
            } => {
                self.started = true;
                if let Some(state) = self.step_mut(*step) {
                    state.status = StepStatus::Passed;
                    state.elapsed_ms = *elapsed_ms;
                }
                self.infer_completion()
            }
            ProgressEvent::StepFail {
                step,
                error,
                description,
                ..
            } => {
                self.started = true;
                let job_id = self.job_id;
                if let Some(state) = self.step_mut(*step) {
                    let timed_out = error.as_deref().map(is_timeout_error).unwrap_or(false);
                    state.status = if timed_out {
                        StepStatus::Timeout
                    } else {
                        StepStatus::Failed
                    };
                    state.error = error.clone();
                    if description.is_some() {
                        state.description = description.clone();
                    }
                    warn!(job_id = %job_id, step = *step, status = ?state.status, "step failed");
                }
                None
            }
            ProgressEvent::TestComplete { passed, .. } => {
                let passed = passed.unwrap_or(!self.has_failed_steps());
                Some(self.finish(passed, None))
            }
            ProgressEvent::TestFail { error, .. } => {
                let message = error.clone().unwrap_or_else(|| "Test failed".to_string());
                Some(self.finish(false, Some(message)))
            }
            ProgressEvent::Screenshot {
                step,
                timing,
                image,
            } => {
                self.latest_frame = Some(Frame {
                    step: *step,
                    timing: timing.clone(),
                    image: image.clone(),
                    received_at: Utc::now(),
                });
                None
            }
            _ => None,
        }
    }

    /// The channel closed. Decides between reconnecting and giving up.
    pub fn on_disconnect(&mut self) -> MonitorEffect {
        match self.phase {
            MonitorPhase::Passed => return MonitorEffect::Finished { passed: true },
            MonitorPhase::Failed => return MonitorEffect::Finished { passed: false },
            MonitorPhase::Review => return MonitorEffect::AwaitingReview,
            _ => {}
        }

        if self.started {
            let message = "Connection lost while the test was running".to_string();
            self.fail(message.clone());
            return MonitorEffect::Lost(message);
        }

        if self.reconnect_attempts >= self.settings.max_reconnect_attempts {
            let message = format!(
                "Could not reach the test after {} reconnect attempts",
                self.reconnect_attempts
            );
            self.fail(message.clone());
            return MonitorEffect::Lost(message);
        }

        self.reconnect_attempts += 1;
        self.set_phase(MonitorPhase::Waiting);
        warn!(
            job_id = %self.job_id,
            attempt = self.reconnect_attempts,
            delay_secs = self.settings.reconnect_delay.as_secs(),
            "execution channel dropped before start; reconnecting"
        );
        MonitorEffect::ScheduleReconnect(self.settings.reconnect_delay)
    }

    /// The job was approved out of review; a fresh session follows.
    pub fn resume_after_approval(&mut self) {
        if self.phase != MonitorPhase::Review {
            return;
        }
        self.started = false;
        self.approved = true;
        self.reconnect_attempts = 0;
        self.set_phase(MonitorPhase::Connecting);
    }

    /// Replace the document held for review after a local edit.
    pub fn set_document(&mut self, document: String, steps_total: u32) {
        self.document = Some(document);
        self.declare_total(steps_total);
    }

    /// Force a terminal failure (operator cancel, unrecoverable channel error).
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.phase.is_terminal() {
            return;
        }
        let message = message.into();
        error!(job_id = %self.job_id, error = %message, "execution failed");
        self.error = Some(message);
        self.set_phase(MonitorPhase::Failed);
    }

    /// Reconcile with a fetched job record. Counters only move forward and
    /// terminal states are never reopened.
    pub fn apply_job_snapshot(&mut self, job: &ExecutionJob) {
        if job.id != self.job_id {
            return;
        }
        self.declare_total(job.steps_total);
        self.remote_completed = self
            .remote_completed
            .max(job.steps_completed)
            .min(self.steps_total());
        if self.document.is_none() {
            self.document = job.document.clone();
        }
        match job.status {
            ExecutionStatus::Done => {
                self.finish(true, None);
            }
            ExecutionStatus::Failed => {
                let message = job
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "Test failed".to_string());
                self.finish(false, Some(message));
            }
            ExecutionStatus::Review => {
                if !self.approved
                    && matches!(
                    self.phase,
                    MonitorPhase::Connecting | MonitorPhase::Waiting | MonitorPhase::Generating
                ) {
                    self.set_phase(MonitorPhase::Review);
                }
            }
            ExecutionStatus::Running => {
                if matches!(self.phase, MonitorPhase::Connecting | MonitorPhase::Waiting) {
                    self.started = true;
                    self.set_phase(MonitorPhase::Running);
                }
            }
            ExecutionStatus::Generating | ExecutionStatus::Queued => {}
        }
    }

    fn finish(&mut self, passed: bool, error: Option<String>) -> MonitorEffect {
        if self.phase.is_terminal() && !(self.phase == MonitorPhase::Passed && !passed) {
            return MonitorEffect::Finished {
                passed: self.phase == MonitorPhase::Passed,
            };
        }
        if passed {
            self.set_phase(MonitorPhase::Passed);
        } else {
            self.error = error.or_else(|| Some("One or more steps failed".to_string()));
            self.set_phase(MonitorPhase::Failed);
        }
        MonitorEffect::Finished { passed }
    }

    /// All steps passed without an explicit completion event.
    fn infer_completion(&mut self) -> Option<MonitorEffect> {
        let total = self.steps_total();
        if total == 0 || self.has_failed_steps() {
            return None;
        }
        if self.steps.iter().all(|s| s.status == StepStatus::Passed) {
            self.set_phase(MonitorPhase::Passed);
            return Some(MonitorEffect::Finished { passed: true });
        }
        None
    }

    fn declare_total(&mut self, total: u32) {
        if total > MAX_STEPS {
            warn!(job_id = %self.job_id, total, max = MAX_STEPS, "step total clamped");
        }
        let total = total.min(MAX_STEPS);
        let current = self.steps.len() as u32;
        if total > current {
            for number in current + 1..=total {
                self.steps.push(StepState {
                    number,
                    ..Default::default()
                });
            }
        }
    }

    fn step_mut(&mut self, step: u32) -> Option<&mut StepState> {
        if step == 0 {
            return None;
        }
        let found = self.steps.get_mut(step as usize - 1);
        if found.is_none() {
            debug!(job_id = %self.job_id, step, "ignoring out-of-range step");
        }
        found
    }

    fn set_phase(&mut self, next: MonitorPhase) {
        if self.phase == next {
            return;
        }
        // a passed job may still be overridden by an authoritative failure
        if self.phase.is_terminal() && !(self.phase == MonitorPhase::Passed && next == MonitorPhase::Failed)
        {
            return;
        }
        info!(job_id = %self.job_id, from = %self.phase, to = %next, "execution phase");
        self.phase = next;
    }

    fn record(&mut self, event: &ProgressEvent) {
        let (step, message) = match event {
            ProgressEvent::TestStart { phase, .. } => (None, phase.clone()),
            ProgressEvent::ScenariosGenerated { count, steps_total } => (
                None,
                Some(format!("{} scenarios, {} steps", count, steps_total)),
            ),
            ProgressEvent::ScenariosReady { steps_total, .. } => {
                (None, Some(format!("{} steps ready for review", steps_total)))
            }
            ProgressEvent::StepStart {
                step, description, ..
            } => (Some(*step), description.clone()),
            ProgressEvent::StepDone { step, .. } => (Some(*step), None),
            ProgressEvent::StepFail { step, error, .. } => (Some(*step), error.clone()),
            ProgressEvent::TestComplete { passed, .. } => {
                (None, passed.map(|p| (if p { "passed" } else { "failed" }).to_string()))
            }
            ProgressEvent::TestFail { error, .. } => (None, error.clone()),
            _ => (None, None),
        };
        self.log.push(EventLogEntry {
            kind: event.kind().to_string(),
            step,
            message,
            received_at: Utc::now(),
        });
    }
}
