//! Phase Controller
//!
//! Top-level workflow driver. Owns the scan record, plan selection,
//! composed document and execution monitor of the active workflow, checks
//! every operator action against the state machine, and routes every
//! remote result into phase state. Errors returned from public methods
//! are also kept as `last_error` on the snapshot.
//!
//! With [`PhaseController::with_progress`] the long-running calls
//! (`run_scan`, `execute`, `start_generation`, `approve`) publish live
//! updates while they are in flight.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webtest_client::{
    CreateTestRequest, EventSource, HttpTestingApi, TestingApi, WsEventSource,
};
use webtest_core::{ExecutionJobId, ExecutionMode, ScanId};

use crate::models::settings::OrchestratorConfig;
use crate::models::workflow::{Action, Outcome, WorkflowPhase};
use crate::services::composer::{
    ComposedRun, ConvertedScenario, PlanSelection, ScenarioComposer, ScenarioDocument,
};
use crate::services::execution::{
    ExecutionMonitor, ExecutionWatcher, MonitorPhase, MonitorSettings, WatchExit,
};
use crate::services::phase::machine;
use crate::services::phase::snapshot::{
    DocumentView, ExecutionView, ScanView, SelectionView, WorkflowSnapshot,
};
use crate::services::plan::PlanSelector;
use crate::services::progress::{ProgressSender, ProgressUpdate};
use crate::services::scan::coordinator::validate_target_url;
use crate::services::scan::{ScanCoordinator, ScanOutcome, ScanRecord, ScanSettings};
use crate::services::validation::{self, ValidationReport};
use crate::utils::error::{AppError, AppResult};

const CANCELLED_MESSAGE: &str = "Cancelled by user";

pub struct PhaseController {
    api: Arc<dyn TestingApi>,
    scanner: ScanCoordinator,
    composer: ScenarioComposer,
    watcher: ExecutionWatcher,
    monitor_settings: MonitorSettings,
    progress: ProgressSender,

    phase: WorkflowPhase,
    outcome: Option<Outcome>,
    target_url: Option<String>,
    scan: Option<ScanRecord>,
    selector: PlanSelector,
    converted: Option<ConvertedScenario>,
    composed: Option<ComposedRun>,
    validation: Option<ValidationReport>,
    monitor: Option<ExecutionMonitor>,
    last_error: Option<String>,
    cancel: CancellationToken,
}

impl PhaseController {
    pub fn new(
        api: Arc<dyn TestingApi>,
        events: Arc<dyn EventSource>,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            scanner: ScanCoordinator::new(api.clone(), events.clone(), ScanSettings::from(config)),
            composer: ScenarioComposer::new(api.clone(), config.language.clone()),
            watcher: ExecutionWatcher::new(api.clone(), events),
            monitor_settings: MonitorSettings::from(config),
            progress: ProgressSender::default(),
            api,
            phase: WorkflowPhase::Idle,
            outcome: None,
            target_url: None,
            scan: None,
            selector: PlanSelector::new(),
            converted: None,
            composed: None,
            validation: None,
            monitor: None,
            last_error: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Wire the reqwest and WebSocket clients from configuration.
    pub fn from_config(config: &OrchestratorConfig) -> AppResult<Self> {
        config.validate().map_err(AppError::config)?;
        let api = HttpTestingApi::new(config.endpoint())?;
        let ws_base = config.resolved_ws_base_url().map_err(AppError::config)?;
        Ok(Self::new(
            Arc::new(api),
            Arc::new(WsEventSource::new(ws_base)),
            config,
        ))
    }

    /// Publish phase changes, scan progress and execution progress to
    /// `event_tx`.
    pub fn with_progress(mut self, event_tx: mpsc::Sender<ProgressUpdate>) -> Self {
        let progress = ProgressSender::new(Some(event_tx));
        self.scanner = self.scanner.with_progress(progress.clone());
        self.watcher = self.watcher.with_progress(progress.clone());
        self.progress = progress;
        self
    }

    pub fn phase(&self) -> WorkflowPhase {
        self.phase
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn target_url(&self) -> Option<&str> {
        self.target_url.as_deref()
    }

    pub fn scan_record(&self) -> Option<&ScanRecord> {
        self.scan.as_ref()
    }

    pub fn selector(&self) -> &PlanSelector {
        &self.selector
    }

    pub fn converted(&self) -> Option<&ConvertedScenario> {
        self.converted.as_ref()
    }

    pub fn composed(&self) -> Option<&ComposedRun> {
        self.composed.as_ref()
    }

    pub fn validation(&self) -> Option<&ValidationReport> {
        self.validation.as_ref()
    }

    pub fn monitor(&self) -> Option<&ExecutionMonitor> {
        self.monitor.as_ref()
    }

    pub fn legal_actions(&self) -> Vec<Action> {
        machine::legal_actions(self.phase)
    }

    pub fn can(&self, action: Action) -> bool {
        machine::is_legal(self.phase, action)
    }

    /// Token that stops the current workflow's long-running call (scan
    /// following or execution watching) from another task. Replaced when a
    /// new workflow starts.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    // ========================================================================
    // Scan path
    // ========================================================================

    /// Create the scan job and enter `scanning`.
    pub async fn start_scan(
        &mut self,
        target_url: &str,
        max_pages: u32,
        max_depth: u32,
    ) -> AppResult<ScanId> {
        let result = self.try_start_scan(target_url, max_pages, max_depth).await;
        self.record(result)
    }

    async fn try_start_scan(
        &mut self,
        target_url: &str,
        max_pages: u32,
        max_depth: u32,
    ) -> AppResult<ScanId> {
        self.begin(Action::StartScan)?;
        let record = self
            .scanner
            .start_scan(target_url, max_pages, max_depth)
            .await?;
        if self.phase == WorkflowPhase::Done {
            self.clear_workflow();
        }
        let scan_id = record.job().id;
        self.target_url = Some(target_url.to_string());
        self.scan = Some(record);
        self.transition(WorkflowPhase::Scanning)?;
        Ok(scan_id)
    }

    /// Follow the scan until its plan is loaded (`plan`) or it ends (`done`).
    pub async fn run_scan(&mut self) -> AppResult<WorkflowPhase> {
        let result = self.try_run_scan().await;
        self.record(result)
    }

    async fn try_run_scan(&mut self) -> AppResult<WorkflowPhase> {
        if self.phase != WorkflowPhase::Scanning {
            return Err(AppError::invalid_transition(self.phase, "follow a scan"));
        }
        let record = self
            .scan
            .as_mut()
            .ok_or_else(|| AppError::internal("No scan in progress"))?;
        let cancel = self.cancel.clone();

        let outcome = self.scanner.run(record, &cancel).await;
        match outcome {
            Ok(ScanOutcome::Planned(plan)) => {
                self.selector.load_plan(plan);
                self.transition(WorkflowPhase::Plan)?;
            }
            Ok(ScanOutcome::Failed(message)) => {
                self.finish(Outcome::Failed, Some(format!("Scan failed: {}", message)));
            }
            Ok(ScanOutcome::Cancelled) => {
                self.finish(Outcome::Cancelled, Some(CANCELLED_MESSAGE.to_string()));
            }
            Err(e) => {
                self.finish(Outcome::Failed, Some(e.to_string()));
                return Err(e);
            }
        }
        Ok(self.phase)
    }

    /// `start_scan` followed by `run_scan`.
    pub async fn scan(
        &mut self,
        target_url: &str,
        max_pages: u32,
        max_depth: u32,
    ) -> AppResult<WorkflowPhase> {
        self.start_scan(target_url, max_pages, max_depth).await?;
        self.run_scan().await
    }

    /// Mutable access to the plan selection. Only while choosing tests.
    pub fn selector_mut(&mut self) -> AppResult<&mut PlanSelector> {
        if let Err(e) = machine::validate_action(self.phase, Action::EditSelection) {
            self.last_error = Some(e.to_string());
            return Err(e);
        }
        Ok(&mut self.selector)
    }

    // ========================================================================
    // Composition
    // ========================================================================

    /// Convert a free-text prompt into a scenario document and hold it for
    /// the next compose. Does not change the phase.
    pub async fn convert_prompt(
        &mut self,
        target_url: &str,
        prompt: &str,
    ) -> AppResult<ConvertedScenario> {
        let result = self.try_convert_prompt(target_url, prompt).await;
        self.record(result)
    }

    async fn try_convert_prompt(
        &mut self,
        target_url: &str,
        prompt: &str,
    ) -> AppResult<ConvertedScenario> {
        self.begin(Action::ConvertPrompt)?;
        validate_target_url(target_url)?;
        let scan_id = match self.phase {
            WorkflowPhase::Plan => self.scan.as_ref().map(|r| r.job().id),
            _ => None,
        };
        let converted = self.composer.convert(target_url, prompt, scan_id).await?;
        if self.target_url.is_none() {
            self.target_url = Some(target_url.to_string());
        }
        self.validation = validation::report(&converted.validation);
        self.converted = Some(converted.clone());
        Ok(converted)
    }

    /// Merge the current plan selection and converted document into one
    /// runnable document and enter `ready`.
    pub async fn compose(&mut self) -> AppResult<ComposedRun> {
        let result = self.try_compose().await;
        self.record(result)
    }

    async fn try_compose(&mut self) -> AppResult<ComposedRun> {
        self.begin(Action::Compose)?;

        // a recompose replaces the job the previous one created
        if let Some(job_id) = self.composed.as_ref().and_then(|c| c.execution_job_id) {
            self.cancel_remote(job_id).await;
        }

        let selection = PlanSelection {
            scan_id: self.scan.as_ref().map(|r| r.job().id),
            selected_ids: self.selector.selected_ids(),
            auth_data: self.selector.auth_data(),
            test_data: self.selector.test_data(),
        };
        let run = self
            .composer
            .compose(&selection, self.converted.as_ref())
            .await?;
        info!(
            scenarios = run.document.scenario_count(),
            steps = run.steps_total,
            job_id = ?run.execution_job_id,
            "scenarios composed"
        );
        self.validation = validation::report(&run.validation);
        self.composed = Some(run.clone());
        self.transition(WorkflowPhase::Ready)?;
        Ok(run)
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Run the composed document. Creates an auto-mode job when composition
    /// did not already produce one.
    pub async fn execute(&mut self) -> AppResult<WorkflowPhase> {
        let result = self.try_execute().await;
        self.record(result)
    }

    async fn try_execute(&mut self) -> AppResult<WorkflowPhase> {
        self.begin(Action::Execute)?;
        let (existing, document, composed_steps) = {
            let composed = self
                .composed
                .as_ref()
                .ok_or_else(|| AppError::internal("Nothing has been composed"))?;
            (
                composed.execution_job_id,
                composed.document.text().to_string(),
                composed.steps_total,
            )
        };

        let (job_id, steps_total) = match existing {
            Some(job_id) => (job_id, composed_steps),
            None => {
                let target_url = self
                    .target_url
                    .clone()
                    .ok_or_else(|| AppError::internal("No target URL"))?;
                let job = self
                    .api
                    .create_execution_job(CreateTestRequest {
                        target_url,
                        mode: ExecutionMode::Auto,
                        document: Some(document.clone()),
                    })
                    .await?;
                info!(job_id = %job.id, "execution job created");
                if let Some(composed) = self.composed.as_mut() {
                    composed.execution_job_id = Some(job.id);
                }
                (job.id, job.steps_total.max(composed_steps))
            }
        };

        let mut monitor = ExecutionMonitor::new(job_id, steps_total, self.monitor_settings.clone());
        monitor.set_document(document, steps_total);
        self.monitor = Some(monitor);
        self.transition(WorkflowPhase::Executing)?;
        self.watch().await
    }

    /// Create a job that generates its own scenarios. In review mode the
    /// workflow pauses in `review`; in auto mode it runs straight through.
    pub async fn start_generation(
        &mut self,
        target_url: &str,
        mode: ExecutionMode,
    ) -> AppResult<WorkflowPhase> {
        let result = self.try_start_generation(target_url, mode).await;
        self.record(result)
    }

    async fn try_start_generation(
        &mut self,
        target_url: &str,
        mode: ExecutionMode,
    ) -> AppResult<WorkflowPhase> {
        self.begin(Action::StartGeneration)?;
        validate_target_url(target_url)?;
        let job = self
            .api
            .create_execution_job(CreateTestRequest {
                target_url: target_url.to_string(),
                mode,
                document: None,
            })
            .await?;
        info!(job_id = %job.id, mode = ?mode, "generation job created");
        if self.phase == WorkflowPhase::Done {
            self.clear_workflow();
        }
        self.target_url = Some(target_url.to_string());
        let mut monitor =
            ExecutionMonitor::new(job.id, job.steps_total, self.monitor_settings.clone());
        monitor.apply_job_snapshot(&job);
        self.monitor = Some(monitor);
        self.transition(WorkflowPhase::Generating)?;
        self.watch().await
    }

    /// Replace the generated document while the job waits in review.
    pub async fn update_document(&mut self, document: &str) -> AppResult<()> {
        let result = self.try_update_document(document).await;
        self.record(result)
    }

    async fn try_update_document(&mut self, document: &str) -> AppResult<()> {
        self.begin(Action::UpdateDocument)?;
        let document = ScenarioDocument::parse(document)?;
        let job_id = self.monitor_job_id()?;
        let job = self
            .api
            .update_scenario_document(job_id, document.text())
            .await?;
        let steps_total = if job.steps_total > 0 {
            job.steps_total
        } else {
            document.step_count()
        };
        if let Some(monitor) = self.monitor.as_mut() {
            monitor.set_document(document.into_text(), steps_total);
        }
        info!(job_id = %job_id, steps = steps_total, "scenario document updated");
        Ok(())
    }

    /// Approve the reviewed document and follow the run.
    pub async fn approve(&mut self) -> AppResult<WorkflowPhase> {
        let result = self.try_approve().await;
        self.record(result)
    }

    async fn try_approve(&mut self) -> AppResult<WorkflowPhase> {
        self.begin(Action::Approve)?;
        let job_id = self.monitor_job_id()?;
        let job = self.api.approve_execution_job(job_id).await?;
        info!(job_id = %job_id, status = %job.status, "execution approved");
        if let Some(monitor) = self.monitor.as_mut() {
            monitor.resume_after_approval();
            monitor.apply_job_snapshot(&job);
        }
        self.transition(WorkflowPhase::Executing)?;
        self.watch().await
    }

    /// Re-read the execution job and reconcile local counters with it.
    pub async fn refresh_execution(&mut self) -> AppResult<WorkflowPhase> {
        let result = self.try_refresh_execution().await;
        self.record(result)
    }

    async fn try_refresh_execution(&mut self) -> AppResult<WorkflowPhase> {
        let job_id = self.monitor_job_id()?;
        let job = self.api.get_execution_job(job_id).await?;
        let (monitor_phase, error) = match self.monitor.as_mut() {
            Some(monitor) => {
                monitor.apply_job_snapshot(&job);
                (monitor.phase(), monitor.error().map(str::to_string))
            }
            None => return Ok(self.phase),
        };
        match monitor_phase {
            MonitorPhase::Passed => self.finish(Outcome::Passed, None),
            MonitorPhase::Failed => self.finish(Outcome::Failed, error),
            MonitorPhase::Review if self.phase == WorkflowPhase::Generating => {
                self.transition(WorkflowPhase::Review)?;
            }
            MonitorPhase::Running if self.phase == WorkflowPhase::Generating => {
                self.transition(WorkflowPhase::Executing)?;
            }
            _ => {}
        }
        Ok(self.phase)
    }

    // ========================================================================
    // Cancel / reset
    // ========================================================================

    /// Stop the active workflow. The remote cancel is best-effort; locally
    /// the workflow is always `done` afterwards.
    pub async fn cancel(&mut self) -> AppResult<WorkflowPhase> {
        let result = self.try_cancel().await;
        self.record(result)
    }

    async fn try_cancel(&mut self) -> AppResult<WorkflowPhase> {
        self.begin(Action::Cancel)?;
        self.cancel.cancel();
        self.abort().await;
        Ok(self.phase)
    }

    /// Leave `done` and start from a clean `idle`.
    pub fn reset(&mut self) -> AppResult<()> {
        let result = self.try_reset();
        self.record(result)
    }

    fn try_reset(&mut self) -> AppResult<()> {
        self.begin(Action::Reset)?;
        self.clear_workflow();
        self.transition(WorkflowPhase::Idle)
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        let plan = self.selector.plan();
        WorkflowSnapshot {
            phase: self.phase,
            outcome: self.outcome,
            target_url: self.target_url.clone(),
            scan: self.scan.as_ref().map(ScanView::from),
            selection: (!self.selector.is_empty()).then(|| SelectionView {
                categories: plan.categories.len(),
                tests: plan.item_count(),
                selected: self.selector.selected_count(),
                estimated_duration: self.selector.estimated_duration(),
                missing_required_fields: self.selector.missing_required_fields().len(),
            }),
            document: self.composed.as_ref().map(|c| DocumentView {
                scenarios: c.document.scenario_count(),
                steps: c.steps_total,
                execution_job_id: c.execution_job_id,
            }),
            validation: self.validation.clone(),
            execution: self.monitor.as_ref().map(ExecutionView::from),
            legal_actions: self.legal_actions(),
            last_error: self.last_error.clone(),
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn watch(&mut self) -> AppResult<WorkflowPhase> {
        let cancel = self.cancel.clone();
        let monitor = self
            .monitor
            .as_mut()
            .ok_or_else(|| AppError::internal("No execution job"))?;
        let phase = &mut self.phase;
        // a generation job that starts running its scenarios is executing
        let exit = self
            .watcher
            .watch_with(monitor, &cancel, |m| {
                let started = *phase == WorkflowPhase::Generating
                    && m.phase() == MonitorPhase::Running
                    && machine::validate_transition(*phase, WorkflowPhase::Executing).is_ok();
                if !started {
                    return None;
                }
                info!(from = %WorkflowPhase::Generating, to = %WorkflowPhase::Executing, "workflow phase changed");
                *phase = WorkflowPhase::Executing;
                Some(ProgressUpdate::Phase {
                    phase: WorkflowPhase::Executing,
                    outcome: None,
                })
            })
            .await;
        let error = self
            .monitor
            .as_ref()
            .and_then(|m| m.error())
            .map(str::to_string);

        match exit {
            WatchExit::Finished { passed: true } => self.finish(Outcome::Passed, None),
            WatchExit::Finished { passed: false } => self.finish(Outcome::Failed, error),
            WatchExit::Lost(message) => self.finish(Outcome::Failed, Some(message)),
            WatchExit::AwaitingReview => self.transition(WorkflowPhase::Review)?,
            WatchExit::Cancelled => self.abort().await,
        }
        Ok(self.phase)
    }

    async fn abort(&mut self) {
        if self.phase == WorkflowPhase::Done {
            return;
        }
        if self.phase == WorkflowPhase::Scanning {
            if let Some(record) = self.scan.as_mut() {
                record.mark_cancelled();
            }
        }
        let job_id = self
            .monitor
            .as_ref()
            .filter(|m| !m.phase().is_terminal())
            .map(|m| m.job_id())
            .or_else(|| self.composed.as_ref().and_then(|c| c.execution_job_id));
        if let Some(job_id) = job_id {
            self.cancel_remote(job_id).await;
        }
        if let Some(monitor) = self.monitor.as_mut() {
            monitor.fail(CANCELLED_MESSAGE);
        }
        self.finish(Outcome::Cancelled, Some(CANCELLED_MESSAGE.to_string()));
    }

    async fn cancel_remote(&self, job_id: ExecutionJobId) {
        match self.api.cancel_execution_job(job_id).await {
            Ok(_) => info!(job_id = %job_id, "execution job cancelled"),
            Err(e) => warn!(job_id = %job_id, error = %e, "remote cancel failed; treating job as cancelled"),
        }
    }

    fn monitor_job_id(&self) -> AppResult<ExecutionJobId> {
        self.monitor
            .as_ref()
            .map(|m| m.job_id())
            .ok_or_else(|| AppError::validation("No execution job"))
    }

    fn begin(&mut self, action: Action) -> AppResult<()> {
        machine::validate_action(self.phase, action)?;
        self.last_error = None;
        debug!(phase = %self.phase, action = ?action, "action accepted");
        Ok(())
    }

    fn transition(&mut self, to: WorkflowPhase) -> AppResult<()> {
        machine::validate_transition(self.phase, to)?;
        if self.phase != to {
            info!(from = %self.phase, to = %to, "workflow phase changed");
            self.phase = to;
            self.publish_phase();
        }
        Ok(())
    }

    fn finish(&mut self, outcome: Outcome, error: Option<String>) {
        if self.phase == WorkflowPhase::Done {
            return;
        }
        info!(outcome = %outcome, "workflow finished");
        self.outcome = Some(outcome);
        if error.is_some() {
            self.last_error = error;
        }
        if let Err(e) = self.transition(WorkflowPhase::Done) {
            warn!(error = %e, "forcing workflow to done");
            self.phase = WorkflowPhase::Done;
            self.publish_phase();
        }
    }

    fn publish_phase(&self) {
        self.progress.try_send(ProgressUpdate::Phase {
            phase: self.phase,
            outcome: self.outcome,
        });
    }

    fn clear_workflow(&mut self) {
        self.outcome = None;
        self.target_url = None;
        self.scan = None;
        self.selector = PlanSelector::new();
        self.converted = None;
        self.composed = None;
        self.validation = None;
        self.monitor = None;
        self.last_error = None;
        self.cancel = CancellationToken::new();
    }

    fn record<T>(&mut self, result: AppResult<T>) -> AppResult<T> {
        if let Err(e) = &result {
            warn!(phase = %self.phase, error = %e, "workflow action failed");
            self.last_error = Some(e.to_string());
        }
        result
    }
}
