//! Workflow Integration Tests
//!
//! Drives `PhaseController` through complete workflows against the
//! in-memory service:
//! - scan, select, compose, execute, pass
//! - generate, review, edit, approve, pass
//! - cancellation from several phases
//! - failures surfacing as `last_error`
//! - runs settled from the job record when the channel stays silent
//! - live progress over the controller's channel

use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;

use webtest_client::{ApiError, JobRef};
use webtest_core::{
    ExecutionJobId, ExecutionMode, ExecutionStatus, ProgressEvent, ScanId, ScanJob, ScanStatus,
};
use webtest_orchestrator::services::execution::MonitorPhase;
use webtest_orchestrator::services::plan::CategorySelection;
use webtest_orchestrator::{Action, Outcome, PhaseController, ProgressUpdate, WorkflowPhase};

use crate::support::{
    conversion_response, event, execute_response, execution_job, scan_job, shop_plan, test_config,
    MockApi, ScriptedEventSource, Session, PLAN_DOCUMENT,
};

const URL: &str = "https://shop.example";

fn controller(api: &std::sync::Arc<MockApi>, events: &std::sync::Arc<ScriptedEventSource>) -> PhaseController {
    PhaseController::new(api.clone(), events.clone(), &test_config())
}

fn page(n: u32, features: &[&str]) -> ProgressEvent {
    event(json!({
        "type": "page_scanned",
        "url": format!("{}/page/{}", URL, n),
        "title": format!("Page {}", n),
        "pages_scanned": n,
        "max_pages": 5,
        "links_found": 4,
        "forms_found": 1,
        "buttons_found": 2,
        "features": features,
        "observations_count": n
    }))
}

fn passing_run(job: i64) -> Vec<ProgressEvent> {
    vec![
        event(json!({"type": "test_start", "test_id": job})),
        event(json!({"type": "step_start", "step": 1, "total": 2, "description": "Open home page"})),
        event(json!({"type": "step_done", "step": 1, "status": "passed"})),
        event(json!({"type": "step_start", "step": 2, "total": 2, "description": "Click Search"})),
        event(json!({"type": "step_done", "step": 2, "status": "passed"})),
        event(json!({"type": "test_complete", "test_id": job, "passed": true})),
    ]
}

/// Scan 7 visits three pages and plans Checkout and Search.
fn scanned_shop() -> (std::sync::Arc<MockApi>, std::sync::Arc<ScriptedEventSource>) {
    let api = MockApi::new();
    {
        let mut state = api.state();
        state.scan_job = Some(ScanJob::new(ScanId(7), URL));
        state.plan = Some(shop_plan());
        state.execute_response = Some(execute_response(55));
    }
    let events = ScriptedEventSource::new();
    events.script(
        JobRef::Scan(ScanId(7)),
        Session::StaysOpen(vec![
            page(1, &["cart"]),
            page(2, &["search"]),
            page(3, &["cart", "search"]),
            event(json!({"type": "scan_complete", "summary": {"total_pages": 3}})),
        ]),
    );
    (api, events)
}

#[tokio::test(start_paused = true)]
async fn test_scan_to_passed_run() {
    let (api, events) = scanned_shop();
    events.script(JobRef::Execution(ExecutionJobId(55)), Session::Closes(passing_run(55)));
    let mut controller = controller(&api, &events);

    assert_eq!(controller.scan(URL, 5, 2).await.unwrap(), WorkflowPhase::Plan);
    let names: Vec<_> = controller
        .selector()
        .plan()
        .categories
        .iter()
        .map(|c| c.name.clone())
        .collect();
    assert_eq!(names, vec!["Checkout", "Search"]);
    assert_eq!(api.state().plan_calls, 1);

    let selection = controller
        .selector_mut()
        .unwrap()
        .toggle_category("search")
        .unwrap();
    assert_eq!(selection, CategorySelection::All);

    let run = controller.compose().await.unwrap();
    assert_eq!(run.execution_job_id, Some(ExecutionJobId(55)));
    assert_eq!(controller.phase(), WorkflowPhase::Ready);
    assert_eq!(
        api.state().execute_requests[0].1.selected_tests,
        vec!["search-1", "search-2"]
    );

    assert_eq!(controller.execute().await.unwrap(), WorkflowPhase::Done);
    assert_eq!(controller.outcome(), Some(Outcome::Passed));
    // the composed job is reused, no second job is created
    assert!(api.state().created.is_empty());

    let snapshot = controller.snapshot();
    let execution = snapshot.execution.unwrap();
    assert_eq!(execution.phase, MonitorPhase::Passed);
    assert_eq!(execution.steps_completed, 2);
    assert_eq!(execution.progress_percent, 100);
    assert_eq!(snapshot.scan.unwrap().status, ScanStatus::Planned);
    assert!(snapshot.last_error.is_none());
    assert_eq!(snapshot.legal_actions, vec![Action::Reset, Action::StartScan, Action::StartGeneration]);
}

#[tokio::test(start_paused = true)]
async fn test_generation_review_path() {
    let api = MockApi::new();
    let events = ScriptedEventSource::new();
    let job = JobRef::Execution(ExecutionJobId(101));
    events.script(
        job,
        Session::StaysOpen(vec![
            event(json!({"type": "test_start", "phase": "generate"})),
            event(json!({"type": "scenarios_ready", "scenario_yaml": "- name: Draft\n  steps: [a]\n", "steps_total": 1})),
        ]),
    );
    events.script(job, Session::Closes(passing_run(101)));
    let mut controller = controller(&api, &events);

    let phase = controller
        .start_generation(URL, ExecutionMode::Review)
        .await
        .unwrap();
    assert_eq!(phase, WorkflowPhase::Review);

    // executing is not an option while a review is pending
    assert!(controller.execute().await.is_err());
    assert!(controller.last_error().unwrap().contains("Cannot"));
    assert_eq!(controller.phase(), WorkflowPhase::Review);

    controller.update_document(PLAN_DOCUMENT).await.unwrap();
    assert!(controller.last_error().is_none());
    assert_eq!(controller.monitor().unwrap().document(), Some(PLAN_DOCUMENT));
    assert_eq!(controller.monitor().unwrap().steps_total(), 2);

    assert_eq!(controller.approve().await.unwrap(), WorkflowPhase::Done);
    assert_eq!(controller.outcome(), Some(Outcome::Passed));

    let state = api.state();
    assert_eq!(state.updated, vec![(ExecutionJobId(101), PLAN_DOCUMENT.to_string())]);
    assert_eq!(state.approved, vec![ExecutionJobId(101)]);
    assert_eq!(events.subscriptions(job), 2);
}

#[tokio::test(start_paused = true)]
async fn test_empty_review_document_is_rejected() {
    let api = MockApi::new();
    let events = ScriptedEventSource::new();
    events.script(
        JobRef::Execution(ExecutionJobId(101)),
        Session::StaysOpen(vec![event(json!({"type": "scenarios_ready", "scenario_yaml": "- steps: [a]\n"}))]),
    );
    let mut controller = controller(&api, &events);
    controller
        .start_generation(URL, ExecutionMode::Review)
        .await
        .unwrap();

    assert!(controller.update_document("  \n").await.is_err());
    assert!(controller.last_error().is_some());
    assert!(api.state().updated.is_empty());
    assert_eq!(controller.phase(), WorkflowPhase::Review);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_execution() {
    let api = MockApi::new();
    api.state().conversion = Some(conversion_response());
    let events = ScriptedEventSource::new();
    events.script(
        JobRef::Execution(ExecutionJobId(101)),
        Session::StaysOpen(vec![event(json!({"type": "test_start", "test_id": 101}))]),
    );
    let mut controller = controller(&api, &events);

    controller.convert_prompt(URL, "open the cart").await.unwrap();
    assert!(controller.validation().is_some());
    controller.compose().await.unwrap();
    assert_eq!(controller.phase(), WorkflowPhase::Ready);

    let token = controller.cancel_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        token.cancel();
    });
    assert_eq!(controller.execute().await.unwrap(), WorkflowPhase::Done);

    assert_eq!(controller.outcome(), Some(Outcome::Cancelled));
    assert_eq!(controller.last_error(), Some("Cancelled by user"));
    assert_eq!(controller.monitor().unwrap().phase(), MonitorPhase::Failed);
    let state = api.state();
    assert_eq!(state.created.len(), 1);
    assert_eq!(state.created[0].mode, ExecutionMode::Auto);
    assert_eq!(state.cancelled, vec![ExecutionJobId(101)]);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_when_remote_cancel_fails() {
    let (api, events) = scanned_shop();
    api.state().cancel_error = Some(ApiError::transient("connection reset"));
    let mut controller = controller(&api, &events);

    controller.scan(URL, 5, 2).await.unwrap();
    controller.compose().await.unwrap();

    assert_eq!(controller.cancel().await.unwrap(), WorkflowPhase::Done);
    assert_eq!(controller.outcome(), Some(Outcome::Cancelled));
    assert_eq!(api.state().cancelled, vec![ExecutionJobId(55)]);
}

#[tokio::test(start_paused = true)]
async fn test_scan_failure_is_reported() {
    let api = MockApi::new();
    let events = ScriptedEventSource::new();
    events.script(
        JobRef::Scan(ScanId(1)),
        Session::StaysOpen(vec![event(json!({"type": "scan_error", "error": "Target unreachable"}))]),
    );
    let mut controller = controller(&api, &events);

    assert_eq!(controller.scan(URL, 5, 2).await.unwrap(), WorkflowPhase::Done);
    assert_eq!(controller.outcome(), Some(Outcome::Failed));
    assert!(controller.last_error().unwrap().contains("Target unreachable"));
    assert_eq!(api.state().plan_calls, 0);
}

#[tokio::test(start_paused = true)]
async fn test_plan_quota_error_ends_workflow() {
    let (api, events) = scanned_shop();
    api.state().plan_error = Some(ApiError::quota("Monthly plan limit reached"));
    let mut controller = controller(&api, &events);

    assert!(controller.scan(URL, 5, 2).await.is_err());
    assert_eq!(controller.phase(), WorkflowPhase::Done);
    assert_eq!(controller.outcome(), Some(Outcome::Failed));
    assert!(controller.last_error().unwrap().contains("Monthly plan limit reached"));
}

#[tokio::test(start_paused = true)]
async fn test_run_finished_before_subscribe_is_settled_from_record() {
    let (api, events) = scanned_shop();
    api.state()
        .job_snapshots
        .insert(55, execution_job(55, URL, ExecutionStatus::Done, 2));
    // the run finished before the channel opened; nothing is replayed
    events.script(JobRef::Execution(ExecutionJobId(55)), Session::StaysOpen(vec![]));
    let mut controller = controller(&api, &events);

    controller.scan(URL, 5, 2).await.unwrap();
    controller.compose().await.unwrap();
    assert_eq!(controller.execute().await.unwrap(), WorkflowPhase::Done);

    assert_eq!(controller.outcome(), Some(Outcome::Passed));
    assert_eq!(controller.monitor().unwrap().phase(), MonitorPhase::Passed);
    assert!(controller.last_error().is_none());
    assert!(api.state().job_reads >= 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_run_is_settled_from_record() {
    let (api, events) = scanned_shop();
    let mut failed = execution_job(55, URL, ExecutionStatus::Failed, 2);
    failed.error_message = Some("Browser crashed".into());
    api.state().job_snapshots.insert(55, failed);
    events.script(JobRef::Execution(ExecutionJobId(55)), Session::StaysOpen(vec![]));
    let mut controller = controller(&api, &events);

    controller.scan(URL, 5, 2).await.unwrap();
    controller.compose().await.unwrap();
    assert_eq!(controller.execute().await.unwrap(), WorkflowPhase::Done);

    assert_eq!(controller.outcome(), Some(Outcome::Failed));
    assert_eq!(controller.last_error(), Some("Browser crashed"));
}

fn drain(rx: &mut mpsc::Receiver<ProgressUpdate>) -> Vec<ProgressUpdate> {
    let mut updates = Vec::new();
    while let Ok(update) = rx.try_recv() {
        updates.push(update);
    }
    updates
}

fn phases(updates: &[ProgressUpdate]) -> Vec<WorkflowPhase> {
    updates
        .iter()
        .filter_map(|u| match u {
            ProgressUpdate::Phase { phase, .. } => Some(*phase),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_scan_and_run_publish_live_progress() {
    let (api, events) = scanned_shop();
    events.script(JobRef::Execution(ExecutionJobId(55)), Session::Closes(passing_run(55)));
    let (tx, mut rx) = mpsc::channel(256);
    let mut controller = controller(&api, &events).with_progress(tx);

    controller.scan(URL, 5, 2).await.unwrap();
    let updates = drain(&mut rx);
    assert_eq!(phases(&updates), vec![WorkflowPhase::Scanning, WorkflowPhase::Plan]);
    let pages: Vec<_> = updates
        .iter()
        .filter_map(|u| match u {
            ProgressUpdate::Scan(view) => Some(view.pages_scanned),
            _ => None,
        })
        .collect();
    assert!(pages.contains(&1));
    assert_eq!(pages.last(), Some(&3));
    assert!(pages.windows(2).all(|w| w[0] <= w[1]));

    controller.compose().await.unwrap();
    controller.execute().await.unwrap();
    let updates = drain(&mut rx);
    assert_eq!(
        phases(&updates),
        vec![WorkflowPhase::Ready, WorkflowPhase::Executing, WorkflowPhase::Done]
    );
    let executions: Vec<_> = updates
        .iter()
        .filter_map(|u| match u {
            ProgressUpdate::Execution(view) => Some(view),
            _ => None,
        })
        .collect();
    assert!(executions.iter().any(|v| v.current_step == Some(1)));
    assert_eq!(executions.last().unwrap().steps_completed, 2);
    assert!(matches!(
        updates.last(),
        Some(ProgressUpdate::Phase {
            phase: WorkflowPhase::Done,
            outcome: Some(Outcome::Passed)
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_auto_generation_moves_to_executing_when_steps_run() {
    let api = MockApi::new();
    let events = ScriptedEventSource::new();
    events.script(
        JobRef::Execution(ExecutionJobId(101)),
        Session::Closes(vec![
            event(json!({"type": "test_start", "phase": "generate"})),
            event(json!({"type": "scenarios_generated", "count": 1, "steps_total": 2})),
            event(json!({"type": "step_start", "step": 1, "description": "Open home page"})),
            event(json!({"type": "step_done", "step": 1, "status": "passed"})),
            event(json!({"type": "step_start", "step": 2, "description": "Click Search"})),
            event(json!({"type": "step_done", "step": 2, "status": "passed"})),
        ]),
    );
    let (tx, mut rx) = mpsc::channel(256);
    let mut controller = controller(&api, &events).with_progress(tx);

    let phase = controller
        .start_generation(URL, ExecutionMode::Auto)
        .await
        .unwrap();
    assert_eq!(phase, WorkflowPhase::Done);
    assert_eq!(controller.outcome(), Some(Outcome::Passed));

    let updates = drain(&mut rx);
    assert_eq!(
        phases(&updates),
        vec![WorkflowPhase::Generating, WorkflowPhase::Executing, WorkflowPhase::Done]
    );
    // the phase moves with the first running step, not after the run
    let executing_at = updates
        .iter()
        .position(|u| matches!(u, ProgressUpdate::Phase { phase: WorkflowPhase::Executing, .. }))
        .unwrap();
    let after: Vec<_> = updates[executing_at..]
        .iter()
        .filter_map(|u| match u {
            ProgressUpdate::Execution(view) => Some(view.steps_completed),
            _ => None,
        })
        .collect();
    assert_eq!(after.first(), Some(&0));
}

#[tokio::test]
async fn test_rejected_cancel_and_reset_are_recorded() {
    let api = MockApi::new();
    let events = ScriptedEventSource::new();
    let mut controller = controller(&api, &events);

    assert!(controller.cancel().await.is_err());
    assert!(controller.last_error().unwrap().contains("Cannot"));

    let mut fresh = PhaseController::new(api.clone(), events.clone(), &test_config());
    assert!(fresh.reset().is_err());
    assert!(fresh.last_error().unwrap().contains("Cannot"));
    assert_eq!(fresh.phase(), WorkflowPhase::Idle);
}

#[tokio::test]
async fn test_illegal_action_in_idle() {
    let api = MockApi::new();
    let events = ScriptedEventSource::new();
    let mut controller = controller(&api, &events);

    assert!(controller.approve().await.is_err());
    assert!(controller.selector_mut().is_err());
    assert!(controller.reset().is_err());
    assert_eq!(controller.phase(), WorkflowPhase::Idle);
    assert!(controller.last_error().is_some());
    assert!(!controller.can(Action::Execute));
    assert!(controller.can(Action::StartScan));
}

#[tokio::test(start_paused = true)]
async fn test_reset_clears_finished_workflow() {
    let api = MockApi::new();
    api.state().scan_polls.push_back(Ok(scan_job(1, URL, ScanStatus::Failed)));
    let events = ScriptedEventSource::new();
    let mut controller = controller(&api, &events);

    controller.scan(URL, 5, 2).await.unwrap();
    assert_eq!(controller.phase(), WorkflowPhase::Done);

    controller.reset().unwrap();
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.phase, WorkflowPhase::Idle);
    assert!(snapshot.outcome.is_none());
    assert!(snapshot.scan.is_none());
    assert!(snapshot.last_error.is_none());
}
