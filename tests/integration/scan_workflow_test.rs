//! Scan Coordination Integration Tests
//!
//! Drives `ScanCoordinator` against the in-memory service with both
//! progress sources active:
//! - Plan generation fires exactly once however completion is observed
//! - A dropped push channel is not a failure while polling continues
//! - Poll errors are retried on the next tick
//! - Explicit scan errors and cancellation are terminal
//! - Progress and log lines are published while the scan runs

use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use webtest_client::{ApiError, JobRef};
use webtest_core::{ProgressEvent, ScanId, ScanJob, ScanStatus};
use webtest_orchestrator::services::progress::{ProgressSender, ProgressUpdate};
use webtest_orchestrator::services::scan::{
    ScanCoordinator, ScanEffect, ScanOutcome, ScanRecord, ScanSettings,
};

use crate::support::{event, scan_job, shop_plan, test_config, MockApi, ScriptedEventSource, Session};

const URL: &str = "https://shop.example";

fn page(n: u32, features: &[&str]) -> ProgressEvent {
    event(json!({
        "type": "page_scanned",
        "url": format!("{}/page/{}", URL, n),
        "title": format!("Page {}", n),
        "pages_scanned": n,
        "max_pages": 5,
        "links_found": 10 * n,
        "forms_found": 1,
        "buttons_found": 4,
        "features": features,
        "observations_count": 3 * n
    }))
}

fn complete() -> ProgressEvent {
    event(json!({"type": "scan_complete", "summary": {"total_pages": 3, "detected_features": ["cart"]}}))
}

fn coordinator(api: std::sync::Arc<MockApi>, events: std::sync::Arc<ScriptedEventSource>) -> ScanCoordinator {
    ScanCoordinator::new(api, events, ScanSettings::from(&test_config()))
}

// ============================================================================
// Reducer properties
// ============================================================================

/// Every ordering of the completion signals from both sources, mixed with
/// progress, requests the plan exactly once.
#[test]
fn test_plan_trigger_at_most_once_for_any_ordering() {
    #[derive(Clone, Copy)]
    enum Input {
        Page,
        EventComplete,
        PollCompleted,
        PollPlanning,
        PollScanning,
    }
    let inputs = [
        Input::Page,
        Input::EventComplete,
        Input::PollCompleted,
        Input::PollPlanning,
        Input::PollScanning,
    ];

    fn permutations(items: &[usize]) -> Vec<Vec<usize>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut out = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let head = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, head);
                out.push(tail);
            }
        }
        out
    }

    let orders = permutations(&[0, 1, 2, 3, 4]);
    assert_eq!(orders.len(), 120);

    for order in orders {
        let mut record = ScanRecord::new(ScanJob::new(ScanId(9), URL), 5, 50);
        let mut triggers = 0;
        // apply each input twice to cover duplicate delivery
        for &i in order.iter().chain(order.iter()) {
            let effects = match inputs[i] {
                Input::Page => record.apply_event(&page(2, &["search"])),
                Input::EventComplete => record.apply_event(&complete()),
                Input::PollCompleted => record.apply_poll(&scan_job(9, URL, ScanStatus::Completed)),
                Input::PollPlanning => record.apply_poll(&scan_job(9, URL, ScanStatus::Planning)),
                Input::PollScanning => record.apply_poll(&scan_job(9, URL, ScanStatus::Scanning)),
            };
            triggers += effects.iter().filter(|e| **e == ScanEffect::TriggerPlan).count();
        }
        assert_eq!(triggers, 1);
        assert!(record.plan_requested());
        assert!(record.status().is_completed());
    }
}

#[test]
fn test_polls_for_other_scans_are_ignored() {
    let mut record = ScanRecord::new(ScanJob::new(ScanId(9), URL), 5, 50);
    let effects = record.apply_poll(&scan_job(10, URL, ScanStatus::Completed));
    assert!(effects.is_empty());
    assert_eq!(record.status(), ScanStatus::Scanning);
}

// ============================================================================
// Coordinator
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_push_completion_generates_one_plan() {
    let api = MockApi::new();
    api.state().plan = Some(shop_plan());
    api.state().scan_polls.push_back(Ok(scan_job(1, URL, ScanStatus::Completed)));
    let events = ScriptedEventSource::new();
    events.script(
        JobRef::Scan(ScanId(1)),
        Session::StaysOpen(vec![page(1, &["search"]), page(2, &["cart"]), complete()]),
    );

    let coordinator = coordinator(api.clone(), events.clone());
    let mut record = coordinator.start_scan(URL, 5, 2).await.unwrap();
    let outcome = coordinator
        .run(&mut record, &CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(outcome, ScanOutcome::Planned(ref plan) if plan.categories.len() == 2));
    assert_eq!(api.state().plan_calls, 1);
    assert_eq!(record.status(), ScanStatus::Planned);
    assert!(!record.is_polling());

    let summary = record.summary().unwrap();
    assert_eq!(summary.total_pages, 3);
    assert_eq!(summary.total_links, 20);
    let mut features = summary.detected_features.clone();
    features.sort();
    assert_eq!(features, vec!["cart", "search"]);
}

#[tokio::test(start_paused = true)]
async fn test_channel_drop_falls_back_to_polling() {
    let api = MockApi::new();
    api.state().plan = Some(shop_plan());
    {
        let mut state = api.state();
        state.scan_polls.push_back(Ok(scan_job(1, URL, ScanStatus::Scanning)));
        state.scan_polls.push_back(Ok(scan_job(1, URL, ScanStatus::Completed)));
    }
    let events = ScriptedEventSource::new();
    events.script(JobRef::Scan(ScanId(1)), Session::Closes(vec![page(1, &["search"])]));

    let coordinator = coordinator(api.clone(), events.clone());
    let mut record = coordinator.start_scan(URL, 5, 2).await.unwrap();
    let outcome = coordinator
        .run(&mut record, &CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(outcome, ScanOutcome::Planned(_)));
    assert_eq!(api.state().poll_calls, 2);
    assert_eq!(api.state().plan_calls, 1);
    assert_eq!(record.pages_scanned(), 1);
    assert_eq!(events.subscriptions(JobRef::Scan(ScanId(1))), 1);
}

#[tokio::test(start_paused = true)]
async fn test_poll_errors_are_retried() {
    let api = MockApi::new();
    api.state().plan = Some(shop_plan());
    {
        let mut state = api.state();
        state.scan_polls.push_back(Err(ApiError::transient("connection reset")));
        state.scan_polls.push_back(Err(ApiError::transient("timed out")));
        state.scan_polls.push_back(Ok(scan_job(1, URL, ScanStatus::Completed)));
    }
    // no channel at all: polling alone must finish the job
    let events = ScriptedEventSource::new();

    let coordinator = coordinator(api.clone(), events);
    let mut record = coordinator.start_scan(URL, 5, 2).await.unwrap();
    let outcome = coordinator
        .run(&mut record, &CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(outcome, ScanOutcome::Planned(_)));
    assert_eq!(api.state().poll_calls, 3);
    assert_eq!(api.state().plan_calls, 1);
}

#[tokio::test(start_paused = true)]
async fn test_scan_error_is_terminal() {
    let api = MockApi::new();
    let events = ScriptedEventSource::new();
    events.script(
        JobRef::Scan(ScanId(1)),
        Session::StaysOpen(vec![
            page(1, &[]),
            event(json!({"type": "scan_error", "error": "Target unreachable"})),
        ]),
    );

    let coordinator = coordinator(api.clone(), events);
    let mut record = coordinator.start_scan(URL, 5, 2).await.unwrap();
    let outcome = coordinator
        .run(&mut record, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, ScanOutcome::Failed("Target unreachable".to_string()));
    assert_eq!(record.status(), ScanStatus::Failed);
    assert_eq!(api.state().plan_calls, 0);
    // a later completion report changes nothing
    assert!(record.apply_poll(&scan_job(1, URL, ScanStatus::Completed)).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_polled_failure_is_terminal() {
    let api = MockApi::new();
    let mut failed = scan_job(1, URL, ScanStatus::Failed);
    failed.error_message = Some("Browser crashed".into());
    api.state().scan_polls.push_back(Ok(failed));
    let events = ScriptedEventSource::new();
    events.script(JobRef::Scan(ScanId(1)), Session::StaysOpen(vec![]));

    let coordinator = coordinator(api.clone(), events);
    let mut record = coordinator.start_scan(URL, 5, 2).await.unwrap();
    let outcome = coordinator
        .run(&mut record, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, ScanOutcome::Failed("Browser crashed".to_string()));
    assert_eq!(api.state().plan_calls, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_scan() {
    let api = MockApi::new();
    let events = ScriptedEventSource::new();
    events.script(JobRef::Scan(ScanId(1)), Session::StaysOpen(vec![]));

    let coordinator = coordinator(api.clone(), events);
    let mut record = coordinator.start_scan(URL, 5, 2).await.unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_secs(10)).await;
        trigger.cancel();
    });
    let outcome = coordinator.run(&mut record, &cancel).await.unwrap();

    assert_eq!(outcome, ScanOutcome::Cancelled);
    assert_eq!(record.status(), ScanStatus::Cancelled);
    // still scanning on the remote side, polled a few times meanwhile
    assert!(api.state().poll_calls >= 1);
    assert_eq!(api.state().plan_calls, 0);
}

#[tokio::test]
async fn test_start_scan_rejects_bad_input() {
    let api = MockApi::new();
    let coordinator = coordinator(api, ScriptedEventSource::new());
    assert!(coordinator.start_scan("ftp://shop.example", 5, 2).await.is_err());
    assert!(coordinator.start_scan("not a url", 5, 2).await.is_err());
    assert!(coordinator.start_scan(URL, 0, 2).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_progress_publishes_each_log_line_once() {
    let api = MockApi::new();
    api.state().plan = Some(shop_plan());
    let events = ScriptedEventSource::new();
    let log = |message: &str| event(json!({"type": "scan_log", "phase": "crawl", "level": "info", "message": message}));
    events.script(
        JobRef::Scan(ScanId(1)),
        Session::StaysOpen(vec![log("a"), page(1, &[]), log("b"), log("c"), complete()]),
    );
    let (tx, mut rx) = mpsc::channel(64);
    let mut settings = ScanSettings::from(&test_config());
    // smaller than the number of lines: eviction must not repeat or skip any
    settings.log_capacity = 2;
    let coordinator = ScanCoordinator::new(api.clone(), events, settings)
        .with_progress(ProgressSender::new(Some(tx)));

    let mut record = coordinator.start_scan(URL, 5, 2).await.unwrap();
    let outcome = coordinator
        .run(&mut record, &CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(outcome, ScanOutcome::Planned(_)));

    let mut lines = Vec::new();
    let mut views = Vec::new();
    while let Ok(update) = rx.try_recv() {
        match update {
            ProgressUpdate::ScanLog(entry) => lines.push(entry.message),
            ProgressUpdate::Scan(view) => views.push(view),
            other => panic!("unexpected update {:?}", other),
        }
    }
    assert_eq!(lines, vec!["a", "b", "c"]);
    // one view per event plus one once the plan is in
    assert_eq!(views.len(), 6);
    assert_eq!(views.last().unwrap().status, ScanStatus::Planned);
}
