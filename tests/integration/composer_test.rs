//! Scenario Composition Integration Tests
//!
//! Covers every combination of plan selection and converted prompt, and
//! checks that a merged run never leaves a stray plan-only job behind.

use std::collections::HashMap;

use webtest_client::ApiError;
use webtest_core::{ExecutionJobId, ScanId};
use webtest_orchestrator::services::composer::{PlanSelection, ScenarioComposer};
use webtest_orchestrator::utils::error::AppError;

use crate::support::{conversion_response, execute_response, MockApi, PLAN_DOCUMENT, PROMPT_DOCUMENT};

const URL: &str = "https://shop.example";

fn selection(ids: &[&str]) -> PlanSelection {
    PlanSelection {
        scan_id: Some(ScanId(7)),
        selected_ids: ids.iter().map(|s| s.to_string()).collect(),
        auth_data: HashMap::from([("email".to_string(), "qa@shop.example".to_string())]),
        test_data: HashMap::new(),
    }
}

#[tokio::test]
async fn test_plan_only_keeps_remote_job() {
    let api = MockApi::new();
    api.state().execute_response = Some(execute_response(55));
    let composer = ScenarioComposer::new(api.clone(), "en");

    let run = composer
        .compose(&selection(&["search-1", "checkout-1"]), None)
        .await
        .unwrap();

    assert_eq!(run.document.text(), PLAN_DOCUMENT);
    assert_eq!(run.execution_job_id, Some(ExecutionJobId(55)));
    assert_eq!(run.steps_total, 2);
    assert_eq!(run.validation.len(), 2);

    let state = api.state();
    assert!(state.cancelled.is_empty());
    assert_eq!(state.execute_requests.len(), 1);
    let (scan_id, request) = &state.execute_requests[0];
    assert_eq!(*scan_id, ScanId(7));
    assert_eq!(request.selected_tests, vec!["search-1", "checkout-1"]);
    assert_eq!(request.auth_data.get("email").map(String::as_str), Some("qa@shop.example"));
}

#[tokio::test]
async fn test_both_sources_merge_into_one_document() {
    let api = MockApi::new();
    api.state().execute_response = Some(execute_response(55));
    api.state().conversion = Some(conversion_response());
    let composer = ScenarioComposer::new(api.clone(), "en");

    let converted = composer
        .convert(URL, "open the cart", Some(ScanId(7)))
        .await
        .unwrap();
    let run = composer
        .compose(&selection(&["search-1"]), Some(&converted))
        .await
        .unwrap();

    assert_eq!(run.document.text(), format!("{}\n{}", PLAN_DOCUMENT, PROMPT_DOCUMENT));
    assert_eq!(run.document.scenario_count(), 2);
    // the caller creates the single job for the merged run
    assert_eq!(run.execution_job_id, None);
    assert_eq!(run.steps_total, 3);
    assert_eq!(api.state().cancelled, vec![ExecutionJobId(55)]);

    // converted results are shifted past the plan scenarios
    assert_eq!(run.validation.len(), 3);
    let last = run.validation.last().unwrap();
    assert_eq!(last.scenario_index, 1);
    assert_eq!(last.closest_match.as_deref(), Some("Basket"));
}

#[tokio::test]
async fn test_converted_only_is_used_as_is() {
    let api = MockApi::new();
    api.state().conversion = Some(conversion_response());
    let composer = ScenarioComposer::new(api.clone(), "ko");

    let converted = composer.convert(URL, "open the cart", None).await.unwrap();
    assert_eq!(converted.scenario_count, 1);
    assert_eq!(converted.steps_total, 1);

    let run = composer
        .compose(&PlanSelection::default(), Some(&converted))
        .await
        .unwrap();

    assert_eq!(run.document, converted.document);
    assert_eq!(run.execution_job_id, None);
    assert_eq!(run.steps_total, 1);

    let state = api.state();
    assert!(state.execute_requests.is_empty());
    assert_eq!(state.convert_requests[0].language, "ko");
    assert_eq!(state.convert_requests[0].scan_id, None);
}

#[tokio::test]
async fn test_nothing_to_compose_is_rejected() {
    let api = MockApi::new();
    let composer = ScenarioComposer::new(api.clone(), "en");

    let err = composer
        .compose(&PlanSelection::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(api.state().execute_requests.is_empty());
}

#[tokio::test]
async fn test_failed_cancel_does_not_block_merge() {
    let api = MockApi::new();
    api.state().execute_response = Some(execute_response(55));
    api.state().conversion = Some(conversion_response());
    api.state().cancel_error = Some(ApiError::transient("connection reset"));
    let composer = ScenarioComposer::new(api.clone(), "en");

    let converted = composer.convert(URL, "open the cart", None).await.unwrap();
    let run = composer
        .compose(&selection(&["search-1"]), Some(&converted))
        .await
        .unwrap();

    assert_eq!(run.execution_job_id, None);
    assert_eq!(api.state().cancelled, vec![ExecutionJobId(55)]);
}

#[tokio::test]
async fn test_plan_selection_needs_a_scan() {
    let api = MockApi::new();
    api.state().execute_response = Some(execute_response(55));
    let composer = ScenarioComposer::new(api.clone(), "en");

    let mut without_scan = selection(&["search-1"]);
    without_scan.scan_id = None;
    assert!(composer.compose(&without_scan, None).await.is_err());
    assert!(api.state().execute_requests.is_empty());
}

#[tokio::test]
async fn test_blank_prompt_is_rejected() {
    let api = MockApi::new();
    api.state().conversion = Some(conversion_response());
    let composer = ScenarioComposer::new(api.clone(), "en");

    assert!(composer.convert(URL, "   ", None).await.is_err());
    assert!(api.state().convert_requests.is_empty());
}
