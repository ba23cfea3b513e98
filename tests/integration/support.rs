//! Test Support
//!
//! In-memory fakes for the remote service: `MockApi` answers REST calls
//! from canned responses and records what was asked, `ScriptedEventSource`
//! replays scripted push-channel sessions per job.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde_json::{json, Value};

use webtest_client::{
    ApiError, ApiResult, ConversionResponse, ConvertRequest, CreateTestRequest, EventSource,
    EventStream, ExecuteScanTestsRequest, ExecuteScanTestsResponse, JobRef, StartScanRequest,
    TestingApi,
};
use webtest_core::{
    ExecutionJob, ExecutionJobId, ExecutionStatus, ProgressEvent, ScanId, ScanJob, ScanStatus,
    TestPlan,
};
use webtest_orchestrator::models::settings::OrchestratorConfig;

// ============================================================================
// Fixtures
// ============================================================================

pub fn event(value: Value) -> ProgressEvent {
    ProgressEvent::from_value(value)
}

pub fn scan_job(id: i64, url: &str, status: ScanStatus) -> ScanJob {
    let mut job = ScanJob::new(ScanId(id), url);
    job.status = status;
    job
}

pub fn execution_job(id: i64, url: &str, status: ExecutionStatus, steps_total: u32) -> ExecutionJob {
    ExecutionJob {
        id: ExecutionJobId(id),
        target_url: url.to_string(),
        status,
        document: None,
        steps_total,
        steps_completed: 0,
        error_message: None,
        result_json: None,
        created_at: None,
        updated_at: None,
    }
}

/// Two categories, "Checkout" and "Search", as the planner returns them.
pub fn shop_plan() -> TestPlan {
    serde_json::from_value(json!({
        "categories": [
            {
                "id": "checkout",
                "name": "Checkout",
                "auto_selected": false,
                "tests": [
                    {"id": "checkout-1", "name": "Add to cart", "priority": "high",
                     "estimated_time": 30, "selected": false},
                    {"id": "checkout-2", "name": "Pay with card", "priority": "high",
                     "estimated_time": 60, "requires_auth": true, "selected": false,
                     "auth_fields": [
                         {"key": "email", "label": "Email", "type": "email", "required": true},
                         {"key": "password", "label": "Password", "type": "password", "required": true}
                     ]}
                ]
            },
            {
                "id": "search",
                "name": "Search",
                "auto_selected": false,
                "tests": [
                    {"id": "search-1", "name": "Search by keyword", "priority": "medium",
                     "estimated_time": 20, "selected": true,
                     "test_data_fields": [
                         {"key": "search_term", "label": "Search term", "required": false}
                     ]},
                    {"id": "search-2", "name": "Empty search", "priority": "low",
                     "estimated_time": 15, "selected": false}
                ]
            }
        ]
    }))
    .expect("plan fixture")
}

pub const PLAN_DOCUMENT: &str = "- id: SC-001\n  name: Search by keyword\n  steps:\n    - action: navigate\n      value: https://shop.example\n    - action: click\n      target: Search\n";

pub const PROMPT_DOCUMENT: &str = "- id: SC-002\n  name: Open cart\n  steps:\n    - action: click\n      target: Cart\n";

pub fn execute_response(job_id: i64) -> ExecuteScanTestsResponse {
    serde_json::from_value(json!({
        "test_id": job_id,
        "scenario_yaml": PLAN_DOCUMENT,
        "scenarios_count": 1,
        "steps_total": 2,
        "validation": [
            {"scenario_idx": 0, "step": 1, "status": "verified", "target_text": "https://shop.example"},
            {"scenario_idx": 0, "step": 2, "status": "verified", "target_text": "Search"}
        ],
        "validation_summary": {"verified": 2, "total": 2, "percent": 100}
    }))
    .expect("execute fixture")
}

pub fn conversion_response() -> ConversionResponse {
    serde_json::from_value(json!({
        "scenario_yaml": PROMPT_DOCUMENT,
        "scenarios_count": 1,
        "steps_total": 1,
        "validation": [
            {"scenario_idx": 0, "step": 1, "status": "unverified", "target_text": "Cart",
             "closest_match": "Basket"}
        ],
        "validation_summary": {"verified": 0, "total": 1, "percent": 0}
    }))
    .expect("conversion fixture")
}

/// Fast timings so time-paused tests advance quickly.
pub fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        poll_interval_secs: 3,
        reconnect_delay_secs: 3,
        max_reconnect_attempts: 3,
        ..OrchestratorConfig::default()
    }
}

// ============================================================================
// MockApi
// ============================================================================

#[derive(Default)]
pub struct MockState {
    /// Returned by `start_scan`; id 1 when unset.
    pub scan_job: Option<ScanJob>,
    /// Successive `get_scan` answers. When drained, the last scan job is
    /// returned unchanged.
    pub scan_polls: VecDeque<ApiResult<ScanJob>>,
    pub plan: Option<TestPlan>,
    pub plan_error: Option<ApiError>,
    pub execute_response: Option<ExecuteScanTestsResponse>,
    pub conversion: Option<ConversionResponse>,
    pub next_job_id: i64,
    pub job_snapshots: HashMap<i64, ExecutionJob>,
    pub cancel_error: Option<ApiError>,
    pub approve_error: Option<ApiError>,

    pub plan_calls: usize,
    pub poll_calls: usize,
    pub job_reads: usize,
    pub execute_requests: Vec<(ScanId, ExecuteScanTestsRequest)>,
    pub convert_requests: Vec<ConvertRequest>,
    pub created: Vec<CreateTestRequest>,
    pub updated: Vec<(ExecutionJobId, String)>,
    pub approved: Vec<ExecutionJobId>,
    pub cancelled: Vec<ExecutionJobId>,
}

#[derive(Default)]
pub struct MockApi {
    state: Mutex<MockState>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl TestingApi for MockApi {
    async fn start_scan(&self, request: StartScanRequest) -> ApiResult<ScanJob> {
        let mut state = self.state();
        let job = state
            .scan_job
            .clone()
            .unwrap_or_else(|| ScanJob::new(ScanId(1), request.target_url.clone()));
        state.scan_job = Some(job.clone());
        Ok(job)
    }

    async fn get_scan(&self, scan_id: ScanId) -> ApiResult<ScanJob> {
        let mut state = self.state();
        state.poll_calls += 1;
        match state.scan_polls.pop_front() {
            Some(result) => {
                if let Ok(job) = &result {
                    state.scan_job = Some(job.clone());
                }
                result
            }
            None => state
                .scan_job
                .clone()
                .filter(|j| j.id == scan_id)
                .ok_or_else(|| ApiError::not_found("Scan not found")),
        }
    }

    async fn generate_plan(&self, _scan_id: ScanId, _language: &str) -> ApiResult<TestPlan> {
        let mut state = self.state();
        state.plan_calls += 1;
        if let Some(err) = state.plan_error.clone() {
            return Err(err);
        }
        Ok(state.plan.clone().unwrap_or_default())
    }

    async fn execute_scan_tests(
        &self,
        scan_id: ScanId,
        request: ExecuteScanTestsRequest,
    ) -> ApiResult<ExecuteScanTestsResponse> {
        let mut state = self.state();
        state.execute_requests.push((scan_id, request));
        state
            .execute_response
            .clone()
            .ok_or_else(|| ApiError::validation("No tests selected"))
    }

    async fn convert_scenario(&self, request: ConvertRequest) -> ApiResult<ConversionResponse> {
        let mut state = self.state();
        state.convert_requests.push(request);
        state
            .conversion
            .clone()
            .ok_or_else(|| ApiError::validation("Could not convert prompt"))
    }

    async fn create_execution_job(&self, request: CreateTestRequest) -> ApiResult<ExecutionJob> {
        let mut state = self.state();
        state.next_job_id += 1;
        let id = 100 + state.next_job_id;
        let status = if request.document.is_some() {
            ExecutionStatus::Queued
        } else {
            ExecutionStatus::Generating
        };
        let mut job = execution_job(id, &request.target_url, status, 0);
        job.document = request.document.clone();
        state.created.push(request);
        state.job_snapshots.insert(id, job.clone());
        Ok(job)
    }

    async fn get_execution_job(&self, job_id: ExecutionJobId) -> ApiResult<ExecutionJob> {
        let mut state = self.state();
        state.job_reads += 1;
        state
            .job_snapshots
            .get(&job_id.0)
            .cloned()
            .ok_or_else(|| ApiError::not_found("Test not found"))
    }

    async fn update_scenario_document(
        &self,
        job_id: ExecutionJobId,
        document: &str,
    ) -> ApiResult<ExecutionJob> {
        let mut state = self.state();
        state.updated.push((job_id, document.to_string()));
        let mut job = state
            .job_snapshots
            .get(&job_id.0)
            .cloned()
            .unwrap_or_else(|| execution_job(job_id.0, "https://shop.example", ExecutionStatus::Review, 0));
        job.document = Some(document.to_string());
        Ok(job)
    }

    async fn approve_execution_job(&self, job_id: ExecutionJobId) -> ApiResult<ExecutionJob> {
        let mut state = self.state();
        if let Some(err) = state.approve_error.clone() {
            return Err(err);
        }
        state.approved.push(job_id);
        Ok(execution_job(job_id.0, "https://shop.example", ExecutionStatus::Queued, 0))
    }

    async fn cancel_execution_job(&self, job_id: ExecutionJobId) -> ApiResult<ExecutionJob> {
        let mut state = self.state();
        state.cancelled.push(job_id);
        if let Some(err) = state.cancel_error.clone() {
            return Err(err);
        }
        Ok(execution_job(job_id.0, "https://shop.example", ExecutionStatus::Failed, 0))
    }
}

// ============================================================================
// ScriptedEventSource
// ============================================================================

/// One scripted connection.
pub enum Session {
    /// Deliver the events, then close.
    Closes(Vec<ProgressEvent>),
    /// Deliver the events, then stay open without sending anything else.
    StaysOpen(Vec<ProgressEvent>),
    /// The connection attempt fails.
    Refused(ApiError),
}

#[derive(Default)]
pub struct ScriptedEventSource {
    sessions: Mutex<HashMap<String, VecDeque<Session>>>,
    subscriptions: Mutex<Vec<String>>,
}

impl ScriptedEventSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, job: JobRef, session: Session) {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(job.to_string())
            .or_default()
            .push_back(session);
    }

    /// How many times `job` was subscribed to.
    pub fn subscriptions(&self, job: JobRef) -> usize {
        let key = job.to_string();
        self.subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|k| **k == key)
            .count()
    }
}

#[async_trait]
impl EventSource for ScriptedEventSource {
    async fn subscribe(&self, job: JobRef) -> ApiResult<EventStream> {
        let key = job.to_string();
        self.subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(key.clone());
        let next = self
            .sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(&key)
            .and_then(|q| q.pop_front());
        match next {
            Some(Session::Closes(events)) => Ok(stream::iter(events).boxed()),
            Some(Session::StaysOpen(events)) => {
                Ok(stream::iter(events).chain(stream::pending()).boxed())
            }
            Some(Session::Refused(err)) => Err(err),
            None => Err(ApiError::transient("connection refused")),
        }
    }
}
