//! Testing Service API
//!
//! The `TestingApi` trait is the seam between the orchestrator and the
//! remote service. Every REST call the orchestrator makes goes through it,
//! which lets tests drive the whole workflow against an in-memory fake.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use webtest_core::{
    ExecutionJob, ExecutionJobId, ExecutionMode, ScanId, ScanJob, TestPlan, ValidationItem,
    ValidationSummary,
};

use crate::error::ApiResult;

/// Body of `POST /api/scan`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartScanRequest {
    pub target_url: String,
    pub max_pages: u32,
    pub max_depth: u32,
}

/// Body of `POST /api/scan/{id}/execute`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecuteScanTestsRequest {
    pub selected_tests: Vec<String>,
    #[serde(default)]
    pub auth_data: HashMap<String, String>,
    #[serde(default)]
    pub test_data: HashMap<String, String>,
}

/// Response of `POST /api/scan/{id}/execute`. The service has already
/// created an execution job for the composed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteScanTestsResponse {
    #[serde(rename = "test_id")]
    pub execution_job_id: ExecutionJobId,
    #[serde(rename = "scenario_yaml")]
    pub document: String,
    #[serde(default)]
    pub scenarios_count: u32,
    #[serde(default)]
    pub steps_total: u32,
    #[serde(default)]
    pub validation: Vec<ValidationItem>,
    #[serde(default)]
    pub validation_summary: Option<ValidationSummary>,
}

/// Body of `POST /api/tests/convert`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertRequest {
    pub target_url: String,
    pub prompt: String,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_id: Option<ScanId>,
}

/// Response of `POST /api/tests/convert`. No job is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResponse {
    #[serde(rename = "scenario_yaml")]
    pub document: String,
    #[serde(default, rename = "scenarios_count")]
    pub count: u32,
    #[serde(default, rename = "steps_total")]
    pub steps: u32,
    #[serde(default)]
    pub validation: Vec<ValidationItem>,
    #[serde(default)]
    pub validation_summary: Option<ValidationSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance: Option<serde_json::Value>,
}

/// Body of `POST /api/tests`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTestRequest {
    pub target_url: String,
    pub mode: ExecutionMode,
    #[serde(rename = "scenario_yaml", skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
}

/// Every REST call consumed by the orchestrator.
#[async_trait]
pub trait TestingApi: Send + Sync {
    async fn start_scan(&self, request: StartScanRequest) -> ApiResult<ScanJob>;

    async fn get_scan(&self, scan_id: ScanId) -> ApiResult<ScanJob>;

    async fn generate_plan(&self, scan_id: ScanId, language: &str) -> ApiResult<TestPlan>;

    async fn execute_scan_tests(
        &self,
        scan_id: ScanId,
        request: ExecuteScanTestsRequest,
    ) -> ApiResult<ExecuteScanTestsResponse>;

    async fn convert_scenario(&self, request: ConvertRequest) -> ApiResult<ConversionResponse>;

    async fn create_execution_job(&self, request: CreateTestRequest) -> ApiResult<ExecutionJob>;

    async fn get_execution_job(&self, job_id: ExecutionJobId) -> ApiResult<ExecutionJob>;

    /// Only legal while the job is in `review`.
    async fn update_scenario_document(
        &self,
        job_id: ExecutionJobId,
        document: &str,
    ) -> ApiResult<ExecutionJob>;

    /// Only legal while the job is in `review`; moves it to `queued`.
    async fn approve_execution_job(&self, job_id: ExecutionJobId) -> ApiResult<ExecutionJob>;

    /// Best-effort.
    async fn cancel_execution_job(&self, job_id: ExecutionJobId) -> ApiResult<ExecutionJob>;
}
