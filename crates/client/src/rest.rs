//! REST Implementation
//!
//! `HttpTestingApi` talks to the service over JSON/HTTP. Non-2xx responses
//! are mapped into [`ApiError`] with the server's `detail` text preserved.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;
use webtest_core::{ExecutionJob, ExecutionJobId, ProxyConfig, ScanId, ScanJob, TestPlan};

use crate::api::{
    ConversionResponse, ConvertRequest, CreateTestRequest, ExecuteScanTestsRequest,
    ExecuteScanTestsResponse, StartScanRequest, TestingApi,
};
use crate::error::{ApiError, ApiResult};
use crate::http_client::build_http_client;

/// Where and how to reach the service.
#[derive(Debug, Clone)]
pub struct ServiceEndpoint {
    /// e.g. `http://localhost:8000`; no trailing slash required.
    pub api_base_url: String,
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    pub request_timeout: Duration,
    pub proxy: Option<ProxyConfig>,
}

impl ServiceEndpoint {
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            api_key: None,
            access_token: None,
            request_timeout: Duration::from_secs(120),
            proxy: None,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url.trim_end_matches('/'), path)
    }
}

/// reqwest-backed [`TestingApi`].
pub struct HttpTestingApi {
    client: reqwest::Client,
    endpoint: ServiceEndpoint,
}

impl HttpTestingApi {
    pub fn new(endpoint: ServiceEndpoint) -> ApiResult<Self> {
        let client = build_http_client(endpoint.proxy.as_ref(), endpoint.request_timeout)?;
        Ok(Self { client, endpoint })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self.client.request(method, self.endpoint.url(path));
        if let Some(key) = &self.endpoint.api_key {
            builder = builder.header("X-API-Key", key);
        }
        if let Some(token) = &self.endpoint.access_token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ApiResult<T> {
        let response = builder.send().await?;
        let response = check_status(response).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ApiError::decode(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        debug!(path = %path, "GET");
        self.send(self.request(Method::GET, path)).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        debug!(path = %path, "POST");
        self.send(self.request(Method::POST, path).json(body)).await
    }

    async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        debug!(path = %path, "PUT");
        self.send(self.request(Method::PUT, path).json(body)).await
    }
}

async fn check_status(response: Response) -> ApiResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::from_status(
        status.as_u16(),
        extract_detail(&body, status.canonical_reason().unwrap_or("request failed")),
    ))
}

/// Pull the operator-facing message out of an error body.
///
/// The service answers `{"detail": "..."}` for domain errors and
/// `{"detail": [{"msg": ...}, ...]}` for request validation errors.
pub(crate) fn extract_detail(body: &str, fallback: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        let trimmed = body.trim();
        return if trimmed.is_empty() {
            fallback.to_string()
        } else {
            trimmed.to_string()
        };
    };
    match value.get("detail") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => {
            let msgs: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(Value::as_str))
                .collect();
            if msgs.is_empty() {
                fallback.to_string()
            } else {
                msgs.join("; ")
            }
        }
        Some(other) => other.to_string(),
        None => fallback.to_string(),
    }
}

#[async_trait]
impl TestingApi for HttpTestingApi {
    async fn start_scan(&self, request: StartScanRequest) -> ApiResult<ScanJob> {
        self.post("/api/scan", &request).await
    }

    async fn get_scan(&self, scan_id: ScanId) -> ApiResult<ScanJob> {
        self.get(&format!("/api/scan/{}", scan_id)).await
    }

    async fn generate_plan(&self, scan_id: ScanId, language: &str) -> ApiResult<TestPlan> {
        self.post(
            &format!("/api/scan/{}/plan", scan_id),
            &json!({ "language": language }),
        )
        .await
    }

    async fn execute_scan_tests(
        &self,
        scan_id: ScanId,
        request: ExecuteScanTestsRequest,
    ) -> ApiResult<ExecuteScanTestsResponse> {
        self.post(&format!("/api/scan/{}/execute", scan_id), &request)
            .await
    }

    async fn convert_scenario(&self, request: ConvertRequest) -> ApiResult<ConversionResponse> {
        self.post("/api/tests/convert", &request).await
    }

    async fn create_execution_job(&self, request: CreateTestRequest) -> ApiResult<ExecutionJob> {
        self.post("/api/tests", &request).await
    }

    async fn get_execution_job(&self, job_id: ExecutionJobId) -> ApiResult<ExecutionJob> {
        self.get(&format!("/api/tests/{}", job_id)).await
    }

    async fn update_scenario_document(
        &self,
        job_id: ExecutionJobId,
        document: &str,
    ) -> ApiResult<ExecutionJob> {
        self.put(
            &format!("/api/tests/{}/scenarios", job_id),
            &json!({ "scenario_yaml": document }),
        )
        .await
    }

    async fn approve_execution_job(&self, job_id: ExecutionJobId) -> ApiResult<ExecutionJob> {
        self.post(&format!("/api/tests/{}/approve", job_id), &json!({}))
            .await
    }

    async fn cancel_execution_job(&self, job_id: ExecutionJobId) -> ApiResult<ExecutionJob> {
        self.post(&format!("/api/tests/{}/cancel", job_id), &json!({}))
            .await
    }
}
