//! WebTest Client
//!
//! Access to the remote web testing service: the REST surface behind the
//! `TestingApi` trait and the per-job push channel behind `EventSource`.
//!
//! ## Module Organization
//!
//! - `api` - `TestingApi` trait and request/response bodies
//! - `rest` - reqwest implementation (`HttpTestingApi`)
//! - `channel` - `EventSource` trait, `JobRef`, `EventStream`
//! - `ws` - tokio-tungstenite implementation (`WsEventSource`)
//! - `http_client` - proxy-aware reqwest client factory
//! - `error` - `ApiError` taxonomy

pub mod api;
pub mod channel;
pub mod error;
pub mod http_client;
pub mod rest;
pub mod ws;

pub use api::{
    ConversionResponse, ConvertRequest, CreateTestRequest, ExecuteScanTestsRequest,
    ExecuteScanTestsResponse, StartScanRequest, TestingApi,
};
pub use channel::{EventSource, EventStream, JobRef};
pub use error::{ApiError, ApiResult};
pub use http_client::build_http_client;
pub use rest::{HttpTestingApi, ServiceEndpoint};
pub use ws::{derive_ws_base_url, WsEventSource};
