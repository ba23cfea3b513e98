//! HTTP Client Factory
//!
//! Builds the reqwest client used for every REST call, with proxy and
//! request-timeout settings applied.

use std::time::Duration;

use webtest_core::proxy::ProxyConfig;

use crate::error::{ApiError, ApiResult};

/// Build a `reqwest::Client` with the resolved proxy configuration.
///
/// - `Some(proxy)` -> configure proxy on the client
/// - `None` -> explicitly disable proxy (`no_proxy`), ignoring env vars
pub fn build_http_client(
    proxy: Option<&ProxyConfig>,
    timeout: Duration,
) -> ApiResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(timeout);
    match proxy {
        Some(cfg) => {
            let url = cfg.url();
            let mut p = reqwest::Proxy::all(&url)
                .map_err(|e| ApiError::validation(format!("invalid proxy URL {}: {}", url, e)))?;
            if let (Some(u), Some(pw)) = (&cfg.username, &cfg.password) {
                p = p.basic_auth(u, pw);
            }
            builder = builder.proxy(p);
        }
        None => {
            builder = builder.no_proxy();
        }
    }
    builder
        .build()
        .map_err(|e| ApiError::transient(format!("failed to build HTTP client: {}", e)))
}
