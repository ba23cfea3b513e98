//! WebSocket Event Source
//!
//! `WsEventSource` subscribes to a job's push channel with tokio-tungstenite
//! and turns text frames into [`ProgressEvent`]s.

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use webtest_core::ProgressEvent;

use crate::channel::{EventSource, EventStream, JobRef};
use crate::error::{ApiError, ApiResult};

/// Derive the push base URL from the REST base URL (`http`→`ws`,
/// `https`→`wss`).
pub fn derive_ws_base_url(api_base_url: &str) -> ApiResult<String> {
    let mut url = url::Url::parse(api_base_url)
        .map_err(|e| ApiError::validation(format!("invalid base URL {}: {}", api_base_url, e)))?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        "ws" | "wss" => return Ok(api_base_url.trim_end_matches('/').to_string()),
        other => {
            return Err(ApiError::validation(format!(
                "unsupported URL scheme: {}",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| ApiError::validation(format!("cannot derive push URL from {}", api_base_url)))?;
    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// tokio-tungstenite backed [`EventSource`].
#[derive(Debug, Clone)]
pub struct WsEventSource {
    ws_base_url: String,
}

impl WsEventSource {
    pub fn new(ws_base_url: impl Into<String>) -> Self {
        Self {
            ws_base_url: ws_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn channel_url(&self, job: JobRef) -> String {
        format!("{}{}", self.ws_base_url, job.channel_path())
    }
}

#[async_trait]
impl EventSource for WsEventSource {
    async fn subscribe(&self, job: JobRef) -> ApiResult<EventStream> {
        let url = self.channel_url(job);
        let (socket, _response) = connect_async(url.as_str()).await?;
        debug!(job = %job, url = %url, "push channel connected");

        let events = stream::unfold(socket, move |mut socket| async move {
            loop {
                match socket.next().await {
                    Some(Ok(Message::Text(text))) => {
                        return Some((ProgressEvent::parse(&text), socket));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(job = %job, ?frame, "push channel closed by server");
                        return None;
                    }
                    // Ping/pong are answered by tungstenite; binary frames carry nothing for us.
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!(job = %job, error = %e, "push channel error");
                        return None;
                    }
                    None => return None,
                }
            }
        });

        Ok(Box::pin(events))
    }
}
