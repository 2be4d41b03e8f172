//! Streamable HTTP transport.
//!
//! Every JSON-RPC message is POSTed to the server URL. The reply is either a
//! plain JSON body or an SSE stream whose events carry JSON-RPC messages. The
//! server may assign an `Mcp-Session-Id` during `initialize`, which is echoed
//! on every later request and released with a DELETE on shutdown.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;
use std::time::Duration;
use toolrelay_core::error::ToolServerError;
use toolrelay_core::tool::{ToolServer, ToolSession};
use tracing::{debug, warn};

use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, match_response};
use crate::session::{McpSession, Transport};

pub const SESSION_HEADER: &str = "mcp-session-id";

/// Connector for a tool server exposed over streamable HTTP.
pub struct HttpToolServer {
    url: String,
    headers: HeaderMap,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpToolServer {
    /// Create a connector; extra `headers` are sent with every request.
    pub fn new(
        url: impl Into<String>,
        headers: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self, ToolServerError> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ToolServerError::Connection(format!("Invalid header name '{name}': {e}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                ToolServerError::Connection(format!("Invalid header value for '{name}': {e}"))
            })?;
            header_map.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ToolServerError::Connection(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: url.into(),
            headers: header_map,
            timeout,
            client,
        })
    }
}

#[async_trait]
impl ToolServer for HttpToolServer {
    fn name(&self) -> &str {
        &self.url
    }

    async fn connect(&self) -> Result<Box<dyn ToolSession>, ToolServerError> {
        let transport = HttpTransport {
            client: self.client.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            session_id: None,
            release_timeout: self.timeout,
        };
        let session = McpSession::initialize(transport, &self.url, self.timeout).await?;
        Ok(Box::new(session))
    }
}

/// One streamable-HTTP session.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
    session_id: Option<String>,
    /// Upper bound on the DELETE that releases the session.
    release_timeout: Duration,
}

impl HttpTransport {
    async fn post(&mut self, body: String) -> Result<reqwest::Response, ToolServerError> {
        let mut builder = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .header(ACCEPT, "application/json, text/event-stream")
            .header(CONTENT_TYPE, "application/json")
            .body(body);

        if let Some(id) = &self.session_id {
            builder = builder.header(SESSION_HEADER, id);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ToolServerError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ToolServerError::Connection(format!("HTTP {status}: {text}")));
        }

        if let Some(id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            if self.session_id.as_deref() != Some(id) {
                debug!(session_id = id, "MCP session assigned");
                self.session_id = Some(id.to_string());
            }
        }

        Ok(response)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(
        &mut self,
        request: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, ToolServerError> {
        let body =
            serde_json::to_string(request).map_err(|e| ToolServerError::Protocol(e.to_string()))?;
        let response = self.post(body).await?;

        let is_sse = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        if !is_sse {
            let text = response
                .text()
                .await
                .map_err(|e| ToolServerError::Connection(e.to_string()))?;
            return match_response(&text, request.id).ok_or_else(|| {
                ToolServerError::Protocol(format!("no reply to request {}", request.id))
            });
        }

        let mut events = response.bytes_stream().eventsource();
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => {
                    if let Some(reply) = match_response(&event.data, request.id) {
                        return Ok(reply);
                    }
                    debug!(event = %event.event, "Skipping unrelated MCP event");
                }
                Err(e) => {
                    warn!(error = %e, "MCP SSE stream error");
                    return Err(ToolServerError::Connection(e.to_string()));
                }
            }
        }

        Err(ToolServerError::Protocol(format!(
            "event stream ended without a reply to request {}",
            request.id
        )))
    }

    async fn notify(&mut self, notification: &JsonRpcNotification) -> Result<(), ToolServerError> {
        let body = serde_json::to_string(notification)
            .map_err(|e| ToolServerError::Protocol(e.to_string()))?;
        self.post(body).await.map(|_| ())
    }

    async fn shutdown(&mut self) -> Result<(), ToolServerError> {
        let Some(id) = self.session_id.take() else {
            return Ok(());
        };

        let result = self
            .client
            .delete(&self.url)
            .headers(self.headers.clone())
            .header(SESSION_HEADER, &id)
            .timeout(self.release_timeout)
            .send()
            .await;

        // Servers may refuse client-initiated termination (405); the session
        // then simply expires on their side.
        match result {
            Ok(response) => {
                debug!(session_id = %id, status = %response.status(), "MCP session released");
                Ok(())
            }
            Err(e) if e.is_timeout() => {
                warn!(session_id = %id, "MCP server did not acknowledge session release");
                Err(ToolServerError::Timeout(format!(
                    "session release after {}s",
                    self.release_timeout.as_secs()
                )))
            }
            Err(e) => Err(ToolServerError::Connection(e.to_string())),
        }
    }
}
