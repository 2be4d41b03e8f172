//! Transport-independent MCP session.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use toolrelay_core::error::{ToolInvocationError, ToolServerError};
use toolrelay_core::tool::{ToolDescriptor, ToolSession};
use tracing::{debug, info, warn};

use crate::protocol::{
    InitializeParams, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ToolCallResult,
    ToolListResult,
};

/// Moves JSON-RPC messages between the client and one server session.
///
/// Requests are issued one at a time, so a transport only needs to find the
/// reply to the request it just sent.
#[async_trait]
pub trait Transport: Send {
    /// Send a request and wait for the reply carrying the same id.
    async fn request(&mut self, request: &JsonRpcRequest)
    -> Result<JsonRpcResponse, ToolServerError>;

    /// Send a notification; nothing is expected back.
    async fn notify(&mut self, notification: &JsonRpcNotification) -> Result<(), ToolServerError>;

    /// Release the underlying process or remote session.
    async fn shutdown(&mut self) -> Result<(), ToolServerError>;
}

/// An initialized MCP session over some [`Transport`].
pub struct McpSession<T: Transport> {
    transport: T,
    server: String,
    next_id: u64,
    timeout: Duration,
    closed: bool,
}

impl<T: Transport> McpSession<T> {
    /// Run the `initialize` handshake on `transport`.
    ///
    /// The transport is shut down if the handshake fails.
    pub async fn initialize(
        transport: T,
        server: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ToolServerError> {
        let mut session = Self {
            transport,
            server: server.into(),
            next_id: 1,
            timeout,
            closed: false,
        };

        if let Err(e) = session.handshake().await {
            warn!(server = %session.server, error = %e, "MCP handshake failed");
            let _ = session.close().await;
            return Err(e);
        }

        Ok(session)
    }

    async fn handshake(&mut self) -> Result<(), ToolServerError> {
        let params = serde_json::to_value(InitializeParams::default())
            .map_err(|e| ToolServerError::Protocol(e.to_string()))?;

        let response = self.rpc("initialize", Some(params)).await?;
        let result = into_result(response)
            .map_err(|message| ToolServerError::Protocol(format!("initialize failed: {message}")))?;

        info!(
            server = %self.server,
            protocol = result["protocolVersion"].as_str().unwrap_or("unknown"),
            name = result["serverInfo"]["name"].as_str().unwrap_or("unknown"),
            "MCP session initialized"
        );

        let notification = JsonRpcNotification::new("notifications/initialized");
        tokio::time::timeout(self.timeout, self.transport.notify(&notification))
            .await
            .map_err(|_| ToolServerError::Timeout("notifications/initialized".into()))?
    }

    /// Issue one request with the session timeout applied.
    async fn rpc(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse, ToolServerError> {
        if self.closed {
            return Err(ToolServerError::Closed);
        }

        let request = JsonRpcRequest::new(self.next_id, method, params);
        self.next_id += 1;

        debug!(server = %self.server, id = request.id, method, "MCP request");

        tokio::time::timeout(self.timeout, self.transport.request(&request))
            .await
            .map_err(|_| {
                ToolServerError::Timeout(format!(
                    "{method} after {}s",
                    self.timeout.as_secs()
                ))
            })?
    }
}

/// Split a response into its result or the server's error message.
fn into_result(response: JsonRpcResponse) -> Result<Value, String> {
    match (response.result, response.error) {
        (_, Some(error)) => Err(format!("{} (code {})", error.message, error.code)),
        (Some(result), None) => Ok(result),
        (None, None) => Ok(Value::Null),
    }
}

#[async_trait]
impl<T: Transport> ToolSession for McpSession<T> {
    async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>, ToolServerError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = cursor.take().map(|c| serde_json::json!({ "cursor": c }));
            let response = self.rpc("tools/list", params).await?;
            let result = into_result(response)
                .map_err(|message| ToolServerError::Protocol(format!("tools/list failed: {message}")))?;

            let page: ToolListResult = serde_json::from_value(result)
                .map_err(|e| ToolServerError::MalformedDescriptors(e.to_string()))?;

            tools.extend(page.tools.into_iter().map(ToolDescriptor::from));

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        debug!(server = %self.server, count = tools.len(), "Listed tools");
        Ok(tools)
    }

    async fn call_tool(
        &mut self,
        name: &str,
        arguments: Value,
    ) -> Result<String, ToolInvocationError> {
        let params = serde_json::json!({ "name": name, "arguments": arguments });

        let response = self.rpc("tools/call", Some(params)).await.map_err(|e| match e {
            ToolServerError::Timeout(_) => ToolInvocationError::Timeout {
                tool_name: name.to_string(),
                timeout_secs: self.timeout.as_secs(),
            },
            other => ToolInvocationError::Transport {
                tool_name: name.to_string(),
                reason: other.to_string(),
            },
        })?;

        let result = into_result(response).map_err(|message| ToolInvocationError::ToolReported {
            tool_name: name.to_string(),
            message,
        })?;

        let result: ToolCallResult =
            serde_json::from_value(result).map_err(|e| ToolInvocationError::Transport {
                tool_name: name.to_string(),
                reason: format!("malformed tools/call result: {e}"),
            })?;

        let text = result.to_text();
        if result.is_error {
            return Err(ToolInvocationError::ToolReported {
                tool_name: name.to_string(),
                message: text,
            });
        }

        Ok(text)
    }

    async fn close(&mut self) -> Result<(), ToolServerError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        debug!(server = %self.server, "Closing MCP session");
        self.transport.shutdown().await
    }
}
