//! Tool server abstraction.
//!
//! Tools live in a separate tool-server process. A [`ToolServer`] is the
//! shared connector; every run acquires its own [`ToolSession`] from it so
//! that concurrent runs never share an in-flight call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ToolInvocationError, ToolServerError};

/// A callable tool as reported by the tool server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique tool name
    pub name: String,

    /// Human-readable description (sent to the model)
    #[serde(default)]
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub input_schema: serde_json::Value,
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Unique call ID (matches the model's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments exactly as the model serialized them
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Parse the raw argument text into a JSON object.
    ///
    /// Blank argument text is treated as an empty object.
    pub fn parse_arguments(&self) -> Result<serde_json::Value, ToolInvocationError> {
        let raw = self.arguments.trim();
        if raw.is_empty() {
            return Ok(serde_json::Value::Object(serde_json::Map::new()));
        }

        let malformed = |reason: String| ToolInvocationError::MalformedArguments {
            tool_name: self.name.clone(),
            reason,
        };

        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(value @ serde_json::Value::Object(_)) => Ok(value),
            Ok(other) => Err(malformed(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
            Err(e) => Err(malformed(e.to_string())),
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// The outcome of one tool call as fed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// The call ID this result is for
    pub call_id: String,

    /// Result content, or the failure description when `is_error` is set
    pub content: String,

    /// Whether `content` describes a failed invocation
    #[serde(default)]
    pub is_error: bool,
}

impl ToolCallResult {
    pub fn success(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    /// Substitute a failure description for the tool's answer.
    pub fn failure(call_id: impl Into<String>, error: &ToolInvocationError) -> Self {
        Self {
            call_id: call_id.into(),
            content: format!("Error: {error}"),
            is_error: true,
        }
    }
}

/// Shared connector to an external tool server.
#[async_trait]
pub trait ToolServer: Send + Sync {
    /// A human-readable name for this server (e.g., the command or URL).
    fn name(&self) -> &str;

    /// Open an independent session for one run.
    async fn connect(&self) -> Result<Box<dyn ToolSession>, ToolServerError>;
}

/// One run's private channel to the tool server.
#[async_trait]
pub trait ToolSession: Send {
    /// List the callable tools, in the order the server reports them.
    async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>, ToolServerError>;

    /// Invoke a tool and return its text content.
    async fn call_tool(
        &mut self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<String, ToolInvocationError>;

    /// Release the session. Calling it twice is a no-op.
    async fn close(&mut self) -> Result<(), ToolServerError>;
}
