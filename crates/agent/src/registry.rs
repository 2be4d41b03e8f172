//! Per-run view of the tool server.
//!
//! A [`ToolRegistryAdapter`] owns the run's private tool session, the tools
//! discovered on it, and their translation into model tool definitions.

use std::collections::HashSet;
use toolrelay_core::error::{RunError, ToolInvocationError, ToolServerError};
use toolrelay_core::provider::ToolDefinition;
use toolrelay_core::tool::{ToolDescriptor, ToolServer, ToolSession};
use tracing::{debug, info, warn};

pub struct ToolRegistryAdapter {
    session: Box<dyn ToolSession>,
    tools: Vec<ToolDescriptor>,
    server: String,
}

impl ToolRegistryAdapter {
    /// Open a session on `server` and list its tools.
    ///
    /// Any failure is fatal for the run and reported as
    /// [`RunError::ToolServerUnavailable`]. The session is closed again if
    /// listing fails.
    pub async fn discover(server: &dyn ToolServer) -> Result<Self, RunError> {
        let mut session = server
            .connect()
            .await
            .map_err(RunError::ToolServerUnavailable)?;

        let listed = session.list_tools().await.and_then(|tools| {
            validate_descriptors(&tools)?;
            Ok(tools)
        });

        let tools = match listed {
            Ok(tools) => tools,
            Err(e) => {
                if let Err(close_err) = session.close().await {
                    debug!(error = %close_err, "Closing failed tool session");
                }
                return Err(RunError::ToolServerUnavailable(e));
            }
        };

        info!(server = server.name(), tools = tools.len(), "Discovered tools");

        Ok(Self {
            session,
            tools,
            server: server.name().to_string(),
        })
    }

    /// Discovered tools, in server order.
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Tool schemas in the shape the model expects. Schemas pass through untouched.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.input_schema.clone(),
            })
            .collect()
    }

    /// Call a discovered tool. Names outside the discovered set are rejected
    /// without contacting the server.
    pub async fn invoke(
        &mut self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<String, ToolInvocationError> {
        if !self.tools.iter().any(|t| t.name == name) {
            return Err(ToolInvocationError::UnknownTool(name.to_string()));
        }
        self.session.call_tool(name, arguments).await
    }

    /// Release the session. Failures are logged, never propagated.
    pub async fn close(&mut self) {
        if let Err(e) = self.session.close().await {
            warn!(server = %self.server, error = %e, "Failed to close tool session");
        }
    }
}

fn validate_descriptors(tools: &[ToolDescriptor]) -> Result<(), ToolServerError> {
    let mut seen = HashSet::new();
    for tool in tools {
        if tool.name.trim().is_empty() {
            return Err(ToolServerError::MalformedDescriptors(
                "tool with an empty name".into(),
            ));
        }
        if !seen.insert(tool.name.as_str()) {
            return Err(ToolServerError::MalformedDescriptors(format!(
                "duplicate tool name '{}'",
                tool.name
            )));
        }
        if !tool.input_schema.is_object() {
            return Err(ToolServerError::MalformedDescriptors(format!(
                "input schema of '{}' is not an object",
                tool.name
            )));
        }
    }
    Ok(())
}
