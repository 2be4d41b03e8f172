//! MCP tool-server client for ToolRelay.
//!
//! Implements `toolrelay_core::ToolServer` over the two transports a tool
//! server is usually reached by:
//! - [`StdioToolServer`]: spawn the server per session, newline-delimited JSON-RPC
//! - [`HttpToolServer`]: streamable HTTP (JSON or SSE responses, `Mcp-Session-Id`)
//!
//! Every `connect()` performs the `initialize` handshake and yields an
//! independent [`McpSession`].

pub mod http;
pub mod protocol;
pub mod session;
pub mod stdio;

use std::sync::Arc;
use std::time::Duration;
use toolrelay_config::{ToolServerConfig, ToolServerTransport};
use toolrelay_core::error::ToolServerError;
use toolrelay_core::tool::ToolServer;

pub use http::HttpToolServer;
pub use session::{McpSession, Transport};
pub use stdio::StdioToolServer;

/// Build the tool-server connector described by the configuration.
pub fn build_from_config(config: &ToolServerConfig) -> Result<Arc<dyn ToolServer>, ToolServerError> {
    let timeout = Duration::from_secs(config.request_timeout_secs);

    let server: Arc<dyn ToolServer> = match &config.transport {
        ToolServerTransport::Stdio {
            command,
            args,
            env,
            cwd,
        } => Arc::new(
            StdioToolServer::new(command, args.clone())
                .with_env(env.clone())
                .with_cwd(cwd.clone())
                .with_timeout(timeout),
        ),
        ToolServerTransport::Http { url, headers } => {
            Arc::new(HttpToolServer::new(url, headers, timeout)?)
        }
    };

    Ok(server)
}
