pub mod ask;
pub mod doctor;
pub mod init;
pub mod serve;
pub mod tools;

use std::path::{Path, PathBuf};
use toolrelay_config::AppConfig;
use toolrelay_core::ToolDescriptor;

/// The file a command reads or writes: `--config` or the default location.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

/// Load config with environment overrides applied.
pub fn load_config(explicit: Option<&Path>) -> toolrelay_core::Result<AppConfig> {
    AppConfig::load_with_env(&config_path(explicit)).map_err(|e| toolrelay_core::Error::Config {
        message: e.to_string(),
    })
}

/// Open a session on the configured tool server, list its tools and close
/// the session again. Returns the server's name with the tools.
pub async fn discover_tools(
    config: &AppConfig,
) -> toolrelay_core::Result<(String, Vec<ToolDescriptor>)> {
    let server = toolrelay_mcp::build_from_config(&config.tool_server)?;
    let mut session = server.connect().await?;
    let listed = session.list_tools().await;
    if let Err(e) = session.close().await {
        tracing::debug!(error = %e, "Closing tool session");
    }
    Ok((server.name().to_string(), listed?))
}
