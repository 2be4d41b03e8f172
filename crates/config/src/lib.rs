//! Configuration loading, validation, and management for ToolRelay.
//!
//! Loads configuration from `~/.toolrelay/config.toml` (or an explicit path)
//! with environment variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Placeholder substituted with the user's request in the instruction template.
pub const USER_PROMPT_PLACEHOLDER: &str = "{user_prompt}";

/// The root configuration structure.
///
/// Maps directly to `~/.toolrelay/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Gateway (HTTP server) configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Completion provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,

    /// External tool server configuration
    #[serde(default)]
    pub tool_server: ToolServerConfig,

    /// Orchestration loop configuration
    #[serde(default)]
    pub agent: AgentConfig,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Origins allowed to call the gateway from a browser
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

fn default_port() -> u16 {
    8001
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".into(),
        "http://127.0.0.1:3000".into(),
    ]
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

/// Which completion API dialect to speak.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Any OpenAI-compatible `/chat/completions` endpoint
    #[default]
    Openai,
    /// Azure OpenAI deployment (api-key header, api-version query)
    Azure,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,

    /// Base URL (OpenAI) or resource endpoint (Azure)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Azure `api-version` query parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// Model name (OpenAI) or deployment name (Azure)
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Total attempts per completion call; 1 disables retry
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_request_timeout_secs() -> u64 {
    120
}
fn default_max_attempts() -> u32 {
    1
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            endpoint: default_endpoint(),
            api_key: None,
            api_version: None,
            model: default_model(),
            temperature: None,
            max_tokens: None,
            request_timeout_secs: default_request_timeout_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("endpoint", &self.endpoint)
            .field("api_key", &redact(&self.api_key))
            .field("api_version", &self.api_version)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

/// How to reach the tool server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum ToolServerTransport {
    /// Spawn the server as a subprocess and speak over stdin/stdout
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<PathBuf>,
    },
    /// Streamable HTTP endpoint
    Http {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

impl Default for ToolServerTransport {
    fn default() -> Self {
        Self::Http {
            url: "http://127.0.0.1:8000/mcp".into(),
            headers: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServerConfig {
    #[serde(flatten)]
    pub transport: ToolServerTransport,

    #[serde(default = "default_tool_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_tool_timeout_secs() -> u64 {
    60
}

impl Default for ToolServerConfig {
    fn default() -> Self {
        Self {
            transport: ToolServerTransport::default(),
            request_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum number of tool-calling rounds per run
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,

    /// Instruction wrapped around the user's request; must contain `{user_prompt}`
    #[serde(default = "default_instruction_template")]
    pub instruction_template: String,

    /// Split the final answer into deltas of this many characters (unset = one delta)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_chunk_chars: Option<usize>,
}

fn default_max_tool_rounds() -> usize {
    25
}

/// The scope policy the model is asked to follow.
pub const DEFAULT_INSTRUCTION_TEMPLATE: &str = r#"You are an intelligent agent capable of orchestrating multiple tools to assist users. Below is a list of available tools, each with a name, description of what it does, and the input it requires.

Guardrails:

- You may only provide answers that are directly related to the database of airports, city details, or weather data.

- For Casual greetings or simple pleasantries (e.g., "Hello", "Namaskar","How are you?"), you may respond conversationally(e.g.,"Hi! How can I Assist you today?").

- For Casual conversation like (e.g., "ok","Thankyou","amazing") you may respond conversationally(e.g.,"Thank You anything else you want me to assist with you").

- Do not provide answers or guesses about anything outside this scope.

- If the user's request is outside this scope, respond politely:

"I'm sorry, I can only provide information about airports, city details, or weather. Can I help you with that?"

Instructions:

1. Identify which tools can be used to fulfill their request.

2. Call one or more tools as needed.

3. Explain how these tools will be used.

4. Ask for any additional details if required.

5. Do not give any additional explanation, context, or interpretation. Do not hesitate or ask follow-up questions unless the user explicitly asks for explanation or interpretation of Metar Data.

6. If duplicate Mongo DB results are present, return only one. If there are differences, return all the unique values.

7. If the user specifically asks for Metar data, just provide the Raw Metar Data Value.

8. If asked for Hours Back data and no results come back from query running then specify the latest timestamp that is present in MongoDB

The user's request is: "{user_prompt}"."#;

fn default_instruction_template() -> String {
    DEFAULT_INSTRUCTION_TEMPLATE.into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
            instruction_template: default_instruction_template(),
            answer_chunk_chars: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location with environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from `path` (defaults if missing), then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides. `TOOLRELAY_*` names win over the
    /// lowercase names of the legacy `.env` deployment.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let pick = |primary: &str, legacy: &str| var(primary).or_else(|| var(legacy));

        if let Some(key) = pick("TOOLRELAY_API_KEY", "subscription_key") {
            self.provider.api_key = Some(key);
        }
        if let Some(endpoint) = pick("TOOLRELAY_ENDPOINT", "endpoint") {
            self.provider.endpoint = endpoint;
        }
        if let Some(version) = pick("TOOLRELAY_API_VERSION", "api_version") {
            self.provider.api_version = Some(version);
            // Only Azure takes an api-version.
            self.provider.kind = ProviderKind::Azure;
        }
        if let Some(deployment) = pick("TOOLRELAY_DEPLOYMENT", "deployment") {
            self.provider.model = deployment;
        }
        if let Some(url) = var("TOOLRELAY_TOOL_SERVER_URL") {
            let headers = match &self.tool_server.transport {
                ToolServerTransport::Http { headers, .. } => headers.clone(),
                ToolServerTransport::Stdio { .. } => HashMap::new(),
            };
            self.tool_server.transport = ToolServerTransport::Http { url, headers };
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".toolrelay")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(t) = self.provider.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::ValidationError(
                    "provider.temperature must be between 0.0 and 2.0".into(),
                ));
            }
        }

        if self.provider.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "provider.max_attempts must be at least 1".into(),
            ));
        }

        if self.agent.max_tool_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_tool_rounds must be at least 1".into(),
            ));
        }

        if !self
            .agent
            .instruction_template
            .contains(USER_PROMPT_PLACEHOLDER)
        {
            return Err(ConfigError::ValidationError(format!(
                "agent.instruction_template must contain {USER_PROMPT_PLACEHOLDER}"
            )));
        }

        if self.agent.answer_chunk_chars == Some(0) {
            return Err(ConfigError::ValidationError(
                "agent.answer_chunk_chars must be greater than 0".into(),
            ));
        }

        match &self.tool_server.transport {
            ToolServerTransport::Stdio { command, .. } if command.trim().is_empty() => {
                return Err(ConfigError::ValidationError(
                    "tool_server.command must not be empty".into(),
                ));
            }
            ToolServerTransport::Http { url, .. }
                if !(url.starts_with("http://") || url.starts_with("https://")) =>
            {
                return Err(ConfigError::ValidationError(format!(
                    "tool_server.url must be an http(s) URL, got '{url}'"
                )));
            }
            _ => {}
        }

        // Credentialed CORS cannot echo a wildcard origin.
        if self.gateway.allowed_origins.iter().any(|o| o.trim() == "*") {
            return Err(ConfigError::ValidationError(
                "gateway.allowed_origins must list explicit origins, '*' is not allowed".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
