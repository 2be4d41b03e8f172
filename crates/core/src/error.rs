//! Error types for the ToolRelay domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`RunError`] is the closed set
//! of conditions that terminate an orchestration run.

use thiserror::Error;

/// The top-level error type for ToolRelay operations outside a run.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool server errors ---
    #[error("Tool server error: {0}")]
    ToolServer(#[from] ToolServerError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolInvocationError),

    // --- Transcript errors ---
    #[error("Transcript error: {0}")]
    Transcript(#[from] TranscriptError),

    // --- Run errors ---
    #[error("Run failed: {0}")]
    Run(#[from] RunError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the completion provider (transport, auth, rate limit).
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    /// Whether a retry of the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Timeout(_) | Self::Network(_)
        ) || matches!(self, Self::ApiError { status_code, .. } if *status_code >= 500)
    }
}

/// Failures reaching or talking to the tool server as a whole.
#[derive(Debug, Clone, Error)]
pub enum ToolServerError {
    #[error("Failed to start tool server: {0}")]
    Spawn(String),

    #[error("Tool server connection failed: {0}")]
    Connection(String),

    #[error("Tool server protocol error: {0}")]
    Protocol(String),

    #[error("Tool server request timed out: {0}")]
    Timeout(String),

    #[error("Tool server returned malformed descriptors: {0}")]
    MalformedDescriptors(String),

    #[error("Tool server session is closed")]
    Closed,
}

/// Failure of a single tool call. Recovered inside the loop.
#[derive(Debug, Clone, Error)]
pub enum ToolInvocationError {
    #[error("Tool not found: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for tool '{tool_name}': {reason}")]
    MalformedArguments { tool_name: String, reason: String },

    #[error("Tool '{tool_name}' reported an error: {message}")]
    ToolReported { tool_name: String, message: String },

    #[error("Tool '{tool_name}' could not be invoked: {reason}")]
    Transport { tool_name: String, reason: String },

    #[error("Tool '{tool_name}' timed out after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },
}

/// Violations of the transcript ordering invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptError {
    #[error("Tool result for '{0}' has no matching assistant tool call")]
    UnmatchedToolResult(String),

    #[error("Tool call '{0}' already has a result")]
    DuplicateToolResult(String),
}

/// Conditions that end a run with a single run-error event.
#[derive(Debug, Clone, Error)]
pub enum RunError {
    #[error("Tool server unavailable: {0}")]
    ToolServerUnavailable(#[source] ToolServerError),

    #[error("Completion provider error: {0}")]
    CompletionProvider(#[source] ProviderError),

    #[error("Tool-calling round limit of {max_rounds} exceeded")]
    RoundLimitExceeded { max_rounds: usize },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RunError {
    /// Stable machine-readable code carried on the run-error event.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ToolServerUnavailable(_) => "TOOL_SERVER_UNAVAILABLE",
            Self::CompletionProvider(_) => "COMPLETION_PROVIDER_ERROR",
            Self::RoundLimitExceeded { .. } => "ROUND_LIMIT_EXCEEDED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<TranscriptError> for RunError {
    fn from(e: TranscriptError) -> Self {
        Self::Internal(e.to_string())
    }
}
