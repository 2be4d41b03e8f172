//! OpenAI-compatible provider implementation.
//!
//! Speaks the `/chat/completions` wire format in two dialects:
//! - OpenAI and compatible endpoints (OpenRouter, Ollama, vLLM): bearer token,
//!   `{base}/chat/completions`
//! - Azure OpenAI: `api-key` header,
//!   `{endpoint}/openai/deployments/{deployment}/chat/completions?api-version=...`
//!
//! Tool use / function calling is always enabled with `tool_choice: "auto"`
//! when the request carries tool definitions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use toolrelay_core::error::ProviderError;
use toolrelay_core::message::Message;
use toolrelay_core::provider::*;
use toolrelay_core::tool::ToolCallRequest;
use tracing::{debug, warn};
use uuid::Uuid;

/// Fallback delay when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// How requests are addressed and authenticated.
#[derive(Clone, PartialEq, Eq)]
pub enum Dialect {
    OpenAi,
    Azure { api_version: String },
}

impl std::fmt::Debug for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAi => f.write_str("OpenAi"),
            Self::Azure { api_version } => write!(f, "Azure({api_version})"),
        }
    }
}

/// An OpenAI-compatible completion provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    dialect: Dialect,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a provider for an OpenAI-compatible endpoint.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Self::with_dialect(name, base_url, api_key, Dialect::OpenAi, timeout)
    }

    /// Create a provider for an Azure OpenAI resource.
    pub fn azure(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        api_version: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Self::with_dialect(
            "azure",
            endpoint,
            api_key,
            Dialect::Azure {
                api_version: api_version.into(),
            },
            timeout,
        )
    }

    fn with_dialect(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        dialect: Dialect,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            dialect,
            client,
        })
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Chat completions URL for the given model (deployment on Azure).
    fn completions_url(&self, model: &str) -> String {
        match &self.dialect {
            Dialect::OpenAi => format!("{}/chat/completions", self.base_url),
            Dialect::Azure { api_version } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.base_url, model, api_version
            ),
        }
    }

    fn models_url(&self) -> String {
        match &self.dialect {
            Dialect::OpenAi => format!("{}/models", self.base_url),
            Dialect::Azure { api_version } => {
                format!("{}/openai/models?api-version={}", self.base_url, api_version)
            }
        }
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.dialect {
            Dialect::Azure { .. } => builder.header("api-key", &self.api_key),
            // Local servers such as Ollama take no key at all.
            Dialect::OpenAi if self.api_key.is_empty() => builder,
            Dialect::OpenAi => builder.bearer_auth(&self.api_key),
        }
    }

    /// Build the JSON request body.
    fn request_body(&self, request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "messages": Self::to_api_messages(&request.messages),
        });

        // Azure addresses the deployment through the URL.
        if self.dialect == Dialect::OpenAi {
            body["model"] = serde_json::json!(request.model);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
            body["tool_choice"] = serde_json::json!("auto");
        }

        body
    }

    /// Convert transcript messages to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| match m {
                Message::User { content } => ApiMessage {
                    role: "user".into(),
                    content: Some(content.clone()),
                    tool_calls: None,
                    tool_call_id: None,
                },
                Message::Assistant {
                    content,
                    tool_calls,
                } => ApiMessage {
                    role: "assistant".into(),
                    content: content.clone(),
                    tool_calls: if tool_calls.is_empty() {
                        None
                    } else {
                        Some(
                            tool_calls
                                .iter()
                                .map(|tc| ApiToolCall {
                                    id: tc.id.clone(),
                                    r#type: "function".into(),
                                    function: ApiFunction {
                                        name: tc.name.clone(),
                                        arguments: tc.arguments.clone(),
                                    },
                                })
                                .collect(),
                        )
                    },
                    tool_call_id: None,
                },
                Message::Tool {
                    tool_call_id,
                    content,
                } => ApiMessage {
                    role: "tool".into(),
                    content: Some(content.clone()),
                    tool_calls: None,
                    tool_call_id: Some(tool_call_id.clone()),
                },
            })
            .collect()
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }
}

/// Map a non-success HTTP status to a provider error.
fn status_error(status: u16, retry_after: Option<u64>, body: String) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        401 | 403 => ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ),
        404 => ProviderError::ModelNotFound(body),
        408 => ProviderError::Timeout(body),
        _ => ProviderError::ApiError {
            status_code: status,
            message: body,
        },
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// Turn the first choice of a completion response into a [`Completion`].
fn into_response(api_response: ApiResponse) -> Result<ProviderResponse, ProviderError> {
    let choice = api_response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::MalformedResponse("No choices in response".into()))?;

    let calls: Vec<ToolCallRequest> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| {
            // Some compatible servers omit the id; the transcript still needs one.
            let id = if tc.id.trim().is_empty() {
                format!("call_{}", Uuid::new_v4().simple())
            } else {
                tc.id
            };
            ToolCallRequest::new(id, tc.function.name, tc.function.arguments)
        })
        .collect();

    let completion = if calls.is_empty() {
        Completion::answer(choice.message.content.unwrap_or_default())
    } else {
        Completion::ToolCalls {
            content: choice.message.content.filter(|c| !c.is_empty()),
            calls,
        }
    };

    let usage = api_response.usage.map(|u| Usage {
        prompt_tokens: u.prompt_tokens,
        completion_tokens: u.completion_tokens,
        total_tokens: u.total_tokens,
    });

    Ok(ProviderResponse {
        completion,
        usage,
        model: api_response.model,
    })
}

#[async_trait]
impl toolrelay_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = self.completions_url(&request.model);
        let body = self.request_body(&request);

        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending completion request"
        );

        let response = self
            .authorize(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();

        if !response.status().is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(status_error(status, retry_after, error_body));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(format!("Failed to parse response: {e}")))?;

        into_response(api_response)
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let response = self
            .authorize(self.client.get(self.models_url()))
            .send()
            .await
            .map_err(transport_error)?;

        Ok(response.status().is_success())
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    #[serde(default)]
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: ApiFunction,
}

fn function_type() -> String {
    "function".into()
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        extract::{Path, Query, State},
        http::{HeaderMap, StatusCode},
        routing::post,
    };
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use toolrelay_core::Provider;

    fn openai() -> OpenAiCompatProvider {
        OpenAiCompatProvider::new(
            "openai",
            "https://api.openai.com/v1/",
            "sk-test",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn azure(endpoint: &str) -> OpenAiCompatProvider {
        OpenAiCompatProvider::azure(endpoint, "az-key", "2024-06-01", Duration::from_secs(5))
            .unwrap()
    }

    fn request() -> ProviderRequest {
        ProviderRequest {
            model: "gpt-4o".into(),
            messages: vec![Message::user("Weather in X?")],
            temperature: None,
            max_tokens: None,
            tools: vec![ToolDefinition {
                name: "get_weather".into(),
                description: "Current weather for a city".into(),
                parameters: serde_json::json!({"type": "object"}),
            }],
        }
    }

    #[test]
    fn openai_url_strips_trailing_slash() {
        assert_eq!(
            openai().completions_url("gpt-4o"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn azure_url_addresses_deployment() {
        let provider = azure("https://res.openai.azure.com");
        assert_eq!(
            provider.completions_url("gpt4o-prod"),
            "https://res.openai.azure.com/openai/deployments/gpt4o-prod/chat/completions?api-version=2024-06-01"
        );
        assert_eq!(provider.name(), "azure");
    }

    #[test]
    fn body_enables_auto_tool_choice() {
        let body = openai().request_body(&request());
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "get_weather");
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn azure_body_omits_model() {
        let mut req = request();
        req.tools.clear();
        req.temperature = Some(0.0);
        let body = azure("https://res.openai.azure.com").request_body(&req);
        assert!(body.get("model").is_none());
        assert!(body.get("tool_choice").is_none());
        assert_eq!(body["temperature"], 0.0);
    }

    #[test]
    fn message_conversion_with_tool_calls() {
        let messages = vec![
            Message::user("hi"),
            Message::Assistant {
                content: None,
                tool_calls: vec![ToolCallRequest::new(
                    "call_1",
                    "get_weather",
                    r#"{"city":"X"}"#,
                )],
            },
            Message::tool_result("call_1", "70"),
        ];
        let api = OpenAiCompatProvider::to_api_messages(&messages);
        assert_eq!(api.len(), 3);
        assert_eq!(api[0].role, "user");
        assert!(api[1].content.is_none());
        let tc = api[1].tool_calls.as_ref().unwrap();
        assert_eq!(tc[0].function.name, "get_weather");
        assert_eq!(api[2].role, "tool");
        assert_eq!(api[2].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn parse_answer_response() {
        let data = r#"{
            "model": "gpt-4o",
            "choices": [{"message": {"role": "assistant", "content": "Hello!"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12}
        }"#;
        let resp = into_response(serde_json::from_str(data).unwrap()).unwrap();
        assert_eq!(resp.completion, Completion::answer("Hello!"));
        assert_eq!(resp.usage.unwrap().total_tokens, 12);
    }

    #[test]
    fn parse_tool_call_response_preserves_order() {
        let data = r#"{
            "model": "gpt-4o",
            "choices": [{"message": {"role": "assistant", "content": null, "tool_calls": [
                {"id": "call_a", "type": "function", "function": {"name": "get_weather", "arguments": "{\"city\":\"X\"}"}},
                {"id": "call_b", "type": "function", "function": {"name": "get_weather", "arguments": "{\"city\":\"Y\"}"}}
            ]}}]
        }"#;
        let resp = into_response(serde_json::from_str(data).unwrap()).unwrap();
        match resp.completion {
            Completion::ToolCalls { content, calls } => {
                assert!(content.is_none());
                assert_eq!(calls.len(), 2);
                assert_eq!(calls[0].id, "call_a");
                assert_eq!(calls[1].arguments, r#"{"city":"Y"}"#);
            }
            other => panic!("unexpected completion: {other:?}"),
        }
    }

    #[test]
    fn missing_tool_call_ids_are_generated() {
        let data = r#"{
            "choices": [{"message": {"role": "assistant", "tool_calls": [
                {"type": "function", "function": {"name": "get_weather", "arguments": "{}"}},
                {"id": "", "type": "function", "function": {"name": "get_hostname"}}
            ]}}]
        }"#;
        let resp = into_response(serde_json::from_str(data).unwrap()).unwrap();
        match resp.completion {
            Completion::ToolCalls { calls, .. } => {
                assert_eq!(calls.len(), 2);
                assert!(calls[0].id.starts_with("call_"));
                assert!(calls[1].id.starts_with("call_"));
                assert_ne!(calls[0].id, calls[1].id);
                assert_eq!(calls[1].name, "get_hostname");
            }
            other => panic!("unexpected completion: {other:?}"),
        }
    }

    #[test]
    fn empty_choices_is_malformed() {
        let data = r#"{"model": "gpt-4o", "choices": []}"#;
        let err = into_response(serde_json::from_str(data).unwrap()).unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            status_error(429, Some(2), String::new()),
            ProviderError::RateLimited { retry_after_secs: 2 }
        ));
        assert!(matches!(
            status_error(401, None, String::new()),
            ProviderError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            status_error(404, None, "no deployment".into()),
            ProviderError::ModelNotFound(_)
        ));
        let err = status_error(503, None, "busy".into());
        assert!(err.is_transient());
        assert!(!status_error(400, None, "bad".into()).is_transient());
    }

    #[derive(Default)]
    struct Seen {
        deployment: Option<String>,
        api_version: Option<String>,
        api_key: Option<String>,
        body: Option<serde_json::Value>,
    }

    async fn fake_azure(
        State(seen): State<Arc<Mutex<Seen>>>,
        Path(deployment): Path<String>,
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> (StatusCode, Json<serde_json::Value>) {
        let mut seen = seen.lock().unwrap();
        seen.deployment = Some(deployment);
        seen.api_version = query.get("api-version").cloned();
        seen.api_key = headers
            .get("api-key")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        seen.body = Some(body);
        (
            StatusCode::OK,
            Json(serde_json::json!({
                "model": "gpt-4o",
                "choices": [{"message": {"role": "assistant", "tool_calls": [
                    {"id": "call_1", "type": "function", "function": {"name": "get_weather", "arguments": "{}"}}
                ]}}]
            })),
        )
    }

    #[tokio::test]
    async fn azure_request_against_local_server() {
        let seen = Arc::new(Mutex::new(Seen::default()));
        let app = Router::new()
            .route(
                "/openai/deployments/{deployment}/chat/completions",
                post(fake_azure),
            )
            .with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let provider = azure(&format!("http://{addr}"));
        let mut req = request();
        req.model = "gpt4o-prod".into();
        let resp = provider.complete(req).await.unwrap();

        assert!(matches!(resp.completion, Completion::ToolCalls { .. }));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.deployment.as_deref(), Some("gpt4o-prod"));
        assert_eq!(seen.api_version.as_deref(), Some("2024-06-01"));
        assert_eq!(seen.api_key.as_deref(), Some("az-key"));
        assert_eq!(seen.body.as_ref().unwrap()["tool_choice"], "auto");
    }

    #[tokio::test]
    async fn non_200_success_status_is_accepted() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async {
                (
                    StatusCode::CREATED,
                    Json(serde_json::json!({
                        "model": "local",
                        "choices": [{"message": {"role": "assistant", "content": "Hi"}}]
                    })),
                )
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let provider =
            OpenAiCompatProvider::new("openai", format!("http://{addr}"), "", Duration::from_secs(5))
                .unwrap();
        let resp = provider.complete(request()).await.unwrap();
        assert_eq!(resp.completion, Completion::answer("Hi"));
    }

    #[tokio::test]
    async fn error_status_surfaces_as_provider_error() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "overloaded") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let provider =
            OpenAiCompatProvider::new("openai", format!("http://{addr}"), "", Duration::from_secs(5))
                .unwrap();
        let err = provider.complete(request()).await.unwrap_err();
        match err {
            ProviderError::ApiError {
                status_code,
                message,
            } => {
                assert_eq!(status_code, 503);
                assert_eq!(message, "overloaded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
