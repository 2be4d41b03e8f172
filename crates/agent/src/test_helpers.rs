//! Shared test doubles for the orchestration tests.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use toolrelay_core::error::{ProviderError, ToolInvocationError, ToolServerError};
use toolrelay_core::provider::{Completion, Provider, ProviderRequest, ProviderResponse};
use toolrelay_core::tool::{ToolCallRequest, ToolDescriptor, ToolServer, ToolSession};

/// A provider that replays scripted outcomes and records every request.
pub struct ScriptedProvider {
    outcomes: Mutex<VecDeque<Result<Completion, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(outcomes: Vec<Result<Completion, ProviderError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let next = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::NotConfigured("script exhausted".into())));
        next.map(|completion| ProviderResponse {
            completion,
            usage: None,
            model: "mock-model".into(),
        })
    }
}

pub fn answer(text: &str) -> Result<Completion, ProviderError> {
    Ok(Completion::answer(text))
}

pub fn calls(calls: &[(&str, &str, &str)]) -> Result<Completion, ProviderError> {
    Ok(Completion::tool_calls(
        calls
            .iter()
            .map(|(id, name, args)| ToolCallRequest::new(*id, *name, *args))
            .collect(),
    ))
}

pub fn descriptor(name: &str) -> ToolDescriptor {
    ToolDescriptor {
        name: name.into(),
        description: format!("The {name} tool"),
        input_schema: json!({"type": "object", "properties": {"city": {"type": "string"}}}),
    }
}

/// In-memory tool server. Each `connect` yields a session sharing the
/// call log and close counter.
#[derive(Clone)]
pub struct MockToolServer {
    tools: Vec<ToolDescriptor>,
    results: HashMap<String, Result<String, ToolInvocationError>>,
    unreachable: bool,
    call_delay: Option<Duration>,
    close_delay: Option<Duration>,
    calls: Arc<Mutex<Vec<(String, Value)>>>,
    closes: Arc<AtomicUsize>,
}

impl MockToolServer {
    pub fn new(tools: Vec<ToolDescriptor>) -> Self {
        Self {
            tools,
            results: HashMap::new(),
            unreachable: false,
            call_delay: None,
            close_delay: None,
            calls: Arc::default(),
            closes: Arc::default(),
        }
    }

    /// `get_weather` answering `{"temp": 70}`, plus `get_hostname`.
    pub fn weather() -> Self {
        Self::new(vec![descriptor("get_weather"), descriptor("get_hostname")])
            .with_result("get_weather", Ok("{\"temp\": 70}".into()))
            .with_result("get_hostname", Ok("tool-host".into()))
    }

    pub fn unreachable() -> Self {
        let mut server = Self::new(vec![]);
        server.unreachable = true;
        server
    }

    pub fn with_result(mut self, tool: &str, result: Result<String, ToolInvocationError>) -> Self {
        self.results.insert(tool.into(), result);
        self
    }

    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = Some(delay);
        self
    }

    /// Sessions take this long to close; the close is counted afterwards.
    pub fn with_close_delay(mut self, delay: Duration) -> Self {
        self.close_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolServer for MockToolServer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn connect(&self) -> Result<Box<dyn ToolSession>, ToolServerError> {
        if self.unreachable {
            return Err(ToolServerError::Connection("connection refused".into()));
        }
        Ok(Box::new(MockSession {
            server: self.clone(),
            closed: false,
        }))
    }
}

struct MockSession {
    server: MockToolServer,
    closed: bool,
}

#[async_trait]
impl ToolSession for MockSession {
    async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>, ToolServerError> {
        Ok(self.server.tools.clone())
    }

    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<String, ToolInvocationError> {
        self.server
            .calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments));
        if let Some(delay) = self.server.call_delay {
            tokio::time::sleep(delay).await;
        }
        self.server
            .results
            .get(name)
            .cloned()
            .unwrap_or_else(|| Ok("ok".into()))
    }

    async fn close(&mut self) -> Result<(), ToolServerError> {
        if !self.closed {
            self.closed = true;
            if let Some(delay) = self.server.close_delay {
                tokio::time::sleep(delay).await;
            }
            self.server.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
