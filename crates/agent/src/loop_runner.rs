//! The orchestration loop implementation.

use std::sync::Arc;
use toolrelay_config::AppConfig;
use toolrelay_core::error::RunError;
use toolrelay_core::event::RunIds;
use toolrelay_core::message::Transcript;
use toolrelay_core::provider::{Completion, Provider, ProviderRequest, ProviderResponse};
use toolrelay_core::tool::{ToolCallRequest, ToolCallResult, ToolServer};
use tracing::{debug, info, warn};

use crate::instruction::render_instruction;
use crate::registry::ToolRegistryAdapter;
use crate::sink::{EventSink, SinkClosed};

/// How a run ended.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The model produced a final answer; run-finished was emitted.
    Finished { answer: String },
    /// A fatal condition ended the run; one run-error was emitted.
    Errored(RunError),
    /// The consumer disconnected; nothing more was emitted.
    Disconnected,
}

/// Why `drive` stopped before finishing.
enum Halt {
    Disconnected,
    Failed(RunError),
}

impl From<SinkClosed> for Halt {
    fn from(_: SinkClosed) -> Self {
        Self::Disconnected
    }
}

impl From<RunError> for Halt {
    fn from(e: RunError) -> Self {
        Self::Failed(e)
    }
}

/// Drives one user request through model completions and tool calls.
///
/// The loop itself is stateless between runs: every [`run`](Self::run) owns
/// its transcript and its tool session.
pub struct AgentLoop {
    /// The completion provider
    provider: Arc<dyn Provider>,

    /// Connector for per-run tool sessions
    tool_server: Arc<dyn ToolServer>,

    /// Model (or Azure deployment) name
    model: String,

    temperature: Option<f32>,

    max_tokens: Option<u32>,

    /// Tool rounds allowed before the run is aborted
    max_rounds: usize,

    /// Wraps the user's request; must contain `{user_prompt}`
    instruction_template: String,

    /// Split the final answer into deltas of this many characters
    answer_chunk_chars: Option<usize>,
}

impl AgentLoop {
    /// Create a loop with the default instruction template and round limit.
    pub fn new(
        provider: Arc<dyn Provider>,
        tool_server: Arc<dyn ToolServer>,
        model: impl Into<String>,
    ) -> Self {
        let defaults = toolrelay_config::AgentConfig::default();
        Self {
            provider,
            tool_server,
            model: model.into(),
            temperature: None,
            max_tokens: None,
            max_rounds: defaults.max_tool_rounds,
            instruction_template: defaults.instruction_template,
            answer_chunk_chars: None,
        }
    }

    /// Create a loop configured from `[provider]` and `[agent]`.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        tool_server: Arc<dyn ToolServer>,
    ) -> Self {
        let mut agent = Self::new(provider, tool_server, &config.provider.model)
            .with_max_rounds(config.agent.max_tool_rounds)
            .with_instruction_template(&config.agent.instruction_template);
        agent.temperature = config.provider.temperature;
        agent.max_tokens = config.provider.max_tokens;
        agent.answer_chunk_chars = config.agent.answer_chunk_chars;
        agent
    }

    /// Set the maximum number of tool-calling rounds.
    pub fn with_max_rounds(mut self, max: usize) -> Self {
        self.max_rounds = max;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_instruction_template(mut self, template: impl Into<String>) -> Self {
        self.instruction_template = template.into();
        self
    }

    pub fn with_answer_chunk_chars(mut self, chars: usize) -> Self {
        self.answer_chunk_chars = Some(chars);
        self
    }

    pub fn tool_server(&self) -> &Arc<dyn ToolServer> {
        &self.tool_server
    }

    /// Run one request to completion, emitting events into `sink`.
    ///
    /// Exactly one terminal event (run-finished or run-error) is emitted
    /// unless the consumer disconnects first. The tool session opened for
    /// the run is closed on every path.
    pub async fn run(&self, user_prompt: &str, ids: &RunIds, sink: &EventSink) -> RunOutcome {
        info!(thread_id = %ids.thread_id, run_id = %ids.run_id, "Run started");

        let mut registry = None;
        let result = self.drive(user_prompt, ids, sink, &mut registry).await;

        // The terminal event goes out before the session is released.
        let outcome = match result {
            Ok(answer) => {
                info!(run_id = %ids.run_id, "Run finished");
                RunOutcome::Finished { answer }
            }
            Err(Halt::Disconnected) => {
                info!(run_id = %ids.run_id, "Consumer disconnected, run stopped");
                RunOutcome::Disconnected
            }
            Err(Halt::Failed(err)) => {
                warn!(run_id = %ids.run_id, code = err.code(), error = %err, "Run failed");
                if sink
                    .emit(RunIds::run_error(err.to_string(), err.code()))
                    .await
                    .is_err()
                {
                    debug!(run_id = %ids.run_id, "Consumer gone before run-error");
                }
                RunOutcome::Errored(err)
            }
        };

        if let Some(mut registry) = registry {
            registry.close().await;
        }

        outcome
    }

    async fn drive(
        &self,
        user_prompt: &str,
        ids: &RunIds,
        sink: &EventSink,
        registry: &mut Option<ToolRegistryAdapter>,
    ) -> Result<String, Halt> {
        sink.emit(ids.run_started()).await?;
        sink.emit(ids.message_start()).await?;

        let tools = registry.insert(ToolRegistryAdapter::discover(self.tool_server.as_ref()).await?);
        let definitions = tools.definitions();

        let mut transcript = Transcript::new();
        transcript.push_user(render_instruction(&self.instruction_template, user_prompt));

        let mut rounds = 0;

        loop {
            sink.ensure_open()?;

            let request = ProviderRequest {
                model: self.model.clone(),
                messages: transcript.messages().to_vec(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: definitions.clone(),
            };

            debug!(
                run_id = %ids.run_id,
                round = rounds,
                messages = request.messages.len(),
                "Requesting completion"
            );

            let response = self.complete(request, sink).await?;

            let (content, calls) = match response.completion {
                Completion::Answer { text } => {
                    return self.finish(text, &mut transcript, ids, sink).await;
                }
                Completion::ToolCalls { content, calls } if calls.is_empty() => {
                    return self
                        .finish(content.unwrap_or_default(), &mut transcript, ids, sink)
                        .await;
                }
                Completion::ToolCalls { content, calls } => (content, calls),
            };

            if rounds >= self.max_rounds {
                return Err(RunError::RoundLimitExceeded {
                    max_rounds: self.max_rounds,
                }
                .into());
            }
            rounds += 1;

            debug!(run_id = %ids.run_id, round = rounds, calls = calls.len(), "Executing tool calls");
            transcript.push_tool_calls(content, calls.clone());

            // Strictly sequential, in the order the model listed them.
            for call in &calls {
                self.execute(call, tools, &mut transcript, ids, sink).await?;
            }
        }
    }

    /// Ask the model for its next step, giving up early if the consumer leaves.
    async fn complete(
        &self,
        request: ProviderRequest,
        sink: &EventSink,
    ) -> Result<ProviderResponse, Halt> {
        tokio::select! {
            biased;
            _ = sink.closed() => Err(Halt::Disconnected),
            response = self.provider.complete(request) => {
                response.map_err(|e| Halt::Failed(RunError::CompletionProvider(e)))
            }
        }
    }

    /// Run one tool call and record its result. Tool failures become the result.
    async fn execute(
        &self,
        call: &ToolCallRequest,
        tools: &mut ToolRegistryAdapter,
        transcript: &mut Transcript,
        ids: &RunIds,
        sink: &EventSink,
    ) -> Result<(), Halt> {
        sink.emit(ids.tool_call_start(&call.id, &call.name)).await?;

        let parsed = call.parse_arguments();
        let args_delta = match &parsed {
            Ok(args) => args.to_string(),
            Err(_) => call.arguments.clone(),
        };
        sink.emit(ids.tool_call_args(&call.id, args_delta)).await?;

        let outcome = match parsed {
            Ok(args) => tools.invoke(&call.name, args).await,
            Err(e) => Err(e),
        };

        let result = match outcome {
            Ok(content) => {
                debug!(run_id = %ids.run_id, tool = %call.name, "Tool call succeeded");
                ToolCallResult::success(&call.id, content)
            }
            Err(e) => {
                warn!(run_id = %ids.run_id, tool = %call.name, error = %e, "Tool call failed");
                ToolCallResult::failure(&call.id, &e)
            }
        };

        // The call may have outlived the consumer; record nothing after that.
        sink.ensure_open()?;
        sink.emit(ids.tool_call_result(&call.id, &result.content)).await?;
        transcript
            .push_tool_result(&call.id, result.content)
            .map_err(RunError::from)?;
        Ok(())
    }

    async fn finish(
        &self,
        answer: String,
        transcript: &mut Transcript,
        ids: &RunIds,
        sink: &EventSink,
    ) -> Result<String, Halt> {
        for delta in chunk_answer(&answer, self.answer_chunk_chars) {
            sink.emit(ids.content(delta)).await?;
        }
        sink.emit(ids.message_end()).await?;
        sink.emit(ids.run_finished()).await?;
        transcript.push_assistant_text(answer.clone());
        Ok(answer)
    }
}

/// Split the answer into content deltas, preserving order without gaps.
/// An empty answer yields no deltas.
fn chunk_answer(answer: &str, chunk_chars: Option<usize>) -> Vec<String> {
    if answer.is_empty() {
        return Vec::new();
    }
    match chunk_chars {
        Some(size) if size > 0 => {
            let chars: Vec<char> = answer.chars().collect();
            chars.chunks(size).map(|c| c.iter().collect()).collect()
        }
        _ => vec![answer.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use std::time::Duration;
    use toolrelay_core::error::{ProviderError, ToolInvocationError};
    use toolrelay_core::event::ConversationEvent;
    use toolrelay_core::message::Message;

    async fn run_to_end(
        agent: &AgentLoop,
        prompt: &str,
    ) -> (RunOutcome, Vec<ConversationEvent>) {
        let (sink, mut rx) = EventSink::channel(256);
        let ids = RunIds::generate();
        let outcome = agent.run(prompt, &ids, &sink).await;
        drop(sink);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (outcome, events)
    }

    fn types(events: &[ConversationEvent]) -> Vec<&'static str> {
        events.iter().map(|e| e.event_type()).collect()
    }

    fn agent(provider: Arc<ScriptedProvider>, server: &MockToolServer) -> AgentLoop {
        AgentLoop::new(provider, Arc::new(server.clone()), "mock-model")
    }

    #[tokio::test]
    async fn weather_round_trip() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            calls(&[("call_1", "get_weather", r#"{"city": "X"}"#)]),
            answer("It's 70°F in X."),
        ]));
        let server = MockToolServer::weather();
        let agent = agent(provider.clone(), &server);

        let (outcome, events) = run_to_end(&agent, "What's the weather in city X?").await;

        assert!(matches!(outcome, RunOutcome::Finished { ref answer } if answer == "It's 70°F in X."));
        assert_eq!(
            types(&events),
            vec![
                "RUN_STARTED",
                "TEXT_MESSAGE_START",
                "TOOL_CALL_START",
                "TOOL_CALL_ARGS",
                "TOOL_CALL_RESULT",
                "TEXT_MESSAGE_CONTENT",
                "TEXT_MESSAGE_END",
                "RUN_FINISHED",
            ]
        );
        match &events[3] {
            ConversationEvent::ToolCallArgs { delta, .. } => {
                assert_eq!(delta, r#"{"city":"X"}"#)
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match &events[4] {
            ConversationEvent::ToolCallResult { content, .. } => assert_eq!(content, "{\"temp\": 70}"),
            other => panic!("unexpected event: {other:?}"),
        }

        // Second completion sees user, assistant(tool_calls), tool.
        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        let second = &requests[1].messages;
        assert_eq!(second.len(), 3);
        assert!(matches!(&second[1], Message::Assistant { tool_calls, .. } if tool_calls.len() == 1));
        assert_eq!(
            second[2],
            Message::tool_result("call_1", "{\"temp\": 70}")
        );
        assert_eq!(server.close_count(), 1);
    }

    #[tokio::test]
    async fn ids_are_stable_within_a_run() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            calls(&[("call_1", "get_weather", "{}")]),
            answer("done"),
        ]));
        let server = MockToolServer::weather();
        let (sink, mut rx) = EventSink::channel(64);
        let ids = RunIds::new("thread_fixed");
        agent(provider, &server).run("hi", &ids, &sink).await;
        drop(sink);

        while let Some(event) = rx.recv().await {
            match event {
                ConversationEvent::RunStarted { thread_id, run_id }
                | ConversationEvent::RunFinished { thread_id, run_id } => {
                    assert_eq!(thread_id, "thread_fixed");
                    assert_eq!(run_id, ids.run_id);
                }
                ConversationEvent::TextMessageStart { message_id, .. }
                | ConversationEvent::TextMessageContent { message_id, .. }
                | ConversationEvent::TextMessageEnd { message_id }
                | ConversationEvent::ToolCallResult { message_id, .. } => {
                    assert_eq!(message_id, ids.message_id)
                }
                ConversationEvent::ToolCallStart {
                    parent_message_id, ..
                } => assert_eq!(parent_message_id, ids.message_id),
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn tools_sent_to_model_match_discovery() {
        let provider = Arc::new(ScriptedProvider::new(vec![answer("hello")]));
        let server = MockToolServer::weather();
        run_to_end(&agent(provider.clone(), &server), "hi").await;

        let requests = provider.requests();
        let tools = &requests[0].tools;
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["get_weather", "get_hostname"]);
        assert_eq!(tools[0].parameters["properties"]["city"]["type"], "string");
    }

    #[tokio::test]
    async fn seeded_message_wraps_prompt_in_template() {
        let provider = Arc::new(ScriptedProvider::new(vec![answer("hi")]));
        let server = MockToolServer::weather();
        let agent = agent(provider.clone(), &server).with_instruction_template("Scope: weather. Q: {user_prompt}");
        run_to_end(&agent, "Hello").await;

        let requests = provider.requests();
        assert_eq!(requests[0].messages, vec![Message::user("Scope: weather. Q: Hello")]);
    }

    #[tokio::test]
    async fn unreachable_tool_server_errors_immediately() {
        let provider = Arc::new(ScriptedProvider::new(vec![answer("never")]));
        let server = MockToolServer::unreachable();
        let (outcome, events) = run_to_end(&agent(provider.clone(), &server), "hi").await;

        assert_eq!(types(&events), vec!["RUN_STARTED", "TEXT_MESSAGE_START", "RUN_ERROR"]);
        match &events[2] {
            ConversationEvent::RunError { code, .. } => assert_eq!(code, "TOOL_SERVER_UNAVAILABLE"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(outcome, RunOutcome::Errored(RunError::ToolServerUnavailable(_))));
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn provider_failure_is_fatal() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(
            ProviderError::AuthenticationFailed("bad key".into()),
        )]));
        let server = MockToolServer::weather();
        let (outcome, events) = run_to_end(&agent(provider, &server), "hi").await;

        assert_eq!(types(&events), vec!["RUN_STARTED", "TEXT_MESSAGE_START", "RUN_ERROR"]);
        match &events[2] {
            ConversationEvent::RunError { message, code } => {
                assert_eq!(code, "COMPLETION_PROVIDER_ERROR");
                assert!(message.contains("bad key"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(outcome, RunOutcome::Errored(_)));
        assert_eq!(server.close_count(), 1);
    }

    #[tokio::test]
    async fn run_error_is_emitted_before_session_release() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(
            ProviderError::AuthenticationFailed("bad key".into()),
        )]));
        let server = MockToolServer::weather().with_close_delay(Duration::from_millis(500));
        let agent = Arc::new(agent(provider, &server));

        let (sink, mut rx) = EventSink::channel(16);
        let run = tokio::spawn({
            let agent = agent.clone();
            async move { agent.run("hi", &RunIds::generate(), &sink).await }
        });

        let mut last = None;
        while let Some(event) = rx.recv().await {
            let terminal = event.is_terminal();
            last = Some(event);
            if terminal {
                break;
            }
        }
        assert!(matches!(last, Some(ConversationEvent::RunError { .. })));
        assert_eq!(server.close_count(), 0);

        assert!(matches!(run.await.unwrap(), RunOutcome::Errored(_)));
        assert_eq!(server.close_count(), 1);
    }

    #[tokio::test]
    async fn tool_failure_becomes_result_and_run_continues() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            calls(&[("call_1", "get_weather", r#"{"city": "X"}"#)]),
            answer("Sorry, the weather service failed."),
        ]));
        let server = MockToolServer::weather().with_result(
            "get_weather",
            Err(ToolInvocationError::ToolReported {
                tool_name: "get_weather".into(),
                message: "upstream timeout".into(),
            }),
        );
        let (outcome, events) = run_to_end(&agent(provider.clone(), &server), "weather?").await;

        assert!(matches!(outcome, RunOutcome::Finished { .. }));
        let result_content = events
            .iter()
            .find_map(|e| match e {
                ConversationEvent::ToolCallResult { content, .. } => Some(content.clone()),
                _ => None,
            })
            .unwrap();
        assert!(result_content.contains("upstream timeout"));

        let requests = provider.requests();
        let second = &requests[1].messages;
        assert_eq!(second[2].content(), Some(result_content.as_str()));
    }

    #[tokio::test]
    async fn malformed_arguments_do_not_abort() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            calls(&[("call_1", "get_weather", r#"{"city": "#)]),
            answer("Could you repeat the city?"),
        ]));
        let server = MockToolServer::weather();
        let (outcome, events) = run_to_end(&agent(provider, &server), "weather?").await;

        assert!(matches!(outcome, RunOutcome::Finished { .. }));
        match &events[3] {
            ConversationEvent::ToolCallArgs { delta, .. } => assert_eq!(delta, r#"{"city": "#),
            other => panic!("unexpected event: {other:?}"),
        }
        match &events[4] {
            ConversationEvent::ToolCallResult { content, .. } => {
                assert!(content.starts_with("Error: Invalid arguments"))
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(server.calls().is_empty());
    }

    #[tokio::test]
    async fn unknown_tool_is_answered_locally() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            calls(&[("call_1", "launch_rocket", "{}")]),
            answer("I can't do that."),
        ]));
        let server = MockToolServer::weather();
        let (_, events) = run_to_end(&agent(provider, &server), "launch").await;

        let content = events
            .iter()
            .find_map(|e| match e {
                ConversationEvent::ToolCallResult { content, .. } => Some(content.clone()),
                _ => None,
            })
            .unwrap();
        assert!(content.contains("Tool not found: launch_rocket"));
        assert!(server.calls().is_empty());
    }

    #[tokio::test]
    async fn multiple_calls_run_in_model_order() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            calls(&[
                ("call_a", "get_hostname", "{}"),
                ("call_b", "get_weather", r#"{"city":"A"}"#),
                ("call_c", "get_weather", r#"{"city":"B"}"#),
            ]),
            answer("done"),
        ]));
        let server = MockToolServer::weather();
        let (_, events) = run_to_end(&agent(provider.clone(), &server), "go").await;

        let starts: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ConversationEvent::ToolCallStart { tool_call_id, .. } => Some(tool_call_id.as_str()),
                _ => None,
            })
            .collect();
        let results: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ConversationEvent::ToolCallResult { tool_call_id, .. } => Some(tool_call_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(starts, vec!["call_a", "call_b", "call_c"]);
        assert_eq!(results, vec!["call_a", "call_b", "call_c"]);
        assert_eq!(
            events.iter().filter(|e| e.event_type() == "TOOL_CALL_ARGS").count(),
            3
        );

        let called: Vec<_> = server.calls().into_iter().map(|(n, _)| n).collect();
        assert_eq!(called, vec!["get_hostname", "get_weather", "get_weather"]);

        let requests = provider.requests();
        let second = &requests[1].messages;
        let tool_ids: Vec<_> = second
            .iter()
            .filter_map(|m| match m {
                Message::Tool { tool_call_id, .. } => Some(tool_call_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(tool_ids, vec!["call_a", "call_b", "call_c"]);
    }

    #[tokio::test]
    async fn chained_rounds_loop_back() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            calls(&[("call_1", "get_hostname", "{}")]),
            calls(&[("call_2", "get_weather", r#"{"city":"PNQ"}"#)]),
            answer("70F at PNQ"),
        ]));
        let server = MockToolServer::weather();
        let (outcome, _) = run_to_end(&agent(provider.clone(), &server), "weather at my airport").await;

        assert!(matches!(outcome, RunOutcome::Finished { .. }));
        assert_eq!(provider.requests().len(), 3);
        assert_eq!(provider.requests()[2].messages.len(), 5);
    }

    #[tokio::test]
    async fn round_limit_is_enforced() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            calls(&[("c1", "get_hostname", "{}")]),
            calls(&[("c2", "get_hostname", "{}")]),
            calls(&[("c3", "get_hostname", "{}")]),
            answer("never reached"),
        ]));
        let server = MockToolServer::weather();
        let agent = agent(provider.clone(), &server).with_max_rounds(2);
        let (outcome, events) = run_to_end(&agent, "loop").await;

        match outcome {
            RunOutcome::Errored(RunError::RoundLimitExceeded { max_rounds }) => {
                assert_eq!(max_rounds, 2)
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(
            events.iter().filter(|e| e.event_type() == "TOOL_CALL_START").count(),
            2
        );
        assert_eq!(events.last().unwrap().event_type(), "RUN_ERROR");
        assert_eq!(
            events.iter().filter(|e| e.event_type() == "RUN_ERROR").count(),
            1
        );
        assert_eq!(provider.requests().len(), 3);
        assert_eq!(server.close_count(), 1);
    }

    #[tokio::test]
    async fn empty_answer_emits_no_delta() {
        let provider = Arc::new(ScriptedProvider::new(vec![answer("")]));
        let server = MockToolServer::weather();
        let (outcome, events) = run_to_end(&agent(provider, &server), "hi").await;

        assert!(matches!(outcome, RunOutcome::Finished { .. }));
        assert_eq!(
            types(&events),
            vec!["RUN_STARTED", "TEXT_MESSAGE_START", "TEXT_MESSAGE_END", "RUN_FINISHED"]
        );
    }

    #[tokio::test]
    async fn chunked_answer_preserves_text() {
        let text = "I'm sorry, I can only provide information about airports.";
        let provider = Arc::new(ScriptedProvider::new(vec![answer(text)]));
        let server = MockToolServer::weather();
        let agent = agent(provider, &server).with_answer_chunk_chars(7);
        let (_, events) = run_to_end(&agent, "write me a poem").await;

        let deltas: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                ConversationEvent::TextMessageContent { delta, .. } => Some(delta.clone()),
                _ => None,
            })
            .collect();
        assert!(deltas.len() > 1);
        assert_eq!(deltas.concat(), text);
    }

    #[tokio::test]
    async fn disconnect_stops_the_run() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            calls(&[("c1", "get_weather", "{}"), ("c2", "get_weather", "{}")]),
            answer("never"),
        ]));
        let server = MockToolServer::weather().with_call_delay(Duration::from_millis(50));
        let agent = agent(provider.clone(), &server);

        let (sink, mut rx) = EventSink::channel(1);
        let ids = RunIds::generate();
        let consumer = tokio::spawn(async move {
            // Read until the first tool call starts, then hang up.
            while let Some(event) = rx.recv().await {
                if event.event_type() == "TOOL_CALL_START" {
                    break;
                }
            }
        });

        let outcome = agent.run("weather", &ids, &sink).await;
        consumer.await.unwrap();

        assert!(matches!(outcome, RunOutcome::Disconnected));
        assert_eq!(provider.requests().len(), 1);
        assert!(server.calls().len() <= 1);
        assert_eq!(server.close_count(), 1);
    }

    #[test]
    fn chunking_handles_multibyte_text() {
        let chunks = chunk_answer("70°F ☀️ ok", Some(3));
        assert_eq!(chunks.concat(), "70°F ☀️ ok");
        assert!(chunk_answer("", Some(3)).is_empty());
        assert_eq!(chunk_answer("abc", None), vec!["abc"]);
    }
}
