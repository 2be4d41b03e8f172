//! HTTP gateway for ToolRelay.
//!
//! Exposes the orchestration loop over HTTP:
//! - `/get_data` streams one run as AG-UI server-sent events
//! - `/answer` runs the same loop and returns only the final text
//! - `/health` for liveness probes
//!
//! Built on Axum; every request gets its own run, transcript and tool session.

use axum::{
    Router,
    extract::{Query, State},
    http::{HeaderValue, StatusCode},
    response::{
        IntoResponse, Json, Response,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
    routing::get,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{info, warn};

use toolrelay_agent::{AgentLoop, EventEncoder, EventSink, RunOutcome};
use toolrelay_config::AppConfig;
use toolrelay_core::{RunError, RunIds};

/// Events buffered between a run and a slow client.
const EVENT_BUFFER: usize = 64;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub config: AppConfig,
    pub agent: Arc<AgentLoop>,
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    let cors = cors_layer(&state.config.gateway.allowed_origins);

    Router::new()
        .route("/health", get(health_handler))
        .route("/get_data", get(stream_handler).post(stream_handler))
        .route("/answer", get(answer_handler).post(answer_handler))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS for browser frontends. Origins that fail to parse are skipped, and so
/// is `*`, which cannot be combined with credentials.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter(|origin| {
            let wildcard = origin.trim() == "*";
            if wildcard {
                warn!("Ignoring wildcard CORS origin; list origins explicitly");
            }
            !wildcard
        })
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Start the gateway HTTP server.
///
/// The provider and the tool-server connector are built once and shared by
/// every run; tool sessions themselves are opened per run.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let provider = toolrelay_providers::build_from_config(&config)?;
    let tool_server = toolrelay_mcp::build_from_config(&config.tool_server)?;
    info!(
        provider = provider.name(),
        tool_server = tool_server.name(),
        model = %config.provider.model,
        "Gateway collaborators ready"
    );

    let agent = Arc::new(AgentLoop::from_config(&config, provider, tool_server));
    let state = Arc::new(GatewayState { config, agent });
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Deserialize)]
struct RunQuery {
    userprompt: Option<String>,
    thread_id: Option<String>,
}

impl RunQuery {
    fn ids(&self) -> RunIds {
        match self.thread_id.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(thread_id) => RunIds::new(thread_id),
            None => RunIds::generate(),
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum AnswerResponse {
    Success { data: String },
    Error { error: String },
}

fn missing_prompt() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(AnswerResponse::Error {
            error: "missing required query parameter 'userprompt'".into(),
        }),
    )
        .into_response()
}

/// Stream one run as `text/event-stream`, one `data:` frame per event.
///
/// The run executes on its own task. When the client goes away the body
/// stream is dropped, which closes the run's sink and stops the loop.
/// Idle periods (a slow provider or tool) are covered by keep-alive comments.
async fn stream_handler(State(state): State<SharedState>, Query(query): Query<RunQuery>) -> Response {
    let Some(prompt) = query.userprompt.clone() else {
        return missing_prompt();
    };
    let ids = query.ids();
    info!(thread_id = %ids.thread_id, run_id = %ids.run_id, "Streaming run requested");

    let (sink, rx) = EventSink::channel(EVENT_BUFFER);
    let agent = state.agent.clone();
    tokio::spawn(async move {
        agent.run(&prompt, &ids, &sink).await;
    });

    let encoder = EventEncoder::new();
    // The body ends with the terminal event, not when the run finishes
    // releasing its tool session.
    let events = ReceiverStream::new(rx).scan(false, |done, event| {
        let next = (!*done).then_some(event);
        if let Some(event) = &next {
            *done = event.is_terminal();
        }
        futures::future::ready(next)
    });
    let frames = events.filter_map(move |event| async move {
        match encoder.payload(&event) {
            Ok(json) => Some(Ok::<_, Infallible>(SseEvent::default().data(json))),
            Err(e) => {
                warn!(event = event.event_type(), error = %e, "Dropping unencodable event");
                None
            }
        }
    });

    Sse::new(frames)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// Run to completion and answer with the final text only.
///
/// As with `/get_data` the run owns its task, so an abandoned request only
/// drops the receiver and the run still releases its tool session.
async fn answer_handler(State(state): State<SharedState>, Query(query): Query<RunQuery>) -> Response {
    let Some(prompt) = query.userprompt.clone() else {
        return missing_prompt();
    };
    let ids = query.ids();

    let (sink, mut rx) = EventSink::channel(EVENT_BUFFER);
    let agent = state.agent.clone();
    let run = tokio::spawn(async move { agent.run(&prompt, &ids, &sink).await });
    while rx.recv().await.is_some() {}

    let outcome = match run.await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(error = %e, "Run task failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(AnswerResponse::Error {
                    error: "run task failed".into(),
                }),
            )
                .into_response();
        }
    };

    match outcome {
        RunOutcome::Finished { answer } => {
            (StatusCode::OK, Json(AnswerResponse::Success { data: answer })).into_response()
        }
        RunOutcome::Errored(e) => {
            let status = match e {
                RunError::ToolServerUnavailable(_) | RunError::CompletionProvider(_) => {
                    StatusCode::BAD_GATEWAY
                }
                RunError::RoundLimitExceeded { .. } | RunError::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            (status, Json(AnswerResponse::Error { error: e.to_string() })).into_response()
        }
        RunOutcome::Disconnected => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(AnswerResponse::Error {
                error: "run stopped before finishing".into(),
            }),
        )
            .into_response(),
    }
}
