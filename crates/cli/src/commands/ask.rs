//! `toolrelay ask`: run one request and print its AG-UI event stream.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use toolrelay_agent::{AgentLoop, EventEncoder, EventSink, RunOutcome};
use toolrelay_core::RunIds;

pub async fn run(
    config_path: Option<&Path>,
    prompt: &str,
    thread_id: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;

    if !config.has_api_key() && config.provider.kind == toolrelay_config::ProviderKind::Azure {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set TOOLRELAY_API_KEY, or add provider.api_key to:");
        eprintln!("    {}", super::config_path(config_path).display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let provider = toolrelay_providers::build_from_config(&config)?;
    let tool_server = toolrelay_mcp::build_from_config(&config.tool_server)?;
    let agent = Arc::new(AgentLoop::from_config(&config, provider, tool_server));

    let ids = match thread_id {
        Some(thread_id) => RunIds::new(thread_id),
        None => RunIds::generate(),
    };

    let (sink, mut rx) = EventSink::channel(64);
    let run = {
        let prompt = prompt.to_string();
        async move { agent.run(&prompt, &ids, &sink).await }
    };
    let print = async move {
        let encoder = EventEncoder::new();
        let mut stdout = std::io::stdout();
        while let Some(event) = rx.recv().await {
            let frame = encoder.encode(&event)?;
            stdout.write_all(frame.as_bytes())?;
            stdout.flush()?;
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    };

    let (outcome, printed) = tokio::join!(run, print);
    printed?;

    match outcome {
        RunOutcome::Finished { .. } => Ok(()),
        RunOutcome::Errored(e) => Err(toolrelay_core::Error::from(e).into()),
        RunOutcome::Disconnected => Err("event stream closed before the run finished".into()),
    }
}
