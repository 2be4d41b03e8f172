//! ToolRelay CLI: the main entry point.
//!
//! Commands:
//! - `serve`  Start the HTTP gateway
//! - `ask`    Run one request and print its event stream
//! - `tools`  List the tool server's tools
//! - `doctor` Diagnose configuration and connectivity
//! - `init`   Write a default config file

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "toolrelay",
    about = "ToolRelay: LLM tool calling streamed as AG-UI events",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ~/.toolrelay/config.toml)
    #[arg(short, long, global = true, env = "TOOLRELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the bind address
        #[arg(long)]
        host: Option<String>,
    },

    /// Run one request and print the encoded events to stdout
    Ask {
        /// The user's request
        prompt: String,

        /// Reuse an existing thread id
        #[arg(long)]
        thread_id: Option<String>,
    },

    /// Discover and print the tool server's tools
    Tools {
        /// Print input schemas too
        #[arg(long)]
        schema: bool,
    },

    /// Diagnose configuration, provider and tool server
    Doctor,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so `ask` output stays a clean event stream.
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve { port, host } => commands::serve::run(config_path, port, host).await?,
        Commands::Ask { prompt, thread_id } => {
            commands::ask::run(config_path, &prompt, thread_id).await?
        }
        Commands::Tools { schema } => commands::tools::run(config_path, schema).await?,
        Commands::Doctor => commands::doctor::run(config_path).await?,
        Commands::Init { force } => commands::init::run(config_path, force)?,
    }

    Ok(())
}
