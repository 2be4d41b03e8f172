//! `toolrelay doctor`: diagnose configuration and connectivity.

use std::path::Path;
use toolrelay_config::{AppConfig, ProviderKind, ToolServerTransport};

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 ToolRelay Doctor: System Diagnostics");
    println!("=======================================\n");

    let mut issues = 0;

    // Config
    let path = super::config_path(config_path);
    if path.exists() {
        println!("  ✅ Config file found: {}", path.display());
    } else {
        println!("  ⚠️  No config file at {}, using defaults (run `toolrelay init`)", path.display());
    }

    let config = match AppConfig::load_with_env(&path) {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  Fix the config before running further checks.");
            return Ok(());
        }
    };

    // Provider
    let kind = match config.provider.kind {
        ProviderKind::Openai => "openai",
        ProviderKind::Azure => "azure",
    };
    println!("  ℹ️  Provider: {kind} at {} (model {})", config.provider.endpoint, config.provider.model);
    if config.has_api_key() {
        println!("  ✅ API key configured");
    } else {
        println!("  ⚠️  No API key configured: set TOOLRELAY_API_KEY or provider.api_key");
        issues += 1;
    }

    match toolrelay_providers::build_from_config(&config) {
        Ok(provider) => match provider.health_check().await {
            Ok(true) => println!("  ✅ Provider reachable"),
            Ok(false) => {
                println!("  ⚠️  Provider answered but reported unhealthy");
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Provider unreachable: {e}");
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ Provider not usable: {e}");
            issues += 1;
        }
    }

    // Tool server
    match &config.tool_server.transport {
        ToolServerTransport::Stdio { command, args, .. } => {
            println!("  ℹ️  Tool server: stdio `{command} {}`", args.join(" "));
        }
        ToolServerTransport::Http { url, .. } => println!("  ℹ️  Tool server: {url}"),
    }
    match super::discover_tools(&config).await {
        Ok((_, tools)) => println!("  ✅ Tool server reachable, {} tool(s) listed", tools.len()),
        Err(e) => {
            println!("  ❌ Tool server unreachable: {e}");
            issues += 1;
        }
    }

    // Summary
    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
