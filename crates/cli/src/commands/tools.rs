//! `toolrelay tools`: list what the configured tool server offers.

use std::path::Path;

pub async fn run(config_path: Option<&Path>, schema: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let (server, tools) = super::discover_tools(&config).await?;

    println!("🧰 Tools on {server} ({})", tools.len());
    println!();
    for tool in &tools {
        println!("  {}", tool.name);
        if !tool.description.is_empty() {
            println!("      {}", tool.description);
        }
        if schema {
            let pretty = serde_json::to_string_pretty(&tool.input_schema)?;
            for line in pretty.lines() {
                println!("      {line}");
            }
        }
    }

    Ok(())
}
