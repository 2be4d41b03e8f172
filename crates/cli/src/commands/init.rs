//! `toolrelay init`: write a default config file.

use std::path::Path;
use toolrelay_config::AppConfig;

pub fn run(config_path: Option<&Path>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = super::config_path(config_path);

    println!("🔌 ToolRelay First-Time Setup");
    println!("=============================\n");

    if path.exists() && !force {
        println!("  Config already exists: {}", path.display());
        println!("  Re-run with --force to overwrite it.");
        return Ok(());
    }

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
            println!("✅ Created config directory: {}", dir.display());
        }
    }

    std::fs::write(&path, AppConfig::default_toml())?;
    println!("✅ Wrote {}", path.display());

    println!();
    println!("Next steps:");
    println!("  1. Set TOOLRELAY_API_KEY (or provider.api_key in the file)");
    println!("  2. Point [tool_server] at your MCP server");
    println!("  3. Run `toolrelay doctor`, then `toolrelay serve`");

    Ok(())
}
