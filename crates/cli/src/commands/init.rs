//! `helmsman init`: write the default config and create data directories.

use helmsman_config::AppConfig;
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));
    let config = AppConfig::default();

    println!("Helmsman - setup");
    println!("================\n");

    if let Some(dir) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
            println!("  Created config directory: {}", dir.display());
        }
    }

    let projects_dir = &config.storage.projects_dir;
    if !projects_dir.exists() {
        std::fs::create_dir_all(projects_dir)?;
        println!("  Created projects directory: {}", projects_dir.display());
    }

    if config_path.exists() {
        println!("\n  Config already exists at: {}", config_path.display());
        println!("  Edit it manually or delete it and re-run init.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("  Created config at: {}", config_path.display());
        println!("\n  Next steps:");
        println!("    1. Add your API key to {} (or set HELMSMAN_API_KEY)", config_path.display());
        println!("    2. Put project databases in {} as <project>.db", projects_dir.display());
        println!("    3. Run: helmsman chat --project <project>\n");
    }

    Ok(())
}
