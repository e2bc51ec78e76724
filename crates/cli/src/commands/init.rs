//! `toolwright init`: write a starter config file.

use std::path::{Path, PathBuf};

use toolwright_config::AppConfig;

pub fn run(path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let path = path.unwrap_or_else(AppConfig::config_path);
    write_default(&path)?;

    println!("Created config at: {}", path.display());
    println!();
    println!("Next steps:");
    println!("  1. Set TOOLWRIGHT_API_KEY (or add api_key to the file)");
    println!("  2. Run: toolwright run -m \"Convert 100 USD to EUR\"");
    Ok(())
}

/// Write the default config to `path`. An existing file is left untouched.
fn write_default(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        return Err(format!(
            "config already exists at {}; edit it or delete it first",
            path.display()
        )
        .into());
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, AppConfig::default_toml())?;
    Ok(())
}
