//! `stylesmith init`: Write the default configuration file.

use stylesmith_config::AppConfig;

pub fn run(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_path();
    AppConfig::write_default(&config_path, force)?;

    println!("✅ Wrote default config: {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  1. Set STYLESMITH_API_KEY (or add `api_key` to the config file)");
    println!("  2. stylesmith --site example.com chat");
    Ok(())
}
