//! `rigchat init`: write the default configuration.

use rigchat_config::AppConfig;

use crate::runtime::CliResult;

pub async fn run(force: bool) -> CliResult<()> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("RigChat setup");
    println!("===============\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() && !force {
        println!("  Config file exists: {} (use --force to overwrite)", config_path.display());
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Wrote default config: {}", config_path.display());
    }

    let config = AppConfig::load_from(&config_path)?;
    println!();
    println!("  Model:     {}", config.completion.model);
    println!("  Storage:   {} ({})", config.storage.backend, config.storage.database_path().display());
    println!("  Cache:     {}", config.cache.backend);
    println!();
    if !config.has_api_key() {
        println!("  Next: set your API key");
        println!("    export RIGCHAT_API_KEY=\"sk-...\"");
        println!();
    }
    println!("  Then run: rigchat chat");

    Ok(())
}
