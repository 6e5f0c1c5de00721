//! `rigchat doctor`: check config, storage and provider reachability.

use rigchat_config::AppConfig;
use rigchat_core::provider::Provider;
use rigchat_core::store::KnowledgeStore;

use crate::runtime::{self, Backends, CliResult};

pub async fn run() -> CliResult<()> {
    println!("RigChat Doctor");
    println!("==============\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  ⚠️  No config file, using defaults (run `rigchat init`)");
    }
    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            return Ok(());
        }
    };

    match Backends::open(&config).await {
        Ok(backends) => match backends.knowledge.count().await {
            Ok(n) => println!("  ✅ Storage ({}) open, {n} knowledge entries", config.storage.backend),
            Err(e) => {
                println!("  ❌ Storage ({}) query failed: {e}", config.storage.backend);
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ Storage ({}) failed to open: {e}", config.storage.backend);
            issues += 1;
        }
    }

    match runtime::provider(&config) {
        Ok(provider) => match provider.health_check().await {
            Ok(true) => println!("  ✅ Provider reachable at {}", config.api_url),
            Ok(false) => {
                println!("  ❌ Provider at {} rejected the health check", config.api_url);
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Provider unreachable: {e}");
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ⚠️  {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  All checks passed.");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
