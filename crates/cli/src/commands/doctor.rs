//! `lexrag doctor`: Diagnose configuration and service health.

use crate::services::{self, Services};
use lexrag_context::TokenCounter;
use std::path::Path;
use std::time::Duration;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 LexRAG Doctor — System Diagnostics");
    println!("=====================================\n");

    let mut issues = 0;

    let path = services::config_path(config_path);
    if path.exists() {
        println!("  ✅ Config file found at {}", path.display());
    } else {
        println!("  ⚠️  No config file — run `lexrag config init` (using defaults)");
        issues += 1;
    }

    let config = match services::load_config(config_path) {
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

    let tokenizer = config.context.tokenizer.clone();
    let services = match Services::build(config) {
        Ok(services) => services,
        Err(e) => {
            println!("  ❌ Search backend could not be created: {e}");
            return Ok(());
        }
    };

    // Search backend
    let backend = services.backend.name().to_string();
    match tokio::time::timeout(HEALTH_TIMEOUT, services.backend.health_check()).await {
        Ok(Ok(true)) => println!("  ✅ Search backend '{backend}' reachable"),
        Ok(Ok(false)) => {
            println!("  ❌ Search backend '{backend}' reports unhealthy");
            issues += 1;
        }
        Ok(Err(e)) => {
            println!("  ❌ Search backend '{backend}' error: {e}");
            issues += 1;
        }
        Err(_) => {
            println!(
                "  ❌ Search backend '{backend}' did not answer within {}s",
                HEALTH_TIMEOUT.as_secs()
            );
            issues += 1;
        }
    }

    // Optional collaborators
    match &services.web {
        Some(web) => println!("  ✅ Web search via {}", web.name()),
        None => println!("  ➖ Web search disabled (no provider or API key)"),
    }
    match &services.generator {
        Some(generator) => println!("  ✅ Query rewriting via {}", generator.name()),
        None => println!("  ➖ Query rewriting disabled (no API key)"),
    }

    // Tokenizer
    let counter = TokenCounter::from_name(&tokenizer);
    if counter.name() == tokenizer {
        println!("  ✅ Tokenizer {tokenizer}");
    } else {
        println!(
            "  ⚠️  Tokenizer {tokenizer} unavailable, counting with {}",
            counter.name()
        );
        issues += 1;
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
