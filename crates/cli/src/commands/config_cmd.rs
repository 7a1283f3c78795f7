//! `lexrag config`: Configuration management commands.

use crate::services;
use lexrag_config::AppConfig;
use std::path::Path;

const REDACTED: &str = "***";

pub fn validate(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match services::load_config(config_path) {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let warnings = warnings(&config);
            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!(
                "   Search:     {} ({})",
                config.search.backend, config.search.url
            );
            println!(
                "   Collections: {} free-text, designated '{}'",
                config.collections.free_text.len(),
                config.collections.designated
            );
            println!("   Top N:      {}", config.retrieval.top_n);
            println!("   Web search: {}", on_off(config.web_search.is_enabled()));
            println!("   Rewrite:    {}", on_off(config.rewrite.is_enabled()));
            println!("   Tokenizer:  {}", config.context.tokenizer);
            println!("   Budget:     {}", config.context.default_budget);
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub fn show(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config =
        services::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&redacted(config))?;
    println!("{toml_str}");
    Ok(())
}

pub fn path(config_path: Option<&Path>) {
    println!("{}", services::config_path(config_path).display());
}

pub fn init(config_path: Option<&Path>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = services::config_path(config_path);
    if path.exists() && !force {
        println!("   ⚠️  {} already exists (use --force to overwrite)", path.display());
        return Ok(());
    }
    write_default(&path)?;
    println!("   ✅ Wrote {}", path.display());
    Ok(())
}

fn write_default(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, AppConfig::default_toml())
}

/// Checks that pass validation but usually mean a misconfiguration.
fn warnings(config: &AppConfig) -> Vec<&'static str> {
    let mut warnings = Vec::new();

    if config.web_search.provider != "none" && config.web_search.api_key.is_none() {
        warnings.push("Web search provider set but no API key (set TAVILY_API_KEY)");
    }

    if config.rewrite.enabled && config.rewrite.api_key.is_none() {
        warnings.push("Rewrite enabled but no API key (set LEXRAG_API_KEY or OPENAI_API_KEY)");
    }

    if config.search.backend == "memory" && config.search.seed_file.is_none() {
        warnings.push("In-memory search backend without seed_file returns no results");
    }

    if config.search.username.is_some() != config.search.password.is_some() {
        warnings.push("search.username and search.password should be set together");
    }

    warnings
}

fn redacted(mut config: AppConfig) -> AppConfig {
    for secret in [
        &mut config.search.password,
        &mut config.web_search.api_key,
        &mut config.rewrite.api_key,
    ] {
        if secret.is_some() {
            *secret = Some(REDACTED.to_string());
        }
    }
    config
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "enabled" } else { "disabled" }
}
