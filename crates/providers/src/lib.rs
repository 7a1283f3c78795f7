//! Provider implementations for LexRAG.
//!
//! Web-search providers implement `lexrag_core::WebSearchProvider`; text
//! generators implement `lexrag_core::TextGenerator`. The factory
//! functions below build whichever ones the configuration enables.

pub mod openai_compat;
pub mod tavily;

pub use openai_compat::OpenAiCompatGenerator;
pub use tavily::TavilySearch;

use lexrag_config::{RewriteConfig, WebSearchConfig};
use lexrag_core::{TextGenerator, WebSearchProvider};
use std::sync::Arc;
use tracing::info;

/// Build the configured web-search provider, if any.
pub fn create_web_search(config: &WebSearchConfig) -> Option<Arc<dyn WebSearchProvider>> {
    if !config.is_enabled() {
        info!("Web search disabled (no provider or API key)");
        return None;
    }
    let api_key = config.api_key.clone()?;
    match config.provider.as_str() {
        "tavily" => Some(Arc::new(
            TavilySearch::new(&config.api_url, api_key).with_domains(config.include_domains.clone()),
        )),
        other => {
            info!(provider = other, "Unknown web search provider, web search disabled");
            None
        }
    }
}

/// Build the query-rewrite generator, if enabled.
pub fn create_generator(config: &RewriteConfig) -> Option<Arc<dyn TextGenerator>> {
    if !config.is_enabled() {
        info!("Query rewriting disabled (no API key)");
        return None;
    }
    let api_key = config.api_key.clone()?;
    let name = if config.api_url.contains("api.openai.com") {
        "openai"
    } else {
        "openai_compat"
    };
    Some(Arc::new(OpenAiCompatGenerator::new(
        name,
        &config.api_url,
        api_key,
        &config.model,
    )))
}
