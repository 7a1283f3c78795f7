//! Provider traits: the abstraction over external services.
//!
//! Two collaborators live outside the core:
//! - a web-search provider (Tavily or similar) returning ranked pages;
//! - a text generator (any chat-completion LLM) used only to rephrase queries.
//!
//! Both are constructed once and injected as `Arc<dyn …>`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// A single page returned by a web-search provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebHit {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub score: f32,
}

/// An external web-search provider.
#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    /// A human-readable name for this provider (e.g., "tavily").
    fn name(&self) -> &str;

    /// Search the web, returning at most `max_results` pages.
    async fn search(&self, text: &str, max_results: usize) -> Result<Vec<WebHit>, ProviderError>;
}

/// A text generator used to produce alternate phrasings of a query.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// A human-readable name for this generator (e.g., "openai").
    fn name(&self) -> &str;

    /// Complete a single prompt, returning the generated text.
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Health check: can we reach the generator?
    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoGenerator;

    #[async_trait]
    impl TextGenerator for EchoGenerator {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
            Ok(prompt.to_uppercase())
        }
    }

    #[tokio::test]
    async fn default_health_check_is_ok() {
        let g = EchoGenerator;
        assert!(g.health_check().await.unwrap());
        assert_eq!(g.generate("abc").await.unwrap(), "ABC");
    }

    #[test]
    fn web_hit_deserializes_with_defaults() {
        let hit: WebHit = serde_json::from_str(r#"{"url":"https://sudact.ru/1"}"#).unwrap();
        assert_eq!(hit.url, "https://sudact.ru/1");
        assert!(hit.title.is_empty());
        assert_eq!(hit.score, 0.0);
    }
}
