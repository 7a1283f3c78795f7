//! Tavily web-search provider.

use async_trait::async_trait;
use lexrag_core::{ProviderError, WebHit, WebSearchProvider};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Web search over the Tavily `/search` API.
pub struct TavilySearch {
    base_url: String,
    api_key: String,
    include_domains: Vec<String>,
    client: reqwest::Client,
}

impl TavilySearch {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            include_domains: Vec::new(),
            client,
        }
    }

    /// Restrict results to these domains (e.g. `sudact.ru`, `consultant.ru`).
    pub fn with_domains(mut self, domains: Vec<String>) -> Self {
        self.include_domains = domains;
        self
    }

    fn request_body<'a>(&'a self, text: &'a str, max_results: usize) -> SearchRequest<'a> {
        SearchRequest {
            query: text,
            max_results,
            search_depth: "basic",
            include_domains: &self.include_domains,
        }
    }
}

#[async_trait]
impl WebSearchProvider for TavilySearch {
    fn name(&self) -> &str {
        "tavily"
    }

    async fn search(&self, text: &str, max_results: usize) -> Result<Vec<WebHit>, ProviderError> {
        let url = format!("{}/search", self.base_url);
        let body = self.request_body(text, max_results);

        debug!(max_results, domains = self.include_domains.len(), "Sending web search request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid Tavily API key".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Web search returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let parsed: SearchResponse = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse response: {e}"),
        })?;

        Ok(into_hits(parsed, max_results))
    }
}

fn into_hits(response: SearchResponse, max_results: usize) -> Vec<WebHit> {
    response
        .results
        .into_iter()
        .filter(|h| !h.url.is_empty())
        .take(max_results)
        .collect()
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    max_results: usize,
    search_depth: &'static str,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    include_domains: &'a [String],
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<WebHit>,
}
