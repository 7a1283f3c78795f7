//! Shared test doubles for pipeline tests.

use async_trait::async_trait;
use lexrag_core::{
    ProviderError, QuerySpec, RawHit, SearchBackend, SearchError, TextGenerator, WebHit,
    WebSearchProvider,
};
use lexrag_search::InMemoryBackend;
use serde_json::json;
use std::sync::Mutex;
use std::time::Duration;

/// A generator that replies with fixed text, optionally after a delay.
pub struct ScriptedGenerator {
    reply: Result<String, ProviderError>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn reply(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: Err(ProviderError::ApiError {
                status_code: 500,
                message: "upstream error".into(),
            }),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn slow(delay: Duration, text: &str) -> Self {
        Self {
            delay: Some(delay),
            ..Self::reply(text)
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        self.calls.lock().unwrap().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply.clone()
    }
}

/// A web-search provider returning canned hits for every query.
pub struct ScriptedWeb {
    hits: Vec<WebHit>,
    fail: bool,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedWeb {
    pub fn with_hits(urls: &[&str]) -> Self {
        Self {
            hits: urls
                .iter()
                .map(|url| WebHit {
                    url: url.to_string(),
                    title: format!("Страница {url}"),
                    content: "Судебная практика по неустойке, дело А40-1/2020".into(),
                    score: 0.5,
                })
                .collect(),
            fail: false,
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::with_hits(&[])
        }
    }

    pub fn slow(delay: Duration, urls: &[&str]) -> Self {
        Self {
            delay: Some(delay),
            ..Self::with_hits(urls)
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebSearchProvider for ScriptedWeb {
    fn name(&self) -> &str {
        "scripted_web"
    }

    async fn search(&self, text: &str, max_results: usize) -> Result<Vec<WebHit>, ProviderError> {
        self.calls.lock().unwrap().push(text.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(ProviderError::Network("connection reset".into()));
        }
        Ok(self.hits.iter().take(max_results).cloned().collect())
    }
}

/// A backend where every call fails.
pub struct DownBackend;

#[async_trait]
impl SearchBackend for DownBackend {
    fn name(&self) -> &str {
        "down"
    }

    async fn search(
        &self,
        _collection: &str,
        _spec: &QuerySpec,
        _size: usize,
    ) -> Result<Vec<RawHit>, SearchError> {
        Err(SearchError::Network("connection refused".into()))
    }
}

/// All default collections, with a few legal documents.
pub fn seeded_backend() -> InMemoryBackend {
    InMemoryBackend::from_seed(json!({
        "court_decisions": [
            {"document_id": "cd1", "chunk_id": 0, "case_number": "А65-28469/2012",
             "title": "Решение по делу А65-28469/2012",
             "text": "Суд взыскал неустойку за просрочку поставки", "claimant": "ООО Ромашка"},
            {"document_id": "cd2", "chunk_id": 0, "case_number": "А40-1/2020",
             "title": "Решение о банкротстве",
             "text": "ООО Ромашка признано банкротом", "defendant": "ООО Ромашка"}
        ],
        "legislation": [
            {"document_id": "gk330", "chunk_id": 0, "title": "Статья 330 ГК РФ",
             "text": "Неустойкой признается определенная законом или договором денежная сумма"}
        ],
        "legal_practice": [
            {"document_id": "lp1", "chunk_id": 0, "title": "Обзор практики",
             "text": "Снижение неустойки по статье 333 ГК РФ"}
        ],
        "commentary": [],
        "forms": [
            {"document_id": "f1", "chunk_id": 0, "title": "Исковое заявление о взыскании неустойки",
             "subject": "неустойка", "category": "иски", "text": "Образец искового заявления"}
        ]
    }))
    .unwrap()
}
