//! Configuration loading, validation, and management for LexRAG.
//!
//! Loads configuration from `~/.lexrag/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.lexrag/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Document-store connection
    #[serde(default)]
    pub search: SearchConfig,

    /// Which collections the strategies query
    #[serde(default)]
    pub collections: CollectionsConfig,

    /// Result-set sizing and truncation
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// External web search
    #[serde(default)]
    pub web_search: WebSearchConfig,

    /// Query rewriting via an OpenAI-compatible endpoint
    #[serde(default)]
    pub rewrite: RewriteConfig,

    /// Context window assembly
    #[serde(default)]
    pub context: ContextConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

fn default_true() -> bool {
    true
}

// ── Search backend ─────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// `elasticsearch` or `memory`
    #[serde(default = "default_search_backend")]
    pub backend: String,

    #[serde(default = "default_search_url")]
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Timeout applied to every individual backend call.
    #[serde(default = "default_search_timeout_ms")]
    pub timeout_ms: u64,

    /// JSON file with documents to load into the `memory` backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_file: Option<PathBuf>,
}

fn default_search_backend() -> String {
    "elasticsearch".into()
}
fn default_search_url() -> String {
    "http://localhost:9200".into()
}
fn default_search_timeout_ms() -> u64 {
    5_000
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backend: default_search_backend(),
            url: default_search_url(),
            username: None,
            password: None,
            timeout_ms: default_search_timeout_ms(),
            seed_file: None,
        }
    }
}

impl std::fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchConfig")
            .field("backend", &self.backend)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("timeout_ms", &self.timeout_ms)
            .field("seed_file", &self.seed_file)
            .finish()
    }
}

// ── Collections ────────────────────────────────────────────────────────────

/// The document shape stored in a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    CourtDecisions,
    Legislation,
    LegalPractice,
    Commentary,
    Forms,
}

impl CollectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CourtDecisions => "court_decisions",
            Self::Legislation => "legislation",
            Self::LegalPractice => "legal_practice",
            Self::Commentary => "commentary",
            Self::Forms => "forms",
        }
    }
}

impl std::fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A physical collection (index) name and its document shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionEntry {
    pub id: String,
    pub kind: CollectionKind,
}

impl CollectionEntry {
    pub fn new(id: impl Into<String>, kind: CollectionKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionsConfig {
    /// Court-decision collection queried by case number and company.
    #[serde(default = "default_case_collection")]
    pub case_collection: String,

    /// Procedural-forms collection queried by document type.
    #[serde(default = "default_forms_collection")]
    pub forms_collection: String,

    /// The free-text collection that receives the allocation remainder.
    #[serde(default = "default_designated_collection")]
    pub designated: String,

    /// Free-text fan-out targets, in merge priority order.
    #[serde(default = "default_free_text_collections")]
    pub free_text: Vec<CollectionEntry>,
}

fn default_case_collection() -> String {
    "court_decisions".into()
}
fn default_forms_collection() -> String {
    "forms".into()
}
fn default_designated_collection() -> String {
    "legislation".into()
}
fn default_free_text_collections() -> Vec<CollectionEntry> {
    vec![
        CollectionEntry::new("legislation", CollectionKind::Legislation),
        CollectionEntry::new("court_decisions", CollectionKind::CourtDecisions),
        CollectionEntry::new("legal_practice", CollectionKind::LegalPractice),
        CollectionEntry::new("commentary", CollectionKind::Commentary),
        CollectionEntry::new("forms", CollectionKind::Forms),
    ]
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            case_collection: default_case_collection(),
            forms_collection: default_forms_collection(),
            designated: default_designated_collection(),
            free_text: default_free_text_collections(),
        }
    }
}

impl CollectionsConfig {
    /// The kind of `id`, looking at the free-text list first.
    pub fn kind_of(&self, id: &str) -> Option<CollectionKind> {
        if let Some(entry) = self.free_text.iter().find(|c| c.id == id) {
            return Some(entry.kind);
        }
        if id == self.case_collection {
            Some(CollectionKind::CourtDecisions)
        } else if id == self.forms_collection {
            Some(CollectionKind::Forms)
        } else {
            None
        }
    }
}

// ── Retrieval ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Hard cap on document-type results regardless of `top_n`.
    #[serde(default = "default_doc_type_cap")]
    pub doc_type_cap: usize,

    /// Free-text results are cut to this many characters.
    #[serde(default = "default_result_char_ceiling")]
    pub result_char_ceiling: usize,

    #[serde(default = "default_truncation_marker")]
    pub truncation_marker: String,
}

fn default_top_n() -> usize {
    10
}
fn default_doc_type_cap() -> usize {
    5
}
fn default_result_char_ceiling() -> usize {
    2_000
}
fn default_truncation_marker() -> String {
    " [...]".into()
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            doc_type_cap: default_doc_type_cap(),
            result_char_ceiling: default_result_char_ceiling(),
            truncation_marker: default_truncation_marker(),
        }
    }
}

// ── Web search ─────────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct WebSearchConfig {
    /// `tavily` or `none`
    #[serde(default = "default_web_provider")]
    pub provider: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_web_api_url")]
    pub api_url: String,

    #[serde(default = "default_web_max_results")]
    pub max_results: usize,

    #[serde(default = "default_web_timeout_ms")]
    pub timeout_ms: u64,

    /// Restrict results to these domains. Empty = any domain.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_domains: Vec<String>,
}

fn default_web_provider() -> String {
    "tavily".into()
}
fn default_web_api_url() -> String {
    "https://api.tavily.com".into()
}
fn default_web_max_results() -> usize {
    5
}
fn default_web_timeout_ms() -> u64 {
    15_000
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            provider: default_web_provider(),
            api_key: None,
            api_url: default_web_api_url(),
            max_results: default_web_max_results(),
            timeout_ms: default_web_timeout_ms(),
            include_domains: vec![],
        }
    }
}

impl WebSearchConfig {
    /// Whether a web-search provider can be constructed.
    pub fn is_enabled(&self) -> bool {
        self.provider != "none" && self.api_key.is_some()
    }
}

impl std::fmt::Debug for WebSearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSearchConfig")
            .field("provider", &self.provider)
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("max_results", &self.max_results)
            .field("timeout_ms", &self.timeout_ms)
            .field("include_domains", &self.include_domains)
            .finish()
    }
}

// ── Query rewrite ──────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct RewriteConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_rewrite_api_url")]
    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_rewrite_model")]
    pub model: String,

    /// Upper bound on the whole rewrite call.
    #[serde(default = "default_rewrite_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_variants")]
    pub max_variants: usize,
}

fn default_rewrite_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_rewrite_model() -> String {
    "gpt-4o-mini".into()
}
fn default_rewrite_timeout_secs() -> u64 {
    20
}
fn default_max_variants() -> usize {
    2
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: default_rewrite_api_url(),
            api_key: None,
            model: default_rewrite_model(),
            timeout_secs: default_rewrite_timeout_secs(),
            max_variants: default_max_variants(),
        }
    }
}

impl RewriteConfig {
    /// Whether a text generator can be constructed.
    pub fn is_enabled(&self) -> bool {
        self.enabled && self.api_key.is_some()
    }
}

impl std::fmt::Debug for RewriteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewriteConfig")
            .field("enabled", &self.enabled)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_variants", &self.max_variants)
            .finish()
    }
}

// ── Context assembly ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_budget")]
    pub default_budget: usize,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Internal evidence items reserved before the rest is packed.
    #[serde(default = "default_min_internal")]
    pub min_internal: usize,

    /// External evidence items reserved before the rest is packed.
    #[serde(default = "default_min_external")]
    pub min_external: usize,

    #[serde(default = "default_evidence_char_ceiling")]
    pub evidence_char_ceiling: usize,

    /// `cl100k_base` or `heuristic`
    #[serde(default = "default_tokenizer")]
    pub tokenizer: String,
}

fn default_budget() -> usize {
    8_000
}
fn default_system_prompt() -> String {
    "Ты юридический ассистент. Отвечай на вопросы пользователя, опираясь на \
     приведённые материалы: нормы права, судебную практику и найденные в \
     интернете источники. Ссылайся на источники и номера дел. Если материалов \
     недостаточно, прямо скажи об этом."
        .into()
}
fn default_min_internal() -> usize {
    3
}
fn default_min_external() -> usize {
    2
}
fn default_evidence_char_ceiling() -> usize {
    1_500
}
fn default_tokenizer() -> String {
    "cl100k_base".into()
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            default_budget: default_budget(),
            system_prompt: default_system_prompt(),
            min_internal: default_min_internal(),
            min_external: default_min_external(),
            evidence_char_ceiling: default_evidence_char_ceiling(),
            tokenizer: default_tokenizer(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.lexrag/config.toml).
    ///
    /// Environment variables override the file:
    /// - `LEXRAG_SEARCH_URL`
    /// - `LEXRAG_API_KEY`, then `OPENAI_API_KEY` (rewrite endpoint)
    /// - `TAVILY_API_KEY`
    /// - `LEXRAG_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("LEXRAG_SEARCH_URL") {
            self.search.url = url;
        }

        if self.rewrite.api_key.is_none() {
            self.rewrite.api_key = lookup("LEXRAG_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }

        if self.web_search.api_key.is_none() {
            self.web_search.api_key = lookup("TAVILY_API_KEY");
        }

        if let Some(model) = lookup("LEXRAG_MODEL") {
            self.rewrite.model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".lexrag")
    }

    /// Get the default config file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collections.free_text.is_empty() {
            return Err(ConfigError::ValidationError(
                "collections.free_text must list at least one collection".into(),
            ));
        }

        if !self
            .collections
            .free_text
            .iter()
            .any(|c| c.id == self.collections.designated)
        {
            return Err(ConfigError::ValidationError(format!(
                "collections.designated '{}' is not one of collections.free_text",
                self.collections.designated
            )));
        }

        if self.retrieval.top_n == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.top_n must be > 0".into(),
            ));
        }

        if self.search.timeout_ms == 0
            || self.web_search.timeout_ms == 0
            || self.rewrite.timeout_secs == 0
        {
            return Err(ConfigError::ValidationError(
                "timeouts must be > 0".into(),
            ));
        }

        if !matches!(self.search.backend.as_str(), "elasticsearch" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "search.backend must be 'elasticsearch' or 'memory', got '{}'",
                self.search.backend
            )));
        }

        if !matches!(self.context.tokenizer.as_str(), "cl100k_base" | "heuristic") {
            return Err(ConfigError::ValidationError(format!(
                "context.tokenizer must be 'cl100k_base' or 'heuristic', got '{}'",
                self.context.tokenizer
            )));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retrieval.top_n, 10);
        assert_eq!(config.retrieval.doc_type_cap, 5);
        assert_eq!(config.collections.free_text.len(), 5);
        assert_eq!(config.rewrite.timeout_secs, 20);
        assert_eq!(config.context.min_internal, 3);
        assert_eq!(config.context.min_external, 2);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.collections.free_text, config.collections.free_text);
        assert_eq!(parsed.search.url, config.search.url);
    }

    #[test]
    fn empty_collections_rejected() {
        let mut config = AppConfig::default();
        config.collections.free_text.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_designated_collection_rejected() {
        let mut config = AppConfig::default();
        config.collections.designated = "archive".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("archive"));
    }

    #[test]
    fn zero_top_n_rejected() {
        let mut config = AppConfig::default();
        config.retrieval.top_n = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut config = AppConfig::default();
        config.search.timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.collections.designated, "legislation");
    }

    #[test]
    fn load_from_file_with_partial_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[search]
backend = "memory"
timeout_ms = 250

[retrieval]
top_n = 6

[collections]
designated = "laws"

[[collections.free_text]]
id = "laws"
kind = "legislation"

[[collections.free_text]]
id = "decisions"
kind = "court_decisions"
"#,
        )
        .unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.search.backend, "memory");
        assert_eq!(config.search.timeout_ms, 250);
        assert_eq!(config.retrieval.top_n, 6);
        assert_eq!(config.retrieval.doc_type_cap, 5);
        assert_eq!(config.collections.free_text.len(), 2);
        assert_eq!(
            config.collections.kind_of("decisions"),
            Some(CollectionKind::CourtDecisions)
        );
    }

    #[test]
    fn env_overrides() {
        let env: HashMap<&str, &str> = [
            ("LEXRAG_SEARCH_URL", "http://es:9200"),
            ("OPENAI_API_KEY", "sk-openai"),
            ("TAVILY_API_KEY", "tvly-1"),
            ("LEXRAG_MODEL", "gpt-4.1-mini"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.search.url, "http://es:9200");
        assert_eq!(config.rewrite.api_key.as_deref(), Some("sk-openai"));
        assert_eq!(config.web_search.api_key.as_deref(), Some("tvly-1"));
        assert_eq!(config.rewrite.model, "gpt-4.1-mini");
        assert!(config.rewrite.is_enabled());
        assert!(config.web_search.is_enabled());
    }

    #[test]
    fn lexrag_key_wins_over_openai_key() {
        let mut config = AppConfig::default();
        config.apply_env(|k| match k {
            "LEXRAG_API_KEY" => Some("lex".into()),
            "OPENAI_API_KEY" => Some("oai".into()),
            _ => None,
        });
        assert_eq!(config.rewrite.api_key.as_deref(), Some("lex"));
    }

    #[test]
    fn secrets_redacted_in_debug() {
        let mut config = AppConfig::default();
        config.rewrite.api_key = Some("sk-secret-value".into());
        config.web_search.api_key = Some("tvly-secret".into());
        config.search.password = Some("hunter2".into());
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("sk-secret-value"));
        assert!(!dbg.contains("tvly-secret"));
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("court_decisions"));
        assert!(toml_str.contains("legislation"));
    }

    #[test]
    fn disabled_collaborators_without_keys() {
        let config = AppConfig::default();
        assert!(!config.rewrite.is_enabled());
        assert!(!config.web_search.is_enabled());
    }
}
