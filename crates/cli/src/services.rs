//! Service handles built once per process.

use lexrag_config::{AppConfig, ConfigError};
use lexrag_core::{SearchBackend, TextGenerator, WebSearchProvider};
use lexrag_pipeline::RetrievalPipeline;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Load the config from `path` (or the default location), with env overrides.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(path) => {
            let mut config = AppConfig::load_from(path)?;
            config.apply_env(|key| std::env::var(key).ok());
            Ok(config)
        }
        None => AppConfig::load(),
    }
}

/// The config file in effect.
pub fn config_path(path: Option<&Path>) -> PathBuf {
    path.map_or_else(AppConfig::config_path, Path::to_path_buf)
}

/// Collaborators shared by every request.
pub struct Services {
    pub config: AppConfig,
    pub backend: Arc<dyn SearchBackend>,
    pub web: Option<Arc<dyn WebSearchProvider>>,
    pub generator: Option<Arc<dyn TextGenerator>>,
}

impl Services {
    pub fn build(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let backend = lexrag_search::create_backend(&config.search)?;
        let web = lexrag_providers::create_web_search(&config.web_search);
        let generator = lexrag_providers::create_generator(&config.rewrite);
        debug!(
            backend = backend.name(),
            web = ?web.as_ref().map(|w| w.name()),
            generator = ?generator.as_ref().map(|g| g.name()),
            "Services ready"
        );
        Ok(Self {
            config,
            backend,
            web,
            generator,
        })
    }

    pub fn pipeline(&self) -> RetrievalPipeline {
        RetrievalPipeline::from_config(
            &self.config,
            self.backend.clone(),
            self.web.clone(),
            self.generator.clone(),
        )
    }
}
