//! `lexrag retrieve`: Retrieve evidence and print the assembled context.

use crate::services::{self, Services};
use lexrag_config::{AppConfig, ConfigError};
use lexrag_context::AssembledContext;
use lexrag_core::{ChatMessage, Source};
use lexrag_pipeline::EvidenceMetadata;
use lexrag_telemetry::{EventCollector, Fanout, RetrievalEvent, TracingObserver};
use serde::Serialize;
use std::path::{Path, PathBuf};

pub struct RetrieveArgs {
    pub query: String,
    pub budget: Option<usize>,
    pub history: Option<PathBuf>,
    pub top_n: Option<usize>,
    pub json: bool,
}

#[derive(Serialize)]
struct Report<'a> {
    context: &'a AssembledContext,
    metadata: &'a EvidenceMetadata,
    events: Vec<RetrievalEvent>,
}

pub async fn run(
    config_path: Option<&Path>,
    args: RetrieveArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = services::load_config(config_path)?;
    apply_overrides(&mut config, &args)?;
    let budget = args.budget.unwrap_or(config.context.default_budget);
    let history = match &args.history {
        Some(path) => read_history(path)?,
        None => Vec::new(),
    };

    let services = Services::build(config)?;
    let pipeline = services.pipeline();

    let collector = EventCollector::new();
    let tracing_observer = TracingObserver;
    let observer = Fanout::new(&collector, &tracing_observer);

    let (context, metadata) = pipeline
        .retrieve_and_assemble(&args.query, &history, budget, &observer)
        .await;

    if args.json {
        let report = Report {
            context: &context,
            metadata: &metadata,
            events: collector.events(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_text(&context, &metadata));
    }
    Ok(())
}

/// Apply command-line overrides and validate the result.
fn apply_overrides(config: &mut AppConfig, args: &RetrieveArgs) -> Result<(), ConfigError> {
    if let Some(top_n) = args.top_n {
        config.retrieval.top_n = top_n;
    }
    config.validate()
}

/// Parse a JSON array of `{role, content}` messages.
fn read_history(path: &Path) -> Result<Vec<ChatMessage>, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read history {}: {e}", path.display()))?;
    let messages = serde_json::from_str(&raw)
        .map_err(|e| format!("Invalid history {}: {e}", path.display()))?;
    Ok(messages)
}

fn render_text(context: &AssembledContext, metadata: &EvidenceMetadata) -> String {
    let mut out = String::new();
    let status = if metadata.success { "✅" } else { "⚠️" };
    out.push_str(&format!(
        "{status} {} query, {} internal + {} external results in {}ms\n",
        metadata.classification.query_type(),
        metadata.internal_results,
        metadata.external_results,
        metadata.execution_time_ms,
    ));
    if let Some(error) = &metadata.error {
        out.push_str(&format!("   Error: {error}\n"));
    }
    if !metadata.variants.is_empty() {
        out.push_str(&format!("   Variants: {}\n", metadata.variants.join(" | ")));
    }
    if !metadata.case_numbers.is_empty() {
        out.push_str(&format!(
            "   Case numbers: {}\n",
            metadata.case_numbers.join(", ")
        ));
    }
    out.push_str(&format!(
        "   Tokens: {} → {} (budget {}){}\n",
        context.original_tokens,
        context.final_tokens,
        context.metadata.budget,
        if context.truncated { ", truncated" } else { "" },
    ));

    if !metadata.sources.is_empty() {
        out.push_str("\nSources:\n");
        for (i, source) in metadata.sources.iter().enumerate() {
            let label = match source {
                Source::Internal {
                    collection_id,
                    document_id,
                    chunk_id,
                } => format!("{collection_id}/{document_id}#{chunk_id}"),
                Source::External { url, .. } => url.clone(),
            };
            out.push_str(&format!("  [{}] {label}\n", i + 1));
        }
    }

    out.push_str("\nContext:\n");
    for message in &context.messages {
        out.push_str(&format!("── {} ──\n{}\n", message.role, message.content));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexrag_classifier::classify;
    use lexrag_context::AssemblyMetadata;
    use lexrag_core::ContextMessage;
    use lexrag_telemetry::ExecutionRecord;

    fn metadata(success: bool) -> EvidenceMetadata {
        let mut record = ExecutionRecord::start();
        record.finish(success);
        let mut metadata = EvidenceMetadata::new(classify("Дело А40-1/2020"), false, record);
        metadata.case_numbers = vec!["А40-1/2020".into()];
        metadata.sources = vec![Source::External {
            url: "https://kad.arbitr.ru/1".into(),
            title: String::new(),
        }];
        metadata
    }

    fn context() -> AssembledContext {
        AssembledContext {
            messages: vec![
                ContextMessage::new(lexrag_core::Role::System, "Ты юрист."),
                ContextMessage::new(lexrag_core::Role::User, "Дело А40-1/2020"),
            ],
            original_tokens: 10,
            final_tokens: 10,
            truncated: false,
            metadata: AssemblyMetadata {
                budget: 100,
                ..Default::default()
            },
        }
    }

    #[test]
    fn text_report_lists_sources_and_messages() {
        let text = render_text(&context(), &metadata(true));
        assert!(text.starts_with("✅ case_number query"));
        assert!(text.contains("Case numbers: А40-1/2020"));
        assert!(text.contains("[1] https://kad.arbitr.ru/1"));
        assert!(text.contains("── user ──\nДело А40-1/2020"));
        assert!(text.contains("Tokens: 10 → 10 (budget 100)\n"));
    }

    #[test]
    fn failed_run_is_flagged() {
        let mut metadata = metadata(false);
        metadata.error = Some("all evidence branches failed".into());
        let text = render_text(&context(), &metadata);
        assert!(text.starts_with("⚠️"));
        assert!(text.contains("Error: all evidence branches failed"));
    }

    fn args(top_n: Option<usize>) -> RetrieveArgs {
        RetrieveArgs {
            query: "неустойка".into(),
            budget: None,
            history: None,
            top_n,
            json: false,
        }
    }

    #[test]
    fn top_n_override_applied() {
        let mut config = AppConfig::default();
        apply_overrides(&mut config, &args(Some(3))).unwrap();
        assert_eq!(config.retrieval.top_n, 3);
    }

    #[test]
    fn zero_top_n_override_rejected() {
        let mut config = AppConfig::default();
        let err = apply_overrides(&mut config, &args(Some(0))).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
        assert!(err.to_string().contains("top_n"));
    }

    #[test]
    fn history_file_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(
            &path,
            r#"[{"role":"user","content":"Привет"},{"role":"assistant","content":"Здравствуйте"}]"#,
        )
        .unwrap();
        let history = read_history(&path).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "Здравствуйте");
    }

    #[test]
    fn malformed_history_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "not json").unwrap();
        let err = read_history(&path).unwrap_err();
        assert!(err.to_string().starts_with("Invalid history"));
    }
}
