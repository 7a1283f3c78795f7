//! Query rewriting.
//!
//! Asks a text generator for alternate phrasings of the user's query to
//! broaden web search. Rewriting is best-effort: a timeout, an error or an
//! unusable answer degrades to the original query as the only variant.

use lexrag_config::RewriteConfig;
use lexrag_core::TextGenerator;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default rewrite timeout (T1).
pub const DEFAULT_REWRITE_TIMEOUT: Duration = Duration::from_secs(20);

/// Default number of variants requested.
pub const DEFAULT_MAX_VARIANTS: usize = 2;

/// Characters stripped from both ends of a variant line.
const QUOTES: &[char] = &['"', '\'', '«', '»', '“', '”', '„'];

const BULLETS: &[char] = &['-', '*', '•', '–', '—'];

/// Variants produced for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct RewriteOutcome {
    /// Never empty.
    pub variants: Vec<String>,
    /// The original query stands in for a failed rewrite.
    pub fell_back: bool,
    /// Why rewriting fell back, or was skipped.
    pub reason: Option<String>,
}

impl RewriteOutcome {
    fn original(query: &str, fell_back: bool, reason: impl Into<String>) -> Self {
        Self {
            variants: vec![query.to_string()],
            fell_back,
            reason: Some(reason.into()),
        }
    }
}

/// Produces query variants through a [`TextGenerator`].
#[derive(Clone)]
pub struct QueryRewriter {
    generator: Option<Arc<dyn TextGenerator>>,
    timeout: Duration,
    max_variants: usize,
}

impl QueryRewriter {
    pub fn new(
        generator: Option<Arc<dyn TextGenerator>>,
        timeout: Duration,
        max_variants: usize,
    ) -> Self {
        Self {
            generator,
            timeout,
            max_variants: max_variants.max(1),
        }
    }

    pub fn from_config(generator: Option<Arc<dyn TextGenerator>>, config: &RewriteConfig) -> Self {
        Self::new(
            generator,
            Duration::from_secs(config.timeout_secs),
            config.max_variants,
        )
    }

    /// A rewriter that always returns the original query.
    pub fn disabled() -> Self {
        Self::new(None, DEFAULT_REWRITE_TIMEOUT, DEFAULT_MAX_VARIANTS)
    }

    pub fn is_enabled(&self) -> bool {
        self.generator.is_some()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Rewrite `query` into up to `max_variants` phrasings.
    pub async fn rewrite(&self, query: &str) -> RewriteOutcome {
        let Some(generator) = &self.generator else {
            return RewriteOutcome::original(query, false, "rewriting not configured");
        };

        let prompt = build_prompt(query, self.max_variants);
        match tokio::time::timeout(self.timeout, generator.generate(&prompt)).await {
            Ok(Ok(text)) => {
                let variants = parse_variants(&text, self.max_variants);
                if variants.is_empty() {
                    warn!(generator = generator.name(), "Rewrite produced no usable variants");
                    return RewriteOutcome::original(query, true, "empty rewrite output");
                }
                debug!(variants = variants.len(), "Query rewritten");
                RewriteOutcome {
                    variants,
                    fell_back: false,
                    reason: None,
                }
            }
            Ok(Err(e)) => {
                warn!(generator = generator.name(), error = %e, "Rewrite failed, using original query");
                RewriteOutcome::original(query, true, e.to_string())
            }
            Err(_) => {
                warn!(
                    generator = generator.name(),
                    timeout_secs = self.timeout.as_secs(),
                    "Rewrite timed out, using original query"
                );
                RewriteOutcome::original(
                    query,
                    true,
                    format!("rewrite timed out after {}s", self.timeout.as_secs()),
                )
            }
        }
    }
}

/// The rewrite instruction sent to the generator.
pub fn build_prompt(query: &str, max_variants: usize) -> String {
    format!(
        "Переформулируй юридический запрос пользователя для поиска в интернете. \
         Дай не более {max_variants} вариантов, каждый на отдельной строке, \
         без нумерации и пояснений. Сохраняй номера дел, названия организаций \
         и ссылки на статьи без изменений.\n\nЗапрос: {query}"
    )
}

/// Extract variant lines from generator output.
///
/// Strips numbering (`1.`, `2)`), bullets and surrounding quotes; drops
/// blank lines, heading lines ending in `:` and case-insensitive duplicates.
pub fn parse_variants(text: &str, max_variants: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for line in text.lines() {
        let cleaned = clean_line(line);
        if cleaned.is_empty() || cleaned.ends_with(':') {
            continue;
        }
        let lowered = cleaned.to_lowercase();
        if out.iter().any(|v| v.to_lowercase() == lowered) {
            continue;
        }
        out.push(cleaned.to_string());
        if out.len() == max_variants {
            break;
        }
    }
    out
}

fn clean_line(line: &str) -> &str {
    let mut s = line.trim();

    let digits = s.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &s[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            s = rest.trim_start();
        }
    }

    s = s.trim_start_matches(BULLETS).trim();
    s.trim_matches(QUOTES).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedGenerator;

    #[test]
    fn parses_numbered_and_bulleted_lines() {
        let text = "Варианты:\n1. неустойка по договору поставки\n2) «взыскание пени с поставщика»\n\n- лишняя строка";
        assert_eq!(
            parse_variants(text, 2),
            vec![
                "неустойка по договору поставки".to_string(),
                "взыскание пени с поставщика".to_string(),
            ]
        );
    }

    #[test]
    fn leading_numbers_without_marker_are_kept() {
        assert_eq!(
            parse_variants("330 ГК РФ неустойка", 2),
            vec!["330 ГК РФ неустойка".to_string()]
        );
    }

    #[test]
    fn duplicates_dropped() {
        let text = "Неустойка\nнеустойка\n\"НЕУСТОЙКА\"\nпеня";
        assert_eq!(parse_variants(text, 3), vec!["Неустойка", "пеня"]);
    }

    #[test]
    fn prompt_mentions_query_and_limit() {
        let prompt = build_prompt("банкротство ООО", 2);
        assert!(prompt.contains("банкротство ООО"));
        assert!(prompt.contains("не более 2"));
    }

    #[tokio::test]
    async fn disabled_returns_original_without_fallback() {
        let outcome = QueryRewriter::disabled().rewrite("вопрос").await;
        assert_eq!(outcome.variants, vec!["вопрос"]);
        assert!(!outcome.fell_back);
    }

    #[tokio::test]
    async fn uses_generator_output() {
        let generator = Arc::new(ScriptedGenerator::reply("1. первый\n2. второй\n3. третий"));
        let rewriter = QueryRewriter::new(Some(generator.clone()), DEFAULT_REWRITE_TIMEOUT, 2);
        let outcome = rewriter.rewrite("вопрос").await;
        assert_eq!(outcome.variants, vec!["первый", "второй"]);
        assert!(!outcome.fell_back);
        assert_eq!(generator.calls().len(), 1);
        assert!(generator.calls()[0].contains("вопрос"));
    }

    #[tokio::test]
    async fn empty_output_falls_back() {
        let rewriter = QueryRewriter::new(
            Some(Arc::new(ScriptedGenerator::reply("  \n\n"))),
            DEFAULT_REWRITE_TIMEOUT,
            2,
        );
        let outcome = rewriter.rewrite("вопрос").await;
        assert_eq!(outcome.variants, vec!["вопрос"]);
        assert!(outcome.fell_back);
    }

    #[tokio::test]
    async fn error_falls_back() {
        let rewriter = QueryRewriter::new(
            Some(Arc::new(ScriptedGenerator::failing())),
            DEFAULT_REWRITE_TIMEOUT,
            2,
        );
        let outcome = rewriter.rewrite("вопрос").await;
        assert_eq!(outcome.variants, vec!["вопрос"]);
        assert!(outcome.fell_back);
        assert!(outcome.reason.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_falls_back() {
        let rewriter = QueryRewriter::new(
            Some(Arc::new(ScriptedGenerator::slow(Duration::from_secs(30), "вариант"))),
            DEFAULT_REWRITE_TIMEOUT,
            2,
        );
        let outcome = rewriter.rewrite("вопрос").await;
        assert_eq!(outcome.variants, vec!["вопрос"]);
        assert!(outcome.fell_back);
        assert!(outcome.reason.unwrap().contains("20s"));
    }
}
