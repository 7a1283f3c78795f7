//! Context window assembly.
//!
//! Packs four layers into a token-budgeted message list:
//!
//! 1. **System** prompt: always first, always counted, never trimmed
//! 2. **Current turn**: the query being asked, reserved before anything else
//! 3. **History**: most recent turns first, stop at the first overflow
//! 4. **Evidence**: one `system` block after the conversation, per-provenance
//!    minimums reserved first, then the rest internal-first
//!
//! The rendered order is `[system, history…, current turn, evidence]`.
//! History is budgeted before evidence; the evidence block only gets what
//! the conversation leaves over.
//!
//! # Determinism
//!
//! Identical inputs and tokenizer always produce identical output.

use crate::token::{MESSAGE_OVERHEAD, TokenCounter};
use lexrag_config::ContextConfig;
use lexrag_core::{ChatMessage, ContextMessage, Provenance, Role, SearchResult, truncate_chars};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Heading of the rendered evidence block.
pub const EVIDENCE_HEADER: &str = "Материалы для ответа:";

/// A reserved item shortened below this many characters is dropped instead.
const MIN_SHORTENED_CHARS: usize = 32;

// ── Types ─────────────────────────────────────────────────────────────────

/// Per-provenance evidence rules.
#[derive(Debug, Clone)]
pub struct EvidencePolicy {
    /// Internal items reserved before anything else.
    pub min_internal: usize,
    /// External items reserved before anything else.
    pub min_external: usize,
    /// Hard character ceiling applied to every item.
    pub char_ceiling: usize,
    /// Appended to truncated text.
    pub truncation_marker: String,
}

impl Default for EvidencePolicy {
    fn default() -> Self {
        Self {
            min_internal: 3,
            min_external: 2,
            char_ceiling: 1500,
            truncation_marker: " [...]".into(),
        }
    }
}

impl EvidencePolicy {
    pub fn from_config(config: &ContextConfig, truncation_marker: &str) -> Self {
        Self {
            min_internal: config.min_internal,
            min_external: config.min_external,
            char_ceiling: config.evidence_char_ceiling,
            truncation_marker: truncation_marker.to_string(),
        }
    }
}

/// Everything the assembler needs for one request.
pub struct AssemblyInput<'a> {
    pub system_prompt: &'a str,
    /// Chronological history of earlier turns.
    pub history: &'a [ChatMessage],
    /// The user turn being answered. Never dropped.
    pub query: Option<&'a str>,
    /// Evidence in relevance order.
    pub evidence: &'a [SearchResult],
    /// Total token budget.
    pub budget: usize,
}

/// The assembled context, ready for a chat-completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembledContext {
    pub messages: Vec<ContextMessage>,
    /// Tokens of all inputs before any trimming.
    pub original_tokens: usize,
    /// Tokens of `messages` as rendered.
    pub final_tokens: usize,
    /// Whether anything was dropped or shortened.
    pub truncated: bool,
    pub metadata: AssemblyMetadata,
}

impl AssembledContext {
    /// The evidence block, if one was included.
    pub fn evidence_block(&self) -> Option<&ContextMessage> {
        self.messages
            .iter()
            .skip(1)
            .find(|m| m.role == Role::System && m.content.starts_with(EVIDENCE_HEADER))
    }

    /// The last user or assistant message.
    pub fn last_turn(&self) -> Option<&ContextMessage> {
        self.messages.iter().rev().find(|m| m.role != Role::System)
    }
}

/// Detailed metadata about the assembly process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssemblyMetadata {
    pub budget: usize,
    /// The system prompt alone exceeded the budget.
    pub system_prompt_over_budget: bool,
    /// The system prompt and current turn together exceeded the budget.
    #[serde(default)]
    pub current_turn_over_budget: bool,
    pub per_layer: Vec<LayerStats>,
    pub drops: Vec<DropInfo>,
}

/// Statistics for a single context layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerStats {
    /// Layer name.
    pub name: String,
    /// Tokens consumed by this layer.
    pub tokens: usize,
    /// Items included after budget trimming.
    pub items_included: usize,
    /// Total items available before trimming.
    pub items_total: usize,
    /// Included items whose text was shortened.
    #[serde(default)]
    pub items_truncated: usize,
}

/// Information about items dropped from a layer during budget enforcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropInfo {
    /// Which layer.
    pub layer: String,
    /// Number of items dropped.
    pub items_dropped: usize,
    /// Estimated tokens of dropped content.
    pub tokens_dropped: usize,
    /// Reason for dropping.
    pub reason: String,
}

/// One evidence item after selection.
#[derive(Debug, Clone)]
struct PlacedItem {
    label: String,
    provenance: Provenance,
    text: String,
    shortened: bool,
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// The context assembler. Stateless; create one and reuse it.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    counter: TokenCounter,
    policy: EvidencePolicy,
}

impl ContextAssembler {
    pub fn new(counter: TokenCounter, policy: EvidencePolicy) -> Self {
        Self { counter, policy }
    }

    pub fn counter(&self) -> &TokenCounter {
        &self.counter
    }

    pub fn policy(&self) -> &EvidencePolicy {
        &self.policy
    }

    /// Assemble the context window.
    ///
    /// # Algorithm
    ///
    /// 1. Count the system prompt; it is kept even when it alone exceeds the budget
    /// 2. Reserve the current turn; like the prompt it is never dropped
    /// 3. Fill history newest-first until the first message that does not fit
    /// 4. Enforce role alternation on the conversational part; a trailing user
    ///    turn in history gives way to the current turn
    /// 5. Fill evidence from what remains: reserved minimums, then the rest
    /// 6. Re-count the rendered messages and drop evidence, then the oldest
    ///    history, until they fit
    pub fn assemble(&self, input: &AssemblyInput<'_>) -> AssembledContext {
        let budget = input.budget;
        let mut per_layer = Vec::new();
        let mut drops = Vec::new();

        // Layer 1: system prompt
        let system_tokens = self.counter.count_message(input.system_prompt);
        let system_prompt_over_budget = system_tokens > budget;
        if system_prompt_over_budget {
            warn!(
                system_tokens,
                budget, "System prompt alone exceeds the token budget"
            );
        }
        per_layer.push(LayerStats {
            name: "system".into(),
            tokens: system_tokens,
            items_included: 1,
            items_total: 1,
            items_truncated: 0,
        });
        let mut remaining = budget.saturating_sub(system_tokens);

        // Layer 2: current turn
        let query = input.query.filter(|q| !q.trim().is_empty());
        let query_tokens = query.map_or(0, |q| self.counter.count_message(q));
        let current_turn_over_budget = query.is_some() && system_tokens + query_tokens > budget;
        if current_turn_over_budget {
            warn!(
                query_tokens,
                remaining, "Current turn does not fit the token budget, keeping it anyway"
            );
        }
        if query.is_some() {
            per_layer.push(LayerStats {
                name: "current_turn".into(),
                tokens: query_tokens,
                items_included: 1,
                items_total: 1,
                items_truncated: 0,
            });
        }
        remaining = remaining.saturating_sub(query_tokens);

        // Layer 3: history
        let candidates: Vec<&ChatMessage> = input
            .history
            .iter()
            .filter(|m| m.role != Role::System)
            .collect();
        let skipped_system = input.history.len() - candidates.len();
        if skipped_system > 0 {
            debug!(skipped_system, "System-role history entries skipped");
        }
        let history_total_tokens: usize = candidates.iter().map(|m| self.message_cost(m)).sum();

        let mut history: Vec<&ChatMessage> = Vec::new();
        let mut history_tokens = 0;
        for msg in candidates.iter().rev() {
            let cost = self.message_cost(msg);
            if cost > remaining {
                break;
            }
            remaining -= cost;
            history_tokens += cost;
            history.push(msg);
        }
        history.reverse();
        maybe_drop(
            &mut drops,
            "history",
            candidates.len() - history.len(),
            history_total_tokens - history_tokens,
            "Oldest messages beyond token budget",
        );

        let (mut history, alternation_dropped, alternation_tokens) =
            self.enforce_alternation(history);
        if alternation_dropped > 0 {
            remaining += alternation_tokens;
            history_tokens -= alternation_tokens;
            maybe_drop(
                &mut drops,
                "history",
                alternation_dropped,
                alternation_tokens,
                "Consecutive same-role message",
            );
        }
        if query.is_some() {
            let (superseded, superseded_tokens) = self.yield_to_current_turn(&mut history);
            remaining += superseded_tokens;
            history_tokens -= superseded_tokens;
            maybe_drop(
                &mut drops,
                "history",
                superseded,
                superseded_tokens,
                "Unanswered user turn before the current query",
            );
        }
        per_layer.push(LayerStats {
            name: "history".into(),
            tokens: history_tokens,
            items_included: history.len(),
            items_total: candidates.len(),
            items_truncated: 0,
        });

        // Layer 4: evidence
        let evidence_total_tokens = if input.evidence.is_empty() {
            0
        } else {
            self.counter
                .count_message(&render_evidence(&self.untrimmed(input.evidence)))
        };
        let mut placed = self.select_evidence(input.evidence, remaining);

        // Render, then verify against the real count.
        let mut messages = self.render(input.system_prompt, &history, query, &placed);
        let limit = budget.max(system_tokens + query_tokens);
        let mut final_tokens = rendered_tokens(&self.counter, &messages);
        let mut verification_dropped = 0;
        while final_tokens > limit && !placed.is_empty() {
            placed.pop();
            verification_dropped += 1;
            messages = self.render(input.system_prompt, &history, query, &placed);
            final_tokens = rendered_tokens(&self.counter, &messages);
        }
        if verification_dropped > 0 {
            debug!(verification_dropped, "Evidence trimmed after re-count");
        }
        while final_tokens > limit && !history.is_empty() {
            history.remove(0);
            let (kept, _, _) = self.enforce_alternation(history);
            history = kept;
            messages = self.render(input.system_prompt, &history, query, &placed);
            final_tokens = rendered_tokens(&self.counter, &messages);
        }

        let evidence_tokens = if placed.is_empty() {
            0
        } else {
            self.counter.count_message(&render_evidence(&placed))
        };
        let shortened = placed.iter().filter(|p| p.shortened).count();
        maybe_drop(
            &mut drops,
            "evidence",
            input.evidence.len() - placed.len(),
            evidence_total_tokens.saturating_sub(evidence_tokens),
            "Lowest-priority evidence beyond token budget",
        );
        per_layer.push(LayerStats {
            name: "evidence".into(),
            tokens: evidence_tokens,
            items_included: placed.len(),
            items_total: input.evidence.len(),
            items_truncated: shortened,
        });

        let original_tokens =
            system_tokens + query_tokens + history_total_tokens + evidence_total_tokens;
        let truncated = !drops.is_empty() || shortened > 0;

        debug!(
            budget,
            original_tokens,
            final_tokens,
            messages = messages.len(),
            evidence = placed.len(),
            truncated,
            "Context assembled"
        );

        AssembledContext {
            messages,
            original_tokens,
            final_tokens,
            truncated,
            metadata: AssemblyMetadata {
                budget,
                system_prompt_over_budget,
                current_turn_over_budget,
                per_layer,
                drops,
            },
        }
    }

    fn message_cost(&self, msg: &ChatMessage) -> usize {
        match msg.token_count {
            Some(tokens) => MESSAGE_OVERHEAD + tokens,
            None => self.counter.count_message(&msg.content),
        }
    }

    /// Drop the later of two consecutive same-role messages, and any leading
    /// assistant turns. Returns the kept messages, count and tokens dropped.
    fn enforce_alternation<'m>(
        &self,
        history: Vec<&'m ChatMessage>,
    ) -> (Vec<&'m ChatMessage>, usize, usize) {
        let mut kept: Vec<&ChatMessage> = Vec::with_capacity(history.len());
        let mut dropped = 0;
        let mut tokens = 0;
        for msg in history {
            let repeats = kept.last().is_some_and(|prev| prev.role == msg.role);
            let leading_assistant = kept.is_empty() && msg.role == Role::Assistant;
            if repeats || leading_assistant {
                dropped += 1;
                tokens += self.message_cost(msg);
                continue;
            }
            kept.push(msg);
        }
        (kept, dropped, tokens)
    }

    /// Pop a trailing user turn so the current query follows an assistant
    /// turn or opens the conversation. Returns the count and tokens dropped.
    fn yield_to_current_turn(&self, history: &mut Vec<&ChatMessage>) -> (usize, usize) {
        let mut dropped = 0;
        let mut tokens = 0;
        while let Some(msg) = history.pop_if(|m| m.role == Role::User) {
            dropped += 1;
            tokens += self.message_cost(msg);
        }
        (dropped, tokens)
    }

    /// Every item cut at the character ceiling, in input order.
    fn untrimmed(&self, evidence: &[SearchResult]) -> Vec<PlacedItem> {
        evidence.iter().map(|r| self.place(r)).collect()
    }

    fn place(&self, result: &SearchResult) -> PlacedItem {
        let (text, shortened) = truncate_chars(
            &result.text,
            self.policy.char_ceiling,
            &self.policy.truncation_marker,
        );
        PlacedItem {
            label: result.label(),
            provenance: result.provenance(),
            text,
            shortened,
        }
    }

    /// Choose evidence items within `available` tokens.
    fn select_evidence(&self, evidence: &[SearchResult], available: usize) -> Vec<PlacedItem> {
        if evidence.is_empty() {
            return Vec::new();
        }
        let fixed = MESSAGE_OVERHEAD + self.counter.count(EVIDENCE_HEADER);
        if fixed >= available {
            debug!(available, "No room for evidence");
            return Vec::new();
        }
        let mut remaining = available - fixed;

        let (reserved, rest) = self.priority_order(evidence);
        let mut placed: Vec<PlacedItem> = Vec::new();

        for result in reserved {
            let item = self.place(result);
            let cost = self.item_cost(placed.len() + 1, &item);
            if cost <= remaining {
                remaining -= cost;
                placed.push(item);
            } else if let Some(item) = self.shorten_to_fit(placed.len() + 1, result, remaining) {
                remaining -= self.item_cost(placed.len() + 1, &item);
                placed.push(item);
            }
        }
        for result in rest {
            let item = self.place(result);
            let cost = self.item_cost(placed.len() + 1, &item);
            if cost <= remaining {
                remaining -= cost;
                placed.push(item);
            }
        }
        placed
    }

    /// Split evidence into the reserved interleaving and the remainder.
    fn priority_order<'r>(
        &self,
        evidence: &'r [SearchResult],
    ) -> (Vec<&'r SearchResult>, Vec<&'r SearchResult>) {
        let internal: Vec<&SearchResult> = evidence
            .iter()
            .filter(|r| r.provenance() == Provenance::Internal)
            .collect();
        let external: Vec<&SearchResult> = evidence
            .iter()
            .filter(|r| r.provenance() == Provenance::External)
            .collect();

        let reserve_internal = self.policy.min_internal.min(internal.len());
        let reserve_external = self.policy.min_external.min(external.len());

        let mut reserved = Vec::with_capacity(reserve_internal + reserve_external);
        for i in 0..reserve_internal.max(reserve_external) {
            if i < reserve_internal {
                reserved.push(internal[i]);
            }
            if i < reserve_external {
                reserved.push(external[i]);
            }
        }
        let rest = internal[reserve_internal..]
            .iter()
            .chain(external[reserve_external..].iter())
            .copied()
            .collect();
        (reserved, rest)
    }

    fn item_cost(&self, position: usize, item: &PlacedItem) -> usize {
        self.counter.count(&render_item(position, item))
    }

    /// Longest prefix of the item text that fits `available` tokens.
    fn shorten_to_fit(
        &self,
        position: usize,
        result: &SearchResult,
        available: usize,
    ) -> Option<PlacedItem> {
        let base = self.place(result);
        let total_chars = base.text.chars().count();
        let marker = &self.policy.truncation_marker;
        let floor = MIN_SHORTENED_CHARS + marker.chars().count();
        if total_chars <= floor {
            return None;
        }

        let candidate = |ceiling: usize| {
            let (text, _) = truncate_chars(&result.text, ceiling, marker);
            PlacedItem {
                text,
                shortened: true,
                ..base.clone()
            }
        };

        let (mut lo, mut hi) = (floor, total_chars - 1);
        if self.item_cost(position, &candidate(lo)) > available {
            return None;
        }
        while lo < hi {
            let mid = lo + (hi - lo).div_ceil(2);
            if self.item_cost(position, &candidate(mid)) <= available {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        debug!(
            label = %base.label,
            kept_chars = lo,
            "Reserved evidence item shortened to fit"
        );
        Some(candidate(lo))
    }

    fn render(
        &self,
        system_prompt: &str,
        history: &[&ChatMessage],
        query: Option<&str>,
        placed: &[PlacedItem],
    ) -> Vec<ContextMessage> {
        let mut messages = Vec::with_capacity(history.len() + 3);
        messages.push(ContextMessage::new(Role::System, system_prompt));
        messages.extend(history.iter().map(|m| ContextMessage::from(*m)));
        if let Some(query) = query {
            messages.push(ContextMessage::new(Role::User, query));
        }
        if !placed.is_empty() {
            messages.push(ContextMessage::new(Role::System, render_evidence(placed)));
        }
        messages
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(TokenCounter::default(), EvidencePolicy::default())
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────

fn render_item(position: usize, item: &PlacedItem) -> String {
    format!(
        "[{position}] ({}) {}\n{}",
        item.provenance, item.label, item.text
    )
}

fn render_evidence(items: &[PlacedItem]) -> String {
    let mut out = String::from(EVIDENCE_HEADER);
    for (i, item) in items.iter().enumerate() {
        out.push_str("\n\n");
        out.push_str(&render_item(i + 1, item));
    }
    out
}

fn rendered_tokens(counter: &TokenCounter, messages: &[ContextMessage]) -> usize {
    messages
        .iter()
        .map(|m| counter.count_message(&m.content))
        .sum()
}

fn maybe_drop(
    drops: &mut Vec<DropInfo>,
    layer: &str,
    dropped: usize,
    tokens_dropped: usize,
    reason: &str,
) {
    if dropped > 0 {
        drops.push(DropInfo {
            layer: layer.into(),
            items_dropped: dropped,
            tokens_dropped,
            reason: reason.into(),
        });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn assembler() -> ContextAssembler {
        ContextAssembler::default()
    }

    fn internal(doc: &str, text: &str) -> SearchResult {
        SearchResult::internal("court_decisions", doc, 0, text, 1.0)
    }

    fn external(url: &str, text: &str) -> SearchResult {
        SearchResult::external(url, "", text, 1.0)
    }

    fn words(n: usize) -> String {
        vec!["слово"; n].join(" ")
    }

    fn roles(ctx: &AssembledContext) -> Vec<Role> {
        ctx.messages.iter().map(|m| m.role).collect()
    }

    #[test]
    fn system_prompt_always_first() {
        let history = vec![ChatMessage::user("Вопрос")];
        let ctx = assembler().assemble(&AssemblyInput {
            system_prompt: "Ты юридический ассистент.",
            history: &history,
            query: None,
            evidence: &[],
            budget: 1000,
        });
        assert_eq!(ctx.messages[0].role, Role::System);
        assert_eq!(ctx.messages[0].content, "Ты юридический ассистент.");
        assert_eq!(ctx.messages.last().unwrap().content, "Вопрос");
        assert!(!ctx.truncated);
        assert_eq!(ctx.original_tokens, ctx.final_tokens);
    }

    #[test]
    fn system_prompt_over_budget_is_kept() {
        let history = vec![ChatMessage::user("Вопрос")];
        let evidence = vec![internal("d1", "текст")];
        let prompt = words(50);
        let ctx = assembler().assemble(&AssemblyInput {
            system_prompt: &prompt,
            history: &history,
            query: None,
            evidence: &evidence,
            budget: 10,
        });
        assert_eq!(ctx.messages.len(), 1);
        assert_eq!(ctx.messages[0].content, prompt);
        assert!(ctx.metadata.system_prompt_over_budget);
        assert_eq!(ctx.final_tokens, 54);
        assert!(ctx.truncated);
    }

    #[test]
    fn history_consecutive_same_role_dropped() {
        let history = vec![
            ChatMessage::user("первый"),
            ChatMessage::user("второй"),
            ChatMessage::assistant("ответ"),
        ];
        let ctx = assembler().assemble(&AssemblyInput {
            system_prompt: "S",
            history: &history,
            query: None,
            evidence: &[],
            budget: 1000,
        });
        assert_eq!(roles(&ctx), vec![Role::System, Role::User, Role::Assistant]);
        assert_eq!(ctx.messages[1].content, "первый");
        assert!(ctx.truncated);
        assert!(ctx.metadata.drops.iter().any(|d| d.reason.contains("same-role")));
    }

    #[test]
    fn conversation_never_starts_with_assistant() {
        let history = vec![
            ChatMessage::user(words(100)),
            ChatMessage::assistant("ответ"),
            ChatMessage::user("новый вопрос"),
        ];
        // Room for the last two messages only; the assistant turn then leads.
        let ctx = assembler().assemble(&AssemblyInput {
            system_prompt: "S",
            history: &history,
            query: None,
            evidence: &[],
            budget: 20,
        });
        assert_eq!(roles(&ctx), vec![Role::System, Role::User]);
        assert_eq!(ctx.messages[1].content, "новый вопрос");
    }

    #[test]
    fn history_scan_stops_at_first_overflow() {
        let history = vec![
            ChatMessage::user("короткий"),
            ChatMessage::assistant(words(100)),
            ChatMessage::user("вопрос"),
        ];
        let ctx = assembler().assemble(&AssemblyInput {
            system_prompt: "S",
            history: &history,
            query: None,
            evidence: &[],
            budget: 30,
        });
        // The older short message would fit but is behind the overflow.
        assert_eq!(roles(&ctx), vec![Role::System, Role::User]);
        assert_eq!(ctx.messages[1].content, "вопрос");
    }

    #[test]
    fn system_history_entries_skipped() {
        let history = vec![ChatMessage::system("старый промпт"), ChatMessage::user("вопрос")];
        let ctx = assembler().assemble(&AssemblyInput {
            system_prompt: "S",
            history: &history,
            query: None,
            evidence: &[],
            budget: 100,
        });
        assert_eq!(roles(&ctx), vec![Role::System, Role::User]);
    }

    #[test]
    fn evidence_block_follows_conversation() {
        let history = vec![ChatMessage::user("Привет"), ChatMessage::assistant("Здравствуйте")];
        let evidence = vec![internal("d1", "Статья 330 ГК РФ"), external("https://sudact.ru/1", "Решение")];
        let ctx = assembler().assemble(&AssemblyInput {
            system_prompt: "S",
            history: &history,
            query: Some("неустойка"),
            evidence: &evidence,
            budget: 1000,
        });
        assert_eq!(
            roles(&ctx),
            vec![Role::System, Role::User, Role::Assistant, Role::User, Role::System]
        );
        assert_eq!(ctx.messages[1].content, "Привет");
        let block = ctx.evidence_block().unwrap();
        assert_eq!(block, ctx.messages.last().unwrap());
        assert!(block.content.contains("[1] (internal)"));
        assert!(block.content.contains("[2] (external) https://sudact.ru/1"));
        assert_eq!(ctx.last_turn().unwrap().content, "неустойка");
    }

    #[test]
    fn current_query_replaces_unanswered_user_turn() {
        let history = vec![ChatMessage::user("старый вопрос без ответа")];
        let ctx = assembler().assemble(&AssemblyInput {
            system_prompt: "S",
            history: &history,
            query: Some("неустойка по договору поставки"),
            evidence: &[],
            budget: 4000,
        });
        assert_eq!(roles(&ctx), vec![Role::System, Role::User]);
        assert_eq!(ctx.messages[1].content, "неустойка по договору поставки");
        assert!(ctx.truncated);
        assert!(
            ctx.metadata
                .drops
                .iter()
                .any(|d| d.layer == "history" && d.reason.starts_with("Unanswered"))
        );
    }

    #[test]
    fn current_query_follows_answered_history() {
        let history = vec![
            ChatMessage::user("первый"),
            ChatMessage::user("второй"),
            ChatMessage::assistant("ответ"),
        ];
        let ctx = assembler().assemble(&AssemblyInput {
            system_prompt: "S",
            history: &history,
            query: Some("новый вопрос"),
            evidence: &[],
            budget: 1000,
        });
        let contents: Vec<&str> = ctx.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["S", "первый", "ответ", "новый вопрос"]);
    }

    #[test]
    fn oversized_query_is_kept() {
        let history = vec![ChatMessage::user("раньше"), ChatMessage::assistant("ответ")];
        let evidence = vec![internal("d1", "Статья 330 ГК РФ")];
        let query = words(100);
        let ctx = assembler().assemble(&AssemblyInput {
            system_prompt: "S",
            history: &history,
            query: Some(&query),
            evidence: &evidence,
            budget: 20,
        });
        assert_eq!(roles(&ctx), vec![Role::System, Role::User]);
        assert_eq!(ctx.messages[1].content, query);
        assert!(ctx.metadata.current_turn_over_budget);
        assert!(!ctx.metadata.system_prompt_over_budget);
        assert_eq!(ctx.final_tokens, 5 + 104);
        assert!(ctx.evidence_block().is_none());
        assert!(ctx.truncated);
    }

    #[test]
    fn query_is_reserved_before_history() {
        // Room for the prompt, the query and the two newest short turns.
        let history = vec![
            ChatMessage::user("а"),
            ChatMessage::assistant("б"),
            ChatMessage::user("в"),
            ChatMessage::assistant("г"),
        ];
        let ctx = assembler().assemble(&AssemblyInput {
            system_prompt: "S",
            history: &history,
            query: Some("вопрос"),
            evidence: &[],
            budget: 20,
        });
        let contents: Vec<&str> = ctx.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["S", "в", "г", "вопрос"]);
        assert_eq!(ctx.final_tokens, 20);
    }

    #[test]
    fn reserved_minimums_interleave_internal_first() {
        let a = assembler();
        let evidence = vec![
            internal("i1", "a"),
            internal("i2", "b"),
            internal("i3", "c"),
            internal("i4", "d"),
            external("https://e1", "e"),
            external("https://e2", "f"),
            external("https://e3", "g"),
        ];
        let (reserved, rest) = a.priority_order(&evidence);
        let labels: Vec<String> = reserved.iter().map(|r| r.label()).collect();
        assert_eq!(
            labels,
            vec![
                "court_decisions/i1",
                "https://e1",
                "court_decisions/i2",
                "https://e2",
                "court_decisions/i3",
            ]
        );
        let rest: Vec<String> = rest.iter().map(|r| r.label()).collect();
        assert_eq!(rest, vec!["court_decisions/i4", "https://e3"]);
    }

    #[test]
    fn reserved_external_survives_tight_budget() {
        let history = vec![ChatMessage::user("вопрос")];
        let evidence = vec![
            internal("i1", &words(10)),
            internal("i2", &words(10)),
            internal("i3", &words(10)),
            internal("i4", &words(10)),
            external("https://e1", &words(5)),
        ];
        let ctx = assembler().assemble(&AssemblyInput {
            system_prompt: "S",
            history: &history,
            query: None,
            evidence: &evidence,
            budget: 60,
        });
        let block = ctx.evidence_block().unwrap();
        assert!(block.content.contains("https://e1"));
        assert!(!block.content.contains("i4"));
        assert!(ctx.final_tokens <= 60);
    }

    #[test]
    fn reserved_item_shortened_to_fit() {
        let history = vec![ChatMessage::user("вопрос")];
        let evidence = vec![internal("i1", &words(200))];
        let ctx = assembler().assemble(&AssemblyInput {
            system_prompt: "S",
            history: &history,
            query: None,
            evidence: &evidence,
            budget: 80,
        });
        let block = ctx.evidence_block().unwrap();
        assert!(block.content.ends_with(" [...]"));
        assert!(ctx.final_tokens <= 80);
        let stats = ctx.metadata.per_layer.iter().find(|l| l.name == "evidence").unwrap();
        assert_eq!(stats.items_included, 1);
        assert_eq!(stats.items_truncated, 1);
        assert!(ctx.truncated);
    }

    #[test]
    fn evidence_cut_at_char_ceiling() {
        let a = ContextAssembler::new(
            TokenCounter::heuristic(),
            EvidencePolicy {
                char_ceiling: 20,
                ..EvidencePolicy::default()
            },
        );
        let evidence = vec![internal("i1", &"а".repeat(100))];
        let ctx = a.assemble(&AssemblyInput {
            system_prompt: "S",
            history: &[],
            query: None,
            evidence: &evidence,
            budget: 1000,
        });
        let block = ctx.evidence_block().unwrap();
        let body = block.content.rsplit('\n').next().unwrap();
        assert_eq!(body.chars().count(), 20);
        assert!(body.ends_with(" [...]"));
    }

    #[test]
    fn cached_token_counts_are_used() {
        let history = vec![ChatMessage::user("вопрос").with_token_count(500)];
        let ctx = assembler().assemble(&AssemblyInput {
            system_prompt: "S",
            history: &history,
            query: None,
            evidence: &[],
            budget: 100,
        });
        assert_eq!(ctx.messages.len(), 1);
        assert_eq!(ctx.original_tokens, 5 + 504);
    }

    #[test]
    fn deterministic() {
        let history = vec![ChatMessage::user("a"), ChatMessage::assistant("b"), ChatMessage::user("c")];
        let evidence = vec![internal("i1", &words(20)), external("https://e", &words(20))];
        let input = AssemblyInput {
            system_prompt: "S",
            history: &history,
            query: None,
            evidence: &evidence,
            budget: 50,
        };
        let a = assembler().assemble(&input);
        let b = assembler().assemble(&input);
        assert_eq!(a.messages, b.messages);
        assert_eq!(a.final_tokens, b.final_tokens);
    }

    #[test]
    fn budget_and_alternation_hold_across_inputs() {
        // Small linear congruential generator for reproducible inputs.
        let mut state: u64 = 0x2545_f491;
        let mut next = |bound: u64| {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            ((state >> 33) % bound) as usize
        };

        let a = assembler();
        for _ in 0..300 {
            let history: Vec<ChatMessage> = (0..next(8))
                .map(|_| {
                    let text = words(next(40) + 1);
                    match next(3) {
                        0 => ChatMessage::user(text),
                        1 => ChatMessage::assistant(text),
                        _ => ChatMessage::system(text),
                    }
                })
                .collect();
            let evidence: Vec<SearchResult> = (0..next(8))
                .map(|i| {
                    let text = words(next(300) + 1);
                    if next(2) == 0 {
                        internal(&format!("d{i}"), &text)
                    } else {
                        external(&format!("https://site/{i}"), &text)
                    }
                })
                .collect();
            let prompt = words(next(30) + 1);
            let query = (next(3) > 0).then(|| words(next(60) + 1));
            let budget = next(400);

            let ctx = a.assemble(&AssemblyInput {
                system_prompt: &prompt,
                history: &history,
                query: query.as_deref(),
                evidence: &evidence,
                budget,
            });

            let system_tokens = a.counter().count_message(&prompt);
            let query_tokens = query.as_deref().map_or(0, |q| a.counter().count_message(q));
            assert!(ctx.final_tokens <= budget.max(system_tokens + query_tokens));
            assert_eq!(ctx.final_tokens, rendered_tokens(a.counter(), &ctx.messages));
            if let Some(query) = &query {
                assert_eq!(&ctx.last_turn().unwrap().content, query);
            }

            let conversation: Vec<Role> = ctx
                .messages
                .iter()
                .map(|m| m.role)
                .filter(|r| *r != Role::System)
                .collect();
            assert!(conversation.windows(2).all(|w| w[0] != w[1]));
            assert_ne!(conversation.first(), Some(&Role::Assistant));
        }
    }

    #[test]
    fn metadata_serializes() {
        let ctx = assembler().assemble(&AssemblyInput {
            system_prompt: "S",
            history: &[],
            query: None,
            evidence: &[],
            budget: 10,
        });
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["metadata"]["per_layer"][0]["name"], "system");
        assert_eq!(json["truncated"], false);
    }
}
