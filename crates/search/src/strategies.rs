//! Query construction and post-processing for each search strategy.

use crate::collections::{CASE_NUMBER_FIELD, CollectionAdapter, DOCUMENT_ID_FIELD, PARTY_FIELDS};
use lexrag_core::{CaseNumber, Clause, CompanyEntity, QuerySpec, SearchResult, Source};
use serde_json::Value;

/// Chunks fetched per requested document when reassembling decisions.
pub const CHUNKS_PER_DOCUMENT: usize = 20;

/// Separator placed between reassembled chunks.
pub const CHUNK_SEPARATOR: &str = "\n";

// ── case_number ────────────────────────────────────────────────────────────

/// Exact match on the case-number field with every variant, OR a phrase
/// match of any variant in the full-text fields.
pub fn case_number_query(number: &CaseNumber, adapter: &CollectionAdapter) -> QuerySpec {
    let mut should = vec![Clause::Terms {
        field: CASE_NUMBER_FIELD.into(),
        values: number.variants.to_vec(),
    }];
    for field in adapter.full_text_fields() {
        for variant in &number.variants {
            should.push(Clause::Phrase {
                field: field.clone(),
                text: variant.clone(),
            });
        }
    }
    QuerySpec::new(Clause::any_of(should, 1)).highlight(&[adapter.schema().text_field])
}

/// Merge chunk hits into one result per document.
///
/// Documents keep the order of their best-ranked chunk; chunks inside a
/// document are concatenated in ascending `chunk_id` order. At most
/// `limit` documents are returned.
pub fn group_by_document(hits: Vec<SearchResult>, limit: usize) -> Vec<SearchResult> {
    let mut groups: Vec<(String, Vec<SearchResult>)> = Vec::new();
    for hit in hits {
        let Some(doc) = hit.document_id().map(str::to_string) else {
            continue;
        };
        match groups.iter_mut().find(|(id, _)| *id == doc) {
            Some((_, chunks)) => chunks.push(hit),
            None => groups.push((doc, vec![hit])),
        }
    }

    groups
        .into_iter()
        .take(limit)
        .filter_map(|(_, chunks)| merge_chunks(chunks))
        .collect()
}

fn chunk_id(result: &SearchResult) -> u64 {
    match result.source {
        Source::Internal { chunk_id, .. } => chunk_id,
        Source::External { .. } => 0,
    }
}

fn merge_chunks(mut chunks: Vec<SearchResult>) -> Option<SearchResult> {
    let best_score = chunks.iter().map(|c| c.score).fold(f32::MIN, f32::max);
    let best_metadata = chunks.first()?.metadata.clone();
    chunks.sort_by_key(chunk_id);

    let chunk_count = chunks.len();
    let mut iter = chunks.into_iter();
    let mut merged = iter.next()?;
    for chunk in iter {
        if !chunk.text.is_empty() {
            if !merged.text.is_empty() {
                merged.text.push_str(CHUNK_SEPARATOR);
            }
            merged.text.push_str(&chunk.text);
        }
        for h in chunk.highlights {
            if !merged.highlights.contains(&h) {
                merged.highlights.push(h);
            }
        }
    }
    merged.score = best_score;
    merged.metadata = best_metadata;
    merged
        .metadata
        .insert("chunks".into(), Value::from(chunk_count));
    Some(merged)
}

// ── company ────────────────────────────────────────────────────────────────

/// OR across party and full-text fields, collapsed by document.
///
/// Returns `None` when the entity carries nothing to search for.
pub fn company_query(company: &CompanyEntity, adapter: &CollectionAdapter) -> Option<QuerySpec> {
    let mut should = Vec::new();

    if let Some(name) = &company.name {
        for field in PARTY_FIELDS {
            should.push(Clause::Phrase {
                field: (*field).into(),
                text: name.clone(),
            });
        }
        should.push(Clause::Phrase {
            field: adapter.schema().text_field.into(),
            text: name.clone(),
        });
    }

    if let Some(reg) = &company.registration {
        for party in PARTY_FIELDS {
            should.push(Clause::Terms {
                field: format!("{party}_{}", reg.kind.field_suffix()),
                values: vec![reg.value.clone()],
            });
        }
        should.push(Clause::Phrase {
            field: adapter.schema().text_field.into(),
            text: reg.value.clone(),
        });
    }

    if should.is_empty() {
        return None;
    }
    Some(
        QuerySpec::new(Clause::any_of(should, 1))
            .collapse_on(DOCUMENT_ID_FIELD)
            .highlight(&[adapter.schema().text_field]),
    )
}

// ── doc_type ───────────────────────────────────────────────────────────────

/// Weighted multi-field match of the document-type phrase.
pub fn doc_type_query(phrase: &str, adapter: &CollectionAdapter) -> QuerySpec {
    QuerySpec::new(Clause::MultiMatch {
        query: phrase.to_string(),
        fields: adapter.free_text_fields(),
        fuzzy: true,
    })
    .collapse_on(DOCUMENT_ID_FIELD)
}

/// The number of document-type results: the cap, never above `top_n`.
pub fn doc_type_limit(cap: usize, top_n: usize) -> usize {
    cap.min(top_n)
}

// ── free_text ──────────────────────────────────────────────────────────────

pub fn free_text_query(query: &str, adapter: &CollectionAdapter) -> QuerySpec {
    QuerySpec::new(Clause::MultiMatch {
        query: query.to_string(),
        fields: adapter.free_text_fields(),
        fuzzy: true,
    })
    .highlight(&[adapter.schema().text_field])
}

/// Split `top_n` across `collections` slots: an equal floor share each,
/// with the remainder added to the `designated` slot.
pub fn allocate(top_n: usize, collections: usize, designated: usize) -> Vec<usize> {
    if collections == 0 {
        return Vec::new();
    }
    let base = top_n / collections;
    let remainder = top_n % collections;
    let mut out = vec![base; collections];
    let slot = if designated < collections { designated } else { 0 };
    out[slot] += remainder;
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexrag_config::CollectionKind;
    use lexrag_core::{RegistrationKind, RegistrationNumber};

    fn decisions() -> CollectionAdapter {
        CollectionAdapter::new("court_decisions", CollectionKind::CourtDecisions)
    }

    #[test]
    fn scenario_c_even_split() {
        assert_eq!(allocate(10, 5, 0), vec![2, 2, 2, 2, 2]);
    }

    #[test]
    fn remainder_goes_to_designated() {
        assert_eq!(allocate(12, 5, 2), vec![2, 2, 4, 2, 2]);
        assert_eq!(allocate(3, 5, 4), vec![0, 0, 0, 0, 3]);
        assert_eq!(allocate(7, 3, 9), vec![3, 2, 2]);
        assert!(allocate(10, 0, 0).is_empty());
    }

    #[test]
    fn allocation_always_sums_to_top_n() {
        for top_n in 0..40 {
            for n in 1..8 {
                assert_eq!(allocate(top_n, n, n - 1).iter().sum::<usize>(), top_n);
            }
        }
    }

    #[test]
    fn case_number_query_uses_both_variants() {
        let number = CaseNumber {
            raw: "А65-28469/12".into(),
            normalized: "А65-28469/2012".into(),
            variants: ["А65-28469/2012".into(), "A65-28469/2012".into()],
        };
        let spec = case_number_query(&number, &decisions());
        match spec.clause {
            Clause::Bool {
                should,
                minimum_should_match,
                ..
            } => {
                assert_eq!(minimum_should_match, Some(1));
                // terms + 2 fields x 2 variants
                assert_eq!(should.len(), 5);
                match &should[0] {
                    Clause::Terms { field, values } => {
                        assert_eq!(field, "case_number");
                        assert_eq!(values.len(), 2);
                    }
                    other => panic!("Expected Terms, got {other:?}"),
                }
            }
            other => panic!("Expected Bool, got {other:?}"),
        }
    }

    #[test]
    fn chunks_concatenated_in_chunk_order() {
        let hits = vec![
            SearchResult::internal("c", "d1", 2, "третий", 3.0),
            SearchResult::internal("c", "d2", 0, "другое", 2.5),
            SearchResult::internal("c", "d1", 0, "первый", 1.0),
            SearchResult::internal("c", "d1", 1, "второй", 0.5),
        ];
        let docs = group_by_document(hits, 10);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].document_id(), Some("d1"));
        assert_eq!(docs[0].text, "первый\nвторой\nтретий");
        assert_eq!(docs[0].score, 3.0);
        assert_eq!(docs[0].metadata["chunks"], 3);
        assert_eq!(docs[1].document_id(), Some("d2"));
    }

    #[test]
    fn grouping_respects_document_limit() {
        let hits = (0..5)
            .map(|i| SearchResult::internal("c", format!("d{i}"), 0, "t", 1.0))
            .collect();
        assert_eq!(group_by_document(hits, 3).len(), 3);
    }

    #[test]
    fn company_query_by_name_and_inn() {
        let company = CompanyEntity {
            name: Some("ООО Ромашка".into()),
            legal_form: Some("ООО".into()),
            registration: Some(RegistrationNumber {
                kind: RegistrationKind::Inn,
                value: "7707083893".into(),
            }),
        };
        let spec = company_query(&company, &decisions()).unwrap();
        assert_eq!(spec.collapse_field.as_deref(), Some("document_id"));
        let Clause::Bool { should, .. } = spec.clause else {
            panic!("Expected Bool");
        };
        assert!(should.iter().any(|c| matches!(
            c,
            Clause::Terms { field, .. } if field == "defendant_inn"
        )));
        assert!(should.iter().any(|c| matches!(
            c,
            Clause::Phrase { field, text } if field == "claimant" && text == "ООО Ромашка"
        )));
    }

    #[test]
    fn empty_company_has_no_query() {
        let company = CompanyEntity {
            name: None,
            legal_form: None,
            registration: None,
        };
        assert!(company_query(&company, &decisions()).is_none());
    }

    #[test]
    fn doc_type_limit_never_exceeds_top_n() {
        assert_eq!(doc_type_limit(5, 10), 5);
        assert_eq!(doc_type_limit(5, 3), 3);
    }
}
