//! # LexRAG Classifier
//!
//! Turns a raw legal query into a [`QueryClassification`] with normalized
//! entities. Classification is pure and deterministic: no I/O, no state,
//! and the same input always yields the same output.
//!
//! When a query matches several categories, the fixed precedence
//! `case_number > company > doc_type > free_text` decides. The losing
//! matches are still reported by [`classify_detailed`] so callers can log
//! the ambiguity.

pub mod case_number;
pub mod company;
pub mod doc_type;

pub use case_number::{detect_case_number, find_case_numbers, normalize_year, sibling_variant};
pub use company::{detect_company, detect_registration, inn_is_valid, ogrn_is_valid};
pub use doc_type::{DOC_TYPE_VOCABULARY, detect_doc_type};

use lexrag_core::{QueryClassification, QueryType};

/// A classification together with every category the query matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationReport {
    pub classification: QueryClassification,
    /// Matched categories in precedence order; the first one won.
    pub matched: Vec<QueryType>,
}

impl ClassificationReport {
    pub fn is_ambiguous(&self) -> bool {
        self.matched.len() > 1
    }
}

/// Classify a query.
pub fn classify(query: &str) -> QueryClassification {
    classify_detailed(query).classification
}

/// Classify a query, keeping track of lower-precedence matches.
pub fn classify_detailed(query: &str) -> ClassificationReport {
    let case_number = detect_case_number(query);
    let company = detect_company(query);
    let doc_type = detect_doc_type(query);

    let mut matched = Vec::new();
    if case_number.is_some() {
        matched.push(QueryType::CaseNumber);
    }
    if company.is_some() {
        matched.push(QueryType::Company);
    }
    if doc_type.is_some() {
        matched.push(QueryType::DocType);
    }

    let classification = if let Some(number) = case_number {
        QueryClassification::case_number(query, number)
    } else if let Some(company) = company {
        QueryClassification::company(query, company)
    } else if let Some(phrase) = doc_type {
        QueryClassification::doc_type(query, phrase)
    } else {
        QueryClassification::free_text(query)
    };

    if matched.len() > 1 {
        tracing::debug!(
            chosen = %classification.query_type(),
            candidates = ?matched,
            "Ambiguous query classification resolved by precedence"
        );
    }

    ClassificationReport {
        classification,
        matched,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexrag_core::Entities;

    #[test]
    fn scenario_a_case_number() {
        let c = classify("Дело №А65-28469/12");
        assert_eq!(c.query_type(), QueryType::CaseNumber);
        let n = c.case_number_entity().unwrap();
        assert_eq!(
            n.variants,
            ["А65-28469/2012".to_string(), "A65-28469/2012".to_string()]
        );
        assert_eq!(c.original_query(), "Дело №А65-28469/12");
    }

    #[test]
    fn scenario_b_company() {
        let c = classify("ООО Ромашка банкротство");
        assert_eq!(c.query_type(), QueryType::Company);
        assert_eq!(
            c.company_entity().and_then(|e| e.name.as_deref()),
            Some("ООО Ромашка")
        );
    }

    #[test]
    fn doc_type_query() {
        let c = classify("образец апелляционной жалобы или апелляционная жалоба шаблон");
        assert_eq!(c.query_type(), QueryType::DocType);
        assert_eq!(
            c.doc_type_entity().map(|d| d.phrase.as_str()),
            Some("апелляционная жалоба")
        );
    }

    #[test]
    fn free_text_has_no_entities() {
        let c = classify("как взыскать неустойку за просрочку поставки");
        assert_eq!(c.query_type(), QueryType::FreeText);
        assert_eq!(c.entities(), &Entities::None);
    }

    #[test]
    fn empty_query_is_free_text() {
        assert_eq!(classify("").query_type(), QueryType::FreeText);
        assert_eq!(classify("   ").query_type(), QueryType::FreeText);
    }

    #[test]
    fn precedence_case_number_over_company() {
        let report = classify_detailed("ООО Ромашка по делу А40-1234/2020 исковое заявление");
        assert_eq!(
            report.classification.query_type(),
            QueryType::CaseNumber
        );
        assert_eq!(
            report.matched,
            vec![QueryType::CaseNumber, QueryType::Company, QueryType::DocType]
        );
        assert!(report.is_ambiguous());
    }

    #[test]
    fn precedence_company_over_doc_type() {
        let c = classify("исковое заявление к ООО «Вектор»");
        assert_eq!(c.query_type(), QueryType::Company);
    }

    #[test]
    fn classification_is_idempotent() {
        for q in [
            "Дело №А65-28469/12",
            "ООО Ромашка банкротство",
            "ИНН 7707083893",
            "мировое соглашение",
            "неустойка по договору",
        ] {
            assert_eq!(classify(q), classify(q));
        }
    }

    #[test]
    fn classification_serializes_with_type_tag() {
        let c = classify("Дело №А65-28469/12");
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["type"], "case_number");
        assert_eq!(json["entities"]["kind"], "case_number");
    }
}
