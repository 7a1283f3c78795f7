//! Query classification domain types.
//!
//! A [`QueryClassification`] is produced once per query by the classifier
//! and never mutated afterwards: its fields are private and the only way
//! to build one is through the constructors below, which keep the `type`
//! tag and the entity payload consistent.

use serde::{Deserialize, Serialize};

/// The classification category of a query, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    CaseNumber,
    Company,
    DocType,
    FreeText,
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CaseNumber => write!(f, "case_number"),
            Self::Company => write!(f, "company"),
            Self::DocType => write!(f, "doc_type"),
            Self::FreeText => write!(f, "free_text"),
        }
    }
}

/// A court case number in both alphabets.
///
/// `variants[0]` always starts with the Cyrillic "А", `variants[1]` with
/// the Latin "A"; everything after the first character is identical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseNumber {
    /// The number exactly as it appeared in the text.
    pub raw: String,
    /// The number in its original alphabet with a four-digit year.
    pub normalized: String,
    /// `[cyrillic, latin]`.
    pub variants: [String; 2],
}

impl CaseNumber {
    pub fn cyrillic(&self) -> &str {
        &self.variants[0]
    }

    pub fn latin(&self) -> &str {
        &self.variants[1]
    }
}

/// Kind of a state registration number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationKind {
    /// Taxpayer number: 10 digits (organisation) or 12 (individual).
    Inn,
    /// Primary state registration number of an organisation, 13 digits.
    Ogrn,
    /// Registration number of an individual entrepreneur, 15 digits.
    Ogrnip,
}

impl RegistrationKind {
    /// Field-name suffix used by the court-decision index.
    pub fn field_suffix(&self) -> &'static str {
        match self {
            Self::Inn => "inn",
            Self::Ogrn | Self::Ogrnip => "ogrn",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationNumber {
    pub kind: RegistrationKind,
    pub value: String,
}

/// A company mentioned in a query, by name, by registration number, or both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyEntity {
    /// Legal form plus name, e.g. `ООО Ромашка`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legal_form: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration: Option<RegistrationNumber>,
}

impl CompanyEntity {
    /// The text used for phrase matching: the name if known, else the number.
    pub fn search_text(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or(self.registration.as_ref().map(|r| r.value.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocTypeEntity {
    /// The vocabulary phrase that matched, lowercase.
    pub phrase: String,
}

/// Normalized entities, tagged by the classification that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entities {
    CaseNumber(CaseNumber),
    Company(CompanyEntity),
    DocType(DocTypeEntity),
    None,
}

/// The result of classifying a raw query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryClassification {
    #[serde(rename = "type")]
    query_type: QueryType,
    entities: Entities,
    original_query: String,
}

impl QueryClassification {
    pub fn case_number(query: impl Into<String>, number: CaseNumber) -> Self {
        Self {
            query_type: QueryType::CaseNumber,
            entities: Entities::CaseNumber(number),
            original_query: query.into(),
        }
    }

    pub fn company(query: impl Into<String>, company: CompanyEntity) -> Self {
        Self {
            query_type: QueryType::Company,
            entities: Entities::Company(company),
            original_query: query.into(),
        }
    }

    pub fn doc_type(query: impl Into<String>, phrase: impl Into<String>) -> Self {
        Self {
            query_type: QueryType::DocType,
            entities: Entities::DocType(DocTypeEntity {
                phrase: phrase.into(),
            }),
            original_query: query.into(),
        }
    }

    pub fn free_text(query: impl Into<String>) -> Self {
        Self {
            query_type: QueryType::FreeText,
            entities: Entities::None,
            original_query: query.into(),
        }
    }

    pub fn query_type(&self) -> QueryType {
        self.query_type
    }

    pub fn entities(&self) -> &Entities {
        &self.entities
    }

    pub fn original_query(&self) -> &str {
        &self.original_query
    }

    pub fn case_number_entity(&self) -> Option<&CaseNumber> {
        match &self.entities {
            Entities::CaseNumber(c) => Some(c),
            _ => None,
        }
    }

    pub fn company_entity(&self) -> Option<&CompanyEntity> {
        match &self.entities {
            Entities::Company(c) => Some(c),
            _ => None,
        }
    }

    pub fn doc_type_entity(&self) -> Option<&DocTypeEntity> {
        match &self.entities {
            Entities::DocType(d) => Some(d),
            _ => None,
        }
    }
}
