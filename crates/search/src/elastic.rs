//! Elasticsearch / OpenSearch backend over the `_search` HTTP API.
//!
//! Translation of a [`QuerySpec`] into the query DSL and parsing of the
//! response are plain functions so they can be tested without a cluster.

use async_trait::async_trait;
use lexrag_core::{Clause, QuerySpec, RawHit, SearchBackend, SearchError};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// A search backend talking to an Elasticsearch-compatible cluster.
pub struct ElasticsearchBackend {
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    client: reqwest::Client,
}

impl ElasticsearchBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: None,
            password: None,
            client,
        }
    }

    /// Use HTTP basic authentication.
    pub fn with_basic_auth(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.username = Some(username.into());
        self.password = password;
        self
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.username {
            Some(user) => builder.basic_auth(user, self.password.as_deref()),
            None => builder,
        }
    }
}

#[async_trait]
impl SearchBackend for ElasticsearchBackend {
    fn name(&self) -> &str {
        "elasticsearch"
    }

    async fn search(
        &self,
        collection: &str,
        query: &QuerySpec,
        size: usize,
    ) -> Result<Vec<RawHit>, SearchError> {
        let url = format!("{}/{}/_search", self.base_url, collection);
        let body = build_request_body(query, size);

        debug!(collection, size, "Sending search request");

        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 404 {
            return Err(SearchError::UnknownCollection(collection.to_string()));
        }

        if !(200..300).contains(&status) {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, collection, body = %error_body, "Search backend returned error");
            return Err(SearchError::Backend {
                status_code: status,
                message: error_body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        parse_hits(body)
    }

    async fn health_check(&self) -> Result<bool, SearchError> {
        let url = format!("{}/_cluster/health", self.base_url);
        let response = self
            .request(reqwest::Method::GET, &url)
            .send()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

// ── Query DSL ──────────────────────────────────────────────────────────────

/// Translate a clause tree into query DSL.
pub fn clause_to_dsl(clause: &Clause) -> Value {
    match clause {
        Clause::Terms { field, values } => json!({ "terms": { field: values } }),
        Clause::Phrase { field, text } => json!({ "match_phrase": { field: text } }),
        Clause::MultiMatch {
            query,
            fields,
            fuzzy,
        } => {
            let fields: Vec<String> = fields
                .iter()
                .map(|f| format!("{}^{}", f.field, f.boost))
                .collect();
            let mut mm = json!({
                "query": query,
                "fields": fields,
                "type": "best_fields",
            });
            if *fuzzy {
                mm["fuzziness"] = json!("AUTO");
            }
            json!({ "multi_match": mm })
        }
        Clause::Bool {
            must,
            should,
            minimum_should_match,
        } => {
            let mut b = Map::new();
            if !must.is_empty() {
                b.insert("must".into(), must.iter().map(clause_to_dsl).collect());
            }
            if !should.is_empty() {
                b.insert("should".into(), should.iter().map(clause_to_dsl).collect());
            }
            if let Some(min) = minimum_should_match {
                b.insert("minimum_should_match".into(), json!(min));
            }
            json!({ "bool": b })
        }
    }
}

/// The full `_search` request body.
pub fn build_request_body(query: &QuerySpec, size: usize) -> Value {
    let mut body = json!({
        "query": clause_to_dsl(&query.clause),
        "size": size,
    });
    if let Some(field) = &query.collapse_field {
        body["collapse"] = json!({ "field": field });
    }
    if !query.highlight_fields.is_empty() {
        let fields: Map<String, Value> = query
            .highlight_fields
            .iter()
            .map(|f| (f.clone(), json!({})))
            .collect();
        body["highlight"] = json!({
            "fields": fields,
            "pre_tags": ["<em>"],
            "post_tags": ["</em>"],
        });
    }
    body
}

#[derive(Deserialize)]
struct ApiResponse {
    hits: ApiHits,
}

#[derive(Deserialize)]
struct ApiHits {
    #[serde(default)]
    hits: Vec<ApiHit>,
}

#[derive(Deserialize)]
struct ApiHit {
    #[serde(rename = "_id", default)]
    id: String,
    #[serde(rename = "_score", default)]
    score: Option<f32>,
    #[serde(rename = "_source", default)]
    source: Map<String, Value>,
    #[serde(default)]
    highlight: BTreeMap<String, Vec<String>>,
}

/// Parse a `_search` response body into raw hits.
pub fn parse_hits(body: Value) -> Result<Vec<RawHit>, SearchError> {
    let parsed: ApiResponse = serde_json::from_value(body)
        .map_err(|e| SearchError::InvalidResponse(format!("Unexpected response shape: {e}")))?;
    Ok(parsed
        .hits
        .hits
        .into_iter()
        .map(|h| RawHit {
            id: h.id,
            score: h.score.unwrap_or(0.0),
            source: h.source,
            highlights: h.highlight,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexrag_core::FieldBoost;

    #[test]
    fn case_number_query_translates_to_bool_should() {
        let spec = QuerySpec::new(Clause::any_of(
            vec![
                Clause::Terms {
                    field: "case_number".into(),
                    values: vec!["А65-1/2012".into(), "A65-1/2012".into()],
                },
                Clause::Phrase {
                    field: "text".into(),
                    text: "А65-1/2012".into(),
                },
            ],
            1,
        ))
        .highlight(&["text"]);

        let body = build_request_body(&spec, 20);
        assert_eq!(body["size"], 20);
        let should = body["query"]["bool"]["should"].as_array().unwrap();
        assert_eq!(should.len(), 2);
        assert_eq!(should[0]["terms"]["case_number"][1], "A65-1/2012");
        assert_eq!(should[1]["match_phrase"]["text"], "А65-1/2012");
        assert_eq!(body["query"]["bool"]["minimum_should_match"], 1);
        assert!(body["query"]["bool"].get("must").is_none());
        assert!(body["highlight"]["fields"]["text"].is_object());
        assert!(body.get("collapse").is_none());
    }

    #[test]
    fn multi_match_carries_boosts_and_fuzziness() {
        let spec = QuerySpec::new(Clause::MultiMatch {
            query: "неустойка".into(),
            fields: vec![FieldBoost::new("title", 3.0), FieldBoost::new("text", 1.0)],
            fuzzy: true,
        })
        .collapse_on("document_id");
        let body = build_request_body(&spec, 5);
        let mm = &body["query"]["multi_match"];
        assert_eq!(mm["fields"][0], "title^3");
        assert_eq!(mm["fields"][1], "text^1");
        assert_eq!(mm["fuzziness"], "AUTO");
        assert_eq!(body["collapse"]["field"], "document_id");
    }

    #[test]
    fn parses_hits_with_highlights_and_null_score() {
        let body = json!({
            "took": 3,
            "hits": {
                "total": {"value": 2},
                "hits": [
                    {"_id": "a", "_score": 1.5, "_source": {"text": "x"},
                     "highlight": {"text": ["<em>x</em>"]}},
                    {"_id": "b", "_score": null, "_source": {"text": "y"}}
                ]
            }
        });
        let hits = parse_hits(body).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].score, 1.5);
        assert_eq!(hits[0].highlights["text"], vec!["<em>x</em>".to_string()]);
        assert_eq!(hits[1].score, 0.0);
    }

    #[test]
    fn malformed_response_is_invalid() {
        let err = parse_hits(json!({"error": "boom"})).unwrap_err();
        assert!(matches!(err, SearchError::InvalidResponse(_)));
    }
}
