//! Entity search against the Wikidata `wbsearchentities` API.
//!
//! Searches are fire-once: no retry, and any transport, status or decoding
//! failure degrades to an empty candidate list. Callers treat "no
//! candidates" as "leave the text unresolved".

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// A knowledge-base entity returned for a text query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateEntity {
    /// Stable knowledge-base key (e.g. `Q90`).
    pub id: String,
    /// Display label.
    #[serde(default)]
    pub label: String,
    /// Short description; absent for some entities.
    #[serde(default)]
    pub description: Option<String>,
}

impl CandidateEntity {
    /// Create a candidate.
    #[must_use]
    pub fn new(id: impl Into<String>, label: impl Into<String>, description: Option<&str>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: description.map(ToString::to_string),
        }
    }
}

/// Entity search capability: text in, ranked candidates out.
#[async_trait]
pub trait EntitySearch: Send + Sync + std::fmt::Debug {
    /// Candidates for `query`, in the service's relevance order.
    async fn search(&self, query: &str) -> Vec<CandidateEntity>;
}

/// Run several queries and union their results in order, keeping the first
/// occurrence of each id.
pub async fn search_union(search: &dyn EntitySearch, queries: &[String]) -> Vec<CandidateEntity> {
    let mut merged: Vec<CandidateEntity> = Vec::new();
    for query in queries {
        for candidate in search.search(query).await {
            if !merged.iter().any(|c| c.id == candidate.id) {
                merged.push(candidate);
            }
        }
    }
    merged
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    search: Vec<CandidateEntity>,
}

/// Client for the Wikidata entity search endpoint.
#[derive(Debug, Clone)]
pub struct WikidataSearch {
    client: Client,
    endpoint: Url,
    language: String,
}

impl WikidataSearch {
    /// Create a client for `endpoint` (e.g. `https://www.wikidata.org/w/api.php`).
    pub fn new(endpoint: &str, language: impl Into<String>, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| Error::Config(format!("invalid search endpoint {endpoint}: {e}")))?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("failed to build search client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            language: language.into(),
        })
    }

    async fn fetch(&self, query: &str) -> std::result::Result<Vec<CandidateEntity>, String> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[
                ("action", "wbsearchentities"),
                ("search", query),
                ("language", self.language.as_str()),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        if !response.status().is_success() {
            return Err(format!("search service returned {}", response.status()));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| format!("unexpected response body: {e}"))?;
        Ok(body.search)
    }
}

#[async_trait]
impl EntitySearch for WikidataSearch {
    async fn search(&self, query: &str) -> Vec<CandidateEntity> {
        if query.trim().is_empty() {
            return Vec::new();
        }

        match self.fetch(query).await {
            Ok(candidates) => {
                tracing::debug!(
                    name: "search.completed",
                    query,
                    candidates = candidates.len(),
                    "Entity search completed"
                );
                candidates
            }
            Err(reason) => {
                tracing::warn!(
                    name: "search.failed",
                    query,
                    reason = %reason,
                    "Entity search failed; treating as no candidates"
                );
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Debug, Default)]
    struct FixedSearch(HashMap<String, Vec<CandidateEntity>>);

    #[async_trait]
    impl EntitySearch for FixedSearch {
        async fn search(&self, query: &str) -> Vec<CandidateEntity> {
            self.0.get(query).cloned().unwrap_or_default()
        }
    }

    #[tokio::test]
    async fn test_union_dedupes_in_order() {
        let mut index = HashMap::new();
        index.insert(
            "Seine".to_string(),
            vec![
                CandidateEntity::new("Q1471", "Seine", Some("river in France")),
                CandidateEntity::new("Q5", "Seine", None),
            ],
        );
        index.insert(
            "Seine River".to_string(),
            vec![
                CandidateEntity::new("Q1471", "Seine", Some("river in France")),
                CandidateEntity::new("Q9", "Seine-et-Marne", None),
            ],
        );
        let search = FixedSearch(index);

        let merged = search_union(&search, &["Seine".to_string(), "Seine River".to_string()]).await;
        let ids: Vec<_> = merged.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["Q1471", "Q5", "Q9"]);
    }

    #[test]
    fn test_candidate_without_description() {
        let c: CandidateEntity = serde_json::from_str(r#"{"id":"Q42","label":"Douglas Adams"}"#).unwrap();
        assert!(c.description.is_none());
    }

    #[test]
    fn test_invalid_endpoint() {
        let result = WikidataSearch::new("not a url", "en", Duration::from_secs(1));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
