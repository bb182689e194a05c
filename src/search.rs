//! Web search providers.
//!
//! A `SearchProvider` returns provider-ranked results and never errors on a
//! zero-result query; transport failures surface as `ApiError::Network`. The
//! configured provider is tried first and DuckDuckGo's Instant Answer API is
//! the keyless fallback.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::core::errors::ApiError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Returns up to `max_results` ranked results; `Ok(vec![])` on no matches.
    async fn search(&self, query: &str, max_results: usize)
        -> Result<Vec<SearchResult>, ApiError>;
}

/// Google results via the Serper.dev API.
pub struct SerperSearch {
    client: Client,
    api_key: String,
}

impl SerperSearch {
    pub fn new(client: Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl SearchProvider for SerperSearch {
    fn name(&self) -> &str {
        "serper"
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, ApiError> {
        let response = self
            .client
            .post("https://google.serper.dev/search")
            .header("X-API-KEY", &self.api_key)
            .json(&json!({ "q": query, "num": max_results }))
            .send()
            .await
            .map_err(ApiError::network)?;

        if !response.status().is_success() {
            return Err(ApiError::Network(format!(
                "Serper search failed: {}",
                response.status()
            )));
        }

        let payload: Value = response.json().await.map_err(ApiError::network)?;
        Ok(parse_serper_results(&payload, max_results))
    }
}

pub fn parse_serper_results(payload: &Value, max_results: usize) -> Vec<SearchResult> {
    let items = payload
        .get("organic")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let mut results = Vec::new();
    for item in items {
        let title = item
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let url = item
            .get("link")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let snippet = item
            .get("snippet")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        if !title.is_empty() && !url.is_empty() {
            results.push(SearchResult {
                title,
                url,
                snippet,
            });
        }
        if results.len() >= max_results {
            break;
        }
    }

    results
}

/// Keyless fallback via the DuckDuckGo Instant Answer API.
pub struct DuckDuckGoSearch {
    client: Client,
}

impl DuckDuckGoSearch {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, ApiError> {
        let url = format!(
            "https://api.duckduckgo.com/?q={}&format=json&no_redirect=1&no_html=1",
            urlencoding::encode(query)
        );

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(ApiError::network)?;

        if !response.status().is_success() {
            return Err(ApiError::Network(format!(
                "DuckDuckGo search failed: {}",
                response.status()
            )));
        }

        let payload: Value = response.json().await.map_err(ApiError::network)?;
        let mut results = parse_ddg_results(&payload);
        results.truncate(max_results);
        Ok(results)
    }
}

pub fn parse_ddg_results(payload: &Value) -> Vec<SearchResult> {
    let mut results = Vec::new();

    if let Some(abstract_text) = payload.get("AbstractText").and_then(|v| v.as_str()) {
        if let Some(url) = payload.get("AbstractURL").and_then(|v| v.as_str()) {
            if !abstract_text.is_empty() && !url.is_empty() {
                results.push(SearchResult {
                    title: abstract_text
                        .split(" - ")
                        .next()
                        .unwrap_or(abstract_text)
                        .to_string(),
                    url: url.to_string(),
                    snippet: abstract_text.to_string(),
                });
            }
        }
    }

    if let Some(items) = payload.get("Results").and_then(|v| v.as_array()) {
        extract_ddg_topics(items, &mut results);
    }
    if let Some(items) = payload.get("RelatedTopics").and_then(|v| v.as_array()) {
        extract_ddg_topics(items, &mut results);
    }

    results
}

fn extract_ddg_topics(items: &[Value], results: &mut Vec<SearchResult>) {
    for item in items {
        if let Some(topics) = item.get("Topics").and_then(|v| v.as_array()) {
            extract_ddg_topics(topics, results);
            continue;
        }
        let text = item.get("Text").and_then(|v| v.as_str()).unwrap_or("");
        let url = item.get("FirstURL").and_then(|v| v.as_str()).unwrap_or("");
        if text.is_empty() || url.is_empty() {
            continue;
        }
        // the abstract URL often reappears under Results/RelatedTopics
        if results.iter().any(|r| r.url == url) {
            continue;
        }
        results.push(SearchResult {
            title: text.split(" - ").next().unwrap_or(text).to_string(),
            url: url.to_string(),
            snippet: text.to_string(),
        });
    }
}

/// Configured provider first, DuckDuckGo fallback on failure or empty primary.
pub struct SearchService {
    primary: Option<Arc<dyn SearchProvider>>,
    fallback: Arc<dyn SearchProvider>,
}

impl SearchService {
    pub fn new(primary: Option<Arc<dyn SearchProvider>>, fallback: Arc<dyn SearchProvider>) -> Self {
        Self { primary, fallback }
    }

    pub fn from_config(client: Client, config: &crate::core::config::SearchConfig) -> Self {
        let primary: Option<Arc<dyn SearchProvider>> =
            if config.provider == "serper" && !config.serper_api_key.is_empty() {
                Some(Arc::new(SerperSearch::new(
                    client.clone(),
                    config.serper_api_key.clone(),
                )))
            } else {
                None
            };
        Self::new(primary, Arc::new(DuckDuckGoSearch::new(client)))
    }
}

#[async_trait]
impl SearchProvider for SearchService {
    fn name(&self) -> &str {
        "search"
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, ApiError> {
        if let Some(primary) = &self.primary {
            match primary.search(query, max_results).await {
                Ok(results) if !results.is_empty() => return Ok(results),
                Ok(_) => {
                    tracing::info!("{} returned no results, falling back", primary.name());
                }
                Err(err) => {
                    tracing::warn!("{} search failed, falling back: {}", primary.name(), err);
                }
            }
        }

        self.fallback.search(query, max_results).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serper_payload_is_parsed_in_rank_order() {
        let payload = json!({
            "organic": [
                { "title": "First", "link": "https://a.example/1", "snippet": "s1" },
                { "title": "Second", "link": "https://a.example/2", "snippet": "s2" },
                { "title": "Third", "link": "https://a.example/3", "snippet": "s3" },
            ]
        });

        let results = parse_serper_results(&payload, 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url, "https://a.example/1");
        assert_eq!(results[1].title, "Second");
    }

    #[test]
    fn serper_items_missing_fields_are_skipped() {
        let payload = json!({
            "organic": [
                { "link": "https://a.example/1" },
                { "title": "Ok", "link": "https://a.example/2", "snippet": "" },
            ]
        });

        let results = parse_serper_results(&payload, 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://a.example/2");
        assert_eq!(results[0].snippet, "");
    }

    #[test]
    fn ddg_related_topics_are_flattened() {
        let payload = json!({
            "AbstractText": "Paris - capital of France",
            "AbstractURL": "https://en.wikipedia.org/wiki/Paris",
            "RelatedTopics": [
                { "Text": "Seine - river", "FirstURL": "https://en.wikipedia.org/wiki/Seine" },
                { "Topics": [
                    { "Text": "Louvre - museum", "FirstURL": "https://en.wikipedia.org/wiki/Louvre" }
                ]}
            ]
        });

        let results = parse_ddg_results(&payload);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].title, "Paris");
        assert_eq!(results[2].url, "https://en.wikipedia.org/wiki/Louvre");
    }

    #[test]
    fn ddg_results_are_unique_by_url() {
        let payload = json!({
            "AbstractText": "Paris - capital of France",
            "AbstractURL": "https://en.wikipedia.org/wiki/Paris",
            "Results": [
                { "Text": "Paris - official", "FirstURL": "https://en.wikipedia.org/wiki/Paris" }
            ],
            "RelatedTopics": [
                { "Text": "Paris - capital", "FirstURL": "https://en.wikipedia.org/wiki/Paris" },
                { "Text": "Seine - river", "FirstURL": "https://en.wikipedia.org/wiki/Seine" }
            ]
        });

        let results = parse_ddg_results(&payload);
        assert_eq!(results.len(), 2);
        // the abstract entry wins; later duplicates are dropped
        assert_eq!(results[0].url, "https://en.wikipedia.org/wiki/Paris");
        assert_eq!(results[0].snippet, "Paris - capital of France");
        assert_eq!(results[1].url, "https://en.wikipedia.org/wiki/Seine");
    }

    #[test]
    fn ddg_empty_payload_gives_no_results() {
        let payload = json!({ "AbstractText": "", "RelatedTopics": [] });
        assert!(parse_ddg_results(&payload).is_empty());
    }
}
