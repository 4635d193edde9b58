// SPDX-License-Identifier: MIT

use crate::adk::error::PetopetaError;
use crate::adk::retriever::{Document, Retriever};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::env;

const BRAVE_SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";

/// Brave caps a page at 20 results
const MAX_COUNT: usize = 20;

// --- Shared HTTP client ---

static HTTP: Lazy<Client> = Lazy::new(Client::new);

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
}

/// Web search through the Brave Search API
pub struct BraveSearchRetriever {
    api_key: String,
    endpoint: String,
}

impl BraveSearchRetriever {
    pub fn new() -> Result<Self, PetopetaError> {
        let api_key = env::var("BRAVE_API_KEY")
            .map_err(|_| PetopetaError::config("BRAVE_API_KEY must be set"))?;
        Ok(Self::with_api_key(api_key))
    }

    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: BRAVE_SEARCH_URL.to_string(),
        }
    }

    /// Point the retriever at another endpoint speaking the same API
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Turn a Brave response body into ranked documents
fn parse_brave_response(body: &Value, k: usize) -> Result<Vec<Document>, PetopetaError> {
    let results_json = body
        .get("web")
        .and_then(|w| w.get("results"))
        .ok_or_else(|| {
            PetopetaError::retrieval("brave", "Invalid response format: missing web.results")
        })?;

    let results: Vec<SearchResult> = serde_json::from_value(results_json.clone())?;

    Ok(results
        .into_iter()
        .take(k)
        .enumerate()
        .map(|(rank, r)| {
            Document::new(r.url, r.title, r.description).with_score(1.0 / (rank as f64 + 1.0))
        })
        .collect())
}

#[async_trait]
impl Retriever for BraveSearchRetriever {
    fn name(&self) -> &str {
        "brave_search"
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<Document>, PetopetaError> {
        let count = k.clamp(1, MAX_COUNT);
        log::debug!("Brave search '{}' (count {})", query, count);
        let count = count.to_string();

        let resp = HTTP
            .get(&self.endpoint)
            .query(&[("q", query), ("count", count.as_str())])
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await?;
            return Err(PetopetaError::retrieval(
                "brave",
                format!("Brave API error ({}): {}", status, text),
            ));
        }

        let body: Value = resp.json().await?;
        parse_brave_response(&body, k)
    }
}
