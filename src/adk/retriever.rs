// SPDX-License-Identifier: MIT

//! Retriever collaborator boundary
//!
//! Vector stores and web search engines are both exposed as a [`Retriever`]
//! returning an ordered list of [`Document`]s.

use crate::adk::error::PetopetaError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A retrieved piece of content.
///
/// `source` and `title` are always present; retrievers that do not know them
/// store an empty string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub score: f64,
}

impl Document {
    pub fn new(
        source: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            title: title.into(),
            content: content.into(),
            score: 0.0,
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }
}

/// Trait for anything that can answer a search query with documents
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Returns the retriever name, used in logs
    fn name(&self) -> &str;

    /// Return up to `k` documents for `query`, best first
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Document>, PetopetaError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_source_and_title_default_to_empty() {
        let doc: Document = serde_json::from_str(r#"{"content": "text"}"#).unwrap();
        assert_eq!(doc.source, "");
        assert_eq!(doc.title, "");
        assert_eq!(doc.score, 0.0);
    }

    #[test]
    fn test_with_score() {
        let doc = Document::new("https://a", "A", "body").with_score(0.7);
        assert_eq!(doc.score, 0.7);
    }
}
