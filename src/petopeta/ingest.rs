// SPDX-License-Identifier: MIT

//! Document ingestion
//!
//! Source documents are split into overlapping chunks, given `source` and
//! `title` metadata when they lack it, and upserted into a [`DocumentSink`]
//! in fixed-size batches. The sink is reindexed once at the end.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::adk::error::PetopetaError;
use crate::adk::retriever::Document;

pub const CHUNK_SIZE: usize = 4000;
pub const CHUNK_OVERLAP: usize = 200;
pub const BATCH_SIZE: usize = 256;
/// Chunks this short or shorter carry no useful content
pub const MIN_CHUNK_CHARS: usize = 10;

/// A loaded document before splitting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceDocument {
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Destination of ingested chunks, typically a vector store
#[async_trait]
pub trait DocumentSink: Send + Sync {
    /// Insert or update one batch of chunks
    async fn add_documents(&self, batch: &[Document]) -> Result<(), PetopetaError>;

    /// Rebuild the search index after all batches are in
    async fn reindex(&self) -> Result<(), PetopetaError>;
}

/// Counts of one ingestion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    pub batches: usize,
}

/// Split `text` into windows of at most `size` characters, consecutive
/// windows sharing `overlap` characters. Windows end at whitespace when one
/// exists in their second half.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() || size == 0 {
        return Vec::new();
    }
    let overlap = overlap.min(size / 2);

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let mut end = (start + size).min(chars.len());
        if end < chars.len() {
            let floor = start + size / 2;
            if let Some(cut) = (floor..end).rev().find(|&i| chars[i].is_whitespace()) {
                end = cut + 1;
            }
        }

        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        if end >= chars.len() {
            break;
        }
        start = end.saturating_sub(overlap).max(start + 1);
    }
    chunks
}

/// Split every document and turn the pieces into chunks with metadata
pub fn split_documents(documents: &[SourceDocument]) -> Vec<Document> {
    documents
        .iter()
        .flat_map(|doc| {
            let source = doc.metadata.get("source").cloned().unwrap_or_default();
            let title = doc.metadata.get("title").cloned().unwrap_or_default();
            chunk_text(&doc.content, CHUNK_SIZE, CHUNK_OVERLAP)
                .into_iter()
                .filter(|c| c.chars().count() > MIN_CHUNK_CHARS)
                .map(move |c| Document::new(source.clone(), title.clone(), c))
        })
        .collect()
}

/// Split, batch and upsert `documents`, then reindex the sink
pub async fn ingest(
    documents: &[SourceDocument],
    sink: &dyn DocumentSink,
) -> Result<IngestReport, PetopetaError> {
    log::info!("Loaded {} documents", documents.len());
    let chunks = split_documents(documents);
    log::info!("About to add {} chunks", chunks.len());

    let mut batches = 0;
    for (i, batch) in chunks.chunks(BATCH_SIZE).enumerate() {
        log::info!(
            "Adding chunks {} to {}",
            i * BATCH_SIZE,
            i * BATCH_SIZE + batch.len()
        );
        sink.add_documents(batch).await?;
        batches += 1;
    }
    sink.reindex().await?;

    Ok(IngestReport {
        documents: documents.len(),
        chunks: chunks.len(),
        batches,
    })
}

/// Read a file as a source document.
///
/// `.jsonl` files hold one serialized [`SourceDocument`] per line; any other
/// file is one document whose source is its path.
pub async fn load_path(path: &Path) -> Result<Vec<SourceDocument>, PetopetaError> {
    let content = fs::read_to_string(path).await?;

    if path.extension().is_some_and(|ext| ext == "jsonl") {
        return content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(PetopetaError::from))
            .collect();
    }

    let mut metadata = HashMap::new();
    metadata.insert("source".to_string(), path.display().to_string());
    Ok(vec![SourceDocument { content, metadata }])
}

/// Sink appending chunks as JSON lines to a local file
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DocumentSink for JsonlSink {
    async fn add_documents(&self, batch: &[Document]) -> Result<(), PetopetaError> {
        let mut out = String::new();
        for doc in batch {
            out.push_str(&serde_json::to_string(doc)?);
            out.push('\n');
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(out.as_bytes()).await?;
        Ok(())
    }

    async fn reindex(&self) -> Result<(), PetopetaError> {
        log::debug!("{} needs no index", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        batches: Mutex<Vec<usize>>,
        reindexed: Mutex<bool>,
    }

    #[async_trait]
    impl DocumentSink for RecordingSink {
        async fn add_documents(&self, batch: &[Document]) -> Result<(), PetopetaError> {
            assert!(!*self.reindexed.lock().unwrap(), "reindexed before the last batch");
            self.batches.lock().unwrap().push(batch.len());
            Ok(())
        }

        async fn reindex(&self) -> Result<(), PetopetaError> {
            *self.reindexed.lock().unwrap() = true;
            Ok(())
        }
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        assert_eq!(chunk_text("Dogs eat grass.", 4000, 200), vec!["Dogs eat grass."]);
        assert!(chunk_text("", 4000, 200).is_empty());
    }

    #[test]
    fn test_chunks_respect_size_and_overlap() {
        let text = (0..3000).map(|i| format!("w{}", i % 10)).collect::<Vec<_>>().join(" ");
        let chunks = chunk_text(&text, 4000, 200);

        assert!(chunks.len() >= 3);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 4000);
        }
        // consecutive chunks overlap
        let tail: String = chunks[0]
            .chars()
            .rev()
            .take(50)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        assert!(chunks[1].contains(tail.trim()));
    }

    #[test]
    fn test_chunking_without_whitespace_progresses() {
        let text = "x".repeat(9000);
        let chunks = chunk_text(&text, 4000, 200);
        assert_eq!(chunks[0].len(), 4000);
        assert_eq!(chunks.iter().map(String::len).sum::<usize>(), 9000 + 2 * 200);
    }

    #[test]
    fn test_tiny_chunks_dropped_and_metadata_backfilled() {
        let mut metadata = HashMap::new();
        metadata.insert("title".to_string(), "Grass".to_string());
        let docs = vec![
            SourceDocument {
                content: "Why do dogs eat grass? Mostly boredom.".to_string(),
                metadata,
            },
            SourceDocument {
                content: "tiny".to_string(),
                ..Default::default()
            },
        ];

        let chunks = split_documents(&docs);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].title, "Grass");
        assert_eq!(chunks[0].source, "");
    }

    #[tokio::test]
    async fn test_ingest_batches_then_reindexes() {
        let docs: Vec<SourceDocument> = (0..600)
            .map(|i| SourceDocument {
                content: format!("Document number {} about pet care", i),
                ..Default::default()
            })
            .collect();
        let sink = RecordingSink::default();

        let report = ingest(&docs, &sink).await.unwrap();

        assert_eq!(report.chunks, 600);
        assert_eq!(report.batches, 3);
        assert_eq!(*sink.batches.lock().unwrap(), vec![256, 256, 88]);
        assert!(*sink.reindexed.lock().unwrap());
    }

    #[tokio::test]
    async fn test_ingest_nothing_still_reindexes() {
        let sink = RecordingSink::default();
        let report = ingest(&[], &sink).await.unwrap();
        assert_eq!(report, IngestReport::default());
        assert!(*sink.reindexed.lock().unwrap());
    }
}
