//! Per-run in-memory vector index.
//!
//! One store instance backs exactly one pipeline run, so a previous query's
//! chunks can never inflate a later run's candidate set. Similarity is cosine
//! over dense embeddings; top-k results come back sorted descending with
//! ties in insertion order.

use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;
use crate::rag::similarity::rank_descending_by_cosine;

/// A retrievable unit of document text. Every chunk traces to exactly one
/// scraped document via `source_url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source_url: String,
    pub source_title: String,
}

/// A chunk with its similarity score against the query embedding.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Default)]
pub struct VectorStore {
    entries: Vec<(Chunk, Vec<f32>)>,
}

impl VectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, chunks: Vec<Chunk>, embeddings: Vec<Vec<f32>>) -> Result<(), ApiError> {
        if chunks.len() != embeddings.len() {
            return Err(ApiError::BadRequest(format!(
                "chunk/embedding count mismatch: {} != {}",
                chunks.len(),
                embeddings.len()
            )));
        }
        self.entries.extend(chunks.into_iter().zip(embeddings));
        Ok(())
    }

    /// Top-k chunks by cosine similarity to `query_embedding`.
    pub fn query(&self, query_embedding: &[f32], k: usize) -> Vec<ScoredChunk> {
        let candidates: Vec<Vec<f32>> = self
            .entries
            .iter()
            .map(|(_, embedding)| embedding.clone())
            .collect();

        rank_descending_by_cosine(query_embedding, &candidates)
            .into_iter()
            .take(k)
            .map(|(idx, score)| ScoredChunk {
                chunk: self.entries[idx].0.clone(),
                score,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, url: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            source_url: url.to_string(),
            source_title: "Title".to_string(),
        }
    }

    #[test]
    fn query_embedding_equal_to_a_chunk_ranks_it_first_with_score_one() {
        let mut store = VectorStore::new();
        store
            .add(
                vec![
                    chunk("off topic", "https://a.example"),
                    chunk("exact match", "https://b.example"),
                ],
                vec![vec![0.1, 0.9, 0.0], vec![0.6, 0.0, 0.8]],
            )
            .unwrap();

        let results = store.query(&[0.6, 0.0, 0.8], 2);
        assert_eq!(results[0].chunk.text, "exact match");
        assert!((results[0].score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn query_respects_k() {
        let mut store = VectorStore::new();
        store
            .add(
                (0..5).map(|i| chunk(&format!("c{i}"), "https://a.example")).collect(),
                (0..5).map(|i| vec![i as f32 + 1.0, 1.0]).collect(),
            )
            .unwrap();

        assert_eq!(store.query(&[1.0, 0.0], 3).len(), 3);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let mut store = VectorStore::new();
        let err = store
            .add(vec![chunk("a", "https://a.example")], vec![])
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn clear_empties_the_index() {
        let mut store = VectorStore::new();
        store
            .add(vec![chunk("a", "https://a.example")], vec![vec![1.0]])
            .unwrap();
        assert_eq!(store.len(), 1);

        store.clear();
        assert!(store.is_empty());
        assert!(store.query(&[1.0], 5).is_empty());
    }
}
