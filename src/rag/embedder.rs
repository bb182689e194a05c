//! Dense embedding client.
//!
//! The query/document asymmetry matters: embedding models that distinguish
//! retrieval intent produce different vectors for the two roles, and the
//! ranker's correctness depends on queries being embedded as queries and
//! chunks as documents.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::core::errors::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingTask {
    Query,
    Document,
}

impl EmbeddingTask {
    fn gemini_task_type(self) -> &'static str {
        match self {
            EmbeddingTask::Query => "RETRIEVAL_QUERY",
            EmbeddingTask::Document => "RETRIEVAL_DOCUMENT",
        }
    }
}

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, texts: &[String], task: EmbeddingTask)
        -> Result<Vec<Vec<f32>>, ApiError>;
}

/// Gemini `embedContent` REST client.
pub struct GeminiEmbeddings {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiEmbeddings {
    pub fn new(client: Client, api_key: String, model: String) -> Self {
        Self::with_base_url(
            client,
            "https://generativelanguage.googleapis.com".to_string(),
            api_key,
            model,
        )
    }

    pub fn with_base_url(client: Client, base_url: String, api_key: String, model: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        }
    }

    async fn embed_one(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>, ApiError> {
        let url = format!(
            "{}/v1beta/models/{}:embedContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let body = json!({
            "model": format!("models/{}", self.model),
            "content": { "parts": [{ "text": text }] },
            "taskType": task.gemini_task_type(),
        });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::network)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Network(format!("Gemini embed error: {text}")));
        }

        let payload: Value = res.json().await.map_err(ApiError::network)?;
        let values = payload["embedding"]["values"]
            .as_array()
            .ok_or_else(|| ApiError::Internal("Gemini embed response missing values".to_string()))?;

        Ok(values
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect())
    }
}

#[async_trait]
impl EmbeddingClient for GeminiEmbeddings {
    async fn embed(
        &self,
        texts: &[String],
        task: EmbeddingTask,
    ) -> Result<Vec<Vec<f32>>, ApiError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed_one(text, task).await?);
        }
        Ok(vectors)
    }
}
