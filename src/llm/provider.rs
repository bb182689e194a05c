use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::errors::ApiError;

use super::types::ChatRequest;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// return the provider name (e.g. "groq", "gemini")
    fn name(&self) -> &str;

    /// chat completion (non-streaming)
    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, ApiError>;

    /// chat completion (streaming); the receiver yields text fragments and at
    /// most one terminal error, and the producer stops when the receiver is
    /// dropped
    async fn stream_chat(
        &self,
        request: ChatRequest,
        model_id: &str,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError>;
}
