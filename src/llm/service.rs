//! Answer generation with ordered multi-model fallback.
//!
//! Candidates are tried in configuration order. For streams, fallback is only
//! allowed before the first token reaches the caller; once a token has been
//! forwarded the chosen model owns the stream and any later error is terminal.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::core::errors::ApiError;
use crate::prompt::PromptBundle;

use super::provider::LlmProvider;
use super::types::{ChatMessage, ChatRequest};

pub const INSUFFICIENT_CONTEXT: &str =
    "I couldn't find enough relevant information to answer your question.";

pub const GENERATION_APOLOGY: &str =
    "I found relevant sources but was unable to generate an answer. Please try again.";

#[derive(Clone)]
pub struct ModelCandidate {
    pub provider: Arc<dyn LlmProvider>,
    pub model_id: String,
}

#[derive(Clone)]
pub struct Generation {
    candidates: Vec<ModelCandidate>,
    temperature: f64,
    max_tokens: i32,
}

impl Generation {
    pub fn new(candidates: Vec<ModelCandidate>, temperature: f64, max_tokens: i32) -> Self {
        Self {
            candidates,
            temperature,
            max_tokens,
        }
    }

    fn request_for(&self, bundle: &PromptBundle) -> ChatRequest {
        ChatRequest::new(vec![
            ChatMessage::system(bundle.system.as_str()),
            ChatMessage::user(bundle.user.as_str()),
        ])
        .with_sampling(self.temperature, self.max_tokens)
    }

    /// Generates a complete answer, falling through the candidate list on
    /// failure. An empty bundle never reaches a backend.
    pub async fn generate(&self, bundle: &PromptBundle) -> Result<String, ApiError> {
        if bundle.sources.is_empty() {
            return Ok(INSUFFICIENT_CONTEXT.to_string());
        }

        let request = self.request_for(bundle);
        let mut failures = Vec::new();

        for candidate in &self.candidates {
            match candidate
                .provider
                .chat(request.clone(), &candidate.model_id)
                .await
            {
                Ok(answer) if !answer.trim().is_empty() => {
                    info!(
                        provider = candidate.provider.name(),
                        model = %candidate.model_id,
                        "generation succeeded"
                    );
                    return Ok(answer);
                }
                Ok(_) => {
                    warn!(
                        provider = candidate.provider.name(),
                        model = %candidate.model_id,
                        "model returned an empty answer, trying next"
                    );
                    failures.push(format!("{}: empty answer", candidate.model_id));
                }
                Err(e) => {
                    warn!(
                        provider = candidate.provider.name(),
                        model = %candidate.model_id,
                        error = %e,
                        "generation failed, trying next"
                    );
                    failures.push(format!("{}: {}", candidate.model_id, e));
                }
            }
        }

        Err(ApiError::Generation(format!(
            "all models failed: [{}]",
            failures.join("; ")
        )))
    }

    /// Streams an answer. Candidates are tried until one produces a first
    /// token; a mid-stream error after that is forwarded and ends the stream.
    pub async fn generate_stream(
        &self,
        bundle: &PromptBundle,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        if bundle.sources.is_empty() {
            let (tx, rx) = mpsc::channel(1);
            let _ = tx.send(Ok(INSUFFICIENT_CONTEXT.to_string())).await;
            return Ok(rx);
        }

        let request = self.request_for(bundle);
        let mut failures = Vec::new();

        for candidate in &self.candidates {
            let mut upstream = match candidate
                .provider
                .stream_chat(request.clone(), &candidate.model_id)
                .await
            {
                Ok(rx) => rx,
                Err(e) => {
                    warn!(
                        provider = candidate.provider.name(),
                        model = %candidate.model_id,
                        error = %e,
                        "stream setup failed, trying next"
                    );
                    failures.push(format!("{}: {}", candidate.model_id, e));
                    continue;
                }
            };

            // probe before committing: a stream that errors or closes without
            // producing a token still allows fallback
            match upstream.recv().await {
                Some(Ok(first)) => {
                    info!(
                        provider = candidate.provider.name(),
                        model = %candidate.model_id,
                        "stream started"
                    );
                    let (tx, rx) = mpsc::channel(32);
                    tokio::spawn(async move {
                        if tx.send(Ok(first)).await.is_err() {
                            return;
                        }
                        while let Some(item) = upstream.recv().await {
                            let terminal = item.is_err();
                            if tx.send(item).await.is_err() || terminal {
                                return;
                            }
                        }
                    });
                    return Ok(rx);
                }
                Some(Err(e)) => {
                    warn!(
                        provider = candidate.provider.name(),
                        model = %candidate.model_id,
                        error = %e,
                        "stream failed before first token, trying next"
                    );
                    failures.push(format!("{}: {}", candidate.model_id, e));
                }
                None => {
                    warn!(
                        provider = candidate.provider.name(),
                        model = %candidate.model_id,
                        "stream closed without output, trying next"
                    );
                    failures.push(format!("{}: closed without output", candidate.model_id));
                }
            }
        }

        Err(ApiError::Generation(format!(
            "all models failed: [{}]",
            failures.join("; ")
        )))
    }
}
