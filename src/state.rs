//! Shared application state wiring.

use std::sync::Arc;
use std::time::Duration;

use crate::core::config::AppConfig;
use crate::core::errors::ApiError;
use crate::llm::{GeminiProvider, Generation, GroqProvider, ModelCandidate};
use crate::pipeline::{Pipeline, PipelineConfig};
use crate::rag::GeminiEmbeddings;
use crate::scraper::fetcher::HttpFetcher;
use crate::scraper::render::ChromiumRenderer;
use crate::scraper::Scraper;
use crate::search::SearchService;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(config: &AppConfig) -> Result<Self, ApiError> {
        let fetcher = HttpFetcher::new(
            Duration::from_secs(config.scrape.fetch_timeout_secs),
            config.scrape.retry_attempts,
        )?;
        // one connection pool for search, embeddings, and chat backends
        let client = fetcher.client();

        let renderer = ChromiumRenderer::new(Duration::from_secs(
            config.scrape.render_timeout_secs,
        ));
        let scraper = Scraper::new(
            Arc::new(fetcher),
            Arc::new(renderer),
            config.scrape.min_chars,
        );

        let search = SearchService::from_config(client.clone(), &config.search);

        // the embed stage has no fallback, so a missing key means every
        // query would fail; refuse to start instead
        if config.llm.gemini_api_key.is_empty() {
            return Err(ApiError::BadRequest(
                "embeddings require GEMINI_API_KEY or GOOGLE_API_KEY".to_string(),
            ));
        }
        let embeddings = GeminiEmbeddings::new(
            client.clone(),
            config.llm.gemini_api_key.clone(),
            config.rag.embedding_model.clone(),
        );

        let mut candidates = Vec::new();
        if !config.llm.groq_api_key.is_empty() {
            let groq = Arc::new(GroqProvider::new(
                client.clone(),
                config.llm.groq_api_key.clone(),
            ));
            for model in &config.llm.groq_models {
                candidates.push(ModelCandidate {
                    provider: groq.clone(),
                    model_id: model.clone(),
                });
            }
        }
        if !config.llm.gemini_api_key.is_empty() {
            let gemini = Arc::new(GeminiProvider::new(
                client,
                config.llm.gemini_api_key.clone(),
            ));
            for model in &config.llm.gemini_models {
                candidates.push(ModelCandidate {
                    provider: gemini.clone(),
                    model_id: model.clone(),
                });
            }
        }
        if candidates.is_empty() {
            return Err(ApiError::BadRequest(
                "no LLM backend configured: set GROQ_API_KEY or GEMINI_API_KEY".to_string(),
            ));
        }

        let generation = Generation::new(
            candidates,
            config.llm.temperature,
            config.llm.max_tokens,
        );

        let pipeline = Pipeline::new(
            Arc::new(search),
            Arc::new(scraper),
            Arc::new(embeddings),
            generation,
            PipelineConfig::from_app_config(config),
        );

        Ok(Self { pipeline })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_key_alone_is_not_enough_to_start() {
        // embeddings always go through Gemini, so a Groq-only configuration
        // could never answer a query
        let mut config = AppConfig::default();
        config.llm.groq_api_key = "groq-key".to_string();

        let err = AppState::new(&config).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn gemini_key_covers_both_embeddings_and_chat() {
        let mut config = AppConfig::default();
        config.llm.gemini_api_key = "gemini-key".to_string();

        assert!(AppState::new(&config).is_ok());
    }

    #[test]
    fn no_chat_backend_is_rejected() {
        let config = AppConfig::default();
        let err = AppState::new(&config).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
