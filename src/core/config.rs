//! Application configuration.
//!
//! Loaded from a TOML file (`RAGWEB_CONFIG_PATH`, falling back to
//! `config.toml` in the working directory), then overlaid with environment
//! variables for secrets so API keys never need to live on disk.

use std::env;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

use crate::core::errors::ApiError;

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let data_dir = env::var("RAGWEB_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let log_dir = data_dir.join("logs");

        let _ = fs::create_dir_all(&log_dir);

        AppPaths { data_dir, log_dir }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// "serper" or "duckduckgo".
    pub provider: String,
    pub serper_api_key: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: "serper".to_string(),
            serper_api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Extracted text shorter than this triggers the headless render fallback.
    pub min_chars: usize,
    pub fetch_timeout_secs: u64,
    pub render_timeout_secs: u64,
    pub retry_attempts: u32,
    /// Bounded concurrency for per-URL fetch-and-extract.
    pub concurrency: usize,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            min_chars: 1000,
            fetch_timeout_secs: 20,
            render_timeout_secs: 30,
            retry_attempts: 3,
            concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub max_words: usize,
    pub overlap: usize,
    pub top_k: usize,
    /// Per-source character ceiling in the prompt context block.
    pub max_source_chars: usize,
    pub embedding_model: String,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            max_words: 220,
            overlap: 40,
            top_k: 8,
            max_source_chars: 3000,
            embedding_model: "text-embedding-004".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub groq_api_key: String,
    pub gemini_api_key: String,
    /// Candidate models tried in order; Groq candidates come before Gemini.
    pub groq_models: Vec<String>,
    pub gemini_models: Vec<String>,
    pub temperature: f64,
    pub max_tokens: i32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            groq_api_key: String::new(),
            gemini_api_key: String::new(),
            groq_models: vec![
                "llama-3.3-70b-versatile".to_string(),
                "llama-3.1-8b-instant".to_string(),
            ],
            gemini_models: vec!["gemini-1.5-flash".to_string()],
            temperature: 0.3,
            max_tokens: 2048,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub search: SearchConfig,
    pub scrape: ScrapeConfig,
    pub rag: RagConfig,
    pub llm: LlmConfig,
    pub max_results: MaxResults,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct MaxResults(pub usize);

impl Default for MaxResults {
    fn default() -> Self {
        MaxResults(5)
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ApiError> {
        let path = env::var("RAGWEB_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let mut config = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(ApiError::internal)?;
            toml::from_str(&raw)
                .map_err(|e| ApiError::BadRequest(format!("invalid config file: {e}")))?
        } else {
            AppConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = env::var("SERPER_API_KEY") {
            self.search.serper_api_key = key;
        }
        if let Ok(key) = env::var("GROQ_API_KEY") {
            self.llm.groq_api_key = key;
        }
        if let Ok(key) = env::var("GEMINI_API_KEY").or_else(|_| env::var("GOOGLE_API_KEY")) {
            self.llm.gemini_api_key = key;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_coherent() {
        let config = AppConfig::default();
        assert!(config.rag.overlap < config.rag.max_words);
        assert!(config.rag.top_k > 0);
        assert!(config.scrape.retry_attempts >= 1);
        assert_eq!(config.max_results.0, 5);
    }

    #[test]
    fn parses_partial_toml() {
        let raw = r#"
            [rag]
            max_words = 100
            overlap = 10

            [scrape]
            min_chars = 500
        "#;
        let config: AppConfig = toml::from_str(raw).expect("toml should parse");
        assert_eq!(config.rag.max_words, 100);
        assert_eq!(config.rag.overlap, 10);
        assert_eq!(config.scrape.min_chars, 500);
        // untouched sections keep defaults
        assert_eq!(config.rag.top_k, 8);
        assert_eq!(config.scrape.fetch_timeout_secs, 20);
    }
}
