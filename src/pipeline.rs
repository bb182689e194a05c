//! The query pipeline: search, scrape, chunk, rank, prompt, generate.
//!
//! Every stage degrades rather than aborts: a failed scrape drops one URL, an
//! empty stage short-circuits with a reason, and only infrastructure errors
//! (embedding transport, config) surface as `Err`.

use std::sync::Arc;
use std::time::Instant;

use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::core::config::AppConfig;
use crate::core::errors::ApiError;
use crate::llm::{Generation, GENERATION_APOLOGY};
use crate::prompt::{build_prompt, PromptBundle, SourceRef};
use crate::rag::{chunk_text, Chunk, EmbeddingClient, EmbeddingTask, VectorStore};
use crate::scraper::ContentScraper;
use crate::search::SearchProvider;

/// A scraped document that survived extraction with usable text.
#[derive(Debug, Clone)]
pub struct Document {
    pub url: String,
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<SourceRef>,
}

/// Why a run produced no answer. Not an error: the pipeline worked, the web
/// just had nothing usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyReason {
    NoSearchResults,
    NoDocuments,
    NoChunks,
}

impl std::fmt::Display for EmptyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            EmptyReason::NoSearchResults => "I couldn't find any search results for your query.",
            EmptyReason::NoDocuments => {
                "I found search results but couldn't extract readable content from any of them."
            }
            EmptyReason::NoChunks => {
                "The retrieved pages contained no usable text to answer from."
            }
        };
        f.write_str(message)
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    Answer(Answer),
    Empty(EmptyReason),
}

/// Wire events for the streaming endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Token { content: String },
    Sources { sources: Vec<SourceRef> },
    Error { error: String },
    Done,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_results: usize,
    pub max_words: usize,
    pub overlap: usize,
    pub top_k: usize,
    pub max_source_chars: usize,
    pub concurrency: usize,
}

impl PipelineConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_results: config.max_results.0,
            max_words: config.rag.max_words,
            overlap: config.rag.overlap,
            top_k: config.rag.top_k,
            max_source_chars: config.rag.max_source_chars,
            concurrency: config.scrape.concurrency.max(1),
        }
    }
}

enum Prepared {
    Ready(PromptBundle),
    Empty(EmptyReason),
}

#[derive(Clone)]
pub struct Pipeline {
    search: Arc<dyn SearchProvider>,
    scraper: Arc<dyn ContentScraper>,
    embeddings: Arc<dyn EmbeddingClient>,
    generation: Generation,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        scraper: Arc<dyn ContentScraper>,
        embeddings: Arc<dyn EmbeddingClient>,
        generation: Generation,
        config: PipelineConfig,
    ) -> Self {
        Self {
            search,
            scraper,
            embeddings,
            generation,
            config,
        }
    }

    /// Runs search through prompt assembly. The vector store lives and dies
    /// inside this call, so runs never see each other's chunks.
    async fn prepare(&self, query: &str, max_sources: Option<usize>) -> Result<Prepared, ApiError> {
        let max_results = max_sources
            .unwrap_or(self.config.max_results)
            .clamp(1, 10);

        let started = Instant::now();
        let results = self.search.search(query, max_results).await?;
        info!(
            count = results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search complete"
        );
        if results.is_empty() {
            return Ok(Prepared::Empty(EmptyReason::NoSearchResults));
        }

        let started = Instant::now();
        let scraper = self.scraper.clone();
        let documents: Vec<Document> = stream::iter(results)
            .map(|result| {
                let scraper = scraper.clone();
                async move {
                    let article = scraper.scrape(&result.url).await;
                    (result, article)
                }
            })
            .buffered(self.config.concurrency)
            .filter_map(|(result, article)| async move {
                if article.text.trim().is_empty() {
                    return None;
                }
                let title = if article.title.is_empty() {
                    result.title
                } else {
                    article.title
                };
                Some(Document {
                    url: result.url,
                    title,
                    text: article.text,
                })
            })
            .collect()
            .await;
        info!(
            count = documents.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "scrape complete"
        );
        if documents.is_empty() {
            return Ok(Prepared::Empty(EmptyReason::NoDocuments));
        }

        let mut chunks = Vec::new();
        for document in &documents {
            for text in chunk_text(&document.text, self.config.max_words, self.config.overlap) {
                chunks.push(Chunk {
                    text,
                    source_url: document.url.clone(),
                    source_title: document.title.clone(),
                });
            }
        }
        info!(count = chunks.len(), "chunking complete");
        if chunks.is_empty() {
            return Ok(Prepared::Empty(EmptyReason::NoChunks));
        }

        let started = Instant::now();
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let chunk_embeddings = self
            .embeddings
            .embed(&texts, EmbeddingTask::Document)
            .await?;
        let query_embedding = self
            .embeddings
            .embed(&[query.to_string()], EmbeddingTask::Query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Internal("query embedding missing".to_string()))?;
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "embedding complete"
        );

        let mut store = VectorStore::new();
        store.add(chunks, chunk_embeddings)?;
        let ranked = store.query(&query_embedding, self.config.top_k);

        Ok(Prepared::Ready(build_prompt(
            query,
            &ranked,
            self.config.max_source_chars,
        )))
    }

    /// Complete (non-streaming) run. Generation failure after successful
    /// retrieval still returns the sources with an apology text.
    pub async fn run(&self, query: &str, max_sources: Option<usize>) -> Result<RunOutcome, ApiError> {
        match self.prepare(query, max_sources).await? {
            Prepared::Empty(reason) => Ok(RunOutcome::Empty(reason)),
            Prepared::Ready(bundle) => match self.generation.generate(&bundle).await {
                Ok(text) => Ok(RunOutcome::Answer(Answer {
                    text,
                    sources: bundle.sources,
                })),
                Err(err) => {
                    error!(error = %err, "generation failed after retrieval");
                    Ok(RunOutcome::Answer(Answer {
                        text: GENERATION_APOLOGY.to_string(),
                        sources: bundle.sources,
                    }))
                }
            },
        }
    }

    /// Streaming run. Token events first, then one Sources event, then Done.
    /// An Error event is always terminal.
    pub fn run_stream(&self, query: String, max_sources: Option<usize>) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(32);
        let pipeline = self.clone();

        tokio::spawn(async move {
            let bundle = match pipeline.prepare(&query, max_sources).await {
                Ok(Prepared::Ready(bundle)) => bundle,
                Ok(Prepared::Empty(reason)) => {
                    let _ = tx
                        .send(StreamEvent::Token {
                            content: reason.to_string(),
                        })
                        .await;
                    let _ = tx.send(StreamEvent::Done).await;
                    return;
                }
                Err(err) => {
                    error!(error = %err, "pipeline failed before generation");
                    let _ = tx
                        .send(StreamEvent::Error {
                            error: err.to_string(),
                        })
                        .await;
                    return;
                }
            };

            let mut tokens = match pipeline.generation.generate_stream(&bundle).await {
                Ok(rx) => rx,
                Err(err) => {
                    error!(error = %err, "streaming generation failed");
                    let _ = tx
                        .send(StreamEvent::Error {
                            error: GENERATION_APOLOGY.to_string(),
                        })
                        .await;
                    return;
                }
            };

            while let Some(item) = tokens.recv().await {
                match item {
                    Ok(content) => {
                        if tx.send(StreamEvent::Token { content }).await.is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        error!(error = %err, "stream aborted mid-answer");
                        let _ = tx
                            .send(StreamEvent::Error {
                                error: err.to_string(),
                            })
                            .await;
                        return;
                    }
                }
            }

            let _ = tx
                .send(StreamEvent::Sources {
                    sources: bundle.sources,
                })
                .await;
            let _ = tx.send(StreamEvent::Done).await;
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmProvider, ModelCandidate};
    use crate::llm::types::ChatRequest;
    use crate::scraper::Article;
    use crate::search::SearchResult;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubSearch {
        results: Vec<SearchResult>,
    }

    #[async_trait]
    impl SearchProvider for StubSearch {
        fn name(&self) -> &str {
            "stub"
        }

        async fn search(
            &self,
            _query: &str,
            max_results: usize,
        ) -> Result<Vec<SearchResult>, ApiError> {
            let mut results = self.results.clone();
            results.truncate(max_results);
            Ok(results)
        }
    }

    struct StubScraper {
        pages: HashMap<String, Article>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ContentScraper for StubScraper {
        async fn scrape(&self, url: &str) -> Article {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.pages.get(url).cloned().unwrap_or_default()
        }
    }

    /// Projects each text onto a fixed vocabulary axis so ranking is
    /// deterministic without a model.
    struct KeywordEmbeddings {
        calls: AtomicUsize,
    }

    impl KeywordEmbeddings {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }

        fn vector_for(text: &str) -> Vec<f32> {
            let lower = text.to_lowercase();
            vec![
                lower.matches("rust").count() as f32 + 0.01,
                lower.matches("cooking").count() as f32 + 0.01,
            ]
        }
    }

    #[async_trait]
    impl EmbeddingClient for KeywordEmbeddings {
        async fn embed(
            &self,
            texts: &[String],
            _task: EmbeddingTask,
        ) -> Result<Vec<Vec<f32>>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
        }
    }

    struct StubLlm {
        answer: Result<&'static str, &'static str>,
    }

    #[async_trait]
    impl LlmProvider for StubLlm {
        fn name(&self) -> &str {
            "stub"
        }

        async fn chat(&self, _request: ChatRequest, _model_id: &str) -> Result<String, ApiError> {
            self.answer
                .map(String::from)
                .map_err(|e| ApiError::Network(e.to_string()))
        }

        async fn stream_chat(
            &self,
            _request: ChatRequest,
            _model_id: &str,
        ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
            let answer = self
                .answer
                .map_err(|e| ApiError::Network(e.to_string()))?;
            let (tx, rx) = mpsc::channel(8);
            for word in answer.split_inclusive(' ') {
                tx.send(Ok(word.to_string())).await.unwrap();
            }
            Ok(rx)
        }
    }

    fn generation(answer: Result<&'static str, &'static str>) -> Generation {
        Generation::new(
            vec![ModelCandidate {
                provider: Arc::new(StubLlm { answer }),
                model_id: "stub-model".to_string(),
            }],
            0.3,
            2048,
        )
    }

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            max_results: 5,
            max_words: 50,
            overlap: 10,
            top_k: 4,
            max_source_chars: 3000,
            concurrency: 2,
        }
    }

    fn result(url: &str, title: &str) -> SearchResult {
        SearchResult {
            title: title.to_string(),
            url: url.to_string(),
            snippet: String::new(),
        }
    }

    fn article(title: &str, text: &str) -> Article {
        Article {
            title: title.to_string(),
            text: text.to_string(),
            html: String::new(),
        }
    }

    fn pipeline_with(
        results: Vec<SearchResult>,
        pages: HashMap<String, Article>,
        answer: Result<&'static str, &'static str>,
    ) -> (Pipeline, Arc<StubScraper>, Arc<KeywordEmbeddings>) {
        let scraper = Arc::new(StubScraper {
            pages,
            calls: AtomicUsize::new(0),
        });
        let embeddings = Arc::new(KeywordEmbeddings::new());
        let pipeline = Pipeline::new(
            Arc::new(StubSearch { results }),
            scraper.clone(),
            embeddings.clone(),
            generation(answer),
            test_config(),
        );
        (pipeline, scraper, embeddings)
    }

    #[tokio::test]
    async fn empty_search_short_circuits_before_scraping() {
        let (pipeline, scraper, embeddings) =
            pipeline_with(vec![], HashMap::new(), Ok("unused"));

        let outcome = pipeline.run("rust borrow checker", None).await.unwrap();

        assert!(matches!(
            outcome,
            RunOutcome::Empty(EmptyReason::NoSearchResults)
        ));
        assert_eq!(scraper.calls.load(Ordering::SeqCst), 0);
        assert_eq!(embeddings.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unscrapable_results_short_circuit_before_embedding() {
        let (pipeline, scraper, embeddings) = pipeline_with(
            vec![
                result("https://a.example", "A"),
                result("https://b.example", "B"),
            ],
            HashMap::new(),
            Ok("unused"),
        );

        let outcome = pipeline.run("rust borrow checker", None).await.unwrap();

        assert!(matches!(
            outcome,
            RunOutcome::Empty(EmptyReason::NoDocuments)
        ));
        assert_eq!(scraper.calls.load(Ordering::SeqCst), 2);
        assert_eq!(embeddings.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn full_run_returns_answer_with_ranked_sources() {
        let mut pages = HashMap::new();
        pages.insert(
            "https://rust.example".to_string(),
            article("Rust Book", &"rust ownership rules explained in depth ".repeat(20)),
        );
        pages.insert(
            "https://cooking.example".to_string(),
            article("Cooking", &"cooking pasta at home every day ".repeat(20)),
        );
        let (pipeline, _, _) = pipeline_with(
            vec![
                result("https://rust.example", "Rust Book"),
                result("https://cooking.example", "Cooking"),
            ],
            pages,
            Ok("Ownership is central to Rust. [1]"),
        );

        let outcome = pipeline.run("rust ownership", None).await.unwrap();

        let RunOutcome::Answer(answer) = outcome else {
            panic!("expected an answer");
        };
        assert_eq!(answer.text, "Ownership is central to Rust. [1]");
        assert!(!answer.sources.is_empty());
        assert!(answer.sources.len() <= 2);
        // the on-topic page must rank first
        assert_eq!(answer.sources[0].url, "https://rust.example");
        // every citation index in the answer stays within the sources list
        for (index, _) in answer.text.match_indices('[') {
            let digits: String = answer.text[index + 1..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            let cited: usize = digits.parse().unwrap();
            assert!(cited >= 1 && cited <= answer.sources.len());
        }
    }

    #[tokio::test]
    async fn generation_failure_keeps_sources_with_apology() {
        let mut pages = HashMap::new();
        pages.insert(
            "https://rust.example".to_string(),
            article("Rust Book", &"rust ownership rules ".repeat(30)),
        );
        let (pipeline, _, _) = pipeline_with(
            vec![result("https://rust.example", "Rust Book")],
            pages,
            Err("all backends down"),
        );

        let outcome = pipeline.run("rust ownership", None).await.unwrap();

        let RunOutcome::Answer(answer) = outcome else {
            panic!("expected an answer");
        };
        assert_eq!(answer.text, GENERATION_APOLOGY);
        assert_eq!(answer.sources[0].url, "https://rust.example");
    }

    #[tokio::test]
    async fn stream_emits_tokens_then_sources_then_done() {
        let mut pages = HashMap::new();
        pages.insert(
            "https://rust.example".to_string(),
            article("Rust Book", &"rust ownership rules ".repeat(30)),
        );
        let (pipeline, _, _) = pipeline_with(
            vec![result("https://rust.example", "Rust Book")],
            pages,
            Ok("Ownership moves values. [1]"),
        );

        let mut rx = pipeline.run_stream("rust ownership".to_string(), None);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        let mut answer = String::new();
        let mut saw_sources = false;
        for event in &events {
            match event {
                StreamEvent::Token { content } => {
                    assert!(!saw_sources, "tokens must precede sources");
                    answer.push_str(content);
                }
                StreamEvent::Sources { sources } => {
                    saw_sources = true;
                    assert_eq!(sources[0].url, "https://rust.example");
                }
                StreamEvent::Error { .. } => panic!("unexpected error event"),
                StreamEvent::Done => {}
            }
        }
        assert_eq!(answer, "Ownership moves values. [1]");
        assert!(saw_sources);
        assert_eq!(events.last(), Some(&StreamEvent::Done));
    }

    #[tokio::test]
    async fn stream_empty_outcome_sends_notice_and_done() {
        let (pipeline, _, _) = pipeline_with(vec![], HashMap::new(), Ok("unused"));

        let mut rx = pipeline.run_stream("anything".to_string(), None);
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();

        assert!(matches!(first, StreamEvent::Token { .. }));
        assert_eq!(second, StreamEvent::Done);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn stream_events_serialize_with_type_tags() {
        let token = serde_json::to_value(StreamEvent::Token {
            content: "hi".to_string(),
        })
        .unwrap();
        assert_eq!(token["type"], "token");
        assert_eq!(token["content"], "hi");

        let done = serde_json::to_value(StreamEvent::Done).unwrap();
        assert_eq!(done["type"], "done");
    }
}
