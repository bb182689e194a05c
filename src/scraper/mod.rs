//! Staged page scraping: static fetch first, headless render as fallback.

pub mod extractor;
pub mod fetcher;
pub mod render;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

/// Readable content extracted from a page. Empty `text` means "no content",
/// never an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub text: String,
    pub html: String,
}

#[async_trait]
pub trait HtmlFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, ApiError>;
}

#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<String, ApiError>;
}

/// The scrape operation the pipeline consumes.
#[async_trait]
pub trait ContentScraper: Send + Sync {
    async fn scrape(&self, url: &str) -> Article;
}

pub struct Scraper {
    fetcher: Arc<dyn HtmlFetcher>,
    renderer: Arc<dyn PageRenderer>,
    /// Static text shorter than this is assumed to hide behind client-side
    /// rendering and escalates to the browser pass.
    min_chars: usize,
}

impl Scraper {
    pub fn new(
        fetcher: Arc<dyn HtmlFetcher>,
        renderer: Arc<dyn PageRenderer>,
        min_chars: usize,
    ) -> Self {
        Self {
            fetcher,
            renderer,
            min_chars,
        }
    }

    async fn render_and_extract(&self, url: &str) -> Option<Article> {
        match self.renderer.render(url).await {
            Ok(html) => {
                let article = extractor::extract(url, &html);
                Some(article)
            }
            Err(err) => {
                tracing::warn!("render fallback for {} failed: {}", url, err);
                None
            }
        }
    }
}

#[async_trait]
impl ContentScraper for Scraper {
    /// Static fetch, extract, and escalate to a render pass when the static
    /// text is too short or the fetch failed outright. Both paths failing
    /// yields an empty article rather than an error.
    async fn scrape(&self, url: &str) -> Article {
        let static_article = match self.fetcher.fetch(url).await {
            Ok(html) => Some(extractor::extract(url, &html)),
            Err(err) => {
                tracing::warn!("static fetch of {} failed: {}", url, err);
                None
            }
        };

        if let Some(article) = &static_article {
            if article.text.chars().count() >= self.min_chars {
                return article.clone();
            }
        }

        if let Some(rendered) = self.render_and_extract(url).await {
            return rendered;
        }

        static_article.unwrap_or_default()
    }
}
