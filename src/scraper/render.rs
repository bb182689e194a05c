//! Headless-browser render fallback for JavaScript-heavy pages.
//!
//! Launches headless Chrome over the DevTools protocol, navigates, waits for
//! the page to settle, and returns the serialized DOM. Images, remote fonts,
//! and audio are disabled at launch since only the text matters here. The
//! whole pass is bounded by the render timeout; this is the dominant
//! tail-latency risk of the pipeline.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures_util::StreamExt;

use crate::core::errors::ApiError;

use super::PageRenderer;

const BROWSER_ARGS: [&str; 8] = [
    "--disable-gpu",
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--disable-extensions",
    "--disable-background-networking",
    "--blink-settings=imagesEnabled=false",
    "--disable-remote-fonts",
    "--mute-audio",
];

// Post-load settle delay for late XHR-driven content.
const SETTLE_DELAY: Duration = Duration::from_millis(1500);

pub struct ChromiumRenderer {
    timeout: Duration,
}

impl ChromiumRenderer {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn render_inner(&self, url: &str) -> Result<String, ApiError> {
        let config = BrowserConfig::builder()
            .args(BROWSER_ARGS)
            .build()
            .map_err(|e| ApiError::Internal(format!("browser config error: {e}")))?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ApiError::Network(format!("failed to launch browser: {e}")))?;

        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        let result = async {
            let page = browser
                .new_page(url)
                .await
                .map_err(|e| ApiError::Network(format!("failed to open page: {e}")))?;

            page.wait_for_navigation()
                .await
                .map_err(|e| ApiError::Network(format!("navigation failed: {e}")))?;
            tokio::time::sleep(SETTLE_DELAY).await;

            page.content()
                .await
                .map_err(|e| ApiError::Network(format!("failed to read DOM: {e}")))
        }
        .await;

        let _ = browser.close().await;
        handler_task.abort();

        result
    }
}

#[async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn render(&self, url: &str) -> Result<String, ApiError> {
        tracing::debug!("rendering {} with headless browser", url);
        tokio::time::timeout(self.timeout, self.render_inner(url))
            .await
            .map_err(|_| ApiError::Network(format!("render of {url} timed out")))?
    }
}
