//! Static HTML fetching with a pooled client and bounded retries.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL};
use reqwest::{Client, StatusCode};

use crate::core::errors::ApiError;

use super::HtmlFetcher;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/127.0.0.0 Safari/537.36";

const RETRYABLE_STATUS: [u16; 5] = [429, 500, 502, 503, 504];

/// Backoff before retry `n` (1-based): 0.6s, 1.2s, 2.4s, ...
fn backoff_delay(retry: u32) -> Duration {
    Duration::from_millis(600 * (1u64 << (retry - 1).min(4)))
}

pub struct HttpFetcher {
    client: Client,
    attempts: u32,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, attempts: u32) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            client,
            attempts: attempts.max(1),
        })
    }

    /// Shares the fetcher's pooled connections with other HTTP collaborators.
    pub fn client(&self) -> Client {
        self.client.clone()
    }
}

#[async_trait]
impl HtmlFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, ApiError> {
        let mut last_error = String::new();

        for attempt in 1..=self.attempts {
            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.text().await.map_err(ApiError::network);
                    }
                    if is_retryable(status) && attempt < self.attempts {
                        tracing::debug!(
                            "GET {} returned {}, retrying ({}/{})",
                            url,
                            status,
                            attempt,
                            self.attempts
                        );
                        tokio::time::sleep(backoff_delay(attempt)).await;
                        last_error = format!("status {status}");
                        continue;
                    }
                    return Err(ApiError::Network(format!("GET {url} failed: {status}")));
                }
                // Connection-level and timeout failures are always retryable.
                Err(err) => {
                    if attempt < self.attempts {
                        tracing::debug!(
                            "GET {} failed ({}), retrying ({}/{})",
                            url,
                            err,
                            attempt,
                            self.attempts
                        );
                        tokio::time::sleep(backoff_delay(attempt)).await;
                        last_error = err.to_string();
                        continue;
                    }
                    return Err(ApiError::network(err));
                }
            }
        }

        Err(ApiError::Network(format!(
            "GET {url} failed after {} attempts: {last_error}",
            self.attempts
        )))
    }
}

fn is_retryable(status: StatusCode) -> bool {
    RETRYABLE_STATUS.contains(&status.as_u16())
}
