//! Shared HTTP client for every page and feed the scrapers read.

use crate::api::{ApiError, RetryPolicy, retry_with_backoff};
use crate::config::ScrapeConfig;
use reqwest::Client;
use reqwest::header::{ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use std::error::Error;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// A `reqwest` client with the browser-like headers news sites expect, plus
/// the shared retry policy.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    policy: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(config: &ScrapeConfig) -> Result<Self, Box<dyn Error>> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_str(&config.accept_language)?);
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            policy: RetryPolicy::new(config.max_attempts, Duration::from_millis(config.base_delay_ms)),
        })
    }

    /// GET `url` and return the body, retrying transient failures.
    #[instrument(level = "debug", skip(self))]
    pub async fn fetch_text(&self, url: &str) -> Result<String, ApiError> {
        retry_with_backoff(url, &self.policy, |attempt| async move {
            let t0 = Instant::now();
            let res = self.client.get(url).send().await?;
            let status = res.status();
            if !status.is_success() {
                return Err(ApiError::from_status(status.as_u16(), format!("GET {url}"), None));
            }
            let body = res.text().await?;
            debug!(attempt, bytes = body.len(), elapsed_ms = t0.elapsed().as_millis(), "Fetched");
            Ok(body)
        })
        .await
    }
}
