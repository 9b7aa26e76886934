use std::time::Duration;

use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::credentials::AccessToken;
use crate::types::{AggregatorError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "social-aggregator/0.1".to_string(),
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_seconds: 2,
        }
    }
}

/// Shared JSON fetch helper the platform clients run their requests through.
/// One reqwest client, per-request bearer auth, exponential backoff between
/// retries.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    config: FetchConfig,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Self {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        bearer: Option<&AccessToken>,
    ) -> Result<T> {
        debug!("GET {}", url);

        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_secs(self.config.retry_delay_seconds),
            initial_interval: Duration::from_secs(self.config.retry_delay_seconds),
            max_interval: Duration::from_secs(self.config.retry_delay_seconds * 32),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(self.config.retry_delay_seconds * 60)),
            ..Default::default()
        };

        let mut last_error: Option<AggregatorError> = None;

        for attempt in 0..=self.config.max_retries {
            let mut request = self.client.get(url);
            if let Some(token) = bearer {
                request = request.bearer_auth(token.as_str());
            }

            match request.send().await {
                Ok(response) => match response.error_for_status() {
                    Ok(response) => match response.json::<T>().await {
                        Ok(body) => return Ok(body),
                        Err(e) => last_error = Some(AggregatorError::Http(e)),
                    },
                    Err(e) => last_error = Some(AggregatorError::Http(e)),
                },
                Err(e) => last_error = Some(AggregatorError::Http(e)),
            }

            if attempt < self.config.max_retries {
                if let Some(delay) = backoff.next_backoff() {
                    warn!("Attempt {} failed for {}, retrying in {:?}", attempt + 1, url, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| AggregatorError::Parse(format!("no response from {url}"))))
    }
}
