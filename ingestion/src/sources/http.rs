use super::AdapterError;
use govsearch_core::config::HttpConfig;
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
}

pub trait BackoffPolicy {
    fn delay_for_attempt(&self, attempt: usize) -> Duration;
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 500,
        }
    }
}

impl BackoffPolicy for RetryPolicy {
    /// Doubles per attempt: base, 2*base, 4*base, ...
    fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as u32;
        Duration::from_millis(self.base_backoff_ms.saturating_mul(1u64 << exponent))
    }
}

/// Shared JSON GET client for the source adapters.
pub struct HttpFetcher {
    client: Client,
    retry: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self, AdapterError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|err| AdapterError::Client(err.to_string()))?;

        Ok(Self {
            client,
            retry: RetryPolicy {
                max_attempts: config.max_attempts.max(1),
                base_backoff_ms: config.base_backoff_ms,
            },
        })
    }

    /// GET `url` and decode the body as JSON, retrying transient failures.
    pub async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
        headers: &HeaderMap,
    ) -> Result<Value, AdapterError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.get_once(url, query, headers).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    tracing::warn!(
                        url = %redact_url(url),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient fetch failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn get_once(
        &self,
        url: &str,
        query: &[(&str, String)],
        headers: &HeaderMap,
    ) -> Result<Value, AdapterError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .headers(headers.clone())
            .send()
            .await
            // API keys can travel in the query string.
            .map_err(|err| AdapterError::Transport(err.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::Http {
                status: status.as_u16(),
                url: redact_url(url),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| AdapterError::Transport(err.without_url()))?;
        serde_json::from_slice(&body)
            .map_err(|err| AdapterError::Decode(format!("{}: {err}", redact_url(url))))
    }
}

/// Drop the query string so credentials never reach logs or errors.
pub fn redact_url(url: &str) -> String {
    url.split('?').next().unwrap_or(url).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_backoff_ms: 100,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn test_redact_url_strips_query() {
        assert_eq!(
            redact_url("https://api.congress.gov/v3/bill/118?api_key=secret&limit=5"),
            "https://api.congress.gov/v3/bill/118"
        );
        assert_eq!(redact_url("https://x.gov/a"), "https://x.gov/a");
    }
}
