//! Outbound HTTP with bounded retry on transport failure.
//!
//! Only failures to complete the exchange (connect errors, timeouts) are
//! retried. A response with a non-2xx status is an answer, not a transport
//! failure, and surfaces immediately as [`TransportError::Upstream`].

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Delay before the first retry. Each further retry doubles it.
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(10);

/// Body argument for calls that send no body.
pub const NO_BODY: Option<&()> = None;

/// Errors from an outbound call.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Upstream {url} responded with {status}: {body}")]
    Upstream {
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("Invalid response body from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Attempt budget and backoff schedule for one logical call.
///
/// The first attempt runs immediately; each retry waits 10ms, 20ms, 40ms, ...
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
}

impl RetryPolicy {
    /// `max_retries` counts every attempt, the first included. Zero means one attempt.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_attempts: max_retries.max(1),
            initial_backoff: INITIAL_BACKOFF,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `op` until it succeeds, fails with an error `retryable` rejects,
    /// or the attempt budget is spent. The last error is returned as is.
    pub async fn run<T, E, F, Fut, R>(&self, mut op: F, retryable: R) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
        E: Display,
    {
        let mut backoff = self.initial_backoff;
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= self.max_attempts || !retryable(&err) => return Err(err),
                Err(err) => {
                    tracing::debug!(
                        attempt,
                        max_attempts = self.max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Outbound call failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
            }
        }
    }
}

/// HTTP client that retries transport failures according to a [`RetryPolicy`].
///
/// The timeout covers the whole exchange, body included, so streaming
/// dispatches need an instance with a long timeout.
#[derive(Debug, Clone)]
pub struct RetryingTransport {
    client: Client,
    policy: RetryPolicy,
}

impl RetryingTransport {
    pub fn new(timeout: Duration, max_retries: u32) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TransportError::Client)?;

        Ok(Self {
            client,
            policy: RetryPolicy::new(max_retries),
        })
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// POST and discard the response body.
    pub async fn post<B>(&self, url: &str, body: Option<&B>) -> Result<(), TransportError>
    where
        B: Serialize + ?Sized,
    {
        self.execute(url, body).await.map(|_| ())
    }

    /// POST and decode a JSON response body.
    pub async fn post_json<B, R>(&self, url: &str, body: Option<&B>) -> Result<R, TransportError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self.execute(url, body).await?;
        response.json().await.map_err(|source| TransportError::Decode {
            url: url.to_string(),
            source,
        })
    }

    /// POST and hand back the successful response with its body unread.
    pub async fn post_stream<B>(&self, url: &str, body: Option<&B>) -> Result<Response, TransportError>
    where
        B: Serialize + ?Sized,
    {
        self.execute(url, body).await
    }

    async fn execute<B>(&self, url: &str, body: Option<&B>) -> Result<Response, TransportError>
    where
        B: Serialize + ?Sized,
    {
        let response = self
            .policy
            .run(
                || {
                    let mut request = self.client.post(url);
                    if let Some(body) = body {
                        request = request.json(body);
                    }
                    request.send()
                },
                |err: &reqwest::Error| !err.is_builder(),
            )
            .await
            .map_err(|source| TransportError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::debug!(url, status = %status, error = %e, "Failed to read error response body");
                    format!("failed to read response body: {e}")
                }
            };
            return Err(TransportError::Upstream {
                url: url.to_string(),
                status,
                body,
            });
        }

        Ok(response)
    }
}
