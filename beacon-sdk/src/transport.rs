//! Retry transport
//!
//! Sends a batch to the ingestion endpoint and classifies the result:
//! network errors, timeouts, and 5xx responses are retryable; 4xx responses
//! are terminal (the identical request can never succeed). Retries back off
//! exponentially from a 1s base, capped at 30s, with the attempt counter
//! scoped to the batch rather than shared globally.
//!
//! The backoff wait is the only cancellable operation: a shutdown signal
//! abandons it and leaves the batch durably queued for the next process
//! lifetime.

use std::future::Future;
use std::time::Duration;

use beacon_core::{Envelope, IngestRequest, IngestResponse};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use tokio::sync::watch;

use crate::config::SdkConfig;
use crate::error::{Error, Result};

/// Classified result of one delivery attempt
#[derive(Debug)]
pub enum Outcome {
    /// Server acknowledged the batch with per-event counts
    Delivered(IngestResponse),
    /// Transient failure; the same batch may succeed later
    Retryable(String),
    /// Permanent failure; retrying the identical batch cannot succeed
    Terminal(String),
}

/// One-shot batch delivery over some medium
pub trait BatchSender: Send + Sync {
    fn send(&self, events: &[Envelope]) -> impl Future<Output = Outcome> + Send;
}

/// Backoff schedule: 1s, 2s, 4s, 8s, ... capped at 30s.
///
/// `attempt` is the number of failed attempts so far (1-based).
pub fn backoff_delay(attempt: u32) -> Duration {
    const MAX: Duration = Duration::from_secs(30);
    let secs = 1u64 << attempt.saturating_sub(1).min(6);
    MAX.min(Duration::from_secs(secs))
}

/// HTTP sender backed by reqwest
pub struct HttpSender {
    http_client: reqwest::Client,
    url: String,
}

impl HttpSender {
    pub fn new(config: &SdkConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Transport(format!("failed to create HTTP client: {}", e)))?;

        let url = format!("{}/v1/events", config.endpoint.trim_end_matches('/'));

        Ok(Self { http_client, url })
    }
}

impl BatchSender for HttpSender {
    async fn send(&self, events: &[Envelope]) -> Outcome {
        let events: Vec<serde_json::Value> = match events
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<_, _>>()
        {
            Ok(events) => events,
            Err(e) => return Outcome::Terminal(format!("unserializable batch: {}", e)),
        };
        let request = IngestRequest { events };

        let response = match self.http_client.post(&self.url).json(&request).send().await {
            Ok(response) => response,
            Err(e) => return Outcome::Retryable(format!("request failed: {}", e)),
        };

        let status = response.status();
        if status.is_success() {
            match response.json::<IngestResponse>().await {
                Ok(counts) => Outcome::Delivered(counts),
                Err(e) => Outcome::Retryable(format!("unreadable response: {}", e)),
            }
        } else if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Outcome::Retryable(format!("server error ({})", status))
        } else {
            let body = response.text().await.unwrap_or_else(|_| "unknown".to_string());
            Outcome::Terminal(format!("server rejected batch ({}): {}", status, body))
        }
    }
}

/// Drives a [`BatchSender`] with bounded exponential-backoff retries
pub struct RetryTransport<S> {
    sender: S,
    max_attempts: usize,
    shutdown: watch::Receiver<bool>,
}

impl<S: BatchSender> RetryTransport<S> {
    pub fn new(sender: S, max_attempts: usize, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            sender,
            max_attempts,
            shutdown,
        }
    }

    /// Attempt delivery up to `max_attempts` times.
    ///
    /// Returns the first non-retryable outcome, or `Retryable` once attempts
    /// are exhausted so the caller leaves the batch queued.
    pub async fn deliver(&self, events: &[Envelope]) -> Outcome {
        let mut shutdown = self.shutdown.clone();
        let mut last_reason = String::new();

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                let delay = backoff_delay((attempt - 1) as u32);
                tracing::debug!(attempt, ?delay, "Waiting before retry");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => {
                        tracing::debug!("Shutdown during backoff, leaving batch queued");
                        return Outcome::Retryable("shutdown during backoff".to_string());
                    }
                }
            }

            match self.sender.send(events).await {
                Outcome::Retryable(reason) => {
                    tracing::warn!(attempt, max = self.max_attempts, %reason, "Transient delivery failure");
                    last_reason = reason;
                }
                outcome => return outcome,
            }
        }

        Outcome::Retryable(format!("attempts exhausted: {}", last_reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    struct FailingSender {
        attempts: Arc<AtomicUsize>,
        succeed_on: Option<usize>,
        terminal: bool,
    }

    impl BatchSender for FailingSender {
        async fn send(&self, _events: &[Envelope]) -> Outcome {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if self.terminal {
                return Outcome::Terminal("payload too large".to_string());
            }
            match self.succeed_on {
                Some(n) if attempt >= n => Outcome::Delivered(IngestResponse {
                    received: 1,
                    inserted: 1,
                    ..Default::default()
                }),
                _ => Outcome::Retryable("connection refused".to_string()),
            }
        }
    }

    fn shutdown_pair() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    #[test]
    fn test_backoff_schedule() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(2), Duration::from_secs(2));
        assert_eq!(backoff_delay(3), Duration::from_secs(4));
        assert_eq!(backoff_delay(4), Duration::from_secs(8));
        assert_eq!(backoff_delay(5), Duration::from_secs(16));
        // Capped at 30s from here on
        assert_eq!(backoff_delay(6), Duration::from_secs(30));
        assert_eq!(backoff_delay(12), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let sender = FailingSender {
            attempts: attempts.clone(),
            succeed_on: Some(3),
            terminal: false,
        };
        let (_tx, rx) = shutdown_pair();
        let transport = RetryTransport::new(sender, 5, rx);

        let start = Instant::now();
        let outcome = transport.deliver(&[]).await;

        assert!(matches!(outcome, Outcome::Delivered(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // Two backoff waits: 1s + 2s
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_attempts_stay_retryable() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let sender = FailingSender {
            attempts: attempts.clone(),
            succeed_on: None,
            terminal: false,
        };
        let (_tx, rx) = shutdown_pair();
        let transport = RetryTransport::new(sender, 4, rx);

        let outcome = transport.deliver(&[]).await;

        assert!(matches!(outcome, Outcome::Retryable(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_fails_fast() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let sender = FailingSender {
            attempts: attempts.clone(),
            succeed_on: None,
            terminal: true,
        };
        let (_tx, rx) = shutdown_pair();
        let transport = RetryTransport::new(sender, 5, rx);

        let outcome = transport.deliver(&[]).await;

        assert!(matches!(outcome, Outcome::Terminal(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_abandons_backoff() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let sender = FailingSender {
            attempts: attempts.clone(),
            succeed_on: None,
            terminal: false,
        };
        let (tx, rx) = shutdown_pair();
        let transport = RetryTransport::new(sender, 5, rx);

        let deliver = tokio::spawn(async move { transport.deliver(&[]).await });
        // Let the first attempt fail and the backoff begin
        tokio::task::yield_now().await;
        tx.send(true).unwrap();

        let outcome = deliver.await.unwrap();
        assert!(matches!(outcome, Outcome::Retryable(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
