//! HTTP plumbing shared by the catalog client and the item fetcher.
//!
//! - [`create_client`] builds the one `reqwest::Client` a harvest run uses,
//!   with a user agent and a per-request timeout.
//! - [`get_bytes`] performs a GET with bounded retry:
//!   HTTP 429 and 5xx, plus transport errors, are retried with exponential
//!   backoff (1s, 2s, 4s, ... capped at 32s); any other non-success status
//!   fails immediately.
//! - [`Throttle`] enforces a global minimum spacing between requests, shared
//!   by every worker that holds a clone of it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::HarvestConfig;
use crate::error::HttpError;

pub fn create_client(config: &HarvestConfig) -> Result<reqwest::Client, HttpError> {
    reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|source| HttpError::Transport {
            url: config.base_url.clone(),
            source,
        })
}

/// Delay before retry `attempt` (1-based).
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt - 1).min(5))
}

/// GET `url` and return the body bytes, retrying transient failures.
pub async fn get_bytes(
    client: &reqwest::Client,
    url: &str,
    max_retries: u32,
) -> Result<Vec<u8>, HttpError> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = backoff_delay(attempt);
            debug!(url, attempt, ?delay, "retrying request");
            tokio::time::sleep(delay).await;
        }

        match client.get(url).send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    match response.bytes().await {
                        Ok(body) => return Ok(body.to_vec()),
                        Err(source) => {
                            last_err = Some(HttpError::Transport {
                                url: url.to_string(),
                                source,
                            });
                            continue;
                        }
                    }
                }

                let err = HttpError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                };
                if status.as_u16() == 429 || status.is_server_error() {
                    warn!(url, status = status.as_u16(), "transient HTTP error");
                    last_err = Some(err);
                    continue;
                }
                return Err(err);
            }
            Err(source) => {
                warn!(url, error = %source, "request failed");
                last_err = Some(HttpError::Transport {
                    url: url.to_string(),
                    source,
                });
            }
        }
    }

    // The loop runs at least once, so there is always a recorded error here.
    Err(last_err.unwrap_or(HttpError::Status {
        url: url.to_string(),
        status: 0,
    }))
}

/// Global request spacing.
///
/// Cloning shares the underlying slot, so every clone observes the same
/// rate limit regardless of how many tasks are fetching.
#[derive(Clone)]
pub struct Throttle {
    interval: Duration,
    next_slot: Arc<Mutex<Option<Instant>>>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Arc::new(Mutex::new(None)),
        }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    /// Waits until this caller may issue a request.
    ///
    /// The first call returns immediately; each following call is released
    /// at least `interval` after the previous one.
    pub async fn acquire(&self) {
        if self.interval.is_zero() {
            return;
        }
        let mut next = self.next_slot.lock().await;
        let now = Instant::now();
        let slot = match *next {
            Some(t) if t > now => t,
            _ => now,
        };
        *next = Some(slot + self.interval);
        // Sleeping while holding the lock keeps later callers queued in order.
        tokio::time::sleep_until(slot).await;
    }
}
