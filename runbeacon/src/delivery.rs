// Copyright (c) The runbeacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery of the summary payload to the webhook endpoint.
//!
//! One delivery walks a small state machine: `Pending → (send) → Delivered`,
//! or back to `Pending` through a backoff wait on a retryable failure, or
//! `Abandoned` on a client rejection or budget exhaustion. Client errors
//! (HTTP 4xx) are never retried: they indicate a malformed payload or bad
//! credentials that retries cannot fix. Server errors and transport
//! failures are presumed transient and retried up to the attempt budget.
//!
//! [`DeliveryClient::deliver`] never returns an error: every outcome is
//! narrated via `tracing` and reduced to a terminal [`DeliveryOutcome`].

use crate::errors::{ConfigError, DeliveryError, TransportFailure};
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

/// Default number of send attempts per delivery, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Upper bound accepted for a configured attempt count.
pub const MAX_DELIVERY_ATTEMPTS: u32 = 10;

/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Default cap on the exponential backoff delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(5000);

/// Default per-attempt request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Retry schedule and timeouts for webhook delivery.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DeliveryPolicy {
    /// Total number of send attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each subsequent retry.
    pub base_delay: Duration,
    /// Cap applied to the exponential delay.
    pub max_delay: Duration,
    /// Per-attempt request timeout.
    pub request_timeout: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Iterator of waits between send attempts: exponential with factor 2,
/// capped at the policy's max delay. For the defaults this yields 1000ms,
/// 2000ms, 4000ms, then 5000ms thereafter.
#[derive(Debug)]
struct BackoffIter {
    base_delay: Duration,
    max_delay: Duration,
    current_factor: f64,
    remaining_waits: u32,
}

impl BackoffIter {
    const BACKOFF_EXPONENT: f64 = 2.;

    fn new(policy: &DeliveryPolicy) -> Self {
        Self {
            base_delay: policy.base_delay,
            max_delay: policy.max_delay,
            current_factor: 1.,
            // One wait between each pair of consecutive attempts.
            remaining_waits: policy.max_attempts.saturating_sub(1),
        }
    }
}

impl Iterator for BackoffIter {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining_waits == 0 {
            return None;
        }
        self.remaining_waits -= 1;

        let exp_delay = self.base_delay.mul_f64(self.current_factor);
        // Stop multiplying the factor once the delay exceeds max_delay.
        if exp_delay > self.max_delay {
            return Some(self.max_delay);
        }
        self.current_factor *= Self::BACKOFF_EXPONENT;
        Some(exp_delay)
    }
}

/// The terminal result of one delivery.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DeliveryOutcome {
    /// The endpoint acknowledged the payload with a success status.
    Delivered,
    /// The payload was given up on: the endpoint rejected it, or the
    /// attempt budget ran out.
    Abandoned,
}

/// An HTTP response, reduced to what the retry decision needs.
#[derive(Clone, Debug)]
pub struct WebhookResponse {
    /// The HTTP status code.
    pub status: u16,
    /// The response body, used for diagnosing rejections.
    pub body: String,
}

impl WebhookResponse {
    /// Classifies this response: `Ok(())` for success, a [`DeliveryError`]
    /// carrying the retry decision otherwise.
    fn classify(&self) -> Result<(), DeliveryError> {
        match self.status {
            200..=299 => Ok(()),
            400..=499 => Err(DeliveryError::ClientRejected {
                status: self.status,
                body: self.body.clone(),
            }),
            status => Err(DeliveryError::ServerUnavailable { status }),
        }
    }
}

/// Sleeps between retry attempts.
///
/// Pluggable so tests can observe the backoff schedule without waiting it
/// out.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Suspends the delivery flow for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by the tokio timer.
#[derive(Clone, Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sends one payload to one endpoint.
///
/// The production implementation is [`HttpTransport`]; tests script
/// responses through their own implementations.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    /// Sends `body` as a JSON POST to `endpoint`.
    async fn send(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<WebhookResponse, TransportFailure>;
}

/// [`WebhookTransport`] over a reqwest client.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    request_timeout: Duration,
}

impl HttpTransport {
    /// Constructs a transport with the given per-attempt request timeout.
    pub fn new(request_timeout: Duration) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|error| ConfigError::HttpClient {
                reason: error.to_string(),
            })?;
        Ok(Self {
            client,
            request_timeout,
        })
    }

    fn classify_send_error(&self, error: reqwest::Error) -> TransportFailure {
        if error.is_timeout() {
            TransportFailure::Timeout {
                timeout: self.request_timeout,
            }
        } else if error.is_connect() {
            TransportFailure::Connect {
                reason: error.to_string(),
            }
        } else {
            TransportFailure::Other {
                reason: error.to_string(),
            }
        }
    }
}

#[async_trait]
impl WebhookTransport for HttpTransport {
    async fn send(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<WebhookResponse, TransportFailure> {
        let response = self
            .client
            .post(endpoint)
            .json(body)
            .send()
            .await
            .map_err(|error| self.classify_send_error(error))?;

        let status = response.status().as_u16();
        // A body that fails to download doesn't change the retry decision;
        // the status already arrived.
        let body = response.text().await.unwrap_or_default();
        Ok(WebhookResponse { status, body })
    }
}

/// Webhook delivery with bounded retries and exponential backoff.
pub struct DeliveryClient {
    transport: Arc<dyn WebhookTransport>,
    sleeper: Arc<dyn Sleeper>,
    policy: DeliveryPolicy,
}

impl DeliveryClient {
    /// Constructs a client that delivers over HTTP.
    pub fn new(policy: DeliveryPolicy) -> Result<Self, ConfigError> {
        let transport = HttpTransport::new(policy.request_timeout)?;
        Ok(Self::with_transport(
            policy,
            Arc::new(transport),
            Arc::new(TokioSleeper),
        ))
    }

    /// Constructs a client with a custom transport and sleeper.
    ///
    /// This is the seam used by tests and by hosts that bring their own
    /// HTTP stack.
    pub fn with_transport(
        policy: DeliveryPolicy,
        transport: Arc<dyn WebhookTransport>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            transport,
            sleeper,
            policy,
        }
    }

    /// Delivers `body` to `endpoint`, retrying per the policy.
    ///
    /// Infallible: failures are logged, and the terminal state is reported
    /// through the returned [`DeliveryOutcome`].
    pub async fn deliver(&self, endpoint: &str, body: &serde_json::Value) -> DeliveryOutcome {
        let max_attempts = self.policy.max_attempts;
        let mut backoff = BackoffIter::new(&self.policy);

        for attempt in 1..=max_attempts {
            debug!(attempt, max_attempts, "sending webhook notification");
            let error = match self.transport.send(endpoint, body).await {
                Ok(response) => match response.classify() {
                    Ok(()) => {
                        info!(attempt, "webhook notification delivered");
                        return DeliveryOutcome::Delivered;
                    }
                    Err(error) => error,
                },
                Err(failure) => DeliveryError::from(failure),
            };

            if !error.is_retryable() {
                warn!(%error, "webhook endpoint rejected the notification, not retrying");
                return DeliveryOutcome::Abandoned;
            }

            if let Some(delay) = backoff.next() {
                warn!(
                    %error,
                    attempt,
                    ?delay,
                    "webhook delivery attempt failed, retrying after backoff"
                );
                self.sleeper.sleep(delay).await;
            } else {
                warn!(%error, attempt, "webhook delivery attempt failed");
            }
        }

        warn!(
            attempts = max_attempts,
            "giving up on webhook notification, retries exhausted"
        );
        DeliveryOutcome::Abandoned
    }
}
