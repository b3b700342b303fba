// Copyright (c) The runbeacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by runbeacon.

use crate::delivery::MAX_DELIVERY_ATTEMPTS;
use std::time::Duration;
use thiserror::Error;

/// An error that occurred while building the reporter configuration.
///
/// This is the only error surfaced to the embedding host, and only at
/// construction time. Once a run is underway, failures in the notification
/// path are logged and swallowed.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The configured webhook endpoint is not a valid HTTP(S) URL.
    #[error("invalid webhook endpoint `{url}`: {reason}")]
    InvalidEndpoint {
        /// The endpoint as configured.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The delivery attempt count override could not be parsed or is out of
    /// range.
    #[error(
        "invalid delivery attempt count `{input}`: expected an integer \
         between 1 and {MAX_DELIVERY_ATTEMPTS}"
    )]
    InvalidMaxRetries {
        /// The value as configured.
        input: String,
    },

    /// The HTTP client could not be constructed (for example, no TLS
    /// backend is available).
    #[error("failed to construct the webhook HTTP client: {reason}")]
    HttpClient {
        /// Why construction failed.
        reason: String,
    },
}

/// A transport-level failure while sending the webhook request.
///
/// The variants are distinguished so that logs can tell a slow endpoint from
/// an unreachable one. All transport failures are presumed transient and
/// retried.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TransportFailure {
    /// The request did not complete within the per-attempt timeout.
    #[error("request timed out after {timeout:?}")]
    Timeout {
        /// The configured per-attempt timeout.
        timeout: Duration,
    },

    /// The connection could not be established: refused, reset, or the host
    /// could not be resolved.
    #[error("connection failed: {reason}")]
    Connect {
        /// The underlying error, rendered for logging.
        reason: String,
    },

    /// Any other I/O or protocol error.
    #[error("transport error: {reason}")]
    Other {
        /// The underlying error, rendered for logging.
        reason: String,
    },
}

/// A single failed delivery attempt, classified for retryability.
#[derive(Clone, Debug, Error)]
pub enum DeliveryError {
    /// The endpoint rejected the payload with a client error (HTTP 4xx).
    ///
    /// Retries cannot fix a malformed payload or bad credentials, so this is
    /// terminal regardless of remaining attempt budget.
    #[error("endpoint rejected the payload with status {status}: {body}")]
    ClientRejected {
        /// The HTTP status code.
        status: u16,
        /// The response body, for diagnosis.
        body: String,
    },

    /// The endpoint answered with a server error (HTTP 5xx) or another
    /// unexpected non-success status. Presumed transient.
    #[error("endpoint unavailable, status {status}")]
    ServerUnavailable {
        /// The HTTP status code.
        status: u16,
    },

    /// The request never produced an HTTP response. Presumed transient.
    #[error("failed to reach endpoint")]
    Transport(#[from] TransportFailure),
}

impl DeliveryError {
    /// Returns true if a later attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::ClientRejected { .. } => false,
            DeliveryError::ServerUnavailable { .. } | DeliveryError::Transport(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_rejection_is_terminal() {
        let err = DeliveryError::ClientRejected {
            status: 404,
            body: "no such hook".to_owned(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn server_and_transport_failures_are_retryable() {
        let server = DeliveryError::ServerUnavailable { status: 503 };
        assert!(server.is_retryable());

        let timeout = DeliveryError::Transport(TransportFailure::Timeout {
            timeout: Duration::from_secs(30),
        });
        assert!(timeout.is_retryable());

        let connect = DeliveryError::Transport(TransportFailure::Connect {
            reason: "connection refused".to_owned(),
        });
        assert!(connect.is_retryable());
    }
}
