//! Retry logic with exponential backoff and error classification.
//!
//! Only server errors (5xx) are retried. Client errors and transport failures
//! are returned to the caller immediately.

use crate::error::TransportFailure;
use std::error::Error as StdError;
use std::time::Duration;

/// Error classification for determining retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// Client errors (400-499) - invalid input, don't retry
    Client,
    /// Server errors (500-599) - temporary issues, retry with backoff
    Server,
    /// Anything else that is not a success
    Other,
}

/// Retry strategy configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryStrategy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff
    pub base_delay_seconds: u64,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_seconds: 2,
        }
    }
}

impl RetryStrategy {
    pub fn new(max_attempts: u32, base_delay_seconds: u64) -> Self {
        Self {
            max_attempts,
            base_delay_seconds,
        }
    }

    /// Check if another attempt is allowed after `attempt` (0-based) failed
    pub fn should_retry(&self, attempt: u32, error_type: ErrorType) -> bool {
        error_type == ErrorType::Server && attempt + 1 < self.max_attempts
    }

    /// Calculate exponential backoff delay
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        // base_delay^(attempt + 1): 2s, 4s, 8s for the default base
        Duration::from_secs(self.base_delay_seconds.saturating_pow(attempt + 1))
    }
}

/// Classify an HTTP status code
pub fn classify_status(status: u16) -> Option<ErrorType> {
    match status {
        200..=299 => None,
        400..=499 => Some(ErrorType::Client),
        500..=599 => Some(ErrorType::Server),
        _ => Some(ErrorType::Other),
    }
}

/// Classify a reqwest error that produced no response
pub fn classify_transport(err: &reqwest::Error) -> TransportFailure {
    if err.is_timeout() {
        return TransportFailure::Timeout;
    }

    let mut chain = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<std::io::Error>() {
            match io_err.kind() {
                std::io::ErrorKind::TimedOut => return TransportFailure::Timeout,
                std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::BrokenPipe => return TransportFailure::ConnectionReset,
                _ => {}
            }
        }
        chain.push(cause.to_string());
        source = cause.source();
    }

    let failure = classify_failure_message(&chain.join(": "));
    if failure == TransportFailure::Other && err.is_connect() {
        TransportFailure::Connect
    } else {
        failure
    }
}

/// Classify a transport error message
pub fn classify_failure_message(message: &str) -> TransportFailure {
    let message = message.to_lowercase();

    if message.contains("timed out") || message.contains("timeout") {
        return TransportFailure::Timeout;
    }

    if message.contains("dns error")
        || message.contains("failed to lookup address")
        || message.contains("name or service not known")
        || message.contains("no such host")
        || message.contains("nodename nor servname")
    {
        return TransportFailure::Dns;
    }

    if message.contains("connection reset")
        || message.contains("reset by peer")
        || message.contains("broken pipe")
        || message.contains("connection closed before message completed")
        || message.contains("connection aborted")
    {
        return TransportFailure::ConnectionReset;
    }

    if message.contains("connection refused") || message.contains("error trying to connect") {
        return TransportFailure::Connect;
    }

    TransportFailure::Other
}
