//! Retry policy for region calls.
//!
//! Region calls use a small, flat retry budget: failed attempts are repeated
//! without delay. The policy sits behind [`RetryPolicy`] so a backoff strategy
//! can replace it without touching the executor.

use std::fmt::Debug;
use std::time::Duration;

use reqwest::Method;

use crate::errors::TransportErrorKind;

/// Default number of retries after the first attempt.
pub const DEFAULT_RETRIES: u32 = 3;

/// Decides whether a failed transport attempt is repeated.
pub trait RetryPolicy: Send + Sync + Debug {
    /// Retries allowed after the first attempt.
    fn max_retries(&self) -> u32;

    /// Whether attempt number `attempt` (0-based) that failed with `failure`
    /// may be repeated. Budget accounting is the caller's job.
    fn should_retry(&self, attempt: u32, method: &Method, failure: TransportErrorKind) -> bool;

    /// Delay before the next attempt.
    fn backoff(&self, attempt: u32) -> Duration;
}

/// Bounded retries with no delay between attempts.
///
/// Connection failures are retried for every method since the request never
/// reached the region. Other transport failures are retried only for
/// idempotent methods. Timeouts and TLS failures are never retried.
#[derive(Debug, Clone)]
pub struct FlatRetry {
    max_retries: u32,
}

impl FlatRetry {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }
}

impl Default for FlatRetry {
    fn default() -> Self {
        Self::new(DEFAULT_RETRIES)
    }
}

pub(crate) fn is_idempotent(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS
    )
}

impl RetryPolicy for FlatRetry {
    fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn should_retry(&self, _attempt: u32, method: &Method, failure: TransportErrorKind) -> bool {
        match failure {
            TransportErrorKind::Connect => true,
            TransportErrorKind::Other => is_idempotent(method),
            TransportErrorKind::Tls | TransportErrorKind::Timeout | TransportErrorKind::MaxRetries => {
                false
            }
        }
    }

    fn backoff(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}
