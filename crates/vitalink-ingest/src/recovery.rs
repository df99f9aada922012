//! Retry executor
//!
//! Runs a fallible async operation with a bounded number of attempts,
//! sleeping `backoff * attempt` between them, and optionally falls back to a
//! second operation once every primary attempt has failed. The outcome is
//! always a [`RecoveryResult`]; callers never handle an error value directly.

use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::events::{EventSink, RecoveryEvent, TracingEventSink};

/// Default number of attempts for a resilient operation
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay between attempts
pub const DEFAULT_BACKOFF_MS: u64 = 1000;

/// Outcome of a resilient operation.
///
/// `data` is present exactly when the operation succeeded, and `recovered`
/// can only be set alongside data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryResult<T> {
    success: bool,
    data: Option<T>,
    recovered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl<T> RecoveryResult<T> {
    /// Worked on the happy path
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            recovered: false,
            message: None,
        }
    }

    /// Worked on attempt `attempt`; recovered when that was not the first
    pub fn ok_after(data: T, context: &str, attempt: u32) -> Self {
        if attempt > 1 {
            Self::recovered(data, format!("{} succeeded after {} attempts", context, attempt))
        } else {
            Self::ok(data)
        }
    }

    /// Worked, but only through a degraded path
    pub fn recovered(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            recovered: true,
            message: Some(message.into()),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            recovered: false,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn is_recovered(&self) -> bool {
        self.recovered
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn into_data(self) -> Option<T> {
        self.data
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> RecoveryResult<U> {
        RecoveryResult {
            success: self.success,
            data: self.data.map(f),
            recovered: self.recovered,
            message: self.message,
        }
    }
}

/// How many times to try and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    pub fn with_max_retries(self, max_retries: u32) -> Self {
        Self {
            max_retries,
            ..self
        }
    }

    /// A single attempt with no waiting
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Attempts actually made; zero is treated as one.
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Delay after failed attempt `attempt` (1-based). Linear, not exponential.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

/// Executes operations under a [`RetryPolicy`], reporting to an [`EventSink`]
#[derive(Clone)]
pub struct RetryExecutor {
    sink: Arc<dyn EventSink>,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(Arc::new(TracingEventSink))
    }
}

impl RetryExecutor {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    /// Run `operation` until it succeeds or the policy is exhausted.
    pub async fn run<T, E, F, Fut>(
        &self,
        context: &str,
        policy: &RetryPolicy,
        operation: F,
    ) -> RecoveryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        match self.attempt_all(context, policy, operation).await {
            Some((data, attempt)) => RecoveryResult::ok_after(data, context, attempt),
            None => self.exhausted(context, policy),
        }
    }

    /// Like [`run`](Self::run), but call `fallback` exactly once if every
    /// primary attempt fails. The fallback is never retried.
    pub async fn run_with_fallback<T, E, F, Fut, E2, G, GFut>(
        &self,
        context: &str,
        policy: &RetryPolicy,
        operation: F,
        fallback: G,
    ) -> RecoveryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E2>>,
        E2: Display,
    {
        if let Some((data, attempt)) = self.attempt_all(context, policy, operation).await {
            return RecoveryResult::ok_after(data, context, attempt);
        }

        self.sink.record(RecoveryEvent::FallbackStarted {
            context: context.to_string(),
        });

        match fallback().await {
            Ok(data) => {
                self.sink.record(RecoveryEvent::FallbackSucceeded {
                    context: context.to_string(),
                });
                let message = format!("{} completed using fallback method", context);
                RecoveryResult::recovered(data, message)
            },
            Err(e) => {
                self.sink.record(RecoveryEvent::FallbackFailed {
                    context: context.to_string(),
                    error: e.to_string(),
                });
                self.exhausted(context, policy)
            },
        }
    }

    /// Returns the value and the 1-based attempt that produced it
    async fn attempt_all<T, E, F, Fut>(
        &self,
        context: &str,
        policy: &RetryPolicy,
        mut operation: F,
    ) -> Option<(T, u32)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let max_attempts = policy.attempts();

        for attempt in 1..=max_attempts {
            match operation().await {
                Ok(data) => {
                    if attempt > 1 {
                        self.sink.record(RecoveryEvent::SucceededAfterRetry {
                            context: context.to_string(),
                            attempts: attempt,
                        });
                    }
                    return Some((data, attempt));
                },
                Err(e) => {
                    let retry_in = (attempt < max_attempts).then(|| policy.delay_for(attempt));

                    self.sink.record(RecoveryEvent::AttemptFailed {
                        context: context.to_string(),
                        attempt,
                        max_attempts,
                        error: e.to_string(),
                        retry_in,
                    });

                    if let Some(delay) = retry_in {
                        tokio::time::sleep(delay).await;
                    }
                },
            }
        }

        None
    }

    fn exhausted<T>(&self, context: &str, policy: &RetryPolicy) -> RecoveryResult<T> {
        self.sink.record(RecoveryEvent::Exhausted {
            context: context.to_string(),
            attempts: policy.attempts(),
        });
        RecoveryResult::failed(format!("{} failed after all retry attempts", context))
    }
}
