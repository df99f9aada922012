//! Structured recovery events
//!
//! The retry and write paths never log directly. They describe what happened
//! as a [`RecoveryEvent`] and hand it to an injected [`EventSink`], so the
//! same code runs against `tracing` in production and an in-memory sink in
//! tests.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Write strategy used by the bulk writer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteTier {
    /// Single multi-row insert
    Batch,
    /// Insert resolving conflicts on the caller's key
    Upsert,
    /// One insert per record
    PerRecord,
}

impl fmt::Display for WriteTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteTier::Batch => f.write_str("batch"),
            WriteTier::Upsert => f.write_str("upsert"),
            WriteTier::PerRecord => f.write_str("per_record"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryEvent {
    AttemptFailed {
        context: String,
        attempt: u32,
        max_attempts: u32,
        error: String,
        /// `None` on the final attempt
        retry_in: Option<Duration>,
    },
    SucceededAfterRetry {
        context: String,
        attempts: u32,
    },
    FallbackStarted {
        context: String,
    },
    FallbackSucceeded {
        context: String,
    },
    FallbackFailed {
        context: String,
        error: String,
    },
    Exhausted {
        context: String,
        attempts: u32,
    },
    TierFailed {
        context: String,
        tier: WriteTier,
        error: String,
    },
    TierSucceeded {
        context: String,
        tier: WriteTier,
        stored: usize,
    },
    RecordRejected {
        context: String,
        index: usize,
        error: String,
    },
}

/// Receiver for recovery events
pub trait EventSink: Send + Sync {
    fn record(&self, event: RecoveryEvent);
}

/// Forwards events to `tracing` with structured fields
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, event: RecoveryEvent) {
        match event {
            RecoveryEvent::AttemptFailed {
                context,
                attempt,
                max_attempts,
                error,
                retry_in: Some(delay),
            } => warn!(
                %context,
                attempt,
                max_attempts,
                %error,
                retry_in_ms = delay.as_millis() as u64,
                "Attempt failed, retrying"
            ),
            RecoveryEvent::AttemptFailed {
                context,
                attempt,
                max_attempts,
                error,
                retry_in: None,
            } => warn!(%context, attempt, max_attempts, %error, "Final attempt failed"),
            RecoveryEvent::SucceededAfterRetry { context, attempts } => {
                info!(%context, attempts, "Operation succeeded after retry")
            },
            RecoveryEvent::FallbackStarted { context } => {
                info!(%context, "Primary attempts exhausted, trying fallback")
            },
            RecoveryEvent::FallbackSucceeded { context } => {
                info!(%context, "Fallback succeeded")
            },
            RecoveryEvent::FallbackFailed { context, error } => {
                error!(%context, %error, "Fallback failed")
            },
            RecoveryEvent::Exhausted { context, attempts } => {
                error!(%context, attempts, "Operation failed after all retry attempts")
            },
            RecoveryEvent::TierFailed {
                context,
                tier,
                error,
            } => warn!(%context, %tier, %error, "Write tier failed"),
            RecoveryEvent::TierSucceeded {
                context,
                tier,
                stored,
            } => debug!(%context, %tier, stored, "Write tier succeeded"),
            RecoveryEvent::RecordRejected {
                context,
                index,
                error,
            } => warn!(%context, index, %error, "Record rejected"),
        }
    }
}

/// Keeps every event in order. Cheap to clone; clones share the buffer.
#[derive(Debug, Default, Clone)]
pub struct MemoryEventSink {
    events: Arc<Mutex<Vec<RecoveryEvent>>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecoveryEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count(&self, predicate: impl Fn(&RecoveryEvent) -> bool) -> usize {
        self.events().iter().filter(|e| predicate(e)).count()
    }
}

impl EventSink for MemoryEventSink {
    fn record(&self, event: RecoveryEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
