// crates/post-forge-core/src/retry.rs
// ============================================================================
// Module: Post Forge Retry Policy
// Description: Transient/terminal classification and per-remote backoff.
// Purpose: Execute remote operations with bounded exponential retries.
// Dependencies: crate::interfaces, rand
// ============================================================================

//! ## Overview
//! Each remote carries its own backoff schedule. Transient failures (network
//! timeouts, connection resets, HTTP 429 and retryable 5xx) sleep and retry
//! up to the schedule's attempt budget; terminal failures propagate after a
//! single call. On exhaustion the last error propagates unchanged so the
//! orchestrator can decide logging and audit. Sleeping goes through a trait
//! seam so tests run without real delays.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::Rng;

use crate::interfaces::RemoteError;

// ============================================================================
// SECTION: Remotes
// ============================================================================

/// The external collaborators the pipeline talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Remote {
    /// Language model provider.
    Llm,
    /// Discussion forum.
    Forum,
    /// E-commerce storefront.
    Storefront,
}

impl Remote {
    /// Returns the stable label for the remote.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::Forum => "forum",
            Self::Storefront => "storefront",
        }
    }

    /// Returns the backoff schedule for the remote.
    #[must_use]
    pub const fn schedule(self) -> BackoffSchedule {
        match self {
            Self::Llm => BackoffSchedule {
                base: Duration::from_secs(2),
                multiplier: 2,
                max_attempts: 4,
                cap: Duration::from_secs(60),
            },
            Self::Forum => BackoffSchedule {
                base: Duration::from_secs(3),
                multiplier: 2,
                max_attempts: 3,
                cap: Duration::from_secs(30),
            },
            Self::Storefront => BackoffSchedule {
                base: Duration::from_secs(2),
                multiplier: 2,
                max_attempts: 3,
                cap: Duration::from_secs(30),
            },
        }
    }
}

impl fmt::Display for Remote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exponential backoff parameters for one remote.
///
/// # Invariants
/// - `max_attempts` counts total calls, not retries; it is always >= 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffSchedule {
    /// First sleep duration.
    pub base: Duration,
    /// Growth factor applied per retry.
    pub multiplier: u32,
    /// Total call budget.
    pub max_attempts: u32,
    /// Upper bound on any single sleep, before jitter.
    pub cap: Duration,
}

impl BackoffSchedule {
    /// Returns the capped sleep before the given retry (1-based).
    #[must_use]
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(retry.saturating_sub(1));
        self.base.saturating_mul(factor).min(self.cap)
    }
}

// ============================================================================
// SECTION: Sleeper
// ============================================================================

/// Seam for backoff sleeps.
pub trait Sleeper: Send + Sync {
    /// Sleeps for the given duration.
    fn sleep(&self, duration: Duration);
}

/// Sleeper that blocks the current thread.
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

// ============================================================================
// SECTION: Retry Policy
// ============================================================================

/// Upper bound of the uniform jitter added to every sleep.
const JITTER_MAX_MS: u64 = 1_000;

/// Executes remote operations under per-remote backoff schedules.
///
/// # Invariants
/// - Terminal errors cause exactly one call.
/// - At most `max_attempts` calls are made per operation.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Sleep implementation.
    sleeper: Arc<dyn Sleeper>,
}

impl RetryPolicy {
    /// Creates a policy that sleeps on the current thread.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    /// Creates a policy with a custom sleeper.
    #[must_use]
    pub fn with_sleeper(sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            sleeper,
        }
    }

    /// Executes an operation against a remote, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns the last [`RemoteError`] unchanged once the attempt budget is
    /// spent or a terminal error occurs.
    pub fn execute<T, F>(&self, remote: Remote, mut op: F) -> Result<T, RemoteError>
    where
        F: FnMut() -> Result<T, RemoteError>,
    {
        let schedule = remote.schedule();
        let mut attempt = 1u32;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if !error.is_transient() || attempt >= schedule.max_attempts {
                        return Err(error);
                    }
                    let delay = schedule.delay_before_retry(attempt) + jitter();
                    self.sleeper.sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns a uniform random jitter in `[0, 1s)`.
fn jitter() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(0..JITTER_MAX_MS))
}
