//! Fixed-delay retry policies that honour the tailer's stop flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Longest uninterrupted sleep before the stop flag is checked again.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Shared stop flag, cloned into supervising threads to close a tailer.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. Idempotent.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless stopped first.
    ///
    /// Returns `false` if the flag was raised before or during the sleep.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_stopped() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

/// Why a retried operation gave up.
#[derive(Debug)]
pub enum RetryAbort<E> {
    /// The stop flag was raised while waiting.
    Stopped,
    /// The attempt bound was reached; carries the last error.
    Exhausted(E),
}

/// Fixed-delay retry policy, optionally bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    /// Retries allowed after the first attempt; `None` retries forever.
    pub max_retries: Option<u32>,
}

impl RetryPolicy {
    #[must_use]
    pub fn bounded(delay: Duration, max_retries: u32) -> Self {
        Self {
            delay,
            max_retries: Some(max_retries),
        }
    }

    #[must_use]
    pub fn unbounded(delay: Duration) -> Self {
        Self {
            delay,
            max_retries: None,
        }
    }

    /// Whether another retry is allowed after `retries` have been spent.
    #[must_use]
    pub fn allows(&self, retries: u32) -> bool {
        self.max_retries.map_or(true, |max| retries < max)
    }

    /// Run `op` until it succeeds, the bound is hit, or `stop` is raised.
    ///
    /// # Errors
    ///
    /// Returns `RetryAbort::Stopped` if the stop flag was raised, or
    /// `RetryAbort::Exhausted` with the last error once the bound is reached.
    pub fn run<T, E, F>(&self, stop: &StopSignal, mut op: F) -> Result<T, RetryAbort<E>>
    where
        E: std::fmt::Display,
        F: FnMut() -> Result<T, E>,
    {
        let mut retries = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !self.allows(retries) {
                        return Err(RetryAbort::Exhausted(e));
                    }
                    tracing::debug!(error = %e, attempt = retries + 1, "Retrying after failure");
                    if !stop.sleep(self.delay) {
                        return Err(RetryAbort::Stopped);
                    }
                    retries += 1;
                }
            }
        }
    }
}
