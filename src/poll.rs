//! Completion polling
//!
//! Some API calls are accepted synchronously but complete later on the
//! provider's side. [`Poller`] repeatedly runs a caller-supplied probe until the
//! probe reports a target label, a deadline passes, or something goes wrong.
//!
//! The machine is strictly sequential: wait, probe, classify, repeat.
//!
//! - probe error: stop with that error, never treated as pending
//! - pending label: sleep at least `min_interval` and probe again, unless the
//!   next probe would start after the deadline, which stops with
//!   [`SlError::Timeout`] carrying the last observed state
//! - target label: stop with the probe's value
//! - any other label: stop with [`SlError::UnexpectedState`]
//!
//! Every [`Poller::run`] call starts a fresh attempt counter and deadline.

use crate::error::{SlError, SlResult};
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Conventional label for "not done yet"
pub const PENDING: &str = "pending";
/// Conventional label for "done"
pub const COMPLETE: &str = "complete";

/// Geometric growth of the probe spacing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub factor: f64,
    pub max_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollSettings {
    /// Total budget, measured from the start of [`Poller::run`]
    pub timeout: Duration,
    /// Wait before the first probe
    pub delay: Duration,
    /// Floor for the spacing between two probes
    pub min_interval: Duration,
    pub backoff: Option<Backoff>,
}

impl PollSettings {
    pub fn new(timeout: Duration, min_interval: Duration) -> Self {
        Self {
            timeout,
            delay: Duration::ZERO,
            min_interval,
            backoff: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_backoff(mut self, factor: f64, max_interval: Duration) -> Self {
        self.backoff = Some(Backoff {
            factor,
            max_interval,
        });
        self
    }

    /// Spacing after the `pending_count`-th pending result (1-based)
    fn interval_after(&self, pending_count: u32) -> Duration {
        let Some(backoff) = self.backoff else {
            return self.min_interval;
        };

        let exponent = pending_count.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.min_interval.as_secs_f64() * backoff.factor.max(1.0).powi(exponent);
        let grown = if secs.is_finite() && secs < backoff.max_interval.as_secs_f64() {
            Duration::from_secs_f64(secs)
        } else {
            backoff.max_interval
        };
        grown.max(self.min_interval)
    }
}

/// What one probe observed
#[derive(Debug, Clone, PartialEq)]
pub struct PollState<V> {
    pub value: V,
    pub label: String,
}

impl<V> PollState<V> {
    pub fn new(value: V, label: impl Into<String>) -> Self {
        Self {
            value,
            label: label.into(),
        }
    }

    pub fn pending(value: V) -> Self {
        Self::new(value, PENDING)
    }

    pub fn complete(value: V) -> Self {
        Self::new(value, COMPLETE)
    }
}

/// Bounded wait-then-probe loop
#[derive(Debug, Clone)]
pub struct Poller<'a> {
    what: String,
    settings: PollSettings,
    pending: &'a [&'a str],
    target: &'a [&'a str],
}

impl<'a> Poller<'a> {
    /// A poller with the conventional `pending` / `complete` labels
    pub fn new(what: impl Into<String>, settings: PollSettings) -> Self {
        Self {
            what: what.into(),
            settings,
            pending: &[PENDING],
            target: &[COMPLETE],
        }
    }

    pub fn pending(mut self, labels: &'a [&'a str]) -> Self {
        self.pending = labels;
        self
    }

    pub fn target(mut self, labels: &'a [&'a str]) -> Self {
        self.target = labels;
        self
    }

    pub async fn run<V, F, Fut>(&self, mut probe: F) -> SlResult<V>
    where
        V: Debug,
        F: FnMut() -> Fut,
        Fut: Future<Output = SlResult<PollState<V>>>,
    {
        let started = Instant::now();
        if !self.settings.delay.is_zero() {
            tokio::time::sleep(self.settings.delay).await;
        }

        let mut attempts: u32 = 0;
        let mut pending_count: u32 = 0;

        loop {
            attempts += 1;
            let state = match probe().await {
                Ok(state) => state,
                Err(e) => {
                    tracing::debug!(what = %self.what, attempts, "probe failed: {}", e);
                    return Err(e);
                },
            };

            tracing::debug!(what = %self.what, attempts, label = %state.label, "probe");

            if self.target.contains(&state.label.as_str()) {
                tracing::info!(
                    "{} finished after {} probes in {:?}",
                    self.what,
                    attempts,
                    started.elapsed()
                );
                return Ok(state.value);
            }

            if !self.pending.contains(&state.label.as_str()) {
                return Err(SlError::UnexpectedState {
                    what: self.what.clone(),
                    label: state.label,
                    expected: self
                        .pending
                        .iter()
                        .chain(self.target.iter())
                        .map(|s| s.to_string())
                        .collect(),
                });
            }

            pending_count += 1;
            let wait = self.settings.interval_after(pending_count);
            let elapsed = started.elapsed();
            if elapsed + wait > self.settings.timeout {
                return Err(SlError::Timeout {
                    what: self.what.clone(),
                    elapsed,
                    attempts,
                    last_state: format!("{} {:?}", state.label, state.value),
                });
            }

            tokio::time::sleep(wait).await;
        }
    }
}
