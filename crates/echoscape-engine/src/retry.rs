use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::http::ProviderHttpError;

const RATE_LIMIT_MARKERS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "ratelimit",
    "quota",
    "resource has been exhausted",
    "too many requests",
];

/// Injectable wait. Production uses `thread::sleep`; tests record.
#[derive(Clone)]
pub struct Sleeper(Arc<dyn Fn(Duration) + Send + Sync>);

impl Sleeper {
    pub fn new<F>(sleep: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        Self(Arc::new(sleep))
    }

    pub fn thread() -> Self {
        Self::new(thread::sleep)
    }

    pub fn sleep(&self, duration: Duration) {
        (self.0)(duration)
    }
}

impl Default for Sleeper {
    fn default() -> Self {
        Self::thread()
    }
}

impl fmt::Debug for Sleeper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Sleeper")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    pub const fn single() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Generative analysis and coach replies: 3 attempts, `attempt × 2s`.
    pub const fn generative() -> Self {
        Self::new(3, Duration::from_secs(2))
    }

    /// Classifier enrichment: 2 attempts, `attempt × 1.5s`.
    pub const fn enrichment() -> Self {
        Self::new(2, Duration::from_millis(1500))
    }

    /// Wait after failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(25),
        }
    }
}

/// A typed HTTP 429 anywhere in the chain, or a rate-limit phrase in the
/// message. Bare digits are not matched; URLs and keys carry them too.
pub fn is_rate_limited(err: &anyhow::Error) -> bool {
    if ProviderHttpError::find(err).is_some_and(|http| http.status == 429) {
        return true;
    }
    let text = format!("{err:#}").to_ascii_lowercase();
    RATE_LIMIT_MARKERS.iter().any(|marker| text.contains(marker))
}

/// Runs `op` until it succeeds, fails with a non-rate-limit error, or runs
/// out of attempts. `on_wait` sees each backoff before the sleep.
pub fn retry_on_rate_limit<T, F, W>(
    policy: RetryPolicy,
    sleeper: &Sleeper,
    mut op: F,
    mut on_wait: W,
) -> Result<T>
where
    F: FnMut(u32) -> Result<T>,
    W: FnMut(u32, Duration, &anyhow::Error),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= max_attempts || !is_rate_limited(&err) {
                    return Err(err);
                }
                let delay = policy.delay_for(attempt);
                on_wait(attempt, delay, &err);
                sleeper.sleep(delay);
                attempt += 1;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Completed,
    Failed,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Pending,
    Completed,
    Failed,
}

/// Sleeps one interval, checks, repeats. Stops at the first terminal state,
/// after `max_attempts` checks, or once the wall-clock deadline has passed
/// (checked before every sleep). Check errors propagate.
pub fn poll_job<F>(policy: PollPolicy, sleeper: &Sleeper, mut check: F) -> Result<PollOutcome>
where
    F: FnMut(u32) -> Result<PollState>,
{
    let started = Instant::now();
    for attempt in 1..=policy.max_attempts {
        if started.elapsed() >= policy.timeout {
            return Ok(PollOutcome::TimedOut);
        }
        sleeper.sleep(policy.interval);
        match check(attempt)? {
            PollState::Completed => return Ok(PollOutcome::Completed),
            PollState::Failed => return Ok(PollOutcome::Failed),
            PollState::Pending => {}
        }
    }
    Ok(PollOutcome::TimedOut)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::Sleeper;

    /// Sleeper that records requested waits instead of sleeping.
    pub(crate) fn recording_sleeper() -> (Sleeper, Arc<Mutex<Vec<Duration>>>) {
        let waits = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&waits);
        let sleeper = Sleeper::new(move |duration| {
            if let Ok(mut guard) = sink.lock() {
                guard.push(duration);
            }
        });
        (sleeper, waits)
    }

    pub(crate) fn waits(log: &Arc<Mutex<Vec<Duration>>>) -> Vec<Duration> {
        log.lock().map(|guard| guard.clone()).unwrap_or_default()
    }
}
