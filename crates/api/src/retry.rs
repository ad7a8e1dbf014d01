//! Exponential-backoff retry wrapper.
//!
//! [`Retry`] re-runs any fallible operation while its error is retryable. Each
//! retry sleeps for the current delay plus a random jitter, then multiplies the
//! delay by the backoff factor. The final attempt is made outside the loop, so
//! its error propagates unmodified; non-retryable errors propagate at once.
//!
//! By default the decision comes from [`ApiError::retry_policy`]; callers can
//! supply their own set of [`ErrorKind`]s or an arbitrary predicate instead.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::{ApiError, ErrorKind, RetryPolicy};

/// Blocks the current thread. Swapped out in tests.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by [`std::thread::sleep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Retry configuration.
#[derive(Clone)]
pub struct Retry {
    max_attempts: u32,
    initial_delay: Duration,
    backoff: f64,
    jitter: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl Default for Retry {
    /// Four attempts, five seconds initial delay, doubling, up to five seconds
    /// of jitter.
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_secs(5),
            backoff: 2.0,
            jitter: Duration::from_secs(5),
            sleeper: Arc::new(ThreadSleeper),
        }
    }
}

impl std::fmt::Debug for Retry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retry")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("backoff", &self.backoff)
            .field("jitter", &self.jitter)
            .finish_non_exhaustive()
    }
}

impl Retry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total attempts, including the first. Values below one are treated as one.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Delay multiplier applied after every retry. Values below one (and
    /// non-finite values) are treated as one.
    pub fn with_backoff(mut self, backoff: f64) -> Self {
        self.backoff = if backoff.is_finite() { backoff.max(1.0) } else { 1.0 };
        self
    }

    /// Upper bound of the random delay added to each sleep. Zero disables it.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.jitter.as_millis().min(u128::from(u64::MAX)) as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=max_ms))
    }

    /// Runs `op`, retrying while `is_retryable` accepts its error.
    pub fn run<T, E, F, P>(&self, is_retryable: P, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut remaining = self.max_attempts;
        let mut delay = self.initial_delay;

        while remaining > 1 {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if is_retryable(&err) => {
                    let sleeping = delay.saturating_add(self.jitter());
                    warn!(
                        error = %err,
                        sleep_ms = sleeping.as_millis() as u64,
                        attempts_left = remaining - 1,
                        "Retrying after error"
                    );
                    self.sleeper.sleep(sleeping);
                    remaining -= 1;
                    delay = Duration::try_from_secs_f64(delay.as_secs_f64() * self.backoff)
                        .unwrap_or(Duration::MAX);
                }
                Err(err) => return Err(err),
            }
        }

        op()
    }

    /// Runs `op`, retrying errors whose [`ApiError::retry_policy`] is
    /// [`RetryPolicy::Retryable`].
    pub fn run_api<T, F>(&self, op: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Result<T, ApiError>,
    {
        self.run(|err: &ApiError| err.retry_policy() == RetryPolicy::Retryable, op)
    }

    /// Runs `op`, retrying errors of the given kinds only.
    pub fn run_on_kinds<T, F>(&self, kinds: &[ErrorKind], op: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Result<T, ApiError>,
    {
        self.run(|err: &ApiError| kinds.contains(&err.kind()), op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSleeper(Mutex<Vec<Duration>>);

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.0.lock().unwrap().push(duration);
        }
    }

    fn retry(sleeper: &Arc<RecordingSleeper>) -> Retry {
        Retry::new()
            .with_jitter(Duration::ZERO)
            .with_sleeper(sleeper.clone())
    }

    #[test]
    fn two_failures_then_success_sleeps_twice_with_growing_delay() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut attempts = 0;
        let value = retry(&sleeper)
            .run_api(|| {
                attempts += 1;
                if attempts <= 2 {
                    Err(ApiError::transport(0, "connection refused"))
                } else {
                    Ok("done")
                }
            })
            .unwrap();

        assert_eq!(value, "done");
        assert_eq!(attempts, 3);
        let sleeps = sleeper.0.lock().unwrap().clone();
        assert_eq!(sleeps, vec![Duration::from_secs(5), Duration::from_secs(10)]);
    }

    #[test]
    fn final_error_propagates_after_budget_is_spent() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut attempts = 0;
        let err = retry(&sleeper)
            .with_max_attempts(3)
            .run_api::<(), _>(|| {
                attempts += 1;
                Err(ApiError::from_fault(-32400, format!("attempt {attempts}")))
            })
            .unwrap_err();

        assert_eq!(attempts, 3);
        assert_eq!(err.fault_string(), "attempt 3");
        assert_eq!(sleeper.0.lock().unwrap().len(), 2);
    }

    #[test]
    fn non_retryable_errors_propagate_immediately() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut attempts = 0;
        let err = retry(&sleeper)
            .run_api::<(), _>(|| {
                attempts += 1;
                Err(ApiError::from_fault(-32601, "no such method"))
            })
            .unwrap_err();

        assert_eq!(attempts, 1);
        assert_eq!(err.kind(), ErrorKind::Server);
        assert!(sleeper.0.lock().unwrap().is_empty());
    }

    #[test]
    fn explicit_kinds_override_the_default_policy() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut attempts = 0;
        let result = retry(&sleeper).run_on_kinds(&[ErrorKind::Application], || {
            attempts += 1;
            if attempts == 1 {
                Err(ApiError::from_fault(-32500, "busy"))
            } else {
                Ok(attempts)
            }
        });
        assert_eq!(result, Ok(2));
    }

    #[test]
    fn jitter_stays_within_bound() {
        let retry = Retry::new().with_jitter(Duration::from_millis(10));
        for _ in 0..50 {
            assert!(retry.jitter() <= Duration::from_millis(10));
        }
    }
}
