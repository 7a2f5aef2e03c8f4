//! Retry strategies, predicates and the per-call retry state machine.
//!
//! A logical call moves through [`RetryState`]s driven by [`RetryPolicy`]:
//!
//! ```text
//! Attempting --2xx--------------------------> Succeeded
//! Attempting --terminal error---------------> FailedTerminal
//! Attempting --retryable, budget left-------> BackingOff --delay--> Attempting
//! Attempting --retryable, budget spent------> FailedExhausted
//! ```
//!
//! The policy itself never sleeps; the client awaits the delay through a
//! [`Sleeper`], which tests replace with a recording fake.

use crate::rate_limit::RateLimitConfig;
use crate::Error;
use rand::Rng;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Defines how long to wait between attempts and how many re-attempts to make.
///
/// # Examples
///
/// ```
/// use linode_rest::RetryStrategy;
/// use std::time::Duration;
///
/// // No retries
/// let no_retry = RetryStrategy::None;
///
/// // Exponential backoff: 100ms, 200ms, 400ms, 800ms...
/// let exponential = RetryStrategy::ExponentialBackoff {
///     initial_delay: Duration::from_millis(100),
///     max_delay: Duration::from_secs(30),
///     max_retries: 5,
///     jitter: true,
/// };
///
/// // Linear backoff: 1s, 1s, 1s...
/// let linear = RetryStrategy::Linear {
///     delay: Duration::from_secs(1),
///     max_retries: 3,
/// };
/// ```
#[derive(Debug, Clone)]
pub enum RetryStrategy {
    /// Do not retry failed requests.
    None,

    /// Retry with exponentially increasing delays.
    ///
    /// Each retry waits for `initial_delay * 2^(retry - 1)` (capped at
    /// `max_delay`). With jitter, the wait is drawn from 50–100% of that.
    ExponentialBackoff {
        /// The delay before the first retry.
        initial_delay: Duration,
        /// The maximum delay between retries.
        max_delay: Duration,
        /// The maximum number of retries after the first attempt.
        max_retries: usize,
        /// Whether to add random jitter to delays.
        jitter: bool,
    },

    /// Retry with a fixed delay between attempts.
    Linear {
        /// The delay between attempts.
        delay: Duration,
        /// The maximum number of retries after the first attempt.
        max_retries: usize,
    },

    /// Custom retry logic.
    ///
    /// The function takes the retry number (starting from 1) and returns
    /// `Some(delay)` to retry after the delay, or `None` to stop.
    Custom {
        /// Function that determines retry delay.
        delay_fn: fn(attempt: usize) -> Option<Duration>,
    },
}

impl Default for RetryStrategy {
    /// Three retries, exponential from 500ms up to 30s, with jitter.
    fn default() -> Self {
        RetryStrategy::ExponentialBackoff {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_retries: 3,
            jitter: true,
        }
    }
}

impl RetryStrategy {
    /// Returns the delay before the given retry, or `None` if retries are exhausted.
    ///
    /// # Arguments
    ///
    /// * `attempt` - The retry number (1-indexed, so 1 = first retry)
    pub fn delay_for_attempt(&self, attempt: usize) -> Option<Duration> {
        match self {
            RetryStrategy::None => None,
            RetryStrategy::ExponentialBackoff {
                initial_delay,
                max_delay,
                max_retries,
                jitter,
            } => {
                if attempt > *max_retries {
                    return None;
                }

                let multiplier = 2u64.saturating_pow(attempt.saturating_sub(1) as u32);
                let base_delay =
                    initial_delay.saturating_mul(multiplier.try_into().unwrap_or(u32::MAX));
                let delay = base_delay.min(*max_delay);

                if *jitter {
                    let jitter_factor = rand::thread_rng().gen_range(0.5..=1.0);
                    Some(delay.mul_f64(jitter_factor))
                } else {
                    Some(delay)
                }
            }
            RetryStrategy::Linear { delay, max_retries } => {
                if attempt > *max_retries {
                    None
                } else {
                    Some(*delay)
                }
            }
            RetryStrategy::Custom { delay_fn } => delay_fn(attempt),
        }
    }

    /// Returns the maximum number of retries, if known up front.
    pub fn max_retries(&self) -> Option<usize> {
        match self {
            RetryStrategy::None => Some(0),
            RetryStrategy::ExponentialBackoff { max_retries, .. } => Some(*max_retries),
            RetryStrategy::Linear { max_retries, .. } => Some(*max_retries),
            RetryStrategy::Custom { .. } => None,
        }
    }
}

/// Decides whether a failed attempt is worth repeating.
///
/// # Examples
///
/// ```
/// use linode_rest::{Error, ErrorKind, RetryPredicate};
///
/// struct OnlyRateLimits;
///
/// impl RetryPredicate for OnlyRateLimits {
///     fn should_retry(&self, error: &Error, _attempt: usize) -> bool {
///         error.kind() == ErrorKind::RateLimited
///     }
/// }
/// ```
pub trait RetryPredicate: Send + Sync {
    /// Returns `true` if the request should be retried.
    ///
    /// `attempt` is the 1-indexed number of the attempt that just failed.
    fn should_retry(&self, error: &Error, attempt: usize) -> bool;
}

/// Retry everything [`Error::is_retryable`] accepts: 429, 5xx, network
/// failures and timeouts.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnRetryable;

impl RetryPredicate for RetryOnRetryable {
    fn should_retry(&self, error: &Error, _attempt: usize) -> bool {
        error.is_retryable()
    }
}

/// Retry only on 5xx server errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryOn5xx;

impl RetryPredicate for RetryOn5xx {
    fn should_retry(&self, error: &Error, _attempt: usize) -> bool {
        error.status().is_some_and(|s| s.is_server_error())
    }
}

/// Retry only on network failures and timeouts.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnNetworkError;

impl RetryPredicate for RetryOnNetworkError {
    fn should_retry(&self, error: &Error, _attempt: usize) -> bool {
        matches!(error, Error::Network(_) | Error::Timeout)
    }
}

/// Retries if ANY of the predicates return `true`.
pub struct OrPredicate {
    predicates: Vec<Box<dyn RetryPredicate>>,
}

impl OrPredicate {
    /// Creates a new `OrPredicate` from a list of predicates.
    pub fn new(predicates: Vec<Box<dyn RetryPredicate>>) -> Self {
        Self { predicates }
    }
}

impl RetryPredicate for OrPredicate {
    fn should_retry(&self, error: &Error, attempt: usize) -> bool {
        self.predicates
            .iter()
            .any(|p| p.should_retry(error, attempt))
    }
}

/// Retries only if ALL of the predicates return `true`.
pub struct AndPredicate {
    predicates: Vec<Box<dyn RetryPredicate>>,
}

impl AndPredicate {
    /// Creates a new `AndPredicate` from a list of predicates.
    pub fn new(predicates: Vec<Box<dyn RetryPredicate>>) -> Self {
        Self { predicates }
    }
}

impl RetryPredicate for AndPredicate {
    fn should_retry(&self, error: &Error, attempt: usize) -> bool {
        self.predicates
            .iter()
            .all(|p| p.should_retry(error, attempt))
    }
}

/// Where a logical call stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Physical attempt `attempt` (1-indexed) is in flight.
    Attempting {
        /// The attempt number.
        attempt: usize,
    },
    /// Attempt `attempt` failed transiently; wait `delay` before the next.
    BackingOff {
        /// The attempt that failed.
        attempt: usize,
        /// The wait before the next attempt.
        delay: Duration,
    },
    /// The call returned a 2xx response.
    Succeeded {
        /// Physical attempts made.
        attempts: usize,
    },
    /// The call failed with an error that must not be retried.
    FailedTerminal {
        /// Physical attempts made.
        attempts: usize,
    },
    /// Every allowed attempt failed transiently.
    FailedExhausted {
        /// Physical attempts made.
        attempts: usize,
    },
}

impl RetryState {
    /// Returns `true` once the call has resolved.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RetryState::Succeeded { .. }
                | RetryState::FailedTerminal { .. }
                | RetryState::FailedExhausted { .. }
        )
    }
}

/// Retry bookkeeping for one logical call.
///
/// Created when the call starts and dropped when it resolves; nothing is
/// shared between calls.
pub struct RetryPolicy<'a> {
    strategy: &'a RetryStrategy,
    predicate: &'a dyn RetryPredicate,
    rate_limit: &'a RateLimitConfig,
    retries_allowed: bool,
    state: RetryState,
    elapsed_backoff: Duration,
}

impl<'a> RetryPolicy<'a> {
    /// Starts a call in `Attempting { attempt: 1 }`.
    ///
    /// With `retries_allowed == false` every failure is terminal; the client
    /// passes the request's idempotency flag here.
    pub fn new(
        strategy: &'a RetryStrategy,
        predicate: &'a dyn RetryPredicate,
        rate_limit: &'a RateLimitConfig,
        retries_allowed: bool,
    ) -> Self {
        Self {
            strategy,
            predicate,
            rate_limit,
            retries_allowed,
            state: RetryState::Attempting { attempt: 1 },
            elapsed_backoff: Duration::ZERO,
        }
    }

    /// The current state.
    pub fn state(&self) -> RetryState {
        self.state
    }

    /// Sum of all backoff delays handed out so far.
    pub fn elapsed_backoff(&self) -> Duration {
        self.elapsed_backoff
    }

    /// The number of the attempt in flight, or the attempt count once resolved.
    pub fn attempt(&self) -> usize {
        match self.state {
            RetryState::Attempting { attempt } | RetryState::BackingOff { attempt, .. } => attempt,
            RetryState::Succeeded { attempts }
            | RetryState::FailedTerminal { attempts }
            | RetryState::FailedExhausted { attempts } => attempts,
        }
    }

    /// Records a 2xx outcome.
    pub fn record_success(&mut self) -> RetryState {
        self.state = RetryState::Succeeded {
            attempts: self.attempt(),
        };
        self.state
    }

    /// Records a failed attempt and moves to `BackingOff`, `FailedTerminal`
    /// or `FailedExhausted`.
    pub fn record_failure(&mut self, error: &Error) -> RetryState {
        let attempt = self.attempt();

        if !self.retries_allowed || !self.predicate.should_retry(error, attempt) {
            self.state = RetryState::FailedTerminal { attempts: attempt };
            return self.state;
        }

        let Some(backoff) = self.strategy.delay_for_attempt(attempt) else {
            self.state = RetryState::FailedExhausted { attempts: attempt };
            return self.state;
        };

        let delay = if self.rate_limit.enabled {
            error.rate_limit_delay(self.rate_limit.max_wait).unwrap_or(backoff)
        } else {
            backoff
        };

        self.elapsed_backoff += delay;
        self.state = RetryState::BackingOff { attempt, delay };
        self.state
    }

    /// Leaves `BackingOff` once the delay has elapsed.
    pub fn resume(&mut self) -> RetryState {
        if let RetryState::BackingOff { attempt, .. } = self.state {
            self.state = RetryState::Attempting {
                attempt: attempt + 1,
            };
        }
        self.state
    }
}

/// Boxed future returned by [`Sleeper::sleep`].
pub type SleepFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Source of backoff delays.
pub trait Sleeper: Send + Sync {
    /// Completes after `duration`.
    fn sleep(&self, duration: Duration) -> SleepFuture;
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> SleepFuture {
        Box::pin(tokio::time::sleep(duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ApiError;
    use http::{HeaderMap, HeaderValue, StatusCode};

    fn api_error(status: u16) -> Error {
        Error::Api(ApiError::from_response(
            StatusCode::from_u16(status).unwrap(),
            HeaderMap::new(),
            b"",
        ))
    }

    fn linear(max_retries: usize) -> RetryStrategy {
        RetryStrategy::Linear {
            delay: Duration::from_millis(10),
            max_retries,
        }
    }

    #[test]
    fn test_exponential_backoff_delays() {
        let strategy = RetryStrategy::ExponentialBackoff {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            max_retries: 5,
            jitter: false,
        };

        assert_eq!(strategy.delay_for_attempt(1), Some(Duration::from_millis(100)));
        assert_eq!(strategy.delay_for_attempt(2), Some(Duration::from_millis(200)));
        assert_eq!(strategy.delay_for_attempt(3), Some(Duration::from_millis(400)));
        assert_eq!(strategy.delay_for_attempt(4), Some(Duration::from_millis(800)));
        assert_eq!(strategy.delay_for_attempt(5), Some(Duration::from_millis(1600)));
        assert_eq!(strategy.delay_for_attempt(6), None);
    }

    #[test]
    fn test_exponential_backoff_capped() {
        let strategy = RetryStrategy::ExponentialBackoff {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(3),
            max_retries: 10,
            jitter: false,
        };

        assert_eq!(strategy.delay_for_attempt(3), Some(Duration::from_secs(3)));
        assert_eq!(strategy.delay_for_attempt(10), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_jitter_stays_within_half_to_full_delay() {
        let strategy = RetryStrategy::ExponentialBackoff {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            max_retries: 3,
            jitter: true,
        };

        for _ in 0..50 {
            let delay = strategy.delay_for_attempt(2).unwrap();
            assert!(delay >= Duration::from_millis(100) && delay <= Duration::from_millis(200));
        }
    }

    #[test]
    fn test_linear_delays() {
        let strategy = RetryStrategy::Linear {
            delay: Duration::from_secs(1),
            max_retries: 3,
        };

        assert_eq!(strategy.delay_for_attempt(1), Some(Duration::from_secs(1)));
        assert_eq!(strategy.delay_for_attempt(3), Some(Duration::from_secs(1)));
        assert_eq!(strategy.delay_for_attempt(4), None);
    }

    #[test]
    fn test_no_retry() {
        assert_eq!(RetryStrategy::None.delay_for_attempt(1), None);
        assert_eq!(RetryStrategy::None.max_retries(), Some(0));
    }

    #[test]
    fn test_two_server_errors_then_success() {
        let strategy = linear(3);
        let rate_limit = RateLimitConfig::default();
        let mut policy = RetryPolicy::new(&strategy, &RetryOnRetryable, &rate_limit, true);

        assert_eq!(policy.state(), RetryState::Attempting { attempt: 1 });
        let mut previous_elapsed = policy.elapsed_backoff();

        for attempt in 1..=2 {
            let state = policy.record_failure(&api_error(503));
            assert_eq!(
                state,
                RetryState::BackingOff {
                    attempt,
                    delay: Duration::from_millis(10)
                }
            );
            assert!(policy.elapsed_backoff() >= previous_elapsed);
            previous_elapsed = policy.elapsed_backoff();
            assert_eq!(policy.resume(), RetryState::Attempting { attempt: attempt + 1 });
        }

        assert_eq!(policy.record_success(), RetryState::Succeeded { attempts: 3 });
        assert_eq!(policy.elapsed_backoff(), Duration::from_millis(20));
    }

    #[test]
    fn test_terminal_error_stops_immediately() {
        let strategy = linear(3);
        let rate_limit = RateLimitConfig::default();
        let mut policy = RetryPolicy::new(&strategy, &RetryOnRetryable, &rate_limit, true);

        let state = policy.record_failure(&api_error(400));
        assert_eq!(state, RetryState::FailedTerminal { attempts: 1 });
        assert!(state.is_terminal());
        assert_eq!(policy.elapsed_backoff(), Duration::ZERO);
    }

    #[test]
    fn test_exhaustion_after_max_retries() {
        let strategy = linear(2);
        let rate_limit = RateLimitConfig::default();
        let mut policy = RetryPolicy::new(&strategy, &RetryOnRetryable, &rate_limit, true);

        assert!(matches!(policy.record_failure(&api_error(500)), RetryState::BackingOff { .. }));
        policy.resume();
        assert!(matches!(policy.record_failure(&api_error(500)), RetryState::BackingOff { .. }));
        policy.resume();
        assert_eq!(
            policy.record_failure(&api_error(500)),
            RetryState::FailedExhausted { attempts: 3 }
        );
    }

    #[test]
    fn test_non_idempotent_call_is_never_retried() {
        let strategy = linear(3);
        let rate_limit = RateLimitConfig::default();
        let mut policy = RetryPolicy::new(&strategy, &RetryOnRetryable, &rate_limit, false);

        assert_eq!(
            policy.record_failure(&api_error(503)),
            RetryState::FailedTerminal { attempts: 1 }
        );
    }

    #[test]
    fn test_rate_limit_delay_replaces_backoff() {
        let strategy = linear(3);
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("2"));
        let error = Error::Api(ApiError::from_response(
            StatusCode::TOO_MANY_REQUESTS,
            headers,
            b"",
        ));

        let enabled = RateLimitConfig::default();
        let mut policy = RetryPolicy::new(&strategy, &RetryOnRetryable, &enabled, true);
        assert_eq!(
            policy.record_failure(&error),
            RetryState::BackingOff {
                attempt: 1,
                delay: Duration::from_secs(2)
            }
        );

        let disabled = RateLimitConfig::disabled();
        let mut policy = RetryPolicy::new(&strategy, &RetryOnRetryable, &disabled, true);
        assert_eq!(
            policy.record_failure(&error),
            RetryState::BackingOff {
                attempt: 1,
                delay: Duration::from_millis(10)
            }
        );
    }

    #[test]
    fn test_rate_limit_does_not_extend_budget() {
        let strategy = RetryStrategy::None;
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("1"));
        let error = Error::Api(ApiError::from_response(
            StatusCode::TOO_MANY_REQUESTS,
            headers,
            b"",
        ));

        let rate_limit = RateLimitConfig::default();
        let mut policy = RetryPolicy::new(&strategy, &RetryOnRetryable, &rate_limit, true);
        assert_eq!(
            policy.record_failure(&error),
            RetryState::FailedExhausted { attempts: 1 }
        );
    }

    #[test]
    fn test_predicate_combinators() {
        let either = OrPredicate::new(vec![Box::new(RetryOn5xx), Box::new(RetryOnNetworkError)]);
        assert!(either.should_retry(&api_error(502), 1));
        assert!(either.should_retry(&Error::Timeout, 1));
        assert!(!either.should_retry(&api_error(429), 1));

        let both = AndPredicate::new(vec![Box::new(RetryOn5xx), Box::new(RetryOnRetryable)]);
        assert!(both.should_retry(&api_error(500), 1));
        assert!(!both.should_retry(&Error::Timeout, 1));
    }
}
