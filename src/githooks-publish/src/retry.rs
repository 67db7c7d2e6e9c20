//! Retry scheduling with exponential backoff.
//!
//! [`retry`] runs an operation until it succeeds, fails with a
//! [`ErrorClass::Fatal`] error, or runs out of attempts. The delay before
//! attempt `n` (n >= 2) is `base * 2^(n-2)` plus optional jitter; the first
//! attempt starts immediately. Every wait observes a [`CancellationToken`].
//!
//! [`retry_with_verification`] adds an existence probe for operations whose
//! side effect may have landed even though every attempt reported an error.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use githooks_common::{CancellationToken, PublishConfig, sleep_or_cancel};
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classify::ErrorClass;

/// Retry settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Upper bound for a single delay.
    pub max_delay: Option<Duration>,
    /// Random extra delay as a fraction of the computed delay (0.0 to 1.0).
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&PublishConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: None,
            jitter_ratio: 0.0,
        }
    }

    pub fn from_config(config: &PublishConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: config.max_delay_ms.map(Duration::from_millis),
            jitter_ratio: config.jitter_ratio.clamp(0.0, 1.0),
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn with_jitter(mut self, ratio: f64) -> Self {
        self.jitter_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    pub fn without_jitter(self) -> Self {
        self.with_jitter(0.0)
    }

    /// Backoff before `attempt` without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 2);
        let delay = self.base_delay.saturating_mul(factor);
        self.cap(delay)
    }

    /// Delay to wait before `attempt`, jitter included.
    ///
    /// Jitter only ever adds, so delays never decrease from one attempt to
    /// the next.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        let delay = self.backoff(attempt);
        if delay.is_zero() || self.jitter_ratio.is_nan() || self.jitter_ratio <= 0.0 {
            return delay;
        }

        let max_extra = delay.as_secs_f64() * self.jitter_ratio;
        if !max_extra.is_finite() {
            return delay;
        }
        let extra = rand::rng().random_range(0.0..=max_extra);
        let extra = Duration::try_from_secs_f64(extra).unwrap_or(Duration::ZERO);
        self.cap(delay.saturating_add(extra))
    }

    fn cap(&self, delay: Duration) -> Duration {
        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

/// How one attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    TransientFailure,
    FatalFailure,
}

/// Record of one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetryAttempt {
    pub attempt_number: u32,
    pub delay_before_ms: u64,
    pub outcome: AttemptOutcome,
    /// Error message for failed attempts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Why a retried operation gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryFailure<E> {
    /// An attempt failed with a fatal error; nothing was retried after it.
    Fatal(E),
    /// Every attempt failed with a transient error. Holds the last one.
    Exhausted(E),
    /// The cancellation token fired.
    Cancelled,
}

impl<E> RetryFailure<E> {
    /// The underlying error, if any.
    pub fn error(&self) -> Option<&E> {
        match self {
            RetryFailure::Fatal(e) | RetryFailure::Exhausted(e) => Some(e),
            RetryFailure::Cancelled => None,
        }
    }
}

/// Attempts made by [`retry`] and the final verdict.
#[derive(Debug)]
pub struct RetryReport<T, E> {
    pub attempts: Vec<RetryAttempt>,
    pub result: Result<T, RetryFailure<E>>,
}

impl<T, E> RetryReport<T, E> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Attempt number that succeeded.
    pub fn succeeded_on_attempt(&self) -> Option<u32> {
        self.attempts
            .iter()
            .find(|a| a.outcome == AttemptOutcome::Success)
            .map(|a| a.attempt_number)
    }

    pub fn delays_ms(&self) -> Vec<u64> {
        self.attempts.iter().map(|a| a.delay_before_ms).collect()
    }
}

/// Run `operation` under `policy`.
///
/// `operation` receives the 1-based attempt number. `classify` decides for
/// each error whether another attempt is worthwhile.
pub async fn retry<T, E, F, Fut, C>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    classify: C,
    mut operation: F,
) -> RetryReport<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> ErrorClass,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = Vec::new();
    let mut attempt = 0;

    loop {
        attempt += 1;

        let delay = policy.delay_before(attempt);
        if cancel.is_cancelled() {
            return cancelled(attempts);
        }
        if !delay.is_zero() {
            debug!(attempt, delay_ms = delay.as_millis() as u64, "Waiting before retry");
            if !sleep_or_cancel(delay, cancel).await {
                return cancelled(attempts);
            }
        }
        if cancel.is_cancelled() {
            return cancelled(attempts);
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return cancelled(attempts),
            result = operation(attempt) => result,
        };

        let delay_before_ms = delay.as_millis() as u64;
        match result {
            Ok(value) => {
                if attempt > 1 {
                    info!(attempt, "Operation succeeded after retry");
                }
                attempts.push(RetryAttempt {
                    attempt_number: attempt,
                    delay_before_ms,
                    outcome: AttemptOutcome::Success,
                    error: None,
                });
                return RetryReport {
                    attempts,
                    result: Ok(value),
                };
            }
            Err(error) => {
                let class = classify(&error);
                let outcome = match class {
                    ErrorClass::Transient => AttemptOutcome::TransientFailure,
                    ErrorClass::Fatal => AttemptOutcome::FatalFailure,
                };
                attempts.push(RetryAttempt {
                    attempt_number: attempt,
                    delay_before_ms,
                    outcome,
                    error: Some(error.to_string()),
                });

                if class == ErrorClass::Fatal {
                    warn!(attempt, error = %error, "Fatal error, not retrying");
                    return RetryReport {
                        attempts,
                        result: Err(RetryFailure::Fatal(error)),
                    };
                }

                if attempt >= max_attempts {
                    warn!(
                        attempt,
                        max_attempts,
                        error = %error,
                        "Transient error, attempts exhausted"
                    );
                    return RetryReport {
                        attempts,
                        result: Err(RetryFailure::Exhausted(error)),
                    };
                }

                warn!(
                    attempt,
                    max_attempts,
                    error = %error,
                    "Transient error, retrying"
                );
            }
        }
    }
}

fn cancelled<T, E>(attempts: Vec<RetryAttempt>) -> RetryReport<T, E> {
    warn!(attempts = attempts.len(), "Retry cancelled");
    RetryReport {
        attempts,
        result: Err(RetryFailure::Cancelled),
    }
}

/// Result of the existence probe run by [`retry_with_verification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeResult {
    /// The retries did not end in transient exhaustion.
    NotRun,
    Found,
    NotFound,
}

/// [`RetryReport`] plus the outcome of the existence probe.
#[derive(Debug)]
pub struct VerifiedReport<T, E> {
    pub report: RetryReport<T, E>,
    pub probe: ProbeResult,
}

impl<T, E> VerifiedReport<T, E> {
    /// Every attempt failed transiently but the probe found the side effect.
    pub fn verified_despite_error(&self) -> bool {
        self.probe == ProbeResult::Found
    }

    /// Either an attempt succeeded or the probe confirmed the effect.
    pub fn is_success(&self) -> bool {
        self.report.is_success() || self.verified_despite_error()
    }
}

/// [`retry`], then, if attempts ran out on transient errors, ask `probe`
/// whether the operation took effect anyway.
///
/// Fatal errors and cancellation skip the probe.
pub async fn retry_with_verification<T, E, F, Fut, C, P, PFut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    classify: C,
    operation: F,
    probe: P,
) -> VerifiedReport<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> ErrorClass,
    E: Display,
    P: FnOnce() -> PFut,
    PFut: Future<Output = bool>,
{
    let report = retry(policy, cancel, classify, operation).await;

    if !matches!(report.result, Err(RetryFailure::Exhausted(_))) {
        return VerifiedReport {
            report,
            probe: ProbeResult::NotRun,
        };
    }

    debug!("Attempts exhausted, probing for the result");
    let found = tokio::select! {
        _ = cancel.cancelled() => {
            return VerifiedReport {
                report: RetryReport {
                    attempts: report.attempts,
                    result: Err(RetryFailure::Cancelled),
                },
                probe: ProbeResult::NotRun,
            };
        }
        found = probe() => found,
    };

    let probe = if found {
        info!("Probe confirmed the operation despite errors");
        ProbeResult::Found
    } else {
        ProbeResult::NotFound
    };
    VerifiedReport { report, probe }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    fn by_prefix(e: &String) -> ErrorClass {
        if e.starts_with("transient") {
            ErrorClass::Transient
        } else {
            ErrorClass::Fatal
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::ZERO);
        assert_eq!(policy.backoff(2), Duration::from_secs(1));
        assert_eq!(policy.backoff(3), Duration::from_secs(2));
        assert_eq!(policy.backoff(4), Duration::from_secs(4));
    }

    #[test]
    fn test_max_delay_caps_backoff() {
        let policy =
            RetryPolicy::new(6, Duration::from_secs(1)).with_max_delay(Duration::from_secs(3));
        assert_eq!(policy.backoff(3), Duration::from_secs(2));
        assert_eq!(policy.backoff(4), Duration::from_secs(3));
        assert_eq!(policy.backoff(6), Duration::from_secs(3));
    }

    #[test]
    fn test_huge_base_delay_saturates() {
        let policy = RetryPolicy::new(40, Duration::from_millis(u64::MAX)).with_jitter(1.0);
        assert_eq!(policy.backoff(40), Duration::MAX);
        assert_eq!(policy.delay_before(40), Duration::MAX);
        assert!(policy.delay_before(2) >= Duration::from_millis(u64::MAX));

        let capped = policy.with_max_delay(Duration::from_secs(60));
        assert_eq!(capped.delay_before(40), Duration::from_secs(60));
    }

    #[test]
    fn test_jitter_only_adds() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1000)).with_jitter(0.5);
        for _ in 0..50 {
            let second = policy.delay_before(2);
            let third = policy.delay_before(3);
            assert!(second >= Duration::from_millis(1000));
            assert!(second <= Duration::from_millis(1500));
            assert!(third >= second);
        }
        assert_eq!(policy.delay_before(1), Duration::ZERO);
    }

    #[test]
    fn test_policy_from_config() {
        let config = PublishConfig {
            max_attempts: 0,
            jitter_ratio: 4.0,
            max_delay_ms: Some(5000),
            ..PublishConfig::default()
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.jitter_ratio, 1.0);
        assert_eq!(policy.max_delay, Some(Duration::from_secs(5)));
        assert_eq!(policy.base_delay, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_then_success() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1000));
        let start = tokio::time::Instant::now();

        let report = retry(&policy, &CancellationToken::new(), by_prefix, |n| async move {
            if n < 3 {
                Err(format!("transient failure {n}"))
            } else {
                Ok("pushed")
            }
        })
        .await;

        assert_eq!(report.result, Ok("pushed"));
        assert_eq!(report.delays_ms(), vec![0, 1000, 2000]);
        assert_eq!(report.succeeded_on_attempt(), Some(3));
        let outcomes: Vec<_> = report.attempts.iter().map(|a| a.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                AttemptOutcome::TransientFailure,
                AttemptOutcome::TransientFailure,
                AttemptOutcome::Success
            ]
        );
        assert!(start.elapsed() >= Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_transient_exhausts_attempts() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100)).with_jitter(0.2);
        let calls = Cell::new(0);

        let report: RetryReport<(), String> =
            retry(&policy, &CancellationToken::new(), by_prefix, |_| {
                calls.set(calls.get() + 1);
                async { Err("transient timeout".to_string()) }
            })
            .await;

        assert_eq!(calls.get(), 4);
        assert_eq!(report.attempts.len(), 4);
        assert!(matches!(report.result, Err(RetryFailure::Exhausted(_))));
        let delays = report.delays_ms();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]), "{delays:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_is_never_retried() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1000));
        let calls = Cell::new(0);

        let report: RetryReport<(), String> =
            retry(&policy, &CancellationToken::new(), by_prefix, |_| {
                calls.set(calls.get() + 1);
                async { Err("permission denied".to_string()) }
            })
            .await;

        assert_eq!(calls.get(), 1);
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(report.attempts[0].outcome, AttemptOutcome::FatalFailure);
        assert_eq!(
            report.result,
            Err(RetryFailure::Fatal("permission denied".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_backoff() {
        let policy = RetryPolicy::new(3, Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let calls = Cell::new(0);
        let report: RetryReport<(), String> = retry(&policy, &cancel, by_prefix, |_| {
            calls.set(calls.get() + 1);
            async { Err("transient reset".to_string()) }
        })
        .await;

        assert_eq!(calls.get(), 1);
        assert_eq!(report.result, Err(RetryFailure::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_first_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = Cell::new(0);

        let report: RetryReport<(), String> =
            retry(&RetryPolicy::default(), &cancel, by_prefix, |_| {
                calls.set(calls.get() + 1);
                async { Ok(()) }
            })
            .await;

        assert_eq!(calls.get(), 0);
        assert!(report.attempts.is_empty());
        assert_eq!(report.result, Err(RetryFailure::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_verification_probe_after_exhaustion() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let probed = Cell::new(false);

        let verified: VerifiedReport<(), String> = retry_with_verification(
            &policy,
            &CancellationToken::new(),
            by_prefix,
            |_| async { Err("transient reset".to_string()) },
            || {
                probed.set(true);
                async { true }
            },
        )
        .await;

        assert!(probed.get());
        assert_eq!(verified.probe, ProbeResult::Found);
        assert!(verified.verified_despite_error());
        assert!(verified.is_success());
        assert_eq!(verified.report.attempts.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_verification_skips_probe_on_fatal() {
        let probed = Cell::new(false);

        let verified: VerifiedReport<(), String> = retry_with_verification(
            &RetryPolicy::default(),
            &CancellationToken::new(),
            by_prefix,
            |_| async { Err("rejected".to_string()) },
            || {
                probed.set(true);
                async { true }
            },
        )
        .await;

        assert!(!probed.get());
        assert_eq!(verified.probe, ProbeResult::NotRun);
        assert!(!verified.is_success());
    }
}
