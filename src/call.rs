//! Resilient call: wraps one probe in bounded timeouts, retries with
//! exponentially growing timeouts, linear backoff plus jitter, and failure
//! classification. Probe-level errors never escape this module; callers see
//! a terminal [`CallOutcome`] only.

use crate::config::profile::CallPolicy;
use crate::metrics::metrics;
use crate::probe::{Probe, ProbeError, ProbeStatus};
use rand::Rng;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallOutcome {
    Success { attempts: u32 },
    Timeout,
    Unavailable,
    NoReply,
    UnknownError,
}

impl CallOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            CallOutcome::Success { .. } => "success",
            CallOutcome::Timeout => "timeout",
            CallOutcome::Unavailable => "unavailable",
            CallOutcome::NoReply => "no-reply",
            CallOutcome::UnknownError => "unknown-error",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, CallOutcome::Success { .. })
    }
}

/// Record of a single attempt. Emitted as a log event and a counter, then
/// discarded; only the terminal outcome survives the call.
#[derive(Clone, Copy, Debug)]
pub struct CallAttempt {
    pub attempt: u32,
    pub timeout: Duration,
    pub classification: CallOutcome,
    pub elapsed: Duration,
}

/// Timeout for the n-th attempt (1-based): base plus a fixed increment per
/// prior attempt, saturating at `max_timeout`.
pub fn timeout_for_attempt(policy: &CallPolicy, attempt: u32) -> Duration {
    let grown = policy
        .base_timeout
        .saturating_add(policy.timeout_increment.saturating_mul(attempt.saturating_sub(1)));
    grown.min(policy.max_timeout)
}

/// Deterministic part of the sleep before the next attempt. Jitter is added
/// on top at call time.
pub fn backoff_base(policy: &CallPolicy, attempt: u32) -> Duration {
    policy.backoff_unit.saturating_mul(attempt)
}

pub fn jitter_between(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let mut rng = rand::thread_rng();
    let min_secs = min.as_secs_f64();
    let span = max.as_secs_f64() - min_secs;
    let sample = rng.gen::<f64>() * span + min_secs;
    Duration::from_secs_f64(sample)
}

/// Deterministic upper bound on the wall-clock time one call may consume:
/// the sum of all attempt timeouts plus the maximum possible backoff sleeps.
pub fn worst_case_duration(policy: &CallPolicy) -> Duration {
    let mut total = Duration::ZERO;
    for attempt in 1..=policy.max_attempts {
        total = total.saturating_add(timeout_for_attempt(policy, attempt));
        if attempt < policy.max_attempts {
            total = total
                .saturating_add(backoff_base(policy, attempt))
                .saturating_add(policy.jitter_cap);
        }
    }
    total
}

pub async fn call(probe: &dyn Probe, endpoint: &str, policy: &CallPolicy) -> CallOutcome {
    let mut last_failure = CallOutcome::UnknownError;

    for attempt in 1..=policy.max_attempts {
        let attempt_timeout = timeout_for_attempt(policy, attempt);
        let started = Instant::now();

        let classification = match timeout(attempt_timeout, probe.probe(endpoint)).await {
            Ok(Ok(ProbeStatus::Ready)) => CallOutcome::Success { attempts: attempt },
            // Not-ready counts as no reply.
            Ok(Ok(ProbeStatus::NotReady)) => CallOutcome::NoReply,
            Ok(Err(ProbeError::Unavailable(_))) => CallOutcome::Unavailable,
            Ok(Err(ProbeError::NoReply(_))) => CallOutcome::NoReply,
            Ok(Err(ProbeError::Unknown { .. })) => CallOutcome::UnknownError,
            Err(_) => CallOutcome::Timeout,
        };

        let record = CallAttempt {
            attempt,
            timeout: attempt_timeout,
            classification,
            elapsed: started.elapsed(),
        };
        metrics().record_call_attempt(endpoint, record.classification.as_str());
        tracing::debug!(
            endpoint = endpoint,
            attempt = record.attempt,
            timeout_ms = record.timeout.as_millis() as u64,
            elapsed_ms = record.elapsed.as_millis() as u64,
            classification = record.classification.as_str(),
            "probe attempt resolved"
        );

        if classification.is_success() {
            return classification;
        }
        last_failure = classification;

        if attempt < policy.max_attempts {
            let delay = backoff_base(policy, attempt)
                .saturating_add(jitter_between(Duration::ZERO, policy.jitter_cap));
            sleep(delay).await;
        }
    }

    tracing::warn!(
        endpoint = endpoint,
        attempts = policy.max_attempts,
        classification = last_failure.as_str(),
        "probe exhausted its retry budget"
    );
    last_failure
}
