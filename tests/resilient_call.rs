#[path = "support/mod.rs"]
mod support;

use async_trait::async_trait;
use sessiond::call::{self, worst_case_duration, CallOutcome};
use sessiond::probe::{Probe, ProbeError, ProbeStatus};
use std::sync::atomic::{AtomicU32, Ordering};
use support::mocks::{fast_call_policy, ProbeScript, ScriptedProbe};

/// Answers no-reply until the scripted attempt, then ready.
struct EventuallyReady {
    succeed_on: u32,
    attempts: AtomicU32,
}

#[async_trait]
impl Probe for EventuallyReady {
    async fn probe(&self, endpoint: &str) -> Result<ProbeStatus, ProbeError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt >= self.succeed_on {
            Ok(ProbeStatus::Ready)
        } else {
            Err(ProbeError::NoReply(endpoint.to_string()))
        }
    }
}

#[tokio::test(start_paused = true)]
async fn success_midway_reports_the_consumed_attempts() {
    let probe = EventuallyReady {
        succeed_on: 3,
        attempts: AtomicU32::new(0),
    };
    let mut policy = fast_call_policy();
    policy.max_attempts = 5;

    let outcome = call::call(&probe, "notifier", &policy).await;
    assert_eq!(outcome, CallOutcome::Success { attempts: 3 });
    assert_eq!(probe.attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn unavailable_probe_classifies_as_unavailable() {
    let probe = ScriptedProbe::new().script("bus", ProbeScript::Unavailable);
    let policy = fast_call_policy();

    let outcome = call::call(&probe, "bus", &policy).await;
    assert_eq!(outcome, CallOutcome::Unavailable);
    assert_eq!(probe.calls(), policy.max_attempts as usize);
}

#[tokio::test(start_paused = true)]
async fn not_ready_reply_classifies_as_no_reply() {
    let probe = ScriptedProbe::new().script("portal", ProbeScript::NotReady);

    let outcome = call::call(&probe, "portal", &fast_call_policy()).await;
    assert_eq!(outcome, CallOutcome::NoReply);
}

#[tokio::test(start_paused = true)]
async fn hanging_probe_times_out_within_the_worst_case_bound() {
    let probe = ScriptedProbe::new().script("compositor", ProbeScript::Hang);
    let policy = fast_call_policy();
    let started = tokio::time::Instant::now();

    let outcome = call::call(&probe, "compositor", &policy).await;
    assert_eq!(outcome, CallOutcome::Timeout);
    assert!(started.elapsed() <= worst_case_duration(&policy));
    assert_eq!(probe.calls(), policy.max_attempts as usize);
}
