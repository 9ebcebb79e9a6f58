//! Readiness poller: fires one resilient call per endpoint concurrently,
//! aggregates arrivals through a single consumer, and resolves as soon as
//! the ready fraction meets the threshold or the deadline elapses. The
//! poller never fails; insufficient readiness is an ordinary result.

use crate::call::{self, CallOutcome};
use crate::config::profile::{CallPolicy, Endpoint, PollPolicy, Tier};
use crate::metrics::metrics;
use crate::probe::Probe;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    NotReady,
}

impl Readiness {
    pub fn as_str(self) -> &'static str {
        match self {
            Readiness::Ready => "ready",
            Readiness::NotReady => "not-ready",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    pub readiness: Readiness,
    /// Offset from poll start at which the endpoint resolved. Endpoints
    /// still outstanding at termination carry the poll's total elapsed time.
    pub resolved_at: Duration,
}

/// Terminal outcome of one poll. Built incrementally by the aggregator,
/// immutable once returned.
#[derive(Clone, Debug)]
pub struct PollResult {
    entries: BTreeMap<String, ResolvedEndpoint>,
    threshold: f64,
    elapsed: Duration,
}

impl PollResult {
    pub fn total(&self) -> usize {
        self.entries.len()
    }

    pub fn ready_count(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.readiness == Readiness::Ready)
            .count()
    }

    pub fn ready_fraction(&self) -> f64 {
        if self.entries.is_empty() {
            return 1.0;
        }
        self.ready_count() as f64 / self.total() as f64
    }

    /// Whether the ready fraction met the threshold. An empty endpoint set
    /// is vacuously satisfied.
    pub fn is_satisfied(&self) -> bool {
        self.ready_fraction() >= self.threshold
    }

    pub fn readiness(&self, endpoint: &str) -> Option<Readiness> {
        self.entries.get(endpoint).map(|entry| entry.readiness)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &ResolvedEndpoint)> {
        self.entries
            .iter()
            .map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

#[derive(Clone)]
pub struct ReadinessPoller {
    probe: Arc<dyn Probe>,
    call_policy: CallPolicy,
}

impl ReadinessPoller {
    pub fn new(probe: Arc<dyn Probe>, call_policy: CallPolicy) -> Self {
        Self { probe, call_policy }
    }

    pub async fn poll(&self, tier: Tier, endpoints: &[Endpoint], policy: PollPolicy) -> PollResult {
        let total = endpoints.len();
        let started = Instant::now();
        let mut entries = BTreeMap::new();

        if total == 0 {
            tracing::info!(
                tier = tier.as_str(),
                ready = 0_u64,
                total = 0_u64,
                satisfied = true,
                "poll vacuously satisfied (no endpoints)"
            );
            metrics().record_poll_outcome(tier.as_str(), true, 0, 0);
            return PollResult {
                entries,
                threshold: policy.threshold,
                elapsed: Duration::ZERO,
            };
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        for endpoint in endpoints {
            let probe = Arc::clone(&self.probe);
            let call_policy = effective_call_policy(&self.call_policy, endpoint);
            let name = endpoint.name.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let outcome = call::call(probe.as_ref(), &name, &call_policy).await;
                let _ = tx.send((name, outcome, started.elapsed()));
            });
        }
        drop(tx);

        let deadline = sleep(policy.deadline);
        tokio::pin!(deadline);

        let mut ready = 0usize;
        let mut resolved = 0usize;

        loop {
            tokio::select! {
                arrival = rx.recv() => match arrival {
                    Some((name, outcome, resolved_at)) => {
                        resolved += 1;
                        let readiness = match outcome {
                            CallOutcome::Success { .. } => {
                                ready += 1;
                                Readiness::Ready
                            }
                            _ => Readiness::NotReady,
                        };
                        entries.insert(name, ResolvedEndpoint { readiness, resolved_at });

                        if ready as f64 / total as f64 >= policy.threshold {
                            break;
                        }
                        if resolved == total {
                            break;
                        }
                    }
                    None => break,
                },
                _ = &mut deadline => {
                    tracing::warn!(
                        tier = tier.as_str(),
                        resolved = resolved as u64,
                        total = total as u64,
                        "poll deadline elapsed with probes outstanding"
                    );
                    break;
                }
            }
        }

        let elapsed = started.elapsed();
        for endpoint in endpoints {
            entries
                .entry(endpoint.name.clone())
                .or_insert(ResolvedEndpoint {
                    readiness: Readiness::NotReady,
                    resolved_at: elapsed,
                });
        }

        let result = PollResult {
            entries,
            threshold: policy.threshold,
            elapsed,
        };

        tracing::info!(
            tier = tier.as_str(),
            ready = result.ready_count() as u64,
            total = result.total() as u64,
            satisfied = result.is_satisfied(),
            elapsed_ms = elapsed.as_millis() as u64,
            "poll resolved"
        );
        metrics().record_poll_outcome(
            tier.as_str(),
            result.is_satisfied(),
            result.ready_count(),
            result.total(),
        );

        result
    }
}

/// A per-endpoint probe timeout overrides the policy's base timeout; the
/// cap is widened if needed so the invariant `max >= base` holds.
fn effective_call_policy(policy: &CallPolicy, endpoint: &Endpoint) -> CallPolicy {
    match endpoint.probe_timeout {
        Some(timeout) => CallPolicy {
            base_timeout: timeout,
            max_timeout: policy.max_timeout.max(timeout),
            ..*policy
        },
        None => *policy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{ProbeError, ProbeStatus};
    use async_trait::async_trait;

    struct NeverReady;

    #[async_trait]
    impl Probe for NeverReady {
        async fn probe(&self, endpoint: &str) -> Result<ProbeStatus, ProbeError> {
            Err(ProbeError::NoReply(endpoint.to_string()))
        }
    }

    fn endpoint(name: &str) -> Endpoint {
        Endpoint {
            name: name.to_string(),
            tier: Tier::Critical,
            probe_timeout: None,
        }
    }

    #[tokio::test]
    async fn empty_endpoint_set_is_vacuously_ready() {
        let poller = ReadinessPoller::new(Arc::new(NeverReady), CallPolicy::default());
        let result = poller
            .poll(
                Tier::Critical,
                &[],
                PollPolicy {
                    threshold: 0.75,
                    deadline: Duration::from_secs(5),
                },
            )
            .await;
        assert!(result.is_satisfied());
        assert_eq!(result.total(), 0);
    }

    #[test]
    fn per_endpoint_timeout_overrides_base_and_widens_cap() {
        let policy = CallPolicy::default();
        let mut target = endpoint("compositor");
        target.probe_timeout = Some(Duration::from_secs(60));
        let effective = effective_call_policy(&policy, &target);
        assert_eq!(effective.base_timeout, Duration::from_secs(60));
        assert_eq!(effective.max_timeout, Duration::from_secs(60));
        assert_eq!(effective.max_attempts, policy.max_attempts);
    }
}
