//! Session coordinator: sequences environment validation, registration,
//! readiness polling, target launch, monitoring, and shutdown through the
//! session state machine, degrading to the fallback launch path when a
//! required step fails irrecoverably.

use crate::call;
use crate::config::profile::{SessionProfile, Tier};
use crate::metrics::metrics;
use crate::poll::ReadinessPoller;
use crate::probe::{Probe, ProbeStatus};
use crate::session::launch::{Launcher, SessionHandle};
use crate::session::state::{SessionState, SessionStateMachine, Signal};
use std::sync::Arc;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Environment lookup seam; production uses the process environment.
pub trait Environment: Send + Sync {
    fn var(&self, key: &str) -> Option<String>;
}

pub struct SystemEnvironment;

impl Environment for SystemEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionVerdict {
    /// Terminated via a clean Monitoring -> ShuttingDown path.
    Clean,
    /// Fallback was engaged and the degraded launch also failed.
    DegradedFailed,
    /// Required environment was missing and no session ever ran.
    EnvironmentMissing,
}

impl SessionVerdict {
    pub fn exit_code(self) -> u8 {
        match self {
            SessionVerdict::Clean => 0,
            SessionVerdict::DegradedFailed => 1,
            SessionVerdict::EnvironmentMissing => 2,
        }
    }
}

pub struct SessionCoordinator {
    profile: SessionProfile,
    probe: Arc<dyn Probe>,
    launcher: Arc<dyn Launcher>,
    environment: Arc<dyn Environment>,
    shutdown: CancellationToken,
    machine: SessionStateMachine,
}

impl SessionCoordinator {
    pub fn new(profile: SessionProfile, probe: Arc<dyn Probe>, launcher: Arc<dyn Launcher>) -> Self {
        Self {
            profile,
            probe,
            launcher,
            environment: Arc::new(SystemEnvironment),
            shutdown: CancellationToken::new(),
            machine: SessionStateMachine::new(),
        }
    }

    pub fn with_environment(mut self, environment: Arc<dyn Environment>) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    /// Drives the session to Terminated. Never returns an error: every
    /// failure is absorbed into the state machine and reflected in the
    /// verdict's exit code.
    pub async fn run(mut self) -> SessionVerdict {
        let poller = ReadinessPoller::new(Arc::clone(&self.probe), self.profile.call);
        let mut session: Option<Box<dyn SessionHandle>> = None;
        let mut environment_failed = false;
        let mut degraded = false;
        let mut monitored_cleanly = false;

        self.machine.advance(Signal::Success, "session start");

        loop {
            match self.machine.state() {
                SessionState::Validating => {
                    let missing = self.missing_environment();
                    if missing.is_empty() {
                        self.machine.advance(Signal::Success, "environment complete");
                    } else {
                        environment_failed = true;
                        tracing::error!(
                            missing = missing.join(",").as_str(),
                            "required environment missing"
                        );
                        self.machine.advance(Signal::Failure, "environment missing");
                    }
                }
                SessionState::Registering => {
                    let signal = self.register().await;
                    self.machine.advance(signal, "registration resolved");
                }
                SessionState::Polling => {
                    let signal = self.run_polls(&poller).await;
                    let reason = match signal {
                        Signal::Success => "critical tier ready",
                        Signal::Failure => "critical threshold missed",
                    };
                    self.machine.advance(signal, reason);
                }
                SessionState::Fallback => {
                    degraded = true;
                    metrics().inc_fallback_engaged();
                    tracing::warn!(
                        command = self.profile.fallback.command.as_str(),
                        "entering degraded mode with fallback configuration"
                    );
                    self.machine.advance(Signal::Success, "degraded configuration prepared");
                }
                SessionState::Launching => {
                    let config = if degraded {
                        &self.profile.fallback
                    } else {
                        &self.profile.launch
                    };
                    match self.launcher.launch(config).await {
                        Ok(handle) => {
                            metrics().inc_launch_success();
                            session = Some(handle);
                            self.machine.advance(Signal::Success, "target started");
                        }
                        Err(err) => {
                            metrics().inc_launch_failure();
                            tracing::error!(
                                command = config.command.as_str(),
                                degraded = degraded,
                                error = %err,
                                "target failed to start"
                            );
                            self.machine.advance(Signal::Failure, "launch failed");
                        }
                    }
                }
                SessionState::Monitoring => {
                    if let Some(mut handle) = session.take() {
                        let reason = self.monitor(handle.as_mut()).await;
                        monitored_cleanly = true;
                        self.machine.advance(Signal::Success, reason);
                    } else {
                        self.machine.advance(Signal::Failure, "no session to monitor");
                    }
                }
                SessionState::ShuttingDown => {
                    self.shutdown.cancel();
                    self.machine.advance(Signal::Success, "cleanup complete");
                }
                SessionState::Terminated => break,
                SessionState::Init => {
                    self.machine.advance(Signal::Success, "session start");
                }
            }
        }

        let verdict = if monitored_cleanly {
            SessionVerdict::Clean
        } else if environment_failed {
            SessionVerdict::EnvironmentMissing
        } else {
            SessionVerdict::DegradedFailed
        };

        tracing::info!(
            verdict = ?verdict,
            degraded = degraded,
            exit_code = verdict.exit_code(),
            "session terminated"
        );
        verdict
    }

    fn missing_environment(&self) -> Vec<String> {
        self.profile
            .required_env
            .iter()
            .filter(|key| self.environment.var(key).is_none())
            .cloned()
            .collect()
    }

    /// A single resilient call against the session manager. Failure is
    /// non-fatal: the session continues without registration.
    async fn register(&self) -> Signal {
        let Some(registration) = self.profile.registration.as_ref() else {
            tracing::debug!("registration skipped (no endpoint configured)");
            return Signal::Success;
        };

        let outcome = call::call(
            self.probe.as_ref(),
            &registration.endpoint,
            &self.profile.call,
        )
        .await;
        if outcome.is_success() {
            Signal::Success
        } else {
            tracing::warn!(
                endpoint = registration.endpoint.as_str(),
                classification = outcome.as_str(),
                "registration failed; continuing without it"
            );
            Signal::Failure
        }
    }

    /// Blocks on the critical tier; important/optional tiers poll detached
    /// for diagnostics only and never gate the launch.
    async fn run_polls(&self, poller: &ReadinessPoller) -> Signal {
        for tier in [Tier::Important, Tier::Optional] {
            let endpoints = self.profile.endpoints_in_tier(tier);
            if endpoints.is_empty() {
                continue;
            }
            let poller = poller.clone();
            let policy = self.profile.poll_policy(tier);
            tokio::spawn(async move {
                let _ = poller.poll(tier, &endpoints, policy).await;
            });
        }

        let critical = self.profile.endpoints_in_tier(Tier::Critical);
        let result = poller
            .poll(Tier::Critical, &critical, self.profile.critical_poll)
            .await;
        if result.is_satisfied() {
            Signal::Success
        } else {
            tracing::warn!(
                ready = result.ready_count() as u64,
                total = result.total() as u64,
                threshold = self.profile.critical_poll.threshold,
                "critical tier below readiness threshold"
            );
            Signal::Failure
        }
    }

    /// Holds the session until the target exits or shutdown is requested,
    /// re-probing critical endpoints at a fixed interval. Degradation is
    /// logged, never acted on; remediation belongs to the operator.
    async fn monitor(&self, handle: &mut dyn SessionHandle) -> &'static str {
        let mut ticker = interval(self.profile.monitor_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // the first tick fires immediately

        loop {
            tokio::select! {
                code = handle.wait() => {
                    tracing::info!(exit_code = code, "target process exited");
                    return "target exited";
                }
                _ = ticker.tick() => {
                    self.recheck_critical().await;
                }
                _ = self.shutdown.cancelled() => {
                    tracing::info!("termination requested; stopping target");
                    handle.terminate().await;
                    return "termination signal";
                }
            }
        }
    }

    async fn recheck_critical(&self) {
        let mut unresponsive = 0usize;
        for endpoint in self.profile.endpoints_in_tier(Tier::Critical) {
            let bound = endpoint
                .probe_timeout
                .unwrap_or(self.profile.call.base_timeout);
            let responsive = matches!(
                timeout(bound, self.probe.probe(&endpoint.name)).await,
                Ok(Ok(ProbeStatus::Ready))
            );
            if !responsive {
                unresponsive += 1;
            }
        }

        if unresponsive > 1 {
            metrics().inc_monitor_degradation();
            tracing::warn!(
                unresponsive = unresponsive as u64,
                "multiple critical endpoints stopped responding; session degraded"
            );
        }
    }
}
