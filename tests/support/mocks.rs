#![allow(dead_code)]

use async_trait::async_trait;
use sessiond::config::profile::{
    CallPolicy, Endpoint, LaunchConfig, PollPolicy, SessionProfile, Tier,
};
use sessiond::probe::{Probe, ProbeError, ProbeStatus};
use sessiond::session::launch::{LaunchError, Launcher, SessionHandle};
use sessiond::session::Environment;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted behaviour for one endpoint.
#[derive(Clone, Copy, Debug)]
pub enum ProbeScript {
    Ready,
    NotReady,
    Unavailable,
    /// Never resolves; the caller's timeout has to cut it off.
    Hang,
    ReadyAfter(Duration),
}

/// Deterministic probe keyed by endpoint name. Unknown endpoints answer
/// not-ready.
#[derive(Clone, Default)]
pub struct ScriptedProbe {
    scripts: Arc<Mutex<HashMap<String, ProbeScript>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, endpoint: &str, script: ProbeScript) -> Self {
        self.scripts
            .lock()
            .expect("probe scripts poisoned")
            .insert(endpoint.to_string(), script);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn probe(&self, endpoint: &str) -> Result<ProbeStatus, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .expect("probe scripts poisoned")
            .get(endpoint)
            .copied()
            .unwrap_or(ProbeScript::NotReady);

        match script {
            ProbeScript::Ready => Ok(ProbeStatus::Ready),
            ProbeScript::NotReady => Ok(ProbeStatus::NotReady),
            ProbeScript::Unavailable => Err(ProbeError::Unavailable(endpoint.to_string())),
            ProbeScript::Hang => {
                std::future::pending::<()>().await;
                Ok(ProbeStatus::NotReady)
            }
            ProbeScript::ReadyAfter(delay) => {
                tokio::time::sleep(delay).await;
                Ok(ProbeStatus::Ready)
            }
        }
    }
}

/// Launcher whose per-launch outcomes are scripted up front; records every
/// command it was asked to start.
#[derive(Default)]
pub struct ScriptedLauncher {
    outcomes: Mutex<VecDeque<bool>>,
    commands: Mutex<Vec<String>>,
}

impl ScriptedLauncher {
    /// `outcomes[i]` decides whether the i-th launch succeeds; launches past
    /// the scripted list succeed.
    pub fn new(outcomes: Vec<bool>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().expect("launcher commands poisoned").clone()
    }
}

#[async_trait]
impl Launcher for ScriptedLauncher {
    async fn launch(&self, config: &LaunchConfig) -> Result<Box<dyn SessionHandle>, LaunchError> {
        self.commands
            .lock()
            .expect("launcher commands poisoned")
            .push(config.command.clone());

        let succeed = self
            .outcomes
            .lock()
            .expect("launcher outcomes poisoned")
            .pop_front()
            .unwrap_or(true);

        if succeed {
            Ok(Box::new(InstantExitHandle { code: 0 }))
        } else {
            Err(LaunchError::InvalidConfig("scripted failure".to_string()))
        }
    }
}

/// Session target that exits immediately with a fixed code.
pub struct InstantExitHandle {
    pub code: i32,
}

#[async_trait]
impl SessionHandle for InstantExitHandle {
    async fn wait(&mut self) -> i32 {
        self.code
    }

    async fn terminate(&mut self) {}
}

/// Environment backed by a plain map.
#[derive(Default)]
pub struct MapEnvironment {
    vars: HashMap<String, String>,
}

impl MapEnvironment {
    pub fn new(vars: &[(&str, &str)]) -> Self {
        Self {
            vars: vars
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        }
    }
}

impl Environment for MapEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn endpoint(name: &str, tier: Tier) -> Endpoint {
    Endpoint {
        name: name.to_string(),
        tier,
        probe_timeout: None,
    }
}

/// Millisecond-scale call policy so paused-clock tests resolve quickly.
pub fn fast_call_policy() -> CallPolicy {
    CallPolicy {
        base_timeout: Duration::from_millis(50),
        timeout_increment: Duration::from_millis(25),
        max_timeout: Duration::from_millis(200),
        max_attempts: 2,
        backoff_unit: Duration::from_millis(5),
        jitter_cap: Duration::from_millis(2),
    }
}

pub fn test_profile(endpoints: Vec<Endpoint>, threshold: f64) -> SessionProfile {
    SessionProfile {
        endpoints,
        call: fast_call_policy(),
        critical_poll: PollPolicy {
            threshold,
            deadline: Duration::from_secs(2),
        },
        important_poll: PollPolicy {
            threshold: 0.5,
            deadline: Duration::from_secs(2),
        },
        optional_poll: PollPolicy {
            threshold: 0.5,
            deadline: Duration::from_secs(2),
        },
        registration: None,
        launch: LaunchConfig {
            command: "primary-wm".to_string(),
            args: vec!["--session".to_string()],
        },
        fallback: LaunchConfig {
            command: "fallback-wm".to_string(),
            args: Vec::new(),
        },
        monitor_interval: Duration::from_millis(100),
        required_env: Vec::new(),
    }
}
