//! Readiness probes. A probe answers a single question about one named
//! endpoint; timeouts and retries live in the resilient call, not here.

use async_trait::async_trait;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeStatus {
    Ready,
    NotReady,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("endpoint `{0}` does not exist")]
    Unavailable(String),
    #[error("endpoint `{0}` did not answer")]
    NoReply(String),
    #[error("probe for `{endpoint}` failed: {reason}")]
    Unknown { endpoint: String, reason: String },
}

#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, endpoint: &str) -> Result<ProbeStatus, ProbeError>;
}

/// Probes a named endpoint by invoking a status command with the endpoint
/// name appended (default `systemctl --user is-active <name>`).
pub struct UnitServiceProbe {
    command: Vec<String>,
}

// `systemctl is-active` exit code for a unit that does not exist.
const EXIT_NO_SUCH_UNIT: i32 = 4;

impl UnitServiceProbe {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl Probe for UnitServiceProbe {
    async fn probe(&self, endpoint: &str) -> Result<ProbeStatus, ProbeError> {
        let Some((program, prefix_args)) = self.command.split_first() else {
            return Err(ProbeError::Unknown {
                endpoint: endpoint.to_string(),
                reason: "probe command is empty".to_string(),
            });
        };

        let output = Command::new(program)
            .args(prefix_args)
            .arg(endpoint)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| ProbeError::Unknown {
                endpoint: endpoint.to_string(),
                reason: err.to_string(),
            })?;

        if output.status.success() {
            return Ok(ProbeStatus::Ready);
        }

        match output.status.code() {
            Some(EXIT_NO_SUCH_UNIT) => Err(ProbeError::Unavailable(endpoint.to_string())),
            Some(_) => Ok(ProbeStatus::NotReady),
            None => Err(ProbeError::NoReply(endpoint.to_string())),
        }
    }
}
