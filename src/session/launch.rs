//! Launching and holding the session target process. The coordinator only
//! sees the `Launcher`/`SessionHandle` seams, so tests substitute their own.

use crate::config::profile::LaunchConfig;
use async_trait::async_trait;
use thiserror::Error;
use tokio::process::{Child, Command};

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid launch configuration: {0}")]
    InvalidConfig(String),
}

/// A running session target. `wait` resolves with its exit code.
#[async_trait]
pub trait SessionHandle: Send {
    async fn wait(&mut self) -> i32;
    async fn terminate(&mut self);
}

#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, config: &LaunchConfig) -> Result<Box<dyn SessionHandle>, LaunchError>;
}

pub struct ProcessLauncher;

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(&self, config: &LaunchConfig) -> Result<Box<dyn SessionHandle>, LaunchError> {
        if config.command.is_empty() {
            return Err(LaunchError::InvalidConfig(
                "launch command is empty".to_string(),
            ));
        }

        let child = Command::new(&config.command)
            .args(&config.args)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                command: config.command.clone(),
                source,
            })?;

        tracing::info!(
            command = config.command.as_str(),
            pid = child.id().map(u64::from).unwrap_or(0),
            "target process started"
        );

        Ok(Box::new(ProcessHandle {
            child,
            command: config.command.clone(),
        }))
    }
}

struct ProcessHandle {
    child: Child,
    command: String,
}

#[async_trait]
impl SessionHandle for ProcessHandle {
    async fn wait(&mut self) -> i32 {
        match self.child.wait().await {
            Ok(status) => status.code().unwrap_or(-1),
            Err(err) => {
                tracing::warn!(
                    command = self.command.as_str(),
                    error = %err,
                    "failed to await target process"
                );
                -1
            }
        }
    }

    async fn terminate(&mut self) {
        if let Err(err) = self.child.start_kill() {
            tracing::warn!(
                command = self.command.as_str(),
                error = %err,
                "failed to signal target process"
            );
        }
        let _ = self.child.wait().await;
    }
}
