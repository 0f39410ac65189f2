//! Sink and meister launch fan-out
//!
//! Launch order matters: the sink comes up first so no meister output is
//! ever dropped, then one meister per host. The controller's own meister is
//! launched directly; every other host goes through the secure-shell client.
//! Remote spawns are issued without blocking and reaped in a single barrier
//! afterwards, so the remote launches proceed concurrently.

use crate::config::{CoordinatorConfig, BUS_PORT, LOOPBACK_HOST};
use crate::error::SpawnError;
use crate::params::{meister_key, sink_key};
use crate::toolgroup::ToolGroup;

use std::process::Stdio;
use tokio::process::{Child, Command};

/// Secure-shell client executable, resolved from PATH
const SSH_CLIENT: &str = "ssh";

/// How one agent was launched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchKind {
    /// Launched directly on the controller
    Local,
    /// Launched over secure shell
    Remote,
}

/// One successfully issued meister launch
#[derive(Debug, Clone)]
pub struct AgentHandle {
    pub host: String,
    pub kind: LaunchKind,
}

/// One failed meister launch
#[derive(Debug, Clone)]
pub struct SpawnFailure {
    pub host: String,
    pub reason: String,
}

/// Aggregate result of the meister fan-out
///
/// The exit classifier reads this aggregate: any failure aborts the start,
/// and an empty `started` list is the degenerate abort case.
#[derive(Debug, Default)]
pub struct SpawnOutcome {
    /// Hosts whose launcher completed cleanly, in launch order
    pub started: Vec<AgentHandle>,
    /// Hosts whose launch or reap failed
    pub failed: Vec<SpawnFailure>,
}

impl SpawnOutcome {
    pub fn successes(&self) -> usize {
        self.started.len()
    }

    pub fn failures(&self) -> usize {
        self.failed.len()
    }

    /// True when every issued launch succeeded and at least one was issued
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && !self.started.is_empty()
    }

    /// Error for the classifier when the fan-out was not clean
    pub fn classify(&self) -> Option<SpawnError> {
        if !self.failed.is_empty() {
            Some(SpawnError::AgentFailures {
                failed: self.failures(),
                attempted: self.successes() + self.failures(),
            })
        } else if self.started.is_empty() {
            Some(SpawnError::NoAgentsStarted)
        } else {
            None
        }
    }
}

/// Launcher for the data sink and the per-host tool meisters
pub struct AgentSpawner<'a> {
    config: &'a CoordinatorConfig,
}

impl<'a> AgentSpawner<'a> {
    pub fn new(config: &'a CoordinatorConfig) -> Self {
        Self { config }
    }

    /// Launch the data sink and wait for its launcher to daemonize
    pub async fn start_sink(&self) -> Result<(), SpawnError> {
        let binary = self.config.sink_binary();
        tracing::debug!("Starting data sink via {}", binary.display());

        let status = Command::new(&binary)
            .arg(LOOPBACK_HOST)
            .arg(BUS_PORT.to_string())
            .arg(sink_key(&self.config.group))
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| SpawnError::Sink {
                reason: format!("failed to launch '{}': {}", binary.display(), e),
            })?;

        if !status.success() {
            return Err(SpawnError::Sink {
                reason: format!("launcher exited with {}", status),
            });
        }
        Ok(())
    }

    /// Launch one tool meister per host in the group
    pub async fn start_meisters(&self, toolgroup: &ToolGroup) -> SpawnOutcome {
        let mut outcome = SpawnOutcome::default();
        let mut remote: Vec<(Child, String)> = Vec::new();

        for host in toolgroup.hostnames.keys() {
            let key = meister_key(&self.config.group, host);
            if *host == self.config.full_hostname {
                self.start_local_meister(host, &key, &mut outcome).await;
            } else {
                self.spawn_remote_meister(host, &key, &mut remote, &mut outcome);
            }
        }

        // Reap barrier: every secure-shell child must be waited on, match
        // or fail.
        for (mut child, host) in remote {
            match child.wait().await {
                Ok(status) if status.success() => {
                    tracing::info!("Remote meister issued on {}", host);
                    outcome.started.push(AgentHandle {
                        host,
                        kind: LaunchKind::Remote,
                    });
                }
                Ok(status) => {
                    tracing::error!("Remote meister on {} failed: {}", host, status);
                    outcome.failed.push(SpawnFailure {
                        host,
                        reason: format!("secure shell exited with {}", status),
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to reap remote meister on {}: {}", host, e);
                    outcome.failed.push(SpawnFailure {
                        host,
                        reason: format!("reap failed: {}", e),
                    });
                }
            }
        }

        outcome
    }

    /// Launch the controller-resident meister and wait for it to daemonize
    async fn start_local_meister(&self, host: &str, key: &str, outcome: &mut SpawnOutcome) {
        let binary = self.config.meister_binary();
        tracing::debug!("Starting local meister via {}", binary.display());

        let result = Command::new(&binary)
            .arg(LOOPBACK_HOST)
            .arg(BUS_PORT.to_string())
            .arg(key)
            .stdin(Stdio::null())
            .status()
            .await;

        match result {
            Ok(status) if status.success() => {
                tracing::info!("Local meister issued on {}", host);
                outcome.started.push(AgentHandle {
                    host: host.to_string(),
                    kind: LaunchKind::Local,
                });
            }
            Ok(status) => {
                tracing::error!("Local meister launcher failed: {}", status);
                outcome.failed.push(SpawnFailure {
                    host: host.to_string(),
                    reason: format!("local launcher exited with {}", status),
                });
            }
            Err(e) => {
                tracing::error!("Failed to launch local meister: {}", e);
                outcome.failed.push(SpawnFailure {
                    host: host.to_string(),
                    reason: format!("failed to launch '{}': {}", binary.display(), e),
                });
            }
        }
    }

    /// Issue one remote meister launch without blocking
    fn spawn_remote_meister(
        &self,
        host: &str,
        key: &str,
        remote: &mut Vec<(Child, String)>,
        outcome: &mut SpawnOutcome,
    ) {
        let launcher = self.config.remote_launcher();
        tracing::debug!("Spawning remote meister on {} via {}", host, SSH_CLIENT);

        let result = Command::new(SSH_CLIENT)
            .arg(host)
            .arg(&launcher)
            .arg(&self.config.full_hostname)
            .arg(BUS_PORT.to_string())
            .arg(key)
            .stdin(Stdio::null())
            .spawn();

        match result {
            Ok(child) => remote.push((child, host.to_string())),
            Err(e) => {
                tracing::error!("Failed to spawn secure shell for {}: {}", host, e);
                outcome.failed.push(SpawnFailure {
                    host: host.to_string(),
                    reason: format!("failed to spawn secure shell: {}", e),
                });
            }
        }
    }
}
