//! Start sequence state machine and exit classification

use crate::bus::{teardown, BusLauncher, TeardownCode};
use crate::config::{CoordinatorConfig, AGENT_PID_KEY};
use crate::error::{BusError, StartError};
use crate::params;
use crate::rendezvous::{self, AgentIdRegistry};
use crate::spawner::AgentSpawner;
use crate::toolgroup::ToolGroup;

use redis::AsyncCommands;

/// Phase of the start sequence, for progress reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPhase {
    Bus,
    Seeding,
    Spawning,
    Rendezvous,
    Recording,
}

impl std::fmt::Display for StartPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartPhase::Bus => write!(f, "starting coordination bus"),
            StartPhase::Seeding => write!(f, "seeding parameter records"),
            StartPhase::Spawning => write!(f, "launching agents"),
            StartPhase::Rendezvous => write!(f, "waiting for agents"),
            StartPhase::Recording => write!(f, "recording agent registry"),
        }
    }
}

/// Progress snapshot passed to the caller's callback
#[derive(Debug, Clone, Copy)]
pub struct StartProgress {
    pub phase: StartPhase,
    /// Agents registered so far (rendezvous phase only)
    pub registered: usize,
    /// Agents expected in total (rendezvous phase only)
    pub expected: usize,
}

impl StartProgress {
    fn phase(phase: StartPhase) -> Self {
        Self {
            phase,
            registered: 0,
            expected: 0,
        }
    }
}

/// Summary of a successful start
#[derive(Debug)]
pub struct StartReport {
    /// Tool group that was started
    pub group: String,
    /// Bus keys seeded before the agents launched
    pub seeded_keys: Vec<String>,
    /// Registry of every running agent, as persisted on the bus
    pub registry: AgentIdRegistry,
}

/// A failed start that has already been rolled back
#[derive(Debug)]
pub struct AbortedStart {
    /// What went wrong
    pub cause: StartError,
    /// Outcome of the compensating teardown
    pub teardown: TeardownCode,
}

impl AbortedStart {
    /// Process exit code for this abort
    pub fn exit_code(&self) -> i32 {
        self.teardown.exit_code()
    }
}

/// The startup coordinator
pub struct StartCoordinator {
    config: CoordinatorConfig,
    toolgroup: ToolGroup,
}

impl StartCoordinator {
    pub fn new(config: CoordinatorConfig, toolgroup: ToolGroup) -> Self {
        Self { config, toolgroup }
    }

    /// Run the full start sequence
    ///
    /// On success the bus, sink, and meisters are left running and the agent
    /// registry has been persisted. On any failure everything already
    /// started is torn down and the result carries the teardown outcome.
    pub async fn run<F>(&self, progress: F) -> Result<StartReport, Box<AbortedStart>>
    where
        F: Fn(StartProgress),
    {
        match self.try_start(&progress).await {
            Ok(report) => Ok(report),
            Err(cause) => {
                tracing::error!("Start failed, rolling back: {}", cause);
                let code = teardown::compensate(
                    &self.config.bus_url(),
                    &self.config.group,
                    &self.config.bus_pid_path(),
                )
                .await;
                Err(Box::new(AbortedStart {
                    cause,
                    teardown: code,
                }))
            }
        }
    }

    async fn try_start<F>(&self, progress: &F) -> Result<StartReport, StartError>
    where
        F: Fn(StartProgress),
    {
        std::fs::create_dir_all(self.config.tm_dir())?;

        progress(StartProgress::phase(StartPhase::Bus));
        let launcher = BusLauncher::new(&self.config);
        launcher.write_config()?;
        launcher.spawn().await?;
        let (handle, mut subscription) = launcher.wait_until_ready().await?;

        progress(StartProgress::phase(StartPhase::Seeding));
        let mut conn = handle
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(BusError::from)?;
        let seeded_keys = params::seed(&mut conn, &self.config, &self.toolgroup).await?;

        progress(StartProgress::phase(StartPhase::Spawning));
        let spawner = AgentSpawner::new(&self.config);
        spawner.start_sink().await?;
        let outcome = spawner.start_meisters(&self.toolgroup).await;
        for failure in &outcome.failed {
            tracing::error!("Meister launch failed on {}: {}", failure.host, failure.reason);
        }
        if let Some(err) = outcome.classify() {
            return Err(err.into());
        }

        let expected_meisters = outcome.successes();
        progress(StartProgress {
            phase: StartPhase::Rendezvous,
            registered: 0,
            expected: expected_meisters + 1,
        });
        let registry = {
            let payloads = subscription.payloads();
            rendezvous::await_agents(payloads, expected_meisters, |registered, expected| {
                progress(StartProgress {
                    phase: StartPhase::Rendezvous,
                    registered,
                    expected,
                })
            })
            .await?
        };

        progress(StartProgress::phase(StartPhase::Recording));
        let payload = serde_json::to_string(&registry)
            .map_err(|e| StartError::Serialization(e.to_string()))?;
        conn.set::<_, _, ()>(AGENT_PID_KEY, payload)
            .await
            .map_err(BusError::from)?;
        tracing::info!(
            "Start complete: 1 sink, {} meisters recorded under '{}'",
            registry.meister.len(),
            AGENT_PID_KEY
        );

        Ok(StartReport {
            group: self.config.group.clone(),
            seeded_keys,
            registry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SpawnError;

    #[test]
    fn test_phase_display() {
        assert_eq!(StartPhase::Bus.to_string(), "starting coordination bus");
        assert_eq!(StartPhase::Rendezvous.to_string(), "waiting for agents");
    }

    #[test]
    fn test_aborted_start_exit_code() {
        let aborted = AbortedStart {
            cause: StartError::Spawn(SpawnError::NoAgentsStarted),
            teardown: TeardownCode::SignalDelivered,
        };
        assert_eq!(aborted.exit_code(), 1);

        let aborted = AbortedStart {
            cause: StartError::Spawn(SpawnError::NoAgentsStarted),
            teardown: TeardownCode::PidFileUnreadable,
        };
        assert_eq!(aborted.exit_code(), 2);
    }
}
