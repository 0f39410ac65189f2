//! Rendezvous watcher
//!
//! Every started agent publishes an `{kind, hostname, pid}` registration on
//! the start channel once it is up. The watcher drains that channel until
//! the expected membership is reached: exactly one sink plus one meister per
//! successful launch. Malformed or unknown messages are logged and skipped,
//! never fatal; a missing agent therefore shows up as a stall, bounded only
//! by outside supervision.

use crate::error::RendezvousError;

use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

/// Registration published by a started agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AgentRegistration {
    /// The data sink announcing readiness
    Sink { hostname: String, pid: u32 },
    /// One tool meister announcing readiness
    Meister { hostname: String, pid: u32 },
}

impl AgentRegistration {
    pub fn hostname(&self) -> &str {
        match self {
            AgentRegistration::Sink { hostname, .. } => hostname,
            AgentRegistration::Meister { hostname, .. } => hostname,
        }
    }

    pub fn pid(&self) -> u32 {
        match self {
            AgentRegistration::Sink { pid, .. } => *pid,
            AgentRegistration::Meister { pid, .. } => *pid,
        }
    }
}

/// Final registry of every running agent, persisted under `tm-pids`
///
/// Meister order is arrival order; the stop tooling reads this record to
/// find what to shut down.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentIdRegistry {
    pub sink: AgentRegistration,
    pub meister: Vec<AgentRegistration>,
}

/// Decode one start-channel payload
///
/// Rejects payloads that are not UTF-8, not JSON, or not a known
/// registration kind, naming the reason for the log.
pub fn decode(payload: &[u8]) -> Result<AgentRegistration, String> {
    let text = std::str::from_utf8(payload).map_err(|e| format!("payload is not UTF-8: {}", e))?;
    serde_json::from_str(text).map_err(|e| format!("payload is not a registration: {}", e))
}

/// Drain registrations until the expected membership is reached
///
/// `on_registration` is invoked with `(seen, expected)` totals after every
/// accepted registration. Returns an error only if the payload stream ends,
/// meaning the bus connection died underneath us.
pub async fn await_agents<S, F>(
    payloads: S,
    expected_meisters: usize,
    mut on_registration: F,
) -> Result<AgentIdRegistry, RendezvousError>
where
    S: Stream<Item = Vec<u8>>,
    F: FnMut(usize, usize),
{
    futures_util::pin_mut!(payloads);

    let expected_total = expected_meisters + 1;
    let mut sink: Option<AgentRegistration> = None;
    let mut meisters: Vec<AgentRegistration> = Vec::new();

    loop {
        if let Some(sink) = sink.as_ref() {
            if meisters.len() >= expected_meisters {
                tracing::info!(
                    "Rendezvous complete: 1 sink and {} meisters registered",
                    meisters.len()
                );
                return Ok(AgentIdRegistry {
                    sink: sink.clone(),
                    meister: meisters,
                });
            }
        }

        let Some(payload) = payloads.next().await else {
            let seen = meisters.len() + usize::from(sink.is_some());
            return Err(RendezvousError::ChannelClosed {
                seen,
                expected: expected_total,
            });
        };

        match decode(&payload) {
            Ok(registration @ AgentRegistration::Sink { .. }) => {
                if sink.is_some() {
                    tracing::warn!(
                        "Ignoring duplicate sink registration from {}",
                        registration.hostname()
                    );
                    continue;
                }
                tracing::debug!(
                    "Sink registered on {} (pid {})",
                    registration.hostname(),
                    registration.pid()
                );
                sink = Some(registration);
            }
            Ok(registration @ AgentRegistration::Meister { .. }) => {
                if meisters.len() >= expected_meisters {
                    tracing::warn!(
                        "Ignoring surplus meister registration from {}",
                        registration.hostname()
                    );
                    continue;
                }
                tracing::debug!(
                    "Meister registered on {} (pid {})",
                    registration.hostname(),
                    registration.pid()
                );
                meisters.push(registration);
            }
            Err(reason) => {
                tracing::warn!("Skipping start-channel message: {}", reason);
                continue;
            }
        }

        let seen = meisters.len() + usize::from(sink.is_some());
        on_registration(seen, expected_total);
    }
}
