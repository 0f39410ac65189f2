//! Agent spawner module
//!
//! Launches the local data sink, the controller-resident tool meister, and
//! one remote tool meister per non-local host over secure shell. Local
//! launchers self-daemonize; remote launches are reaped after the fan-out.

mod launch;

pub use launch::{AgentHandle, AgentSpawner, LaunchKind, SpawnFailure, SpawnOutcome};
