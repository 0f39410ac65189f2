//! tool-meister-start - Startup coordinator for a telemetry-collection fleet
//!
//! Brings up everything a benchmark run needs to collect performance data
//! from a set of hosts, then gets out of the way.
//!
//! # Architecture
//!
//! One start invocation walks a fixed sequence:
//!
//! ## Phase 1: Bus
//! - Writes the coordination bus configuration into the run directory
//! - Spawns the bus daemon and polls until a subscription round-trips
//!
//! ## Phase 2: Seeding
//! - Publishes tool metadata and per-agent parameter records under
//!   well-known bus keys
//!
//! ## Phase 3: Agents
//! - Launches the local data sink, the controller's own tool meister, and
//!   one remote meister per other host over secure shell
//!
//! ## Phase 4: Rendezvous
//! - Waits on the start channel until one sink and one meister per
//!   successful launch have registered, then persists the registry of
//!   agent process identifiers for the stop tooling
//!
//! Any failure after the bus daemon is spawned triggers a uniform rollback:
//! a terminate broadcast on the main channel followed by a force-kill of the
//! bus. The bus, sink, and meisters survive a successful start; tearing them
//! down afterwards is the stop tooling's job.

pub mod bus;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod params;
pub mod rendezvous;
pub mod spawner;
pub mod toolgroup;

pub use config::{CliArgs, CoordinatorConfig};
pub use error::{Result, StartError};
pub use toolgroup::ToolGroup;
