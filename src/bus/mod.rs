//! Coordination bus module
//!
//! The bus is a Redis-style daemon providing key/value records and pub/sub
//! channels. The coordinator owns it for the duration of start:
//! - the launcher writes its configuration, spawns the daemon, and polls
//!   until a subscription round-trips end to end;
//! - the teardown compensator broadcasts a terminate message and force-kills
//!   the daemon whenever any later phase fails.

mod launcher;
pub mod teardown;

pub use launcher::{BusHandle, BusLauncher, StartSubscription};
pub use teardown::TeardownCode;
