//! Startup coordinator module
//!
//! The coordinator runs the whole start sequence as a single state machine:
//! bring up the bus, seed parameter records, launch the sink and meisters,
//! wait for the rendezvous, persist the agent registry. Any failure after
//! the bus daemon is spawned rolls everything back through the teardown
//! compensator, and the outcome collapses to one process exit code.

mod startup;

pub use startup::{
    AbortedStart, StartCoordinator, StartPhase, StartProgress, StartReport,
};
