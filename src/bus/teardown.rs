//! Teardown compensator
//!
//! Uniform rollback used whenever any start phase fails after the bus
//! daemon was spawned, and on clean abort. Two idempotent steps: broadcast
//! a terminate message so live agents shut themselves down, then force-kill
//! the bus daemon through its process-id file.

use crate::config::MAIN_CHANNEL;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use redis::AsyncCommands;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Outcome of the bus kill, encoded as the coordinator's abort exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownCode {
    /// Termination signal delivered to the bus daemon
    SignalDelivered = 1,
    /// Process-id file missing or unreadable
    PidFileUnreadable = 2,
    /// Process-id file contents are not a valid integer
    PidFileInvalid = 3,
    /// No process with the recorded identifier exists
    NoSuchProcess = 4,
    /// The kernel refused the signal for another reason
    KernelError = 5,
    /// Recorded identifier is outside the range of a single process
    Unexpected = 6,
}

impl TeardownCode {
    /// Process exit code reported by the coordinator on abort
    pub fn exit_code(self) -> i32 {
        self as i32
    }
}

/// Terminate broadcast published on the main channel
#[derive(Debug, Serialize)]
struct TerminateMessage<'a> {
    action: &'static str,
    group: &'a str,
    directory: Option<&'a str>,
}

/// Tear down everything started so far
///
/// Publish failures are logged and ignored; the kill outcome is the
/// authoritative result.
pub async fn compensate(bus_url: &str, group: &str, pid_file: &Path) -> TeardownCode {
    publish_terminate(bus_url, group).await;
    kill_bus(pid_file)
}

/// Broadcast `{action: terminate}` so any live sink or meister exits
async fn publish_terminate(bus_url: &str, group: &str) {
    let message = TerminateMessage {
        action: "terminate",
        group,
        directory: None,
    };
    let payload = match serde_json::to_string(&message) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!("Failed to encode terminate message: {}", e);
            return;
        }
    };

    let client = match redis::Client::open(bus_url) {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!("Terminate broadcast skipped, bad bus URL: {}", e);
            return;
        }
    };
    match client.get_multiplexed_async_connection().await {
        Ok(mut conn) => {
            if let Err(e) = conn.publish::<_, _, i64>(MAIN_CHANNEL, payload).await {
                tracing::warn!("Failed to publish terminate message: {}", e);
            }
        }
        Err(e) => {
            tracing::warn!("Terminate broadcast skipped, bus unreachable: {}", e);
        }
    }
}

/// Force-kill the bus daemon recorded in `pid_file`
pub fn kill_bus(pid_file: &Path) -> TeardownCode {
    let raw = match fs::read_to_string(pid_file) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!("Bus pid file '{}' unreadable: {}", pid_file.display(), e);
            return TeardownCode::PidFileUnreadable;
        }
    };

    let pid: i32 = match raw.trim().parse() {
        Ok(pid) => pid,
        Err(_) => {
            tracing::warn!(
                "Bus pid file '{}' holds '{}', not a process id",
                pid_file.display(),
                raw.trim()
            );
            return TeardownCode::PidFileInvalid;
        }
    };

    // A zero or negative value would address a process group, never a
    // daemon we started.
    if pid <= 0 {
        tracing::warn!("Refusing to signal recorded process id {}", pid);
        return TeardownCode::Unexpected;
    }

    match kill(Pid::from_raw(pid), Signal::SIGKILL) {
        Ok(()) => {
            tracing::info!("Killed bus daemon (pid {})", pid);
            TeardownCode::SignalDelivered
        }
        Err(Errno::ESRCH) => {
            tracing::warn!("Bus daemon (pid {}) already gone", pid);
            TeardownCode::NoSuchProcess
        }
        Err(e) => {
            tracing::error!("Failed to kill bus daemon (pid {}): {}", pid, e);
            TeardownCode::KernelError
        }
    }
}
