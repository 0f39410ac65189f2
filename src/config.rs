//! Configuration types for tool-meister-start
//!
//! Defines CLI arguments, wire constants shared with the stop tooling, and
//! the controller configuration resolved from the environment.

use crate::error::ConfigError;
use clap::Parser;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fixed port the coordination bus listens on
pub const BUS_PORT: u16 = 17001;

/// Main control channel shared by the coordinator, sink, and meisters
pub const MAIN_CHANNEL: &str = "tool-meister-chan";

/// Channel on which started agents announce readiness
pub const START_CHANNEL: &str = "tool-meister-chan-start";

/// Loopback host identifier used for controller-local connections
pub const LOOPBACK_HOST: &str = "localhost";

/// Prefix of on-disk tool-group directories under `pbench_run`
pub const TOOL_GROUP_PREFIX: &str = "tools-v1";

/// Bus key under which the final agent identifier registry is persisted
pub const AGENT_PID_KEY: &str = "tm-pids";

/// Name of the bus database file dropped in the run directory
pub const BUS_DB_FILENAME: &str = "pbench-redis.rdb";

/// Maximum time to wait for the bus to accept a verified subscription
pub const BUS_MAX_WAIT: Duration = Duration::from_secs(60);

/// Sleep between bus readiness probes
pub const BUS_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default tool group name
pub const DEFAULT_GROUP: &str = "default";

/// Start the telemetry-collection fleet for one tool group
#[derive(Parser, Debug, Clone)]
#[command(
    name = "tool-meister-start",
    version,
    about = "Start the coordination bus, data sink, and per-host tool meisters",
    long_about = "Brings up the telemetry-collection fleet for a benchmark run:\n\
                  starts the coordination bus, seeds it with per-agent parameter\n\
                  records, launches the local data sink and one tool meister per\n\
                  host in the group, then waits until every agent has registered.\n\n\
                  On success the bus, sink, and meisters are left running for the\n\
                  downstream benchmark steps."
)]
pub struct CliArgs {
    /// Tool group to start agents for
    #[arg(value_name = "GROUP", default_value = DEFAULT_GROUP)]
    pub group: String,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Agent installation configuration file (TOML)
#[derive(Debug, Deserialize)]
struct AgentConfigFile {
    #[serde(rename = "pbench-agent")]
    agent: AgentSection,
}

#[derive(Debug, Deserialize)]
struct AgentSection {
    #[serde(rename = "install-dir")]
    install_dir: PathBuf,
}

/// Controller configuration resolved from the environment
///
/// All required variables are exported by the outer agent shell before the
/// coordinator runs; a missing one is a hard configuration error.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Tool group being started
    pub group: String,
    /// Base directory of the current benchmark run
    pub benchmark_run_dir: PathBuf,
    /// Short host identifier of the controller
    pub hostname: String,
    /// Fully-qualified host identifier of the controller
    pub full_hostname: String,
    /// Root under which tool-group directories are resolved
    pub pbench_run: PathBuf,
    /// Agent installation directory
    pub install_dir: PathBuf,
    /// Force the loopback identifier into meister parameter records
    pub unit_test_mode: bool,
}

impl CoordinatorConfig {
    /// Resolve the configuration from the environment
    pub fn from_env(group: &str) -> Result<Self, ConfigError> {
        let benchmark_run_dir = PathBuf::from(required_env("benchmark_run_dir")?);
        let hostname = required_env("_pbench_hostname")?;
        let full_hostname = required_env("_pbench_full_hostname")?;
        let pbench_run = PathBuf::from(required_env("pbench_run")?);
        let agent_config = PathBuf::from(required_env("_PBENCH_AGENT_CONFIG")?);
        let install_dir = read_install_dir(&agent_config)?;
        let unit_test_mode = env::var_os("_PBENCH_UNIT_TESTS").is_some();

        Ok(Self {
            group: group.to_string(),
            benchmark_run_dir,
            hostname,
            full_hostname,
            pbench_run,
            install_dir,
            unit_test_mode,
        })
    }

    /// Working subdirectory owned by the coordinator during start
    pub fn tm_dir(&self) -> PathBuf {
        self.benchmark_run_dir.join("tm")
    }

    /// Path of the bus configuration file
    pub fn bus_conf_path(&self) -> PathBuf {
        self.tm_dir().join("redis.conf")
    }

    /// Path of the bus process-id file
    pub fn bus_pid_path(&self) -> PathBuf {
        self.tm_dir().join(format!("redis_{}.pid", BUS_PORT))
    }

    /// Client URL of the bus on the controller
    pub fn bus_url(&self) -> String {
        format!("redis://{}:{}/", LOOPBACK_HOST, BUS_PORT)
    }

    /// Controller identifier recorded in meister parameter records
    ///
    /// The loopback name is substituted only under the unit-test escape.
    pub fn controller(&self) -> &str {
        if self.unit_test_mode {
            LOOPBACK_HOST
        } else {
            &self.full_hostname
        }
    }

    /// Path of the data-sink launcher binary
    pub fn sink_binary(&self) -> PathBuf {
        self.install_dir.join("tool-meister/pbench-tool-data-sink")
    }

    /// Path of the local tool-meister launcher binary
    pub fn meister_binary(&self) -> PathBuf {
        self.install_dir.join("tool-meister/pbench-tool-meister")
    }

    /// Path of the remote tool-meister launcher invoked over secure shell
    pub fn remote_launcher(&self) -> PathBuf {
        self.install_dir.join("tool-meister/pbench-tool-meister-remote")
    }

    /// Path of the bundled tool-metadata descriptor
    pub fn metadata_file(&self) -> PathBuf {
        self.install_dir.join("tool-scripts/meta.json")
    }
}

fn required_env(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingEnv { name }),
    }
}

fn read_install_dir(agent_config: &Path) -> Result<PathBuf, ConfigError> {
    let raw = std::fs::read_to_string(agent_config).map_err(|e| ConfigError::AgentConfig {
        path: agent_config.to_path_buf(),
        reason: e.to_string(),
    })?;

    let parsed: AgentConfigFile = toml::from_str(&raw).map_err(|e| ConfigError::AgentConfig {
        path: agent_config.to_path_buf(),
        reason: e.to_string(),
    })?;

    let install_dir = parsed.agent.install_dir;
    if !install_dir.is_dir() {
        return Err(ConfigError::InstallDirMissing { path: install_dir });
    }

    Ok(install_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> CoordinatorConfig {
        CoordinatorConfig {
            group: "default".to_string(),
            benchmark_run_dir: PathBuf::from("/var/lib/pbench-agent/run-1"),
            hostname: "ctrl".to_string(),
            full_hostname: "ctrl.example.com".to_string(),
            pbench_run: PathBuf::from("/var/lib/pbench-agent"),
            install_dir: PathBuf::from("/opt/pbench-agent"),
            unit_test_mode: false,
        }
    }

    #[test]
    fn test_start_channel_derivation() {
        assert_eq!(START_CHANNEL, format!("{}-start", MAIN_CHANNEL));
    }

    #[test]
    fn test_paths() {
        let config = test_config();
        assert_eq!(
            config.bus_conf_path(),
            PathBuf::from("/var/lib/pbench-agent/run-1/tm/redis.conf")
        );
        assert_eq!(
            config.bus_pid_path(),
            PathBuf::from("/var/lib/pbench-agent/run-1/tm/redis_17001.pid")
        );
        assert_eq!(config.bus_url(), "redis://localhost:17001/");
        assert_eq!(
            config.sink_binary(),
            PathBuf::from("/opt/pbench-agent/tool-meister/pbench-tool-data-sink")
        );
    }

    #[test]
    fn test_controller_identifier() {
        let mut config = test_config();
        assert_eq!(config.controller(), "ctrl.example.com");

        config.unit_test_mode = true;
        assert_eq!(config.controller(), LOOPBACK_HOST);
    }

    #[test]
    fn test_read_install_dir() {
        let temp = tempfile::tempdir().unwrap();
        let install = temp.path().join("pbench-agent");
        std::fs::create_dir_all(&install).unwrap();

        let conf = temp.path().join("agent.toml");
        std::fs::write(
            &conf,
            format!("[pbench-agent]\ninstall-dir = \"{}\"\n", install.display()),
        )
        .unwrap();

        let resolved = read_install_dir(&conf).unwrap();
        assert_eq!(resolved, install);
    }

    #[test]
    fn test_read_install_dir_missing() {
        let temp = tempfile::tempdir().unwrap();
        let conf = temp.path().join("agent.toml");
        std::fs::write(&conf, "[pbench-agent]\ninstall-dir = \"/does/not/exist\"\n").unwrap();

        let err = read_install_dir(&conf).unwrap_err();
        assert!(matches!(err, ConfigError::InstallDirMissing { .. }));
    }

    #[test]
    fn test_read_install_dir_bad_toml() {
        let temp = tempfile::tempdir().unwrap();
        let conf = temp.path().join("agent.toml");
        std::fs::write(&conf, "not toml at all [").unwrap();

        let err = read_install_dir(&conf).unwrap_err();
        assert!(matches!(err, ConfigError::AgentConfig { .. }));
    }
}
