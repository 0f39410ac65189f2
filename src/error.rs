//! Error types for tool-meister-start
//!
//! Comprehensive error hierarchy covering:
//! - Environment and agent-configuration errors
//! - Tool-group directory parsing errors
//! - Coordination bus errors
//! - Parameter seeding and agent spawn errors

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for the startup coordinator
#[derive(Error, Debug)]
pub enum StartError {
    /// Environment/configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Tool-group parsing errors
    #[error("Tool group error: {0}")]
    ToolGroup(#[from] ToolGroupError),

    /// Coordination bus errors
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// Parameter seeding errors
    #[error("Seed error: {0}")]
    Seed(#[from] SeedError),

    /// Agent spawn errors
    #[error("Spawn error: {0}")]
    Spawn(#[from] SpawnError),

    /// Rendezvous errors
    #[error("Rendezvous error: {0}")]
    Rendezvous(#[from] RendezvousError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Environment and agent-configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required environment variable is absent or empty
    #[error("Required environment variable '{name}' is not set")]
    MissingEnv { name: &'static str },

    /// The agent configuration file could not be read or parsed
    #[error("Failed to load agent configuration '{path}': {reason}")]
    AgentConfig { path: PathBuf, reason: String },

    /// The configured installation directory does not exist
    #[error("Installation directory '{path}' does not exist")]
    InstallDirMissing { path: PathBuf },
}

/// Tool-group directory parsing errors
#[derive(Error, Debug)]
pub enum ToolGroupError {
    /// The tool-group directory is missing, not a directory, or unresolvable
    #[error("Bad tool group '{group}' at '{path}': {reason}")]
    BadGroup {
        group: String,
        path: PathBuf,
        reason: String,
    },

    /// A file inside the tool-group tree could not be read
    #[error("Failed to read '{path}': {reason}")]
    Read { path: PathBuf, reason: String },
}

/// Coordination bus errors
#[derive(Error, Debug)]
pub enum BusError {
    /// The bus configuration file could not be written
    #[error("Failed to write bus configuration '{path}': {reason}")]
    Config { path: PathBuf, reason: String },

    /// The bus daemon could not be launched at all
    #[error("Failed to launch '{command}': {reason}")]
    LaunchFailed { command: String, reason: String },

    /// The bus daemon launcher exited nonzero
    #[error("Bus daemon launcher exited with {status}")]
    DaemonFailed { status: std::process::ExitStatus },

    /// The bus never accepted a verified subscription within the deadline
    #[error("Bus at '{url}' not ready within {waited:?}")]
    Unreachable { url: String, waited: Duration },

    /// The subscription round trip did not check out
    #[error("Subscription handshake on '{channel}' failed: {detail}")]
    SubscribeHandshake { channel: String, detail: String },

    /// Bus client error
    #[error("Bus client error: {0}")]
    Redis(String),
}

impl From<redis::RedisError> for BusError {
    fn from(err: redis::RedisError) -> Self {
        BusError::Redis(err.to_string())
    }
}

/// Parameter seeding errors
#[derive(Error, Debug)]
pub enum SeedError {
    /// The bundled tool-metadata descriptor could not be read
    #[error("Failed to read tool metadata '{path}': {reason}")]
    MetadataUnreadable { path: PathBuf, reason: String },

    /// The tool-metadata descriptor is not valid JSON
    #[error("Failed to parse tool metadata '{path}': {reason}")]
    MetadataParse { path: PathBuf, reason: String },

    /// A parameter record could not be written to the bus
    #[error("Failed to write bus key '{key}': {reason}")]
    Write { key: String, reason: String },
}

/// Agent spawn errors
#[derive(Error, Debug)]
pub enum SpawnError {
    /// The data sink failed to daemonize
    #[error("Data sink failed to start: {reason}")]
    Sink { reason: String },

    /// One or more meister launches failed
    #[error("{failed} of {attempted} meister launches failed")]
    AgentFailures { failed: usize, attempted: usize },

    /// No meister was started at all (empty host list)
    #[error("No meisters started; treating the run as an abort")]
    NoAgentsStarted,
}

/// Rendezvous errors
#[derive(Error, Debug)]
pub enum RendezvousError {
    /// The start channel closed before the expected membership was reached
    #[error("Start channel closed with {seen} of {expected} registrations")]
    ChannelClosed { seen: usize, expected: usize },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, StartError>;

/// Result type for bus operations
pub type BusResult<T> = std::result::Result<T, BusError>;
