//! Bus daemon launcher and readiness poll
//!
//! Start is only considered successful once a client subscription to the
//! start channel has been verified end to end, not merely once the daemon
//! process exists.

use crate::config::{
    CoordinatorConfig, BUS_DB_FILENAME, BUS_MAX_WAIT, BUS_POLL_INTERVAL, BUS_PORT, LOOPBACK_HOST,
    START_CHANNEL,
};
use crate::error::{BusError, BusResult};

use futures_util::StreamExt;
use redis::aio::PubSub;
use redis::Client;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;

/// Executable name of the bus daemon, resolved from PATH
const BUS_EXECUTABLE: &str = "redis-server";

/// Handle to a running, verified bus
///
/// Owned exclusively by the coordinator for the duration of start.
pub struct BusHandle {
    /// Host identifier the coordinator connects through
    pub host: String,
    /// Listening port
    pub port: u16,
    /// Path of the daemon's process-id file
    pub pid_file: PathBuf,
    /// Connected client
    pub client: Client,
}

/// The verified start-channel subscription carried out of the readiness poll
///
/// Kept open so the rendezvous watcher observes every registration published
/// from the moment the bus came up.
pub struct StartSubscription {
    pubsub: PubSub,
}

impl StartSubscription {
    /// Raw message payloads in arrival order
    pub fn payloads(&mut self) -> impl futures_util::Stream<Item = Vec<u8>> + '_ {
        self.pubsub
            .on_message()
            .map(|msg| msg.get_payload_bytes().to_vec())
    }
}

/// Launcher for the coordination bus daemon
pub struct BusLauncher {
    conf_path: PathBuf,
    pid_path: PathBuf,
    tm_dir: PathBuf,
    full_hostname: String,
    url: String,
}

impl BusLauncher {
    /// Create a launcher from the controller configuration
    pub fn new(config: &CoordinatorConfig) -> Self {
        Self {
            conf_path: config.bus_conf_path(),
            pid_path: config.bus_pid_path(),
            tm_dir: config.tm_dir(),
            full_hostname: config.full_hostname.clone(),
            url: config.bus_url(),
        }
    }

    /// Render the daemon configuration
    ///
    /// Binds both the loopback identifier and the controller's
    /// fully-qualified identifier so local children and remote meisters
    /// reach the same instance.
    pub fn render_config(&self) -> String {
        format!(
            "bind {loopback} {fqdn}\n\
             port {port}\n\
             daemonize yes\n\
             dir {dir}\n\
             dbfilename {dbfile}\n\
             pidfile {pidfile}\n\
             logfile {logfile}\n\
             save \"\"\n",
            loopback = LOOPBACK_HOST,
            fqdn = self.full_hostname,
            port = BUS_PORT,
            dir = self.tm_dir.display(),
            dbfile = BUS_DB_FILENAME,
            pidfile = self.pid_path.display(),
            logfile = self.tm_dir.join("redis.log").display(),
        )
    }

    /// Write the daemon configuration file
    pub fn write_config(&self) -> BusResult<()> {
        std::fs::write(&self.conf_path, self.render_config()).map_err(|e| BusError::Config {
            path: self.conf_path.clone(),
            reason: e.to_string(),
        })
    }

    /// Spawn the bus daemon
    ///
    /// The daemon self-daemonizes, so the spawned launcher process runs to
    /// completion here; a nonzero status means no bus came up.
    pub async fn spawn(&self) -> BusResult<()> {
        tracing::debug!("Spawning {} with {}", BUS_EXECUTABLE, self.conf_path.display());

        let status = Command::new(BUS_EXECUTABLE)
            .arg(&self.conf_path)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| BusError::LaunchFailed {
                command: BUS_EXECUTABLE.to_string(),
                reason: e.to_string(),
            })?;

        if !status.success() {
            return Err(BusError::DaemonFailed { status });
        }
        Ok(())
    }

    /// Poll until a start-channel subscription round-trips, or time out
    ///
    /// Connection-level failures are retried on a fixed interval; a
    /// subscription that connects but fails validation is reported
    /// immediately as a handshake error.
    pub async fn wait_until_ready(&self) -> BusResult<(BusHandle, StartSubscription)> {
        let client = Client::open(self.url.as_str())?;
        let deadline = Instant::now() + BUS_MAX_WAIT;

        loop {
            match self.try_subscribe(&client).await {
                Ok(pubsub) => {
                    tracing::info!("Bus ready at {}", self.url);
                    let handle = BusHandle {
                        host: LOOPBACK_HOST.to_string(),
                        port: BUS_PORT,
                        pid_file: self.pid_path.clone(),
                        client,
                    };
                    return Ok((handle, StartSubscription { pubsub }));
                }
                Err(BusError::Redis(reason)) => {
                    if Instant::now() >= deadline {
                        tracing::error!("Bus never became ready: {}", reason);
                        return Err(BusError::Unreachable {
                            url: self.url.clone(),
                            waited: BUS_MAX_WAIT,
                        });
                    }
                    tokio::time::sleep(BUS_POLL_INTERVAL).await;
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// One subscription attempt, validated end to end
    async fn try_subscribe(&self, client: &Client) -> BusResult<PubSub> {
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(START_CHANNEL).await?;

        // Confirm the server sees exactly our one subscriber on the channel
        // it echoed back.
        let mut conn = client.get_multiplexed_async_connection().await?;
        let counts: Vec<(String, i64)> = redis::cmd("PUBSUB")
            .arg("NUMSUB")
            .arg(START_CHANNEL)
            .query_async(&mut conn)
            .await?;

        match counts.first() {
            Some((channel, 1)) if channel == START_CHANNEL => Ok(pubsub),
            Some((channel, count)) => Err(BusError::SubscribeHandshake {
                channel: START_CHANNEL.to_string(),
                detail: format!("server reported channel '{}' with {} subscribers", channel, count),
            }),
            None => Err(BusError::SubscribeHandshake {
                channel: START_CHANNEL.to_string(),
                detail: "server reported no subscription".to_string(),
            }),
        }
    }
}
