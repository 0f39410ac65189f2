//! Parameter record seeding
//!
//! Before any agent starts, the bus is seeded with everything an agent needs
//! to configure itself: the bundled tool metadata, one sink parameter record,
//! and one meister parameter record per host. Agents read their record by
//! key at startup, so key naming is part of the wire contract.
//!
//! All values are JSON with deterministic key order: identical inputs
//! produce byte-identical records.

use crate::config::{CoordinatorConfig, MAIN_CHANNEL};
use crate::error::SeedError;
use crate::toolgroup::ToolGroup;

use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Parameter record read by the data sink at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkParams {
    pub benchmark_run_dir: String,
    pub channel: String,
    pub group: String,
}

/// Parameter record read by one tool meister at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeisterParams {
    pub benchmark_run_dir: String,
    pub channel: String,
    /// Host identifier the meister reports back to
    pub controller: String,
    pub group: String,
    /// Host the meister itself runs on
    pub hostname: String,
    /// Tool identifier to options-string, empty for a host with no tools
    pub tools: BTreeMap<String, String>,
}

/// Bus key of the sink parameter record
pub fn sink_key(group: &str) -> String {
    format!("tds-{}", group)
}

/// Bus key of one host's meister parameter record
pub fn meister_key(group: &str, host: &str) -> String {
    format!("tm-{}-{}", group, host)
}

/// Bus key of one tool-metadata section
pub fn metadata_key(section: &str) -> String {
    format!("tm-metadata-{}", section)
}

impl SinkParams {
    pub fn new(config: &CoordinatorConfig) -> Self {
        Self {
            benchmark_run_dir: config.benchmark_run_dir.display().to_string(),
            channel: MAIN_CHANNEL.to_string(),
            group: config.group.clone(),
        }
    }
}

impl MeisterParams {
    pub fn new(config: &CoordinatorConfig, toolgroup: &ToolGroup, host: &str) -> Self {
        Self {
            benchmark_run_dir: config.benchmark_run_dir.display().to_string(),
            channel: MAIN_CHANNEL.to_string(),
            controller: config.controller().to_string(),
            group: config.group.clone(),
            hostname: host.to_string(),
            tools: toolgroup.tools_for(host),
        }
    }
}

/// Load the tool-metadata descriptor bundled with the installation
///
/// The descriptor is a JSON object whose top-level sections are seeded as
/// separate bus keys.
pub fn load_tool_metadata(
    path: &Path,
) -> Result<BTreeMap<String, serde_json::Value>, SeedError> {
    let raw = std::fs::read_to_string(path).map_err(|e| SeedError::MetadataUnreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    serde_json::from_str(&raw).map_err(|e| SeedError::MetadataParse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Seed every parameter record the agents depend on
///
/// Returns the keys written, in write order.
pub async fn seed(
    conn: &mut MultiplexedConnection,
    config: &CoordinatorConfig,
    toolgroup: &ToolGroup,
) -> Result<Vec<String>, SeedError> {
    let mut written = Vec::new();

    let metadata = load_tool_metadata(&config.metadata_file())?;
    for (section, value) in &metadata {
        let key = metadata_key(section);
        write_json(conn, &key, value).await?;
        written.push(key);
    }

    let key = sink_key(&config.group);
    write_json(conn, &key, &SinkParams::new(config)).await?;
    written.push(key);

    for host in toolgroup.hostnames.keys() {
        let key = meister_key(&config.group, host);
        write_json(conn, &key, &MeisterParams::new(config, toolgroup, host)).await?;
        written.push(key);
    }

    tracing::info!("Seeded {} parameter records", written.len());
    Ok(written)
}

async fn write_json<T: Serialize>(
    conn: &mut MultiplexedConnection,
    key: &str,
    value: &T,
) -> Result<(), SeedError> {
    let payload = serde_json::to_string(value).map_err(|e| SeedError::Write {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    conn.set::<_, _, ()>(key, payload)
        .await
        .map_err(|e| SeedError::Write {
            key: key.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn test_config() -> CoordinatorConfig {
        CoordinatorConfig {
            group: "default".to_string(),
            benchmark_run_dir: PathBuf::from("/run/pbench/run-1"),
            hostname: "ctrl".to_string(),
            full_hostname: "ctrl.example.com".to_string(),
            pbench_run: PathBuf::from("/var/lib/pbench-agent"),
            install_dir: PathBuf::from("/opt/pbench-agent"),
            unit_test_mode: false,
        }
    }

    fn test_group(hosts: &[(&str, &[(&str, &str)])]) -> ToolGroup {
        let mut hostnames = BTreeMap::new();
        let mut toolnames: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for (host, tools) in hosts {
            let mut host_tools = BTreeMap::new();
            for (tool, opts) in *tools {
                host_tools.insert(tool.to_string(), opts.to_string());
                toolnames
                    .entry(tool.to_string())
                    .or_default()
                    .insert(host.to_string(), opts.to_string());
            }
            hostnames.insert(host.to_string(), host_tools);
        }
        ToolGroup {
            name: "default".to_string(),
            trigger: None,
            hostnames,
            labels: BTreeMap::new(),
            toolnames,
        }
    }

    #[test]
    fn test_key_naming() {
        assert_eq!(sink_key("default"), "tds-default");
        assert_eq!(
            meister_key("default", "host-a.example.com"),
            "tm-default-host-a.example.com"
        );
        assert_eq!(metadata_key("persistent"), "tm-metadata-persistent");
    }

    #[test]
    fn test_sink_params_json() {
        let params = SinkParams::new(&test_config());
        assert_eq!(
            serde_json::to_string(&params).unwrap(),
            r#"{"benchmark_run_dir":"/run/pbench/run-1","channel":"tool-meister-chan","group":"default"}"#
        );
    }

    #[test]
    fn test_meister_params_json() {
        let group = test_group(&[("ctrl.example.com", &[("mpstat", "-P ALL 1")])]);
        let params = MeisterParams::new(&test_config(), &group, "ctrl.example.com");
        assert_eq!(
            serde_json::to_string(&params).unwrap(),
            concat!(
                r#"{"benchmark_run_dir":"/run/pbench/run-1","channel":"tool-meister-chan","#,
                r#""controller":"ctrl.example.com","group":"default","#,
                r#""hostname":"ctrl.example.com","tools":{"mpstat":"-P ALL 1"}}"#
            )
        );
    }

    #[test]
    fn test_meister_params_unit_test_escape() {
        let mut config = test_config();
        config.unit_test_mode = true;
        let group = test_group(&[("remote-a", &[])]);
        let params = MeisterParams::new(&config, &group, "remote-a");
        assert_eq!(params.controller, "localhost");
        assert!(params.tools.is_empty());
    }

    #[test]
    fn test_params_byte_stable() {
        let group = test_group(&[
            ("host-b", &[("vmstat", ""), ("iostat", "-x 2")]),
            ("host-a", &[("mpstat", "-P ALL 1")]),
        ]);
        let first =
            serde_json::to_string(&MeisterParams::new(&test_config(), &group, "host-b")).unwrap();
        let second =
            serde_json::to_string(&MeisterParams::new(&test_config(), &group, "host-b")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_load_tool_metadata() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("meta.json");
        std::fs::write(
            &path,
            r#"{"persistent": {"node-exporter": {"collector": "prometheus"}}, "transient": {}}"#,
        )
        .unwrap();

        let metadata = load_tool_metadata(&path).unwrap();
        assert_eq!(metadata.len(), 2);
        assert!(metadata.contains_key("persistent"));
        assert!(metadata.contains_key("transient"));
    }

    #[test]
    fn test_load_tool_metadata_missing() {
        let temp = tempfile::tempdir().unwrap();
        let err = load_tool_metadata(&temp.path().join("meta.json")).unwrap_err();
        assert!(matches!(err, SeedError::MetadataUnreadable { .. }));
    }

    #[test]
    fn test_load_tool_metadata_malformed() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("meta.json");
        std::fs::write(&path, "{ this is not json").unwrap();
        let err = load_tool_metadata(&path).unwrap_err();
        assert!(matches!(err, SeedError::MetadataParse { .. }));
    }
}
