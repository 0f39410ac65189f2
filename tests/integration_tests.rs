//! Integration tests for tool-meister-start
//!
//! Note: Full start scenarios require a live bus daemon and reachable hosts.
//! These tests exercise everything that runs before any process is spawned:
//! tool-group parsing, parameter record construction, registration handling.

use std::fs;
use std::path::PathBuf;

use futures_util::stream;
use tempfile::tempdir;

use tool_meister_start::config::{CoordinatorConfig, MAIN_CHANNEL, START_CHANNEL};
use tool_meister_start::params::{meister_key, sink_key, MeisterParams, SinkParams};
use tool_meister_start::rendezvous::{self, AgentRegistration};
use tool_meister_start::toolgroup::ToolGroup;

fn config_for(group: &str, run_dir: &str) -> CoordinatorConfig {
    CoordinatorConfig {
        group: group.to_string(),
        benchmark_run_dir: PathBuf::from(run_dir),
        hostname: "ctrl".to_string(),
        full_hostname: "ctrl.example.com".to_string(),
        pbench_run: PathBuf::from("/var/lib/pbench-agent"),
        install_dir: PathBuf::from("/opt/pbench-agent"),
        unit_test_mode: false,
    }
}

#[test]
fn test_single_host_single_tool_group() {
    // One host carrying one tool, the way a default local run looks.
    let temp = tempdir().unwrap();
    let host_dir = temp.path().join("tools-v1-default/ctrl.example.com");
    fs::create_dir_all(&host_dir).unwrap();
    fs::write(host_dir.join("mpstat"), "-P ALL 1\n").unwrap();

    let group = ToolGroup::load("default", temp.path()).unwrap();
    assert_eq!(group.host_count(), 1);
    assert_eq!(group.tools_for("ctrl.example.com")["mpstat"], "-P ALL 1");

    let config = config_for("default", "/run/pbench/run-1");
    assert_eq!(sink_key(&config.group), "tds-default");
    assert_eq!(
        serde_json::to_string(&SinkParams::new(&config)).unwrap(),
        r#"{"benchmark_run_dir":"/run/pbench/run-1","channel":"tool-meister-chan","group":"default"}"#
    );

    let params = MeisterParams::new(&config, &group, "ctrl.example.com");
    assert_eq!(params.controller, "ctrl.example.com");
    assert_eq!(params.channel, MAIN_CHANNEL);
    assert_eq!(params.tools["mpstat"], "-P ALL 1");
}

#[test]
fn test_two_host_group_with_blank_options() {
    let temp = tempdir().unwrap();
    let root = temp.path().join("tools-v1-default");

    let local = root.join("ctrl.example.com");
    fs::create_dir_all(&local).unwrap();
    fs::write(local.join("mpstat"), "-P ALL 1\n").unwrap();

    let remote = root.join("remote-a");
    fs::create_dir_all(&remote).unwrap();
    fs::write(remote.join("vmstat"), "").unwrap();
    fs::write(remote.join("iostat"), "\n").unwrap();

    let group = ToolGroup::load("default", temp.path()).unwrap();
    assert_eq!(group.host_count(), 2);

    let config = config_for("default", "/run/pbench/run-1");
    let remote_params = MeisterParams::new(&config, &group, "remote-a");
    assert_eq!(remote_params.tools["vmstat"], "");
    assert_eq!(remote_params.tools["iostat"], "");
    assert_eq!(meister_key(&config.group, "remote-a"), "tm-default-remote-a");
}

#[test]
fn test_trigger_propagation() {
    let temp = tempdir().unwrap();
    let root = temp.path().join("tools-v1-trig");
    fs::create_dir_all(&root).unwrap();

    fs::write(root.join("__trigger__"), "start:foo\nstop:bar\n").unwrap();
    let group = ToolGroup::load("trig", temp.path()).unwrap();
    assert_eq!(group.trigger.as_deref(), Some("start:foo\nstop:bar\n"));

    fs::write(root.join("__trigger__"), "").unwrap();
    let group = ToolGroup::load("trig", temp.path()).unwrap();
    assert_eq!(group.trigger, None);
}

#[test]
fn test_zero_tool_host_still_gets_params() {
    let temp = tempdir().unwrap();
    fs::create_dir_all(temp.path().join("tools-v1-default/bare-host")).unwrap();

    let group = ToolGroup::load("default", temp.path()).unwrap();
    let config = config_for("default", "/run/pbench/run-1");
    let params = MeisterParams::new(&config, &group, "bare-host");
    assert!(params.tools.is_empty());
    assert_eq!(
        serde_json::to_string(&params).unwrap(),
        concat!(
            r#"{"benchmark_run_dir":"/run/pbench/run-1","channel":"tool-meister-chan","#,
            r#""controller":"ctrl.example.com","group":"default","#,
            r#""hostname":"bare-host","tools":{}}"#
        )
    );
}

#[test]
fn test_one_meister_param_per_host() {
    let temp = tempdir().unwrap();
    let root = temp.path().join("tools-v1-default");
    for host in ["h1", "h2", "h3"] {
        let host_dir = root.join(host);
        fs::create_dir_all(&host_dir).unwrap();
        fs::write(host_dir.join("sar"), "-A\n").unwrap();
    }

    let group = ToolGroup::load("default", temp.path()).unwrap();
    let config = config_for("default", "/run/pbench/run-1");

    let keys: Vec<String> = group
        .hostnames
        .keys()
        .map(|host| meister_key(&config.group, host))
        .collect();
    assert_eq!(keys, vec!["tm-default-h1", "tm-default-h2", "tm-default-h3"]);
}

#[tokio::test]
async fn test_rendezvous_tolerates_garbage_before_agents() {
    // A stray non-UTF-8 frame followed by the real registrations must not
    // abort the start.
    let payloads = stream::iter(vec![
        vec![0xc3, 0x28],
        br#"{"kind":"sink","hostname":"ctrl.example.com","pid":2001}"#.to_vec(),
        br#"{"kind":"meister","hostname":"ctrl.example.com","pid":2002}"#.to_vec(),
        br#"{"kind":"meister","hostname":"remote-a","pid":31}"#.to_vec(),
    ]);

    let registry = rendezvous::await_agents(payloads, 2, |_, _| {}).await.unwrap();
    assert_eq!(registry.sink.pid(), 2001);
    assert_eq!(registry.meister.len(), 2);
    assert_eq!(registry.meister[1].hostname(), "remote-a");
}

#[tokio::test]
async fn test_rendezvous_registry_roundtrip() {
    let payloads = stream::iter(vec![
        br#"{"kind":"meister","hostname":"remote-a","pid":7}"#.to_vec(),
        br#"{"kind":"sink","hostname":"ctrl.example.com","pid":5}"#.to_vec(),
    ]);

    let registry = rendezvous::await_agents(payloads, 1, |_, _| {}).await.unwrap();
    let json = serde_json::to_string(&registry).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["sink"]["kind"], "sink");
    assert_eq!(value["sink"]["pid"], 5);
    assert_eq!(value["meister"][0]["hostname"], "remote-a");
}

#[test]
fn test_registration_kinds() {
    let sink = rendezvous::decode(br#"{"kind":"sink","hostname":"h","pid":1}"#).unwrap();
    assert!(matches!(sink, AgentRegistration::Sink { .. }));

    let meister = rendezvous::decode(br#"{"kind":"meister","hostname":"h","pid":1}"#).unwrap();
    assert!(matches!(meister, AgentRegistration::Meister { .. }));

    assert!(rendezvous::decode(br#"{"kind":"shipper","hostname":"h","pid":1}"#).is_err());
}

#[test]
fn test_channel_names() {
    assert_eq!(MAIN_CHANNEL, "tool-meister-chan");
    assert_eq!(START_CHANNEL, "tool-meister-chan-start");
}
