//! Tool-group directory loader
//!
//! Normalizes a `tools-v1-<group>` directory tree into an in-memory model:
//! one subdirectory per registered host, one file per tool holding its
//! command-line options, plus the optional `__trigger__` and `__label__`
//! marker files.

use crate::config::TOOL_GROUP_PREFIX;
use crate::error::ToolGroupError;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Optional group-level trigger file
pub const TRIGGER_FILE: &str = "__trigger__";

/// Optional per-host label file
pub const LABEL_FILE: &str = "__label__";

/// Suffix marking a tool as registered but not to be installed
pub const NOINSTALL_SUFFIX: &str = "__noinstall__";

/// Normalized, immutable view of one tool-group directory tree
///
/// Hosts and tools are kept in sorted maps so that iteration order, and
/// therefore everything derived from it, is deterministic regardless of
/// file-system enumeration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolGroup {
    /// Group name the tree was resolved from
    pub name: String,
    /// Optional trigger text, stored verbatim
    pub trigger: Option<String>,
    /// Host identifier to tools registered on that host (may be empty)
    pub hostnames: BTreeMap<String, BTreeMap<String, String>>,
    /// Host identifier to label, only for hosts that carry one
    pub labels: BTreeMap<String, String>,
    /// Tool identifier to the hosts it runs on, with per-host options
    pub toolnames: BTreeMap<String, BTreeMap<String, String>>,
}

impl ToolGroup {
    /// Parse the tool-group directory for `group` under `run_root`
    pub fn load(group: &str, run_root: &Path) -> Result<Self, ToolGroupError> {
        let dir = run_root.join(format!("{}-{}", TOOL_GROUP_PREFIX, group));
        let dir = fs::canonicalize(&dir).map_err(|e| ToolGroupError::BadGroup {
            group: group.to_string(),
            path: dir.clone(),
            reason: e.to_string(),
        })?;
        if !dir.is_dir() {
            return Err(ToolGroupError::BadGroup {
                group: group.to_string(),
                path: dir,
                reason: "not a directory".to_string(),
            });
        }

        let mut toolgroup = ToolGroup {
            name: group.to_string(),
            trigger: None,
            hostnames: BTreeMap::new(),
            labels: BTreeMap::new(),
            toolnames: BTreeMap::new(),
        };

        for entry in read_dir(&dir)? {
            let path = entry.path();
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::warn!("Skipping non-UTF-8 entry in {}", dir.display());
                continue;
            };

            if name == TRIGGER_FILE {
                let raw = read_file(&path)?;
                if !raw.trim_end_matches('\n').is_empty() {
                    toolgroup.trigger = Some(raw);
                }
            } else if path.is_dir() {
                toolgroup.load_host(&name, &path)?;
            } else {
                tracing::warn!(
                    "Ignoring unexpected file '{}' in tool group '{}'",
                    path.display(),
                    group
                );
            }
        }

        Ok(toolgroup)
    }

    /// Parse one host subdirectory
    fn load_host(&mut self, host: &str, host_dir: &Path) -> Result<(), ToolGroupError> {
        // A host with no tool files is still a registered host.
        self.hostnames.entry(host.to_string()).or_default();

        for entry in read_dir(host_dir)? {
            let path = entry.path();
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::warn!("Skipping non-UTF-8 entry in {}", host_dir.display());
                continue;
            };

            if name.ends_with(NOINSTALL_SUFFIX) {
                continue;
            }
            if !path.is_file() {
                tracing::warn!(
                    "Ignoring non-file entry '{}' under host '{}'",
                    path.display(),
                    host
                );
                continue;
            }

            if name == LABEL_FILE {
                let label = read_file(&path)?.trim().to_string();
                if !label.is_empty() {
                    self.labels.insert(host.to_string(), label);
                }
            } else {
                let options = join_options(&read_file(&path)?);
                self.toolnames
                    .entry(name.clone())
                    .or_default()
                    .insert(host.to_string(), options.clone());
                self.hostnames
                    .entry(host.to_string())
                    .or_default()
                    .insert(name, options);
            }
        }

        Ok(())
    }

    /// Number of hosts registered in the group
    pub fn host_count(&self) -> usize {
        self.hostnames.len()
    }

    /// Number of distinct tools registered in the group
    pub fn tool_count(&self) -> usize {
        self.toolnames.len()
    }

    /// Tools registered for one host, empty when the host carries none
    pub fn tools_for(&self, host: &str) -> BTreeMap<String, String> {
        self.hostnames.get(host).cloned().unwrap_or_default()
    }
}

fn read_dir(dir: &Path) -> Result<Vec<fs::DirEntry>, ToolGroupError> {
    let entries = fs::read_dir(dir).map_err(|e| ToolGroupError::Read {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })?;
    entries
        .map(|entry| {
            entry.map_err(|e| ToolGroupError::Read {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            })
        })
        .collect()
}

fn read_file(path: &Path) -> Result<String, ToolGroupError> {
    fs::read_to_string(path).map_err(|e| ToolGroupError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Collapse a tool options file into a single options-string
///
/// Lines are trimmed, blank lines dropped, and the remainder joined with
/// single spaces in file order.
fn join_options(content: &str) -> String {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
