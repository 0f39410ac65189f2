//! Tool-group module for parsing on-disk tool registrations
//!
//! A tool group is a directory tree under the agent run root naming which
//! monitoring tools should run on which hosts, with what options.

mod loader;

pub use loader::{ToolGroup, LABEL_FILE, NOINSTALL_SUFFIX, TRIGGER_FILE};
