//! Registered templates and minions (`~/.saltpad.json`).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::BootstrapError;

/// Persisted local state.
///
/// Loaded once at startup and handed to the command that needs it; only
/// `register_dir` and `create_vm` write it back.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LocalState {
    /// Vagrantfile templates by name (`default` for `register_dir`).
    pub vagrantfiles: BTreeMap<String, PathBuf>,
    /// Minion configuration files by file name.
    pub minion_conf: BTreeMap<String, PathBuf>,
    /// Vagrant project directory by project (minion) name.
    pub minions: BTreeMap<String, PathBuf>,
}

impl LocalState {
    pub fn minion_path(&self, project: &str) -> Result<&Path, BootstrapError> {
        self.minions
            .get(project)
            .map(PathBuf::as_path)
            .ok_or_else(|| BootstrapError::UnknownProject {
                project: project.to_string(),
            })
    }
}

/// Default state location: `~/.saltpad.json`.
pub fn default_state_path() -> Result<PathBuf> {
    let dirs = BaseDirs::new().ok_or_else(|| anyhow!("cannot determine the home directory"))?;
    Ok(dirs.home_dir().join(".saltpad.json"))
}

/// Load local state; a missing file is an empty state.
pub fn load_state(path: &Path) -> Result<LocalState> {
    if !path.exists() {
        debug!(path = %path.display(), "no state file, starting empty");
        return Ok(LocalState::default());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read state {}", path.display()))?;
    let state: LocalState = serde_json::from_str(&contents)
        .with_context(|| format!("parse state {}", path.display()))?;
    debug!(
        minions = state.minions.len(),
        vagrantfiles = state.vagrantfiles.len(),
        minion_conf = state.minion_conf.len(),
        "state loaded"
    );
    Ok(state)
}

/// Atomically write local state to disk (temp file + rename).
pub fn write_state(path: &Path, state: &LocalState) -> Result<()> {
    debug!(path = %path.display(), minions = state.minions.len(), "writing state");
    let mut buf = serde_json::to_string_pretty(state)?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("state path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp state {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace state {}", path.display()))?;
    Ok(())
}
