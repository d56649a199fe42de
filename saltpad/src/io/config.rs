//! saltpad settings stored in `<config dir>/saltpad/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::selection::DownNodePolicy;

/// Upper bound for the ping and `vagrant status` timeouts (one day).
pub const MAX_SHORT_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// saltpad settings (TOML).
///
/// Every field is optional; a missing file yields the defaults, which match a
/// stock salt master with the vagrant sandbox plugin installed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SaltpadConfig {
    /// Whether minions that do not answer the ping are skipped or still deployed.
    pub down_nodes: DownNodePolicy,

    /// Timeout handed to salt for `state.highstate` and the post-deploy states.
    pub apply_timeout_secs: u64,

    /// Timeout handed to salt for `test.ping` and grain lookups.
    pub ping_timeout_secs: u64,

    /// State run after a minion deployed successfully.
    pub orchestration_state: String,

    /// State run as the health check, after the orchestration state.
    pub healthcheck_state: String,

    /// Grain listing a minion's roles.
    pub roles_grain: String,

    /// Truncate captured salt/vagrant output beyond this many bytes.
    pub output_limit_bytes: usize,

    pub salt: SaltConfig,
    pub vagrant: VagrantConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SaltConfig {
    /// Command used to reach the master (e.g. `["sudo", "salt"]`).
    pub command: Vec<String>,
    pub key_command: Vec<String>,
    /// Prefix for commands that touch the master's key directory.
    pub privileged: Vec<String>,
    pub master_pki_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VagrantConfig {
    pub command: Vec<String>,
    /// Upper bound for `vagrant status` and `vagrant sandbox status`.
    pub status_timeout_secs: u64,
}

impl Default for SaltConfig {
    fn default() -> Self {
        Self {
            command: vec!["salt".to_string()],
            key_command: vec!["salt-key".to_string()],
            privileged: vec!["sudo".to_string()],
            master_pki_dir: PathBuf::from("/etc/salt/pki/master/minions"),
        }
    }
}

impl Default for VagrantConfig {
    fn default() -> Self {
        Self {
            command: vec!["vagrant".to_string()],
            status_timeout_secs: 120,
        }
    }
}

impl Default for SaltpadConfig {
    fn default() -> Self {
        Self {
            down_nodes: DownNodePolicy::Skip,
            apply_timeout_secs: 9_999_999_999,
            ping_timeout_secs: 10,
            orchestration_state: "orchestration".to_string(),
            healthcheck_state: "healthchecks".to_string(),
            roles_grain: "roles".to_string(),
            output_limit_bytes: 64 * 1024 * 1024,
            salt: SaltConfig::default(),
            vagrant: VagrantConfig::default(),
        }
    }
}

impl SaltpadConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, secs) in [
            ("ping_timeout_secs", self.ping_timeout_secs),
            ("vagrant.status_timeout_secs", self.vagrant.status_timeout_secs),
        ] {
            if secs == 0 || secs > MAX_SHORT_TIMEOUT_SECS {
                return Err(anyhow!(
                    "{name} must be between 1 and {MAX_SHORT_TIMEOUT_SECS}, got {secs}"
                ));
            }
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        for (name, state) in [
            ("orchestration_state", &self.orchestration_state),
            ("healthcheck_state", &self.healthcheck_state),
            ("roles_grain", &self.roles_grain),
        ] {
            if state.trim().is_empty() {
                return Err(anyhow!("{name} must not be empty"));
            }
        }
        for (name, command) in [
            ("salt.command", &self.salt.command),
            ("salt.key_command", &self.salt.key_command),
            ("vagrant.command", &self.vagrant.command),
        ] {
            if command.is_empty() || command[0].trim().is_empty() {
                return Err(anyhow!("{name} must be a non-empty array"));
            }
        }
        Ok(())
    }
}

/// Default settings location (`~/.config/saltpad/config.toml` on Linux).
pub fn default_config_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", "saltpad")
        .ok_or_else(|| anyhow!("cannot determine the user configuration directory"))?;
    Ok(dirs.config_dir().join("config.toml"))
}

/// Load settings from a TOML file.
///
/// If the file is missing, returns `SaltpadConfig::default()`.
pub fn load_config(path: &Path) -> Result<SaltpadConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "no settings file, using defaults");
        let cfg = SaltpadConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SaltpadConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid settings in {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write settings to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &SaltpadConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
