//! Vagrant lifecycle adapter.
//!
//! Each registered minion is a vagrant project directory; every call runs
//! `vagrant` inside that directory. Snapshots go through the `sandbox`
//! subcommand of the sahara plugin.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::error::BootstrapError;
use crate::io::config::SaltpadConfig;
use crate::io::process::{command_from_argv, run_command_attached, run_command_captured};

/// Lifecycle actions that run attached to the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmAction {
    Up,
    Halt,
    Destroy,
    Provision,
    Ssh,
}

impl VmAction {
    fn args(self) -> &'static [&'static str] {
        match self {
            Self::Up => &["up"],
            Self::Halt => &["halt"],
            Self::Destroy => &["destroy", "-f"],
            Self::Provision => &["provision"],
            Self::Ssh => &["ssh"],
        }
    }
}

impl fmt::Display for VmAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Up => "up",
            Self::Halt => "halt",
            Self::Destroy => "destroy",
            Self::Provision => "provision",
            Self::Ssh => "ssh",
        };
        f.write_str(name)
    }
}

/// Snapshot (sandbox) mode of a VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotStatus {
    On,
    Off,
    /// The driver cannot snapshot (plugin missing or unsupported provider).
    Unsupported,
}

/// VM lifecycle operations keyed by project name.
pub trait VmDriver {
    fn run_action(&self, project: &str, action: VmAction) -> Result<()>;
    fn status(&self, project: &str) -> Result<String>;
    fn snapshot_status(&self, project: &str) -> Result<SnapshotStatus>;
    fn snapshot_enable(&self, project: &str) -> Result<()>;
    fn snapshot_rollback(&self, project: &str) -> Result<()>;
}

/// Driver that shells out to `vagrant` in each project directory.
#[derive(Debug, Clone)]
pub struct VagrantCli {
    command: Vec<String>,
    projects: BTreeMap<String, PathBuf>,
    status_timeout: Duration,
    output_limit_bytes: usize,
}

impl VagrantCli {
    pub fn new(cfg: &SaltpadConfig, projects: BTreeMap<String, PathBuf>) -> Self {
        Self {
            command: cfg.vagrant.command.clone(),
            projects,
            status_timeout: Duration::from_secs(cfg.vagrant.status_timeout_secs),
            output_limit_bytes: cfg.output_limit_bytes,
        }
    }

    fn project_dir(&self, project: &str) -> Result<&Path> {
        self.projects
            .get(project)
            .map(PathBuf::as_path)
            .ok_or_else(|| {
                BootstrapError::UnknownProject {
                    project: project.to_string(),
                }
                .into()
            })
    }

    fn run_attached(&self, project: &str, args: &[&str]) -> Result<()> {
        let dir = self.project_dir(project)?;
        let cmd = command_from_argv(&self.command, args)?;
        info!(project, ?args, "running vagrant");
        let status = run_command_attached(cmd, Some(dir))?;
        if !status.success() {
            return Err(anyhow!(
                "vagrant {} failed on {project} with status {:?}",
                args.join(" "),
                status.code()
            ));
        }
        Ok(())
    }

    fn run_captured(&self, project: &str, args: &[&str]) -> Result<(bool, String)> {
        let dir = self.project_dir(project)?;
        let mut cmd = command_from_argv(&self.command, args)?;
        cmd.current_dir(dir);
        let output = run_command_captured(cmd, Some(self.status_timeout), self.output_limit_bytes)?;
        if output.timed_out {
            return Err(anyhow!(
                "vagrant {} on {project} did not finish within {:?}",
                args.join(" "),
                self.status_timeout
            ));
        }
        Ok((output.status.success(), output.stdout_text()))
    }
}

impl VmDriver for VagrantCli {
    #[instrument(skip(self))]
    fn run_action(&self, project: &str, action: VmAction) -> Result<()> {
        self.run_attached(project, action.args())
    }

    #[instrument(skip(self))]
    fn status(&self, project: &str) -> Result<String> {
        let (ok, stdout) = self.run_captured(project, &["status", "--machine-readable"])?;
        if !ok {
            return Err(anyhow!("vagrant status failed on {project}"));
        }
        parse_machine_state(&stdout)
            .ok_or_else(|| anyhow!("vagrant status on {project} reported no machine state"))
    }

    #[instrument(skip(self))]
    fn snapshot_status(&self, project: &str) -> Result<SnapshotStatus> {
        let (ok, stdout) = self.run_captured(project, &["sandbox", "status"])?;
        if !ok {
            warn!(project, "vagrant sandbox unavailable");
            return Ok(SnapshotStatus::Unsupported);
        }
        let status = parse_sandbox_status(&stdout);
        debug!(project, ?status, "sandbox status");
        Ok(status)
    }

    fn snapshot_enable(&self, project: &str) -> Result<()> {
        self.run_attached(project, &["sandbox", "on"])
    }

    fn snapshot_rollback(&self, project: &str) -> Result<()> {
        self.run_attached(project, &["sandbox", "rollback"])
    }
}

/// Extract the machine state from `vagrant status --machine-readable`.
///
/// Lines look like `1700000000,default,state,running`. The `default` machine
/// wins; otherwise the first machine listed.
pub fn parse_machine_state(stdout: &str) -> Option<String> {
    let mut first = None;
    for line in stdout.lines() {
        let fields: Vec<&str> = line.splitn(4, ',').collect();
        let [_, machine, kind, value] = fields.as_slice() else {
            continue;
        };
        if *kind != "state" {
            continue;
        }
        if *machine == "default" {
            return Some((*value).to_string());
        }
        if first.is_none() {
            first = Some((*value).to_string());
        }
    }
    first
}

/// Interpret `vagrant sandbox status` output ("[default] Sandbox mode is on").
pub fn parse_sandbox_status(stdout: &str) -> SnapshotStatus {
    let text = stdout.to_lowercase();
    if text.contains("sandbox mode is on") {
        SnapshotStatus::On
    } else if text.contains("sandbox mode is off") {
        SnapshotStatus::Off
    } else {
        SnapshotStatus::Unsupported
    }
}
