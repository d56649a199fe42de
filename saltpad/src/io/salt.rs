//! Salt master access.
//!
//! The [`SaltClient`] trait decouples deployment orchestration from the way
//! the master is reached (currently the `salt` CLI with JSON output). Tests use
//! scripted clients that return canned minion returns without spawning
//! processes.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::io::config::SaltpadConfig;
use crate::io::process::{command_from_argv, run_command_captured};

/// Extra time granted to the `salt` process beyond the timeout salt itself enforces.
const PROCESS_GRACE: Duration = Duration::from_secs(30);

/// Which state run to execute on a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateTarget {
    /// `state.highstate`
    Highstate,
    /// `state.sls <name>`
    Sls(String),
}

impl fmt::Display for StateTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Highstate => write!(f, "state.highstate"),
            Self::Sls(name) => write!(f, "state.sls {name}"),
        }
    }
}

/// Abstraction over the salt execution layer.
pub trait SaltClient {
    /// `test.ping` against a target; `true` for minions that answered.
    fn ping(&self, target: &str) -> Result<BTreeMap<String, bool>>;

    /// Roles of every minion matching the target.
    fn roles(&self, target: &str) -> Result<BTreeMap<String, Vec<String>>>;

    /// Run a state on a target and return the raw return of every minion.
    fn run_state(
        &self,
        target: &str,
        state: &StateTarget,
        timeout_secs: u64,
    ) -> Result<BTreeMap<String, Value>>;
}

/// Client that shells out to `salt --out=json --static`.
#[derive(Debug, Clone)]
pub struct SaltCli {
    command: Vec<String>,
    ping_timeout_secs: u64,
    roles_grain: String,
    output_limit_bytes: usize,
}

impl SaltCli {
    pub fn from_config(cfg: &SaltpadConfig) -> Self {
        Self {
            command: cfg.salt.command.clone(),
            ping_timeout_secs: cfg.ping_timeout_secs,
            roles_grain: cfg.roles_grain.clone(),
            output_limit_bytes: cfg.output_limit_bytes,
        }
    }

    /// Run one salt function. `deadline` bounds the local process; `None` waits forever.
    #[instrument(skip(self, args, deadline))]
    fn call(
        &self,
        target: &str,
        function: &str,
        args: &[&str],
        timeout_secs: u64,
        deadline: Option<Duration>,
    ) -> Result<Map<String, Value>> {
        let timeout_arg = timeout_secs.to_string();
        let mut argv = vec!["--out=json", "--static", "-t", timeout_arg.as_str(), target, function];
        argv.extend_from_slice(args);
        let cmd = command_from_argv(&self.command, &argv)?;

        info!("calling salt");
        let output = run_command_captured(cmd, deadline, self.output_limit_bytes)
            .with_context(|| format!("run salt {target} {function}"))?;
        if output.timed_out {
            return Err(anyhow!(
                "salt {target} {function} did not finish within {:?}",
                deadline.unwrap_or_default()
            ));
        }
        if !output.status.success() {
            // salt exits non-zero when a state fails; the JSON still carries the details.
            warn!(exit_code = ?output.status.code(), "salt exited with failure status");
        }

        let stdout = output.stdout_text();
        parse_salt_output(&stdout).map_err(|err| {
            anyhow!(
                "{err}{}\nsalt stderr:\n{}",
                output.stdout_truncated_notice("salt"),
                output.stderr_text().trim_end()
            )
        })
    }

    fn short_deadline(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs).saturating_add(PROCESS_GRACE)
    }
}

impl SaltClient for SaltCli {
    fn ping(&self, target: &str) -> Result<BTreeMap<String, bool>> {
        let returns = self.call(
            target,
            "test.ping",
            &[],
            self.ping_timeout_secs,
            Some(self.short_deadline()),
        )?;
        Ok(liveness(&returns))
    }

    fn roles(&self, target: &str) -> Result<BTreeMap<String, Vec<String>>> {
        let returns = self.call(
            target,
            "grains.get",
            &[self.roles_grain.as_str()],
            self.ping_timeout_secs,
            Some(self.short_deadline()),
        )?;
        Ok(roles_by_minion(&returns))
    }

    fn run_state(
        &self,
        target: &str,
        state: &StateTarget,
        timeout_secs: u64,
    ) -> Result<BTreeMap<String, Value>> {
        let returns = match state {
            StateTarget::Highstate => {
                self.call(target, "state.highstate", &[], timeout_secs, None)?
            }
            StateTarget::Sls(name) => {
                self.call(target, "state.sls", &[name.as_str()], timeout_secs, None)?
            }
        };
        debug!(minions = returns.len(), %state, "state run returned");
        Ok(returns.into_iter().collect())
    }
}

/// Decode `salt --out=json --static` output: one JSON object keyed by minion id.
///
/// Empty output (no minion matched) decodes to an empty map.
pub fn parse_salt_output(stdout: &str) -> Result<Map<String, Value>> {
    if stdout.trim().is_empty() {
        return Ok(Map::new());
    }
    let value: Value = serde_json::from_str(stdout).context("decode salt json output")?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(anyhow!(
            "expected a JSON object keyed by minion id, got: {other}"
        )),
    }
}

/// Anything other than a literal `true` (e.g. "Minion did not return") is down.
pub fn liveness(returns: &Map<String, Value>) -> BTreeMap<String, bool> {
    returns
        .iter()
        .map(|(minion, value)| (minion.clone(), value.as_bool() == Some(true)))
        .collect()
}

pub fn roles_by_minion(returns: &Map<String, Value>) -> BTreeMap<String, Vec<String>> {
    returns
        .iter()
        .map(|(minion, value)| {
            let roles = match value {
                Value::Array(items) => items
                    .iter()
                    .map(|item| match item {
                        Value::String(role) => role.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
                _ => Vec::new(),
            };
            (minion.clone(), roles)
        })
        .collect()
}
