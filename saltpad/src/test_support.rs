//! Test-only collaborators and fixtures.
//!
//! Scripted salt and vagrant drivers record every call so tests can assert on
//! exactly what a command would have run.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Result, anyhow};
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::io::salt::{SaltClient, StateTarget};
use crate::io::templates::{MINION_CONF_DIR, VAGRANTFILE_TEMPLATE};
use crate::io::vagrant::{SnapshotStatus, VmAction, VmDriver};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaltCall {
    Ping(String),
    Roles(String),
    State(String, StateTarget),
}

/// In-memory salt master.
#[derive(Debug, Default)]
pub struct ScriptedSaltClient {
    pings: BTreeMap<String, bool>,
    roles: BTreeMap<String, Vec<String>>,
    highstates: BTreeMap<String, Value>,
    sls: BTreeMap<(String, String), Value>,
    calls: RefCell<Vec<SaltCall>>,
}

impl ScriptedSaltClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(mut self, node: &str, alive: bool) -> Self {
        self.pings.insert(node.to_string(), alive);
        self
    }

    pub fn with_roles(mut self, node: &str, roles: &[&str]) -> Self {
        self.roles.insert(
            node.to_string(),
            roles.iter().map(|role| role.to_string()).collect(),
        );
        self
    }

    /// Return of `state.highstate` for `node`.
    pub fn with_state_result(mut self, node: &str, result: Value) -> Self {
        self.highstates.insert(node.to_string(), result);
        self
    }

    /// Return of `state.sls <name>` for `node`; unscripted runs return `{}`.
    pub fn with_sls_result(mut self, node: &str, name: &str, result: Value) -> Self {
        self.sls.insert((node.to_string(), name.to_string()), result);
        self
    }

    pub fn calls(&self) -> Vec<SaltCall> {
        self.calls.borrow().clone()
    }

    pub fn state_calls(&self) -> Vec<(String, StateTarget)> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                SaltCall::State(target, state) => Some((target.clone(), state.clone())),
                _ => None,
            })
            .collect()
    }

    fn matches(&self, target: &str) -> Vec<&String> {
        match target.strip_suffix('*') {
            Some(prefix) => self
                .pings
                .keys()
                .filter(|node| node.starts_with(prefix))
                .collect(),
            None => self.pings.keys().filter(|node| *node == target).collect(),
        }
    }
}

impl SaltClient for ScriptedSaltClient {
    fn ping(&self, target: &str) -> Result<BTreeMap<String, bool>> {
        self.calls
            .borrow_mut()
            .push(SaltCall::Ping(target.to_string()));
        Ok(self
            .matches(target)
            .into_iter()
            .map(|node| (node.clone(), self.pings[node]))
            .collect())
    }

    fn roles(&self, target: &str) -> Result<BTreeMap<String, Vec<String>>> {
        self.calls
            .borrow_mut()
            .push(SaltCall::Roles(target.to_string()));
        Ok(self
            .matches(target)
            .into_iter()
            .filter_map(|node| Some((node.clone(), self.roles.get(node)?.clone())))
            .collect())
    }

    fn run_state(
        &self,
        target: &str,
        state: &StateTarget,
        _timeout_secs: u64,
    ) -> Result<BTreeMap<String, Value>> {
        self.calls
            .borrow_mut()
            .push(SaltCall::State(target.to_string(), state.clone()));
        let mut returns = BTreeMap::new();
        for node in self.matches(target) {
            let value = match state {
                StateTarget::Highstate => self.highstates.get(node).cloned(),
                StateTarget::Sls(name) => Some(
                    self.sls
                        .get(&(node.clone(), name.clone()))
                        .cloned()
                        .unwrap_or_else(|| json!({})),
                ),
            };
            if let Some(value) = value {
                returns.insert(node.clone(), value);
            }
        }
        Ok(returns)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmCall {
    Action(String, VmAction),
    Status(String),
    SnapshotStatus(String),
    SnapshotEnable(String),
    SnapshotRollback(String),
}

/// In-memory VM driver; snapshots default to off.
#[derive(Debug, Default)]
pub struct ScriptedVmDriver {
    snapshots: BTreeMap<String, SnapshotStatus>,
    statuses: BTreeMap<String, String>,
    failing: Option<VmAction>,
    calls: RefCell<Vec<VmCall>>,
}

impl ScriptedVmDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(mut self, project: &str, status: SnapshotStatus) -> Self {
        self.snapshots.insert(project.to_string(), status);
        self
    }

    pub fn with_status(mut self, project: &str, status: &str) -> Self {
        self.statuses
            .insert(project.to_string(), status.to_string());
        self
    }

    /// Make every `action` call fail.
    pub fn failing_on(mut self, action: VmAction) -> Self {
        self.failing = Some(action);
        self
    }

    pub fn calls(&self) -> Vec<VmCall> {
        self.calls.borrow().clone()
    }
}

impl VmDriver for ScriptedVmDriver {
    fn run_action(&self, project: &str, action: VmAction) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(VmCall::Action(project.to_string(), action));
        if self.failing == Some(action) {
            return Err(anyhow!("vagrant {action} failed on {project}"));
        }
        Ok(())
    }

    fn status(&self, project: &str) -> Result<String> {
        self.calls
            .borrow_mut()
            .push(VmCall::Status(project.to_string()));
        Ok(self
            .statuses
            .get(project)
            .cloned()
            .unwrap_or_else(|| "running".to_string()))
    }

    fn snapshot_status(&self, project: &str) -> Result<SnapshotStatus> {
        self.calls
            .borrow_mut()
            .push(VmCall::SnapshotStatus(project.to_string()));
        Ok(self
            .snapshots
            .get(project)
            .copied()
            .unwrap_or(SnapshotStatus::Off))
    }

    fn snapshot_enable(&self, project: &str) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(VmCall::SnapshotEnable(project.to_string()));
        Ok(())
    }

    fn snapshot_rollback(&self, project: &str) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(VmCall::SnapshotRollback(project.to_string()));
        Ok(())
    }
}

/// One step record as salt returns it.
pub fn step(result: Value, comment: &str, changes: Value, run_num: u64) -> Value {
    json!({
        "result": result,
        "comment": comment,
        "changes": changes,
        "__run_num__": run_num,
    })
}

/// Highstate where every step succeeds; the package install reports a change.
pub fn ok_highstate() -> Value {
    json!({
        "pkg_|-id1|-nginx|-installed": step(
            json!(true),
            "The following packages were installed: nginx",
            json!({"nginx": {"old": "", "new": "1.24.0"}}),
            0,
        ),
        "svc_|-id2|-nginx|-running": step(json!(true), "Service nginx is running", json!({}), 1),
    })
}

/// Highstate with one change, one failure and one failed requisite.
pub fn failing_highstate() -> Value {
    json!({
        "pkg_|-id1|-nginx|-installed": step(
            json!(true),
            "The following packages were installed: nginx",
            json!({"nginx": {"old": "", "new": "1.24.0"}}),
            0,
        ),
        "svc_|-id2|-nginx|-running": step(json!(false), "Service nginx failed to start", json!({}), 1),
        "cmd_|-id3|-reload|-run": step(json!(false), "One or more requisite failed", json!({}), 2),
    })
}

/// Templates directory with a Vagrantfile template and one minion configuration.
pub fn template_dir(template: &str) -> Result<TempDir> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join(VAGRANTFILE_TEMPLATE), template)?;
    write_minion_conf(dir.path(), "dev", "master: salt.local\n")?;
    Ok(dir)
}

pub fn write_minion_conf(templates: &Path, name: &str, contents: &str) -> Result<()> {
    let conf_dir = templates.join(MINION_CONF_DIR);
    fs::create_dir_all(&conf_dir)?;
    fs::write(conf_dir.join(name), contents)?;
    Ok(())
}
