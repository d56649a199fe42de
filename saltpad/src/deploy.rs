//! Orchestration for `saltpad deploy`.
//!
//! Minions matching the target are deployed one at a time in ascending id
//! order. The first failing minion aborts the run; minions already deployed
//! are left as they are.

use std::collections::BTreeMap;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::core::aggregate::{NodeReport, aggregate};
use crate::core::selection::{DownNodePolicy, NodeSelection};
use crate::core::types::NodeResult;
use crate::error::DeployError;
use crate::io::config::SaltpadConfig;
use crate::io::salt::{SaltClient, StateTarget};
use crate::io::vagrant::{SnapshotStatus, VmAction, VmDriver};

/// Knobs for a single deploy run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOptions {
    pub down_nodes: DownNodePolicy,
    pub apply_timeout_secs: u64,
    pub orchestration_state: String,
    pub healthcheck_state: String,
    /// Reset each VM (snapshot rollback or destroy + up) before applying.
    pub clean: bool,
}

impl DeployOptions {
    pub fn from_config(cfg: &SaltpadConfig, clean: bool) -> Self {
        Self {
            down_nodes: cfg.down_nodes,
            apply_timeout_secs: cfg.apply_timeout_secs,
            orchestration_state: cfg.orchestration_state.clone(),
            healthcheck_state: cfg.healthcheck_state.clone(),
            clean,
        }
    }
}

/// Progress notifications, in the order they happen.
#[derive(Debug, Clone, PartialEq)]
pub enum DeployEvent {
    NodesSelected {
        nodes: Vec<String>,
    },
    DownNodes {
        nodes: Vec<String>,
        policy: DownNodePolicy,
    },
    NodeStarted {
        node: String,
        roles: Vec<String>,
    },
    CleanRollback {
        node: String,
    },
    CleanRecreate {
        node: String,
    },
    Applying {
        node: String,
        state: StateTarget,
    },
    NodeReport {
        node: String,
        report: NodeReport,
    },
    Orchestration {
        node: String,
        returns: BTreeMap<String, Value>,
    },
    HealthCheck {
        node: String,
        returns: BTreeMap<String, Value>,
    },
    AllSucceeded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeDeployment {
    pub node: String,
    pub report: NodeReport,
}

/// Result of a deploy run where every attempted minion succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct DeployOutcome {
    pub deployed: Vec<NodeDeployment>,
    /// Down minions left out under [`DownNodePolicy::Skip`].
    pub skipped: Vec<String>,
}

/// Ping the target and decide which minions to deploy.
///
/// Fails with [`DeployError::NoMatchingNodes`] when nothing matched, or when
/// every match is down and down minions are skipped.
pub fn select_nodes<C: SaltClient>(
    salt: &C,
    target: &str,
    policy: DownNodePolicy,
) -> Result<(NodeSelection, Vec<String>)> {
    let pings = salt.ping(target)?;
    let selection = NodeSelection::from_pings(&pings);
    let order = selection.deploy_order(policy);
    debug!(live = selection.live.len(), down = selection.down.len(), "minions selected");
    if order.is_empty() {
        return Err(DeployError::NoMatchingNodes {
            target: target.to_string(),
        }
        .into());
    }
    Ok((selection, order))
}

/// Deploy `target`, reporting progress through `on_event`.
///
/// Returns `DeployError::NodeFailed` (wrapped in `anyhow`) for the first
/// minion whose verdict is not a success; its report has already been sent
/// as a [`DeployEvent::NodeReport`].
#[instrument(skip_all, fields(selector = %target, clean = options.clean))]
pub fn run_deploy<C: SaltClient, V: VmDriver, F: FnMut(&DeployEvent)>(
    salt: &C,
    vms: &V,
    target: &str,
    options: &DeployOptions,
    mut on_event: F,
) -> Result<DeployOutcome> {
    let (selection, order) = select_nodes(salt, target, options.down_nodes)?;
    if !selection.down.is_empty() {
        on_event(&DeployEvent::DownNodes {
            nodes: selection.down.clone(),
            policy: options.down_nodes,
        });
    }
    on_event(&DeployEvent::NodesSelected {
        nodes: order.clone(),
    });

    let roles = salt.roles(target)?;
    let mut deployed = Vec::with_capacity(order.len());
    for node in order {
        on_event(&DeployEvent::NodeStarted {
            node: node.clone(),
            roles: roles.get(&node).cloned().unwrap_or_default(),
        });

        if options.clean {
            clean_node(vms, &node, &mut on_event)?;
        }

        let report = apply_node(salt, &node, options, &mut on_event)?;
        if !report.verdict.is_success() {
            info!(node = %node, "deployment failed, aborting");
            return Err(DeployError::NodeFailed {
                node,
                verdict: report.verdict,
            }
            .into());
        }

        let orchestration = StateTarget::Sls(options.orchestration_state.clone());
        let returns = salt.run_state(&node, &orchestration, options.apply_timeout_secs)?;
        on_event(&DeployEvent::Orchestration {
            node: node.clone(),
            returns,
        });

        let healthcheck = StateTarget::Sls(options.healthcheck_state.clone());
        let returns = salt.run_state(&node, &healthcheck, options.apply_timeout_secs)?;
        on_event(&DeployEvent::HealthCheck {
            node: node.clone(),
            returns,
        });

        deployed.push(NodeDeployment { node, report });
    }

    on_event(&DeployEvent::AllSucceeded);
    let skipped = match options.down_nodes {
        DownNodePolicy::Skip => selection.down,
        DownNodePolicy::Attempt => Vec::new(),
    };
    Ok(DeployOutcome { deployed, skipped })
}

/// Roll the VM back to its snapshot, or rebuild it when snapshots are off.
///
/// A rebuilt VM whose driver can snapshot gets its sandbox turned on, so the
/// next clean deploy rolls back instead of rebuilding.
fn clean_node<V: VmDriver, F: FnMut(&DeployEvent)>(
    vms: &V,
    node: &str,
    on_event: &mut F,
) -> Result<()> {
    let snapshot = vms.snapshot_status(node)?;
    if snapshot == SnapshotStatus::On {
        on_event(&DeployEvent::CleanRollback {
            node: node.to_string(),
        });
        return vms.snapshot_rollback(node);
    }

    on_event(&DeployEvent::CleanRecreate {
        node: node.to_string(),
    });
    vms.run_action(node, VmAction::Destroy)?;
    vms.run_action(node, VmAction::Up)?;
    if snapshot == SnapshotStatus::Off {
        vms.snapshot_enable(node)?;
    }
    Ok(())
}

fn apply_node<C: SaltClient, F: FnMut(&DeployEvent)>(
    salt: &C,
    node: &str,
    options: &DeployOptions,
    on_event: &mut F,
) -> Result<NodeReport> {
    on_event(&DeployEvent::Applying {
        node: node.to_string(),
        state: StateTarget::Highstate,
    });
    let returns = salt.run_state(node, &StateTarget::Highstate, options.apply_timeout_secs)?;
    let result = node_result_for(node, &returns)?;
    let report = aggregate(&result)?;
    on_event(&DeployEvent::NodeReport {
        node: node.to_string(),
        report: report.clone(),
    });
    Ok(report)
}

/// Pick this minion's entry out of a state run's returns.
pub fn node_result_for(node: &str, returns: &BTreeMap<String, Value>) -> Result<NodeResult> {
    match returns.get(node) {
        Some(value) => Ok(NodeResult::from_value(value)?),
        None => Ok(NodeResult::ExecutionError(format!("no return from {node}"))),
    }
}
