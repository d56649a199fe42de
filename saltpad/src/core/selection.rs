//! Ordering and filtering of the minions answering a ping.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// What to do with minions that did not answer the liveness ping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownNodePolicy {
    /// Report them and leave them out of the run.
    #[default]
    Skip,
    /// Report them and still try to deploy them.
    Attempt,
}

/// Minions split by liveness, each list sorted by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSelection {
    pub live: Vec<String>,
    pub down: Vec<String>,
}

impl NodeSelection {
    pub fn from_pings(pings: &BTreeMap<String, bool>) -> Self {
        let (live, down): (Vec<_>, Vec<_>) = pings.iter().partition(|(_, alive)| **alive);
        Self {
            live: live.into_iter().map(|(node, _)| node.clone()).collect(),
            down: down.into_iter().map(|(node, _)| node.clone()).collect(),
        }
    }

    /// Nodes to deploy, in ascending id order.
    pub fn deploy_order(&self, policy: DownNodePolicy) -> Vec<String> {
        match policy {
            DownNodePolicy::Skip => self.live.clone(),
            DownNodePolicy::Attempt => {
                let mut all: Vec<String> = self.live.iter().chain(&self.down).cloned().collect();
                all.sort();
                all
            }
        }
    }
}
