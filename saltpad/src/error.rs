//! Typed failures that callers need to tell apart.
//!
//! Everything else travels as `anyhow::Error` with context; these types are
//! the ones `main` and the tests downcast to.

use std::path::PathBuf;

use thiserror::Error;

use crate::core::aggregate::Verdict;

/// A salt return that does not have the shape the parser expects.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("malformed step id {raw:?}: expected 4 parts, found {parts}")]
    StepId { raw: String, parts: usize },

    #[error("step {id:?} returned {found} instead of a mapping: {raw}")]
    StepRecord {
        id: String,
        found: &'static str,
        raw: String,
    },

    #[error("unexpected node result ({found}): {raw}")]
    NodeResult { found: &'static str, raw: String },
}

/// Conditions that end a `deploy` run.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DeployError {
    #[error("No up minions matching {target:?}, abort!")]
    NoMatchingNodes { target: String },

    #[error("Deployment has failed on {node} minion, abort!")]
    NodeFailed { node: String, verdict: Verdict },
}

/// Problems with the registered templates or the project layout.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BootstrapError {
    #[error("You must register at least one {kind}, use register_dir command to do so.")]
    NothingRegistered { kind: &'static str },

    #[error("More than one {kind} registered ({choices}), pick one with --{flag}")]
    Ambiguous {
        kind: &'static str,
        flag: &'static str,
        choices: String,
    },

    #[error("No {kind} named {name:?} is registered")]
    UnknownChoice { kind: &'static str, name: String },

    #[error("The directory {} already exists, abort", path.display())]
    ProjectExists { path: PathBuf },

    #[error("Unknown minion {project:?}, create it with create_vm first")]
    UnknownProject { project: String },
}
