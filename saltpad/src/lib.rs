//! Deploy salt states on vagrant-managed minions and read the results.
//!
//! The crate keeps the same split throughout:
//!
//! - **[`core`]**: Pure interpretation of salt returns (step ids, step
//!   classification, verdicts, report rendering, node selection). No I/O.
//! - **[`io`]**: Collaborators with side effects: the salt master, vagrant,
//!   key provisioning, templates, settings and the local state file.
//!
//! [`deploy`] and [`project`] wire the two together for the CLI commands;
//! [`console`] turns their results into colored terminal output.

pub mod console;
pub mod core;
pub mod deploy;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod project;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
