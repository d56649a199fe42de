//! Side-effecting collaborators: salt, vagrant, the filesystem and child processes.

pub mod config;
pub mod keys;
pub mod process;
pub mod salt;
pub mod state;
pub mod templates;
pub mod vagrant;
