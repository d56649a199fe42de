//! Process exit codes for saltpad commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Deployment failed, no minion matched, the setup is incomplete, or any other error.
pub const FAILURE: i32 = 1;
