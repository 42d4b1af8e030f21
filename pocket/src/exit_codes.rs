//! Stable exit codes for the `pok` CLI.

/// Every task that ran succeeded.
pub const OK: i32 = 0;
/// A task failed or the run was cancelled.
pub const FAILED: i32 = 1;
/// Invalid configuration, tree, task name or flags; nothing ran.
pub const INVALID: i32 = 2;
