//! Stable exit codes for `tof` commands.

/// Command succeeded; for `prompt` and `resume`, the task reached `success`.
pub const OK: i32 = 0;
/// Invalid input, configuration, or workspace, or any other error.
pub const INVALID: i32 = 1;
/// The run ended with the task `failed`.
pub const FAILED: i32 = 2;
/// The run was cancelled, or escalated without reaching a terminal status.
pub const INTERRUPTED: i32 = 3;
