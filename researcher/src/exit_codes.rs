//! Stable exit codes for researcher CLI commands.

/// The run completed and a report was produced.
pub const OK: i32 = 0;
/// Invalid invocation, configuration or credentials.
pub const INVALID: i32 = 1;
/// The run ended in the `failed` state.
pub const FAILED: i32 = 2;
