//! Stable exit codes for shiki CLI commands.

/// Command succeeded; conflict checks found no overlap.
pub const OK: i32 = 0;
/// Overlapping files, merge conflict, missing ref, cycle, schema or budget
/// violation, or any tool failure.
pub const FAILURE: i32 = 1;
