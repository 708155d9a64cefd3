//! Process exit codes: coarse, stable, and named rather than inlined as
//! bare integers at the process boundary.

/// Clean shutdown.
pub const OK: i32 = 0;

/// Fatal startup failure: listener bind, config parse, or directory
/// creation for the local sink failed before the pipeline could run.
pub const STARTUP_FAILURE: i32 = 1;
