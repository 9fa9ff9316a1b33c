//! Structured logging setup for the engine and its binaries.

use crate::error::{EngineError, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// Initializes a process-wide `tracing` subscriber from `level` (e.g. `"info"`,
/// `"atomdb=debug"`). Safe to call more than once; later calls are no-ops.
pub fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .map_err(|e| EngineError::Internal(format!("invalid log level: {e}")))?;
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();
    Ok(())
}
