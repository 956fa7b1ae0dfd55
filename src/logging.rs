//! Tracing subscriber setup for embedders and tools.

use tracing_subscriber::{fmt, EnvFilter};

use crate::types::{Result, RidBagError};

/// Installs a global fmt subscriber filtered by `level`
/// (an `EnvFilter` directive such as `"info"` or `"ridbag=trace"`).
pub fn init_logging(level: &str) -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(level)
                .map_err(|e| RidBagError::InvalidArgument(format!("Invalid log level: {e}")))?,
        )
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|_| RidBagError::InvalidArgument("Logging already initialized".into()))
}
