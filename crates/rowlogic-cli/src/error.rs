//! CLI error types.

use thiserror::Error;

/// Errors surfaced by the `rowlogic` binary.
#[derive(Debug, Error)]
pub enum CliError {
    /// Engine, storage, or rule failure.
    #[error(transparent)]
    Core(#[from] rowlogic_core::Error),

    /// A demo step did not behave as documented.
    #[error("step '{step}': {reason}")]
    Scenario {
        /// Step label.
        step: String,
        /// What went wrong.
        reason: String,
    },
}
