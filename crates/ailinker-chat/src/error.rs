//! Chat node error types.

use ailinker_core::BusError;

/// Errors that stop the chat node.
#[derive(Debug, thiserror::Error)]
pub enum ChatNodeError {
    /// Bus transport could not be started.
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),
}
