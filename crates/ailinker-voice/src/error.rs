//! TTS node error types.

use std::time::Duration;

use ailinker_core::{BusError, TtsPortError};

/// Why a single synthesis call ended without completing.
///
/// None of these are fatal to the node; the caller logs them and moves on
/// to the next message.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    /// The backend produced a malformed result record.
    #[error("TTS protocol error: {0}")]
    Protocol(String),

    /// The connection dropped and did not come back in time.
    #[error("TTS reconnect timed out after {0:?}")]
    ReconnectTimeout(Duration),

    /// The backend reported that synthesis failed.
    #[error("TTS backend reported synthesis failure")]
    BackendFailed,

    /// The backend rejected the submission.
    #[error("TTS submission failed: {0}")]
    Submit(#[from] TtsPortError),
}

impl SynthesisError {
    /// Whether the connection was closed while handling this error.
    #[must_use]
    pub const fn closes_connection(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::ReconnectTimeout(_))
    }
}

/// Errors that stop the TTS node itself.
#[derive(Debug, thiserror::Error)]
pub enum TtsNodeError {
    /// Bus transport could not be started.
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// TTS backend could not be launched.
    #[error("TTS backend error: {0}")]
    Backend(#[from] TtsPortError),
}
