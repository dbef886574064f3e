//! Streaming text-to-speech connection port.
//!
//! Concrete backends (cloud websocket services, local engines) implement
//! [`TtsConnection`]. The connection is poll-based: after
//! [`execute`](TtsConnection::execute) submits text, the caller repeatedly
//! calls [`get_result`](TtsConnection::get_result) and interprets the
//! returned [`TtsResultRecord`]s.
//!
//! ## Record protocol
//!
//! | outer `status` | meaning |
//! |----------------|---------|
//! | `CONNECTED`    | (re)connection established |
//! | `DISCONNECT`   | connection dropped mid-stream |
//! | `REQ_OK`       | `result` carries a [`SynthesisResult`] |
//! | anything else  | informational, not terminal |
//!
//! A record without an outer status is a protocol error.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by a TTS backend outside the record stream.
#[derive(Debug, Error)]
pub enum TtsPortError {
    /// The backend refused to start.
    #[error("TTS backend failed to launch: {0}")]
    Launch(String),

    /// The backend rejected a submission.
    #[error("TTS submission rejected: {0}")]
    Submit(String),
}

/// Outer status of a result record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConnectionStatus {
    Connected,
    Disconnect,
    ReqOk,
    Other(String),
}

impl From<String> for ConnectionStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "CONNECTED" => Self::Connected,
            "DISCONNECT" => Self::Disconnect,
            "REQ_OK" => Self::ReqOk,
            _ => Self::Other(value),
        }
    }
}

impl From<ConnectionStatus> for String {
    fn from(value: ConnectionStatus) -> Self {
        match value {
            ConnectionStatus::Connected => "CONNECTED".to_string(),
            ConnectionStatus::Disconnect => "DISCONNECT".to_string(),
            ConnectionStatus::ReqOk => "REQ_OK".to_string(),
            ConnectionStatus::Other(s) => s,
        }
    }
}

/// Phase reported by the inner `result.status` of a `REQ_OK` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisPhase {
    /// Synthesis accepted; no audio yet.
    Started,
    /// Intermediate audio.
    Audio,
    /// Last audio of the request.
    Complete,
    /// Backend gave up on the request.
    Failed,
}

impl SynthesisPhase {
    /// Wire code of this phase.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Started => 0,
            Self::Audio => 1,
            Self::Complete => 2,
            Self::Failed => -1,
        }
    }

    /// Parse a wire code.
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Started),
            1 => Some(Self::Audio),
            2 => Some(Self::Complete),
            -1 => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Inner payload of a `REQ_OK` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisResult {
    /// Phase code, see [`SynthesisPhase`].
    pub status: i32,

    /// Raw audio bytes delivered by this record.
    #[serde(default)]
    pub data: Vec<u8>,

    /// Backend-reported size of this delivery.
    #[serde(default)]
    pub seq_size: usize,
}

impl SynthesisResult {
    /// Decoded phase, or `None` for an unknown code.
    #[must_use]
    pub const fn phase(&self) -> Option<SynthesisPhase> {
        SynthesisPhase::from_code(self.status)
    }
}

/// One record pulled from a TTS connection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TtsResultRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ConnectionStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<SynthesisResult>,
}

impl TtsResultRecord {
    /// A `CONNECTED` record.
    #[must_use]
    pub const fn connected() -> Self {
        Self {
            status: Some(ConnectionStatus::Connected),
            result: None,
        }
    }

    /// A `DISCONNECT` record.
    #[must_use]
    pub const fn disconnected() -> Self {
        Self {
            status: Some(ConnectionStatus::Disconnect),
            result: None,
        }
    }

    /// A `REQ_OK` record carrying audio for the given phase.
    #[must_use]
    pub fn synthesis(phase: SynthesisPhase, data: Vec<u8>) -> Self {
        let seq_size = data.len();
        Self {
            status: Some(ConnectionStatus::ReqOk),
            result: Some(SynthesisResult {
                status: phase.code(),
                data,
                seq_size,
            }),
        }
    }
}

/// Result delivery mode of the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// Whole audio returned at once.
    Query,
    /// Audio streamed as it is produced.
    #[default]
    Submit,
}

/// A single streaming TTS connection.
///
/// Owned exclusively by the active synthesis session; never shared.
pub trait TtsConnection: Send {
    /// Open the connection and start any backend workers.
    fn launch(&mut self) -> Result<(), TtsPortError>;

    /// Submit text for synthesis.
    fn execute(&mut self, text: &str) -> Result<(), TtsPortError>;

    /// Pop the next result record, if one is ready.
    fn get_result(&mut self) -> Option<TtsResultRecord>;

    /// Start reconnecting; success is reported as a `CONNECTED` record.
    fn auto_connect(&mut self);

    /// Close the connection. Idempotent.
    fn connect_close(&mut self);

    /// Select the voice for subsequent submissions.
    fn set_voice_type(&mut self, voice_type: &str);

    /// Select the result delivery mode.
    fn set_operation_type(&mut self, operation: OperationType);
}
