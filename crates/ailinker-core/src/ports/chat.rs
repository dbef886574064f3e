//! Chat backend port.
//!
//! A backend turns one user utterance into a stream of reply segments. The
//! stream is already segmented and sequenced: segments carry `seq` 0, 1, …
//! and the last one carries [`FINAL_SEQ`](crate::domain::FINAL_SEQ).

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

/// Errors raised by a chat backend.
#[derive(Debug, Error)]
pub enum ChatPortError {
    /// Backend is misconfigured (missing key, bad URL).
    #[error("Chat backend misconfigured: {0}")]
    Config(String),

    /// Request could not be sent or the stream broke.
    #[error("Chat request failed: {0}")]
    Request(String),

    /// Backend answered with a non-success status.
    #[error("Chat backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// A streamed event could not be decoded.
    #[error("Failed to decode chat stream: {0}")]
    Decode(String),
}

/// One sequenced piece of a chat reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSegment {
    pub seq: i64,
    pub text: String,
}

/// Stream of reply segments.
pub type ChatSegmentStream = BoxStream<'static, Result<ChatSegment, ChatPortError>>;

/// Backend-agnostic chat engine.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Start a reply for `prompt`. Dropping the stream abandons the request.
    async fn stream_reply(&self, prompt: &str) -> Result<ChatSegmentStream, ChatPortError>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}
