//! Turn identifiers and chat-reply text chunks.

use serde::{Deserialize, Serialize};

/// Identifier of one user utterance and its response cycle.
///
/// Minted by the ASR stage and carried on the wire as `chat_id`. Values are
/// monotonically non-decreasing within a session.
pub type TurnId = i64;

/// Sequence number that marks the last chunk of a turn.
pub const FINAL_SEQ: i64 = -1;

/// Watermark value meaning "nothing has been cancelled yet".
pub const NO_TURN: TurnId = -1;

/// A fragment of a chat reply, sequenced within its turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Turn this fragment belongs to.
    #[serde(rename = "chat_id")]
    pub turn_id: TurnId,

    /// Position within the reply; [`FINAL_SEQ`] closes the turn.
    pub seq: i64,

    /// Reply text (may be empty on the final chunk).
    pub text: String,
}

impl TextChunk {
    /// Create an intermediate or final chunk.
    pub fn new(turn_id: TurnId, seq: i64, text: impl Into<String>) -> Self {
        Self {
            turn_id,
            seq,
            text: text.into(),
        }
    }

    /// Whether this chunk closes its turn.
    #[must_use]
    pub const fn is_final(&self) -> bool {
        self.seq == FINAL_SEQ
    }

    /// Length of the chunk text in UTF-8 bytes.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.text.len()
    }
}
