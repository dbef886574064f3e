//! Domain types shared by every node.

pub mod envelope;
pub mod messages;
pub mod turn;

pub use envelope::{Envelope, EnvelopeError, JSON_PAYLOAD};
pub use messages::{
    AsrResponse, AudioPayload, CancelRequest, ChatAnswer, ChatResponse, TtsRequest, VoiceType,
    topics,
};
pub use turn::{FINAL_SEQ, NO_TURN, TextChunk, TurnId};
