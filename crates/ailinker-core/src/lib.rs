//! Core domain types and port definitions for ailinker.
//!
//! Every worker node (chat, TTS) is built from the pieces in this crate:
//!
//! - [`domain`]: turns, text chunks, bus envelopes and topic payloads
//! - [`ports`]: the bus, TTS connection and chat backend traits
//! - [`TurnTracker`]: current turn plus the cancellation watermark
//! - [`ControlInbox`]: keeps cancellation live while a node is busy
//! - [`settings`]: JSON configuration

pub mod domain;
pub mod inbox;
pub mod ports;
pub mod settings;
pub mod turn_tracker;

// Re-export commonly used types for convenience
pub use domain::{
    AsrResponse, AudioPayload, CancelRequest, ChatAnswer, ChatResponse, Envelope, EnvelopeError,
    FINAL_SEQ, NO_TURN, TextChunk, TtsRequest, TurnId, VoiceType, topics,
};
pub use inbox::{ControlInbox, apply_cancel};
pub use ports::{
    BusError, BusPort, ChatBackend, ChatPortError, ChatSegment, ChatSegmentStream,
    ConnectionStatus, OperationType, SynthesisPhase, SynthesisResult, TtsConnection, TtsPortError,
    TtsResultRecord,
};
pub use settings::{
    AppConfig, AudioFormat, BusConfig, ChatService, ChatSettings, ConfigError, LoopbackConfig,
    NodeConfig, TtsService, TtsSettings, validate_config,
};
pub use turn_tracker::TurnTracker;
