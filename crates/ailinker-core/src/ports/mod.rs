//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces that the nodes expect from infrastructure.
//! They contain no implementation details and use only domain types.
//!
//! # Design Rules
//!
//! - No transport types (broker clients, sockets) in any signature
//! - Poll-based, non-blocking methods for the bus and TTS connection
//! - Backends are selected by configuration, never by downcasting

pub mod bus;
pub mod chat;
pub mod tts;

pub use bus::{BusError, BusPort, DEFAULT_INBOUND_QUEUE_MAX};
pub use chat::{ChatBackend, ChatPortError, ChatSegment, ChatSegmentStream};
pub use tts::{
    ConnectionStatus, OperationType, SynthesisPhase, SynthesisResult, TtsConnection,
    TtsPortError, TtsResultRecord,
};

#[cfg(test)]
pub use bus::MockBusPort;
