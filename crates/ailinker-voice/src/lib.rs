//! TTS node for ailinker.
//!
//! Turns streamed chat text into paced, fixed-size audio frames on the bus:
//!
//! - [`batcher`]: direct-then-batched grouping of text chunks per turn
//! - [`session`]: one streaming synthesis call, including reconnect
//! - [`framer`]: re-slicing backend audio into fixed-size frames
//! - [`emitter`]: cancellation-aware publishing of `chat/response` frames
//! - [`node`]: the bus-facing loop tying the pieces together
//! - [`backend`]: concrete TTS connections

pub mod backend;
pub mod batcher;
pub mod emitter;
pub mod error;
pub mod framer;
pub mod node;
pub mod session;

pub use backend::{LoopbackTts, build_tts_connection};
pub use batcher::{BatchAction, BatchPolicy, ChunkBatcher};
pub use emitter::{FrameEmitter, FrameFormat, FrameMark, SendOutcome};
pub use error::{SynthesisError, TtsNodeError};
pub use framer::AudioFramer;
pub use node::{TtsNode, TtsNodeConfig};
pub use session::{SessionConfig, SessionState, SynthesisReport, SynthesisRequest, SynthesisSession};
