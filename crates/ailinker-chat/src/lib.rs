//! Chat node for ailinker.
//!
//! Answers ASR utterances with streamed, sentence-segmented replies
//! published as `chat/answer` chunks.

pub mod backend;
pub mod error;
pub mod node;
pub mod segmenter;

pub use backend::{EchoChat, OpenAiChat, build_chat_backend};
pub use error::ChatNodeError;
pub use node::{ChatNode, ChatNodeConfig, ReplyOutcome};
pub use segmenter::{Segmenter, segment_stream};
