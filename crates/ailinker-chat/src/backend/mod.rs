//! Chat backends.
//!
//! | Service  | Module       | Notes                                         |
//! |----------|--------------|-----------------------------------------------|
//! | `echo`   | [`echo`]     | Offline, repeats the utterance                |
//! | `openai` | [`openai`]   | OpenAI-compatible `/chat/completions` (SSE)   |

pub mod echo;
pub mod openai;

use std::sync::Arc;

use ailinker_core::{ChatBackend, ChatPortError, ChatService, ChatSettings};

pub use echo::EchoChat;
pub use openai::OpenAiChat;

/// Build the backend selected by `settings.service`.
pub fn build_chat_backend(settings: &ChatSettings) -> Result<Arc<dyn ChatBackend>, ChatPortError> {
    let backend: Arc<dyn ChatBackend> = match settings.service {
        ChatService::Echo => Arc::new(EchoChat::new(settings.segment_min_chars)),
        ChatService::OpenAi => Arc::new(OpenAiChat::from_settings(settings)?),
    };
    tracing::info!(backend = backend.name(), "Chat backend ready");
    Ok(backend)
}
