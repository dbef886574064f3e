//! Offline chat backend that speaks the user's words back.

use async_trait::async_trait;
use futures_util::stream;

use ailinker_core::{ChatBackend, ChatPortError, ChatSegmentStream};

use crate::segmenter::segment_stream;

/// Replies with the prompt, streamed word by word.
#[derive(Debug, Clone)]
pub struct EchoChat {
    segment_min_chars: usize,
}

impl EchoChat {
    #[must_use]
    pub const fn new(segment_min_chars: usize) -> Self {
        Self { segment_min_chars }
    }
}

#[async_trait]
impl ChatBackend for EchoChat {
    async fn stream_reply(&self, prompt: &str) -> Result<ChatSegmentStream, ChatPortError> {
        let words: Vec<Result<String, ChatPortError>> = prompt
            .split_inclusive(char::is_whitespace)
            .map(|w| Ok(w.to_string()))
            .collect();
        tracing::debug!(words = words.len(), "Echo reply");
        Ok(segment_stream(stream::iter(words), self.segment_min_chars))
    }

    fn name(&self) -> &'static str {
        "echo"
    }
}
