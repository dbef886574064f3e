//! Typed payloads for every topic on the bus.

use serde::{Deserialize, Serialize};

use super::turn::{TextChunk, TurnId};

/// Topic names.
pub mod topics {
    /// Cancel every turn up to and including `chat_id`.
    pub const REQUEST_CANCEL: &str = "request/cancel";
    /// Speech recognised for a new turn.
    pub const ASR_RESPONSE: &str = "asr/response";
    /// A chat-reply fragment.
    pub const CHAT_ANSWER: &str = "chat/answer";
    /// Synthesize text directly, bypassing chat.
    pub const REQUEST_TTS: &str = "request/tts";
    /// Audio frames and turn/segment markers for the playback consumer.
    pub const CHAT_RESPONSE: &str = "chat/response";
    /// Voice catalogue entry published by the TTS node.
    pub const TTS_VOICE_TYPE: &str = "tts/voice_type";
}

/// Payload of `request/cancel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRequest {
    pub chat_id: TurnId,
}

/// Payload of `asr/response`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsrResponse {
    pub chat_id: TurnId,
    pub text: String,
}

/// Payload of `chat/answer`.
pub type ChatAnswer = TextChunk;

/// Payload of `request/tts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtsRequest {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_type: Option<String>,
}

/// Audio block attached to a `chat/response`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioPayload {
    pub samplerate: u32,
    pub bits: u16,
    pub channels: u16,
    pub format: String,
    /// Base64-encoded frame bytes.
    pub buff: String,
}

/// Payload of `chat/response`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub chat_id: TurnId,
    /// `1` when the whole turn is finished.
    pub chat_end: u8,
    /// `1` when one synthesis segment is finished.
    pub seg_end: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioPayload>,
}

impl ChatResponse {
    /// Whether this message closes its turn.
    #[must_use]
    pub const fn is_turn_end(&self) -> bool {
        self.chat_end == 1
    }

    /// Whether this message closes a synthesis segment.
    #[must_use]
    pub const fn is_segment_end(&self) -> bool {
        self.seg_end == 1
    }
}

/// A voice offered by the TTS backend (payload of `tts/voice_type`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceType {
    /// Backend voice identifier.
    pub id: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Sample sentence used for voice previews.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example_text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_response_omits_absent_fields() {
        let msg = ChatResponse {
            chat_id: 2,
            chat_end: 1,
            seg_end: 1,
            text: None,
            audio: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("text").is_none());
        assert!(json.get("audio").is_none());
        assert!(msg.is_turn_end());
    }

    #[test]
    fn tts_request_voice_type_is_optional() {
        let req: TtsRequest = serde_json::from_str(r#"{"text":"hello"}"#).unwrap();
        assert_eq!(req.voice_type, None);
    }
}
