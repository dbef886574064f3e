//! Node configuration types, loading and validation.
//!
//! Configuration is a single JSON document. Every field has a default, so an
//! empty object (`{}`) is a valid configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::VoiceType;
use crate::ports::{DEFAULT_INBOUND_QUEUE_MAX, OperationType};

/// Default number of leading chunks synthesized without batching.
pub const DEFAULT_DIRECT_N: usize = 2;

/// Default byte budget of one synthesis request.
pub const DEFAULT_TTS_TEXT_BYTES_MAX: usize = 1024;

/// Default audio frame size expected by the playback consumer.
pub const DEFAULT_FRAME_LENGTH: usize = 512;

/// Default reconnect window after a mid-stream disconnect.
pub const DEFAULT_RECONNECT_TIMEOUT_MS: u64 = 10_000;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("Voice type list contains an entry with an empty id")]
    EmptyVoiceId,
}

// ── Sections ───────────────────────────────────────────────────────

/// Identity and loop timing of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Name put in the `node` field of outgoing envelopes. `None` lets the
    /// node pick its role name (`tts`, `chat`).
    pub name: Option<String>,

    /// Sleep between iterations of the polling loop.
    pub tick_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: None,
            tick_ms: 10,
        }
    }
}

/// Bus transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Bound of the inbound queue.
    pub inbound_queue_max: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            inbound_queue_max: DEFAULT_INBOUND_QUEUE_MAX,
        }
    }
}

/// Audio format advertised in `chat/response` frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioFormat {
    pub codec: String,
    pub samplerate: u32,
    pub channels: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            codec: "pcm".to_string(),
            samplerate: 16_000,
            channels: 1,
        }
    }
}

/// TTS backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsService {
    /// Offline backend that streams silent PCM sized to the text.
    #[default]
    Loopback,
}

/// Settings of the loopback TTS backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopbackConfig {
    /// Audio duration produced per character of input.
    pub ms_per_char: u32,

    /// Bytes delivered per result record.
    pub chunk_bytes: usize,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            ms_per_char: 60,
            chunk_bytes: 3200,
        }
    }
}

/// TTS node settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsSettings {
    pub service: TtsService,

    /// Leading chunks per turn synthesized immediately.
    pub direct_n: usize,

    /// Byte budget of one batched synthesis request.
    pub tts_text_bytes_max: usize,

    /// Audio frame size in bytes.
    pub frame_length: usize,

    /// Reconnect window after a disconnect.
    pub reconnect_timeout_ms: u64,

    /// Sleep between result polls.
    pub poll_interval_ms: u64,

    /// Gap between consecutive frames of one flush.
    pub frame_send_interval_ms: u64,

    /// Delivery mode requested from the backend at launch.
    pub operation_type: OperationType,

    /// Voice selected at launch.
    pub voice_type: Option<String>,

    /// Voices published on `tts/voice_type` at launch.
    pub voice_types: Vec<VoiceType>,

    pub audio: AudioFormat,

    pub loopback: LoopbackConfig,
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            service: TtsService::default(),
            direct_n: DEFAULT_DIRECT_N,
            tts_text_bytes_max: DEFAULT_TTS_TEXT_BYTES_MAX,
            frame_length: DEFAULT_FRAME_LENGTH,
            reconnect_timeout_ms: DEFAULT_RECONNECT_TIMEOUT_MS,
            poll_interval_ms: 10,
            frame_send_interval_ms: 5,
            operation_type: OperationType::Submit,
            voice_type: None,
            voice_types: Vec::new(),
            audio: AudioFormat::default(),
            loopback: LoopbackConfig::default(),
        }
    }
}

/// Chat backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatService {
    /// Offline backend that speaks the user's words back.
    #[default]
    Echo,
    /// OpenAI-compatible `/v1/chat/completions` endpoint.
    OpenAi,
}

/// Chat node settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub service: ChatService,
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f32,
    pub system_prompt: Option<String>,
    /// Characters that must be pending before a sentence boundary may close
    /// a segment.
    pub segment_min_chars: usize,
    pub request_timeout_ms: u64,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            service: ChatService::default(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.7,
            system_prompt: None,
            segment_min_chars: 8,
            request_timeout_ms: 60_000,
        }
    }
}

/// Whole-application configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub node: NodeConfig,
    pub bus: BusConfig,
    pub tts: TtsSettings,
    pub chat: ChatSettings,
}

impl AppConfig {
    /// Read and validate a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Node name, falling back to the role name.
    #[must_use]
    pub fn node_name(&self, role: &str) -> String {
        self.node.name.clone().unwrap_or_else(|| role.to_string())
    }
}

/// Validate a configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    let checks: [(&'static str, bool); 5] = [
        ("bus.inbound_queue_max", config.bus.inbound_queue_max == 0),
        ("tts.frame_length", config.tts.frame_length == 0),
        ("tts.tts_text_bytes_max", config.tts.tts_text_bytes_max == 0),
        ("tts.poll_interval_ms", config.tts.poll_interval_ms == 0),
        ("tts.loopback.chunk_bytes", config.tts.loopback.chunk_bytes == 0),
    ];
    if let Some((field, _)) = checks.iter().find(|(_, zero)| *zero) {
        return Err(ConfigError::Zero { field: *field });
    }

    if config.tts.voice_types.iter().any(|v| v.id.trim().is_empty()) {
        return Err(ConfigError::EmptyVoiceId);
    }

    Ok(())
}
