//! Bus message envelope.
//!
//! Every node speaks the same wire shape:
//!
//! ```json
//! { "node": "tts", "topic": "chat/response", "type": "json", "data": { ... } }
//! ```
//!
//! The `data` object is topic-specific; see [`crate::domain::messages`] for
//! the typed payloads.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The only payload encoding used on the bus.
pub const JSON_PAYLOAD: &str = "json";

/// Errors raised while building or decoding an envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Payload could not be converted to or from JSON.
    #[error("Invalid payload for topic '{topic}': {source}")]
    Payload {
        topic: String,
        #[source]
        source: serde_json::Error,
    },

    /// Envelope declared a payload encoding other than JSON.
    #[error("Unsupported payload type '{0}'")]
    UnsupportedType(String),
}

/// Typed pub/sub unit exchanged between nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Name of the sending node.
    pub node: String,

    /// Routing topic (e.g. `chat/answer`).
    pub topic: String,

    /// Payload encoding, always `"json"`.
    #[serde(rename = "type", default = "default_payload_type")]
    pub payload_type: String,

    /// Topic-specific payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

fn default_payload_type() -> String {
    JSON_PAYLOAD.to_string()
}

impl Envelope {
    /// Build an envelope by serializing a typed payload.
    pub fn new<T: Serialize>(
        node: impl Into<String>,
        topic: impl Into<String>,
        payload: &T,
    ) -> Result<Self, EnvelopeError> {
        let topic = topic.into();
        let data = serde_json::to_value(payload).map_err(|source| EnvelopeError::Payload {
            topic: topic.clone(),
            source,
        })?;
        Ok(Self {
            node: node.into(),
            topic,
            payload_type: default_payload_type(),
            data,
        })
    }

    /// Decode the payload into a typed message.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, EnvelopeError> {
        if self.payload_type != JSON_PAYLOAD {
            return Err(EnvelopeError::UnsupportedType(self.payload_type.clone()));
        }
        T::deserialize(&self.data).map_err(|source| EnvelopeError::Payload {
            topic: self.topic.clone(),
            source,
        })
    }

    /// Check the envelope's topic.
    #[must_use]
    pub fn is_topic(&self, topic: &str) -> bool {
        self.topic == topic
    }
}
