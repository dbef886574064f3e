//! TTS connection backends.
//!
//! The node only ever talks to a `Box<dyn TtsConnection>`; this module picks
//! the concrete implementation from configuration.
//!
//! | Service    | Module         | Notes                                   |
//! |------------|----------------|-----------------------------------------|
//! | `loopback` | [`loopback`]   | Offline, silent PCM sized to the text   |

pub mod loopback;

use ailinker_core::{TtsConnection, TtsService, TtsSettings};

pub use loopback::LoopbackTts;

/// Build the connection selected by `settings.service`.
#[must_use]
pub fn build_tts_connection(settings: &TtsSettings) -> Box<dyn TtsConnection> {
    match settings.service {
        TtsService::Loopback => Box::new(LoopbackTts::new(
            settings.loopback.clone(),
            settings.audio.clone(),
        )),
    }
}
