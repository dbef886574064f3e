//! Terminal front end for the in-process bus.
//!
//! Plays the part of the ASR stage (or of a UI sending direct TTS requests):
//! every stdin line is published with a fresh turn id, and whatever the
//! nodes publish back is printed as a running transcript plus a per-turn
//! audio summary.

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use ailinker_bus::MemoryBus;
use ailinker_core::{
    AsrResponse, BusPort, CancelRequest, ChatResponse, Envelope, TextChunk, TtsRequest, TurnId,
    VoiceType, topics,
};

/// Node name of the console endpoint.
pub const CONSOLE_NODE: &str = "console";

/// Topics the console prints.
pub const CONSOLE_TOPICS: [&str; 3] = [topics::CHAT_ANSWER, topics::CHAT_RESPONSE, topics::TTS_VOICE_TYPE];

/// Which stage the console feeds, and so which message closes an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    /// Lines become `asr/response`; done on the final `chat/answer`.
    ChatOnly,
    /// Lines become `asr/response`; done on `chat/response` with `chat_end`.
    Pipeline,
    /// Lines become `request/tts`; done on `chat/response` with `seg_end`.
    Speech,
}

/// One parsed stdin line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Say(String),
    Cancel,
    Quit,
    Empty,
}

/// Parse a stdin line. `/cancel` and `/quit` are commands.
pub fn parse_line(line: &str) -> ConsoleInput {
    match line.trim() {
        "" => ConsoleInput::Empty,
        "/cancel" => ConsoleInput::Cancel,
        "/quit" | "/exit" => ConsoleInput::Quit,
        text => ConsoleInput::Say(text.to_string()),
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct AudioTally {
    frames: usize,
    bytes: usize,
}

/// Console endpoint state.
pub struct Console {
    bus: MemoryBus,
    feed: Feed,
    chat_id: TurnId,
    pending: usize,
    audio: BTreeMap<TurnId, AudioTally>,
}

impl Console {
    pub const fn new(bus: MemoryBus, feed: Feed) -> Self {
        Self {
            bus,
            feed,
            chat_id: 0,
            pending: 0,
            audio: BTreeMap::new(),
        }
    }

    /// Inputs still waiting for their closing message.
    #[must_use]
    pub const fn pending(&self) -> usize {
        self.pending
    }

    /// Turn id of the latest utterance.
    #[must_use]
    pub const fn chat_id(&self) -> TurnId {
        self.chat_id
    }

    /// Act on one input. Returns `false` when the user asked to quit.
    pub fn submit(&mut self, input: ConsoleInput) -> bool {
        match input {
            ConsoleInput::Empty => {}
            ConsoleInput::Quit => return false,
            ConsoleInput::Cancel if self.feed == Feed::Speech => {
                println!("[cancel] direct speech requests have no turn to cancel");
            }
            ConsoleInput::Cancel => {
                self.publish(topics::REQUEST_CANCEL, &CancelRequest { chat_id: self.chat_id });
                println!("[cancel] turn {}", self.chat_id);
                self.pending = 0;
            }
            ConsoleInput::Say(text) => {
                match self.feed {
                    Feed::ChatOnly | Feed::Pipeline => {
                        self.chat_id += 1;
                        let utterance = AsrResponse {
                            chat_id: self.chat_id,
                            text,
                        };
                        self.publish(topics::ASR_RESPONSE, &utterance);
                    }
                    Feed::Speech => {
                        let request = TtsRequest {
                            text,
                            voice_type: None,
                        };
                        self.publish(topics::REQUEST_TTS, &request);
                    }
                }
                self.pending += 1;
            }
        }
        true
    }

    /// Print everything waiting on the bus.
    pub fn drain(&mut self) -> usize {
        let mut handled = 0;
        while let Some(envelope) = self.bus.read() {
            self.show(&envelope);
            handled += 1;
        }
        handled
    }

    fn show(&mut self, envelope: &Envelope) {
        match envelope.topic.as_str() {
            topics::CHAT_ANSWER => {
                let Ok(chunk) = envelope.decode::<TextChunk>() else {
                    return;
                };
                println!("[chat {}:{}] {}", chunk.turn_id, chunk.seq, chunk.text);
                if chunk.is_final() && self.feed == Feed::ChatOnly {
                    self.complete_one();
                }
            }
            topics::CHAT_RESPONSE => {
                let Ok(response) = envelope.decode::<ChatResponse>() else {
                    return;
                };
                let tally = self.audio.entry(response.chat_id).or_default();
                if let Some(audio) = &response.audio {
                    tally.frames += 1;
                    tally.bytes += BASE64.decode(&audio.buff).map_or(0, |b| b.len());
                }
                let tally = *tally;
                if response.is_turn_end() {
                    println!(
                        "[audio {}] turn complete: {} frames, {} bytes",
                        response.chat_id, tally.frames, tally.bytes
                    );
                    self.audio.remove(&response.chat_id);
                } else if response.is_segment_end() {
                    println!(
                        "[audio {}] segment: {} frames, {} bytes so far",
                        response.chat_id, tally.frames, tally.bytes
                    );
                }
                let closes = match self.feed {
                    Feed::Pipeline => response.is_turn_end(),
                    Feed::Speech => response.is_segment_end(),
                    Feed::ChatOnly => false,
                };
                if closes {
                    self.complete_one();
                }
            }
            topics::TTS_VOICE_TYPE => {
                if let Ok(voice) = envelope.decode::<VoiceType>() {
                    tracing::debug!(id = %voice.id, name = %voice.name, "Voice type available");
                }
            }
            _ => {}
        }
    }

    const fn complete_one(&mut self) {
        self.pending = self.pending.saturating_sub(1);
    }

    fn publish<T: serde::Serialize>(&self, topic: &str, payload: &T) {
        let result = Envelope::new(CONSOLE_NODE, topic, payload)
            .map_err(|e| e.to_string())
            .and_then(|envelope| self.bus.send(&envelope).map_err(|e| e.to_string()));
        if let Err(error) = result {
            tracing::warn!(topic, %error, "Console failed to publish");
        }
    }
}
