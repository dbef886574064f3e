//! Outgoing `chat/response` frames.
//!
//! [`FrameEmitter`] is the only place the TTS node publishes audio. Before
//! every send it drains pending cancellations from the bus and checks the
//! watermark, so a cancel that arrives mid-flush stops the very next frame.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use ailinker_core::{
    AudioFormat, AudioPayload, BusPort, ChatResponse, ControlInbox, Envelope, TurnId, TurnTracker,
    topics,
};

/// Placeholder carried in the `text` field of audio frames.
pub const REDACTED_TEXT: &str = " ";

/// Sample width of the PCM we publish.
pub const SAMPLE_BITS: u16 = 16;

/// Position of a frame within the turn's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMark {
    /// More frames of this segment follow.
    Continue,
    /// Last frame of one synthesis call.
    SegmentEnd,
    /// Last frame of the turn.
    TurnEnd,
}

impl FrameMark {
    /// `(chat_end, seg_end)` wire flags.
    #[must_use]
    pub const fn flags(self) -> (u8, u8) {
        match self {
            Self::Continue => (0, 0),
            Self::SegmentEnd => (0, 1),
            Self::TurnEnd => (1, 1),
        }
    }
}

/// Result of one send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// The turn is cancelled; nothing was published.
    Suppressed,
    /// The bus refused the envelope. Already logged.
    Failed,
}

/// Static description of the frames a node produces.
#[derive(Debug, Clone)]
pub struct FrameFormat {
    node: String,
    audio: AudioFormat,
}

impl FrameFormat {
    #[must_use]
    pub fn new(node: impl Into<String>, audio: AudioFormat) -> Self {
        Self {
            node: node.into(),
            audio,
        }
    }

    /// Node name stamped on outgoing envelopes.
    #[must_use]
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Build the payload for one frame, or a bare marker when `frame` is `None`.
    #[must_use]
    pub fn response(&self, turn_id: TurnId, mark: FrameMark, frame: Option<&[u8]>) -> ChatResponse {
        let (chat_end, seg_end) = mark.flags();
        let audio = frame.map(|bytes| AudioPayload {
            samplerate: self.audio.samplerate,
            bits: SAMPLE_BITS,
            channels: self.audio.channels,
            format: self.audio.codec.clone(),
            buff: BASE64.encode(bytes),
        });
        ChatResponse {
            chat_id: turn_id,
            chat_end,
            seg_end,
            text: audio.as_ref().map(|_| REDACTED_TEXT.to_string()),
            audio,
        }
    }
}

/// Publishes frames for one synthesis call.
///
/// Borrowed from the node for the duration of the call; holds the node's
/// inbox so cancellation keeps flowing while the node is busy.
pub struct FrameEmitter<'a> {
    bus: &'a dyn BusPort,
    tracker: &'a TurnTracker,
    inbox: &'a mut ControlInbox,
    format: &'a FrameFormat,
    sent: usize,
    suppressed: usize,
    suppressed_turn: Option<TurnId>,
}

impl<'a> FrameEmitter<'a> {
    pub fn new(
        bus: &'a dyn BusPort,
        tracker: &'a TurnTracker,
        inbox: &'a mut ControlInbox,
        format: &'a FrameFormat,
    ) -> Self {
        Self {
            bus,
            tracker,
            inbox,
            format,
            sent: 0,
            suppressed: 0,
            suppressed_turn: None,
        }
    }

    /// Apply any cancellations waiting on the bus.
    pub fn poll_control(&mut self) -> usize {
        self.inbox.pump(self.bus, self.tracker)
    }

    /// Whether `turn_id` is cancelled, after draining pending control messages.
    pub fn is_cancelled(&mut self, turn_id: TurnId) -> bool {
        self.poll_control();
        self.tracker.is_cancelled(turn_id)
    }

    /// Publish one audio frame.
    pub fn send_frame(&mut self, turn_id: TurnId, frame: &[u8], mark: FrameMark) -> SendOutcome {
        let response = self.format.response(turn_id, mark, Some(frame));
        self.publish(turn_id, &response)
    }

    /// Publish an audio-less marker, used when a segment or turn ends with
    /// no frame left to carry the flags.
    pub fn send_marker(&mut self, turn_id: TurnId, mark: FrameMark) -> SendOutcome {
        let response = self.format.response(turn_id, mark, None);
        self.publish(turn_id, &response)
    }

    /// Publish the end-of-turn marker.
    pub fn send_turn_end(&mut self, turn_id: TurnId) -> SendOutcome {
        self.send_marker(turn_id, FrameMark::TurnEnd)
    }

    /// Envelopes published so far.
    #[must_use]
    pub const fn sent(&self) -> usize {
        self.sent
    }

    /// Sends skipped because their turn was cancelled.
    #[must_use]
    pub const fn suppressed(&self) -> usize {
        self.suppressed
    }

    fn publish(&mut self, turn_id: TurnId, response: &ChatResponse) -> SendOutcome {
        if self.is_cancelled(turn_id) {
            self.suppressed += 1;
            if self.suppressed_turn != Some(turn_id) {
                self.suppressed_turn = Some(turn_id);
                tracing::info!(
                    turn_id,
                    cancelled_upto = self.tracker.cancelled_upto(),
                    "Turn cancelled, suppressing audio"
                );
            }
            return SendOutcome::Suppressed;
        }

        let envelope = match Envelope::new(self.format.node(), topics::CHAT_RESPONSE, response) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(turn_id, error = %e, "Failed to encode chat response");
                return SendOutcome::Failed;
            }
        };
        match self.bus.send(&envelope) {
            Ok(()) => {
                self.sent += 1;
                tracing::trace!(
                    turn_id,
                    chat_end = response.chat_end,
                    seg_end = response.seg_end,
                    "Frame sent"
                );
                SendOutcome::Sent
            }
            Err(e) => {
                tracing::warn!(turn_id, error = %e, "Failed to publish frame");
                SendOutcome::Failed
            }
        }
    }
}
