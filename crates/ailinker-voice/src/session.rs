//! Streaming synthesis session.
//!
//! One [`SynthesisSession`] drives one `execute` call against the TTS
//! connection: submit the text, poll result records, re-frame audio as it
//! arrives, survive a mid-stream disconnect, and flush the tail on
//! completion.
//!
//! ```text
//! Idle ──submit──► Submitted ──STARTED/AUDIO──► Streaming ──COMPLETE──► FrameFlush ──► Done
//!                      │                            │
//!                      └────────DISCONNECT──────────┴──► Disconnected ──► Reconnecting
//!                                                                           │   │
//!                                                             CONNECTED ◄───┘   └──► Failed (timeout)
//! ```
//!
//! A failed session never takes the node down; the error is returned to the
//! caller, which logs it and moves on. Errors that leave the connection
//! closed say so through [`SynthesisError::closes_connection`], and the
//! caller runs [`SynthesisSession::reopen`] before the next submission.

use std::time::Duration;

use tokio::time::Instant;

use ailinker_core::{
    ConnectionStatus, OperationType, SynthesisPhase, TtsConnection, TtsResultRecord, TtsSettings,
    TurnId,
};

use crate::emitter::{FrameEmitter, FrameMark, SendOutcome};
use crate::error::SynthesisError;
use crate::framer::AudioFramer;

// ── Configuration ──────────────────────────────────────────────────

/// Timing and framing parameters shared by every session of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub frame_length: usize,
    pub reconnect_timeout: Duration,
    pub poll_interval: Duration,
    pub frame_send_interval: Duration,
}

impl SessionConfig {
    #[must_use]
    pub const fn from_settings(settings: &TtsSettings) -> Self {
        Self {
            frame_length: settings.frame_length,
            reconnect_timeout: Duration::from_millis(settings.reconnect_timeout_ms),
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            frame_send_interval: Duration::from_millis(settings.frame_send_interval_ms),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_settings(&TtsSettings::default())
    }
}

/// One text submission.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisRequest<'t> {
    pub turn_id: TurnId,
    pub text: &'t str,
    pub voice_type: Option<&'t str>,
    pub operation: Option<OperationType>,
    /// Whether the final frame closes the turn.
    pub end_of_turn: bool,
}

impl<'t> SynthesisRequest<'t> {
    #[must_use]
    pub const fn new(turn_id: TurnId, text: &'t str, end_of_turn: bool) -> Self {
        Self {
            turn_id,
            text,
            voice_type: None,
            operation: None,
            end_of_turn,
        }
    }

    /// Switch voice before submitting.
    #[must_use]
    pub const fn with_voice(mut self, voice_type: Option<&'t str>) -> Self {
        self.voice_type = voice_type;
        self
    }

    /// Switch delivery mode before submitting.
    #[must_use]
    pub const fn with_operation(mut self, operation: Option<OperationType>) -> Self {
        self.operation = operation;
        self
    }

    const fn final_mark(&self) -> FrameMark {
        if self.end_of_turn {
            FrameMark::TurnEnd
        } else {
            FrameMark::SegmentEnd
        }
    }
}

// ── State ──────────────────────────────────────────────────────────

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Submitted,
    Streaming,
    Disconnected,
    Reconnecting,
    FrameFlush,
    Done,
    Failed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Submitted => write!(f, "Submitted"),
            Self::Streaming => write!(f, "Streaming"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Reconnecting => write!(f, "Reconnecting"),
            Self::FrameFlush => write!(f, "FrameFlush"),
            Self::Done => write!(f, "Done"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// What one call produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SynthesisReport {
    pub frames_sent: usize,
    pub frames_suppressed: usize,
    pub audio_bytes: usize,
    pub reconnects: u32,
}

// ── Session ────────────────────────────────────────────────────────

/// Drives a single synthesis call.
pub struct SynthesisSession<'c> {
    conn: &'c mut dyn TtsConnection,
    config: &'c SessionConfig,
    framer: AudioFramer,
    state: SessionState,
    report: SynthesisReport,
}

impl<'c> SynthesisSession<'c> {
    pub fn new(conn: &'c mut dyn TtsConnection, config: &'c SessionConfig) -> Self {
        Self {
            conn,
            config,
            framer: AudioFramer::new(config.frame_length),
            state: SessionState::Idle,
            report: SynthesisReport::default(),
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Synthesize `request.text` and publish its frames through `emitter`.
    ///
    /// Empty or whitespace-only text is a no-op: nothing is submitted and
    /// nothing is published.
    pub async fn execute(
        &mut self,
        request: &SynthesisRequest<'_>,
        emitter: &mut FrameEmitter<'_>,
    ) -> Result<SynthesisReport, SynthesisError> {
        if request.text.trim().is_empty() {
            tracing::debug!(turn_id = request.turn_id, "Skipping empty synthesis text");
            return Ok(self.report);
        }

        if let Some(voice) = request.voice_type {
            self.conn.set_voice_type(voice);
        }
        if let Some(operation) = request.operation {
            self.conn.set_operation_type(operation);
        }

        self.framer.clear();
        if let Err(e) = self.conn.execute(request.text) {
            self.transition(SessionState::Failed);
            return Err(e.into());
        }
        self.transition(SessionState::Submitted);
        tracing::debug!(
            turn_id = request.turn_id,
            bytes = request.text.len(),
            end_of_turn = request.end_of_turn,
            "Text submitted for synthesis"
        );

        let outcome = self.stream(request, emitter).await;
        match &outcome {
            Ok(_) => self.transition(SessionState::Done),
            Err(_) => {
                self.framer.clear();
                self.transition(SessionState::Failed);
            }
        }
        outcome
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            tracing::trace!(from = %self.state, to = %next, "Synthesis session transition");
            self.state = next;
        }
    }

    async fn stream(
        &mut self,
        request: &SynthesisRequest<'_>,
        emitter: &mut FrameEmitter<'_>,
    ) -> Result<SynthesisReport, SynthesisError> {
        loop {
            tokio::time::sleep(self.config.poll_interval).await;
            emitter.poll_control();

            let Some(record) = self.conn.get_result() else {
                continue;
            };

            if self.handle_record(record, request, emitter).await? {
                return Ok(self.report);
            }
        }
    }

    /// Returns `true` once the call is complete.
    async fn handle_record(
        &mut self,
        record: TtsResultRecord,
        request: &SynthesisRequest<'_>,
        emitter: &mut FrameEmitter<'_>,
    ) -> Result<bool, SynthesisError> {
        let Some(status) = record.status else {
            tracing::warn!(turn_id = request.turn_id, "TTS result record without status");
            self.conn.connect_close();
            return Err(SynthesisError::Protocol("result record without status".into()));
        };

        match status {
            ConnectionStatus::Disconnect => {
                tracing::warn!(turn_id = request.turn_id, "TTS connection lost mid-stream");
                self.framer.clear();
                self.transition(SessionState::Disconnected);
                self.reconnect(emitter).await?;
                self.report.reconnects += 1;
                self.transition(SessionState::Streaming);
                Ok(false)
            }
            ConnectionStatus::ReqOk => {
                let Some(result) = record.result else {
                    self.conn.connect_close();
                    return Err(SynthesisError::Protocol("REQ_OK record without result".into()));
                };
                match result.phase() {
                    Some(SynthesisPhase::Started) => {
                        self.transition(SessionState::Streaming);
                        Ok(false)
                    }
                    Some(SynthesisPhase::Audio) => {
                        self.transition(SessionState::Streaming);
                        self.report.audio_bytes += result.data.len();
                        let frames = self.framer.push(&result.data);
                        self.send_frames(request.turn_id, frames, None, emitter).await;
                        Ok(false)
                    }
                    Some(SynthesisPhase::Complete) => {
                        self.transition(SessionState::FrameFlush);
                        self.report.audio_bytes += result.data.len();
                        let frames = self.framer.flush(&result.data);
                        if frames.is_empty() {
                            self.tally(emitter.send_marker(request.turn_id, request.final_mark()));
                        } else {
                            self.send_frames(request.turn_id, frames, Some(request.final_mark()), emitter)
                                .await;
                        }
                        tracing::debug!(
                            turn_id = request.turn_id,
                            frames_sent = self.report.frames_sent,
                            audio_bytes = self.report.audio_bytes,
                            "Synthesis complete"
                        );
                        Ok(true)
                    }
                    Some(SynthesisPhase::Failed) => {
                        tracing::warn!(turn_id = request.turn_id, "TTS backend reported failure");
                        Err(SynthesisError::BackendFailed)
                    }
                    None => {
                        tracing::debug!(code = result.status, "Ignoring unknown synthesis phase");
                        Ok(false)
                    }
                }
            }
            other => {
                tracing::debug!(status = ?other, "Ignoring connection status while streaming");
                Ok(false)
            }
        }
    }

    /// Publish frames with pacing. When `last` is set the final frame
    /// carries that mark; otherwise every frame is a continuation.
    async fn send_frames(
        &mut self,
        turn_id: TurnId,
        frames: Vec<Vec<u8>>,
        last: Option<FrameMark>,
        emitter: &mut FrameEmitter<'_>,
    ) {
        let count = frames.len();
        for (i, frame) in frames.into_iter().enumerate() {
            let is_last = i + 1 == count;
            let mark = match last {
                Some(mark) if is_last => mark,
                _ => FrameMark::Continue,
            };
            self.tally(emitter.send_frame(turn_id, &frame, mark));
            if !(is_last && last.is_some()) && !self.config.frame_send_interval.is_zero() {
                tokio::time::sleep(self.config.frame_send_interval).await;
            }
        }
    }

    fn tally(&mut self, outcome: SendOutcome) {
        match outcome {
            SendOutcome::Sent => self.report.frames_sent += 1,
            SendOutcome::Suppressed => self.report.frames_suppressed += 1,
            SendOutcome::Failed => {}
        }
    }

    /// Bring a closed connection back before the next submission.
    ///
    /// Same bounded wait as a mid-stream reconnect. Nothing is submitted and
    /// nothing is published.
    pub async fn reopen(&mut self, emitter: &mut FrameEmitter<'_>) -> Result<(), SynthesisError> {
        tracing::info!("Reopening closed TTS connection");
        self.transition(SessionState::Disconnected);
        let outcome = self.reconnect(emitter).await;
        match &outcome {
            Ok(()) => self.transition(SessionState::Idle),
            Err(_) => self.transition(SessionState::Failed),
        }
        outcome
    }

    /// Wait for the connection to come back, bounded by the reconnect timeout.
    async fn reconnect(&mut self, emitter: &mut FrameEmitter<'_>) -> Result<(), SynthesisError> {
        self.conn.auto_connect();
        self.transition(SessionState::Reconnecting);
        let started = Instant::now();

        loop {
            tokio::time::sleep(self.config.poll_interval).await;
            emitter.poll_control();

            if let Some(record) = self.conn.get_result() {
                match record.status {
                    Some(ConnectionStatus::Connected) => {
                        tracing::info!(elapsed_ms = started.elapsed().as_millis(), "TTS reconnected");
                        return Ok(());
                    }
                    Some(status) => {
                        tracing::debug!(status = ?status, "Discarding record while reconnecting");
                    }
                    None => {
                        tracing::warn!("TTS result record without status while reconnecting");
                        self.conn.connect_close();
                        return Err(SynthesisError::Protocol("result record without status".into()));
                    }
                }
            }

            if started.elapsed() >= self.config.reconnect_timeout {
                tracing::error!(
                    timeout_ms = self.config.reconnect_timeout.as_millis(),
                    "TTS reconnect timed out"
                );
                self.conn.connect_close();
                return Err(SynthesisError::ReconnectTimeout(self.config.reconnect_timeout));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_final_mark_follows_end_of_turn() {
        assert_eq!(SynthesisRequest::new(1, "a", true).final_mark(), FrameMark::TurnEnd);
        assert_eq!(SynthesisRequest::new(1, "a", false).final_mark(), FrameMark::SegmentEnd);
    }

    #[test]
    fn config_from_settings() {
        let config = SessionConfig::default();
        assert_eq!(config.frame_length, 512);
        assert_eq!(config.reconnect_timeout, Duration::from_secs(10));
        assert_eq!(config.poll_interval, Duration::from_millis(10));
        assert_eq!(config.frame_send_interval, Duration::from_millis(5));
    }

    #[test]
    fn closing_errors() {
        assert!(SynthesisError::Protocol("x".into()).closes_connection());
        assert!(SynthesisError::ReconnectTimeout(Duration::from_secs(1)).closes_connection());
        assert!(!SynthesisError::BackendFailed.closes_connection());
    }

    #[test]
    fn state_display() {
        assert_eq!(SessionState::FrameFlush.to_string(), "FrameFlush");
        assert_eq!(SessionState::Reconnecting.to_string(), "Reconnecting");
    }
}
