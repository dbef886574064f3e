//! TTS worker node.
//!
//! Subscribes to `request/cancel`, `request/tts` and `chat/answer`, turns
//! text into audio through a [`TtsConnection`], and publishes the audio as
//! `chat/response` frames. One message is taken off the bus per tick;
//! synthesis runs inline, with cancellation kept live by the control inbox.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use ailinker_core::{
    AppConfig, BusPort, ControlInbox, Envelope, TextChunk, TtsConnection, TtsRequest, TtsSettings,
    TurnId, TurnTracker, VoiceType, apply_cancel, topics,
};

use crate::batcher::{BatchAction, BatchPolicy, ChunkBatcher};
use crate::emitter::{FrameEmitter, FrameFormat, SendOutcome};
use crate::error::TtsNodeError;
use crate::session::{SessionConfig, SynthesisRequest, SynthesisSession};

/// Topics the TTS node consumes.
pub const SUBSCRIPTIONS: [&str; 3] = [topics::REQUEST_CANCEL, topics::REQUEST_TTS, topics::CHAT_ANSWER];

/// Times the voice list is published at launch.
const VOICE_BROADCAST_ROUNDS: usize = 3;
const VOICE_BROADCAST_ROUND_GAP: Duration = Duration::from_millis(100);
const VOICE_BROADCAST_MESSAGE_GAP: Duration = Duration::from_millis(5);

/// Static node parameters.
#[derive(Debug, Clone)]
pub struct TtsNodeConfig {
    pub name: String,
    pub tick: Duration,
    pub inbound_queue_max: usize,
    pub settings: TtsSettings,
}

impl TtsNodeConfig {
    /// Derive the node parameters from the application config.
    #[must_use]
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            name: config.node_name("tts"),
            tick: Duration::from_millis(config.node.tick_ms),
            inbound_queue_max: config.bus.inbound_queue_max,
            settings: config.tts.clone(),
        }
    }
}

/// The TTS node.
pub struct TtsNode {
    config: TtsNodeConfig,
    bus: Arc<dyn BusPort>,
    conn: Box<dyn TtsConnection>,
    tracker: Arc<TurnTracker>,
    inbox: ControlInbox,
    batcher: ChunkBatcher,
    format: FrameFormat,
    session_config: SessionConfig,
    /// Set when a failed call closed the connection.
    conn_closed: bool,
    closed: bool,
}

impl TtsNode {
    pub fn new(config: TtsNodeConfig, bus: Arc<dyn BusPort>, conn: Box<dyn TtsConnection>) -> Self {
        let batcher = ChunkBatcher::new(BatchPolicy {
            direct_n: config.settings.direct_n,
            text_bytes_max: config.settings.tts_text_bytes_max,
        });
        let format = FrameFormat::new(config.name.clone(), config.settings.audio.clone());
        let session_config = SessionConfig::from_settings(&config.settings);
        let inbox = ControlInbox::with_capacity(config.inbound_queue_max);
        Self {
            config,
            bus,
            conn,
            tracker: Arc::new(TurnTracker::new()),
            inbox,
            batcher,
            format,
            session_config,
            conn_closed: false,
            closed: false,
        }
    }

    /// Shared turn state.
    #[must_use]
    pub fn tracker(&self) -> Arc<TurnTracker> {
        Arc::clone(&self.tracker)
    }

    /// Start the bus transport and the backend, then announce voices.
    pub async fn launch(&mut self) -> Result<(), TtsNodeError> {
        self.bus.set_inbound_capacity(self.config.inbound_queue_max);
        self.bus.start_transport()?;
        self.conn.launch()?;
        self.conn.set_operation_type(self.config.settings.operation_type);
        if let Some(voice) = &self.config.settings.voice_type {
            self.conn.set_voice_type(voice);
        }
        tracing::info!(
            node = %self.config.name,
            operation = ?self.config.settings.operation_type,
            direct_n = self.config.settings.direct_n,
            text_bytes_max = self.config.settings.tts_text_bytes_max,
            frame_length = self.config.settings.frame_length,
            "TTS node launched"
        );
        self.broadcast_voice_types().await;
        Ok(())
    }

    /// Run until `shutdown` fires. The bus is closed on every exit path.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<(), TtsNodeError> {
        if let Err(e) = self.launch().await {
            self.close();
            return Err(e);
        }

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(self.config.tick) => {}
            }
            self.poll_once().await;
        }

        tracing::info!(node = %self.config.name, "TTS node shutting down");
        self.close();
        Ok(())
    }

    /// Take one message off the bus and handle it. Returns `false` when
    /// nothing was waiting.
    pub async fn poll_once(&mut self) -> bool {
        match self.inbox.next(self.bus.as_ref()) {
            Some(envelope) => {
                self.handle(envelope).await;
                true
            }
            None => false,
        }
    }

    /// Dispatch one envelope by topic.
    pub async fn handle(&mut self, envelope: Envelope) {
        match envelope.topic.as_str() {
            topics::REQUEST_CANCEL => {
                apply_cancel(&envelope, &self.tracker);
            }
            topics::REQUEST_TTS => match envelope.decode::<TtsRequest>() {
                Ok(request) => self.on_tts_request(request).await,
                Err(e) => tracing::warn!(error = %e, "Dropping malformed TTS request"),
            },
            topics::CHAT_ANSWER => match envelope.decode::<TextChunk>() {
                Ok(chunk) => self.on_chat_answer(&chunk).await,
                Err(e) => tracing::warn!(error = %e, "Dropping malformed chat answer"),
            },
            other => tracing::debug!(topic = other, "Ignoring unexpected topic"),
        }
    }

    /// Close the bus and the backend connection. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.conn.connect_close();
        self.bus.close();
    }

    async fn on_tts_request(&mut self, request: TtsRequest) {
        let turn_id = self.tracker.current();
        tracing::info!(turn_id, voice = ?request.voice_type, "Direct TTS request");
        self.synthesize(turn_id, &request.text, request.voice_type.as_deref(), false)
            .await;
    }

    async fn on_chat_answer(&mut self, chunk: &TextChunk) {
        self.tracker.observe(chunk.turn_id);
        for action in self.batcher.accept(chunk, &self.tracker) {
            match action {
                BatchAction::Synthesize {
                    turn_id,
                    text,
                    end_of_turn,
                } => self.synthesize(turn_id, &text, None, end_of_turn).await,
                BatchAction::TurnEnd { turn_id } => {
                    let mut emitter = FrameEmitter::new(
                        self.bus.as_ref(),
                        &self.tracker,
                        &mut self.inbox,
                        &self.format,
                    );
                    if emitter.send_turn_end(turn_id) == SendOutcome::Sent {
                        tracing::debug!(turn_id, "Turn ended");
                    }
                }
            }
        }
    }

    async fn synthesize(
        &mut self,
        turn_id: TurnId,
        text: &str,
        voice_type: Option<&str>,
        end_of_turn: bool,
    ) {
        let mut emitter =
            FrameEmitter::new(self.bus.as_ref(), &self.tracker, &mut self.inbox, &self.format);
        if emitter.is_cancelled(turn_id) {
            tracing::debug!(turn_id, "Skipping synthesis for cancelled turn");
            return;
        }

        let mut session = SynthesisSession::new(self.conn.as_mut(), &self.session_config);
        let request = SynthesisRequest::new(turn_id, text, end_of_turn).with_voice(voice_type);
        let ready = if self.conn_closed {
            session.reopen(&mut emitter).await
        } else {
            Ok(())
        };
        let outcome = match ready {
            Ok(()) => {
                self.conn_closed = false;
                session.execute(&request, &mut emitter).await
            }
            Err(e) => Err(e),
        };
        match outcome {
            Ok(report) => tracing::debug!(
                turn_id,
                frames_sent = report.frames_sent,
                frames_suppressed = report.frames_suppressed,
                reconnects = report.reconnects,
                "Synthesis finished"
            ),
            Err(e) => {
                tracing::warn!(turn_id, error = %e, "Synthesis failed");
                if e.closes_connection() {
                    self.conn_closed = true;
                }
                if end_of_turn {
                    emitter.send_turn_end(turn_id);
                }
            }
        }
    }

    async fn broadcast_voice_types(&mut self) {
        if self.config.settings.voice_types.is_empty() {
            return;
        }
        for _ in 0..VOICE_BROADCAST_ROUNDS {
            tokio::time::sleep(VOICE_BROADCAST_ROUND_GAP).await;
            for voice in &self.config.settings.voice_types {
                publish_voice_type(self.bus.as_ref(), &self.config.name, voice);
                tokio::time::sleep(VOICE_BROADCAST_MESSAGE_GAP).await;
            }
        }
        tracing::debug!(
            voices = self.config.settings.voice_types.len(),
            rounds = VOICE_BROADCAST_ROUNDS,
            "Voice types published"
        );
    }
}

impl Drop for TtsNode {
    fn drop(&mut self) {
        self.close();
    }
}

fn publish_voice_type(bus: &dyn BusPort, node: &str, voice: &VoiceType) {
    let result = Envelope::new(node, topics::TTS_VOICE_TYPE, voice)
        .map_err(|e| e.to_string())
        .and_then(|envelope| bus.send(&envelope).map_err(|e| e.to_string()));
    if let Err(error) = result {
        tracing::warn!(voice = %voice.id, %error, "Failed to publish voice type");
    }
}
