//! Chat worker node.
//!
//! Consumes `asr/response` utterances, asks the chat backend for a reply
//! and publishes it as sequenced `chat/answer` chunks. Cancellation is
//! honoured twice: a turn cancelled before its utterance arrives never
//! reaches the backend, and a cancel arriving mid-reply stops publishing
//! and drops the backend stream.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use ailinker_core::{
    AppConfig, AsrResponse, BusPort, ChatBackend, ChatSegmentStream, ControlInbox, Envelope,
    FINAL_SEQ, TextChunk, TurnId, TurnTracker, apply_cancel, topics,
};

use crate::error::ChatNodeError;

/// Topics the chat node consumes.
pub const SUBSCRIPTIONS: [&str; 2] = [topics::REQUEST_CANCEL, topics::ASR_RESPONSE];

/// Static node parameters.
#[derive(Debug, Clone)]
pub struct ChatNodeConfig {
    pub name: String,
    pub tick: Duration,
    pub inbound_queue_max: usize,
}

impl ChatNodeConfig {
    #[must_use]
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            name: config.node_name("chat"),
            tick: Duration::from_millis(config.node.tick_ms),
            inbound_queue_max: config.bus.inbound_queue_max,
        }
    }
}

/// How a reply ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// The final chunk was published.
    Completed { chunks: usize },
    /// The turn was cancelled before the backend was asked.
    Skipped,
    /// The turn was cancelled while the reply was streaming.
    Cancelled { chunks: usize },
    /// The backend failed; the turn was closed with an empty final chunk.
    Failed,
}

/// The chat node.
pub struct ChatNode {
    config: ChatNodeConfig,
    bus: Arc<dyn BusPort>,
    backend: Arc<dyn ChatBackend>,
    tracker: Arc<TurnTracker>,
    inbox: ControlInbox,
    closed: bool,
}

impl ChatNode {
    pub fn new(config: ChatNodeConfig, bus: Arc<dyn BusPort>, backend: Arc<dyn ChatBackend>) -> Self {
        let inbox = ControlInbox::with_capacity(config.inbound_queue_max);
        Self {
            config,
            bus,
            backend,
            tracker: Arc::new(TurnTracker::new()),
            inbox,
            closed: false,
        }
    }

    /// Shared turn state.
    #[must_use]
    pub fn tracker(&self) -> Arc<TurnTracker> {
        Arc::clone(&self.tracker)
    }

    /// Start the bus transport.
    pub fn launch(&self) -> Result<(), ChatNodeError> {
        self.bus.set_inbound_capacity(self.config.inbound_queue_max);
        self.bus.start_transport()?;
        tracing::info!(node = %self.config.name, backend = self.backend.name(), "Chat node launched");
        Ok(())
    }

    /// Run until `shutdown` fires. The bus is closed on every exit path.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<(), ChatNodeError> {
        if let Err(e) = self.launch() {
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

        tracing::info!(node = %self.config.name, "Chat node shutting down");
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
            topics::ASR_RESPONSE => match envelope.decode::<AsrResponse>() {
                Ok(utterance) => {
                    self.reply(&utterance).await;
                }
                Err(e) => tracing::warn!(error = %e, "Dropping malformed ASR response"),
            },
            other => tracing::debug!(topic = other, "Ignoring unexpected topic"),
        }
    }

    /// Answer one utterance.
    pub async fn reply(&mut self, utterance: &AsrResponse) -> ReplyOutcome {
        let chat_id = utterance.chat_id;
        self.tracker.observe(chat_id);
        tracing::info!(chat_id, text = %utterance.text, "User utterance");

        if self.tracker.is_cancelled(chat_id) {
            tracing::info!(
                chat_id,
                cancelled_upto = self.tracker.cancelled_upto(),
                "Turn already cancelled, skipping chat request"
            );
            return ReplyOutcome::Skipped;
        }

        match self.backend.stream_reply(&utterance.text).await {
            Ok(stream) => self.relay(chat_id, stream).await,
            Err(e) => {
                tracing::warn!(chat_id, error = %e, "Chat request failed");
                self.close_turn(chat_id);
                ReplyOutcome::Failed
            }
        }
    }

    /// Close the bus. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.bus.close();
    }

    async fn relay(&mut self, chat_id: TurnId, mut stream: ChatSegmentStream) -> ReplyOutcome {
        let mut chunks = 0;
        loop {
            let item = tokio::select! {
                item = stream.next() => item,
                () = tokio::time::sleep(self.config.tick) => {
                    if self.cancelled(chat_id) {
                        return self.abandon(chat_id, chunks);
                    }
                    continue;
                }
            };

            if self.cancelled(chat_id) {
                return self.abandon(chat_id, chunks);
            }

            match item {
                Some(Ok(segment)) => {
                    let chunk = TextChunk::new(chat_id, segment.seq, segment.text);
                    tracing::info!(chat_id, seq = chunk.seq, text = %chunk.text, "Reply segment");
                    self.publish(&chunk);
                    chunks += 1;
                    if chunk.is_final() {
                        return ReplyOutcome::Completed { chunks };
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(chat_id, error = %e, "Chat stream failed");
                    self.close_turn(chat_id);
                    return ReplyOutcome::Failed;
                }
                None => {
                    tracing::debug!(chat_id, "Chat stream ended without final segment");
                    if self.close_turn(chat_id) {
                        return ReplyOutcome::Completed { chunks: chunks + 1 };
                    }
                    return self.abandon(chat_id, chunks);
                }
            }
        }
    }

    fn cancelled(&mut self, chat_id: TurnId) -> bool {
        self.inbox.pump(self.bus.as_ref(), &self.tracker);
        self.tracker.is_cancelled(chat_id)
    }

    fn abandon(&self, chat_id: TurnId, chunks: usize) -> ReplyOutcome {
        tracing::info!(chat_id, chunks, "Turn cancelled mid-reply, dropping stream");
        ReplyOutcome::Cancelled { chunks }
    }

    /// Publish an empty final chunk so downstream nodes can end the turn.
    /// Returns `false` when the turn is cancelled and nothing was sent.
    fn close_turn(&self, chat_id: TurnId) -> bool {
        if self.tracker.is_cancelled(chat_id) {
            return false;
        }
        self.publish(&TextChunk::new(chat_id, FINAL_SEQ, ""));
        true
    }

    fn publish(&self, chunk: &TextChunk) {
        let result = Envelope::new(&self.config.name, topics::CHAT_ANSWER, chunk)
            .map_err(|e| e.to_string())
            .and_then(|envelope| self.bus.send(&envelope).map_err(|e| e.to_string()));
        if let Err(error) = result {
            tracing::warn!(chat_id = chunk.turn_id, seq = chunk.seq, %error, "Failed to publish chat answer");
        }
    }
}

impl Drop for ChatNode {
    fn drop(&mut self) {
        self.close();
    }
}
