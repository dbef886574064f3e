//! Chat node scenarios over the in-process bus.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;

use ailinker_bus::{MemoryBus, MemoryHub};
use ailinker_chat::node::SUBSCRIPTIONS;
use ailinker_chat::{ChatNode, ChatNodeConfig, EchoChat, ReplyOutcome};
use ailinker_core::{
    AppConfig, AsrResponse, BusPort, CancelRequest, ChatBackend, ChatPortError, ChatSegment,
    ChatSegmentStream, Envelope, FINAL_SEQ, TextChunk, topics,
};

// ── Test backends ──────────────────────────────────────────────────

/// Replies with fixed segments and counts calls.
struct ScriptedChat {
    segments: Vec<ChatSegment>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    /// Publishes a cancel for the given turn when segment `seq` is produced.
    cancel_at: Option<(i64, TurnCanceller)>,
}

#[derive(Clone)]
struct TurnCanceller {
    bus: Arc<MemoryBus>,
    chat_id: i64,
}

impl TurnCanceller {
    fn fire(&self) {
        let envelope = Envelope::new(
            "asr",
            topics::REQUEST_CANCEL,
            &CancelRequest {
                chat_id: self.chat_id,
            },
        )
        .unwrap();
        self.bus.send(&envelope).unwrap();
    }
}

impl ScriptedChat {
    fn new(texts: &[&str]) -> Self {
        let last = texts.len().saturating_sub(1);
        let segments = texts
            .iter()
            .enumerate()
            .map(|(i, t)| ChatSegment {
                seq: if i == last { FINAL_SEQ } else { i as i64 },
                text: (*t).to_string(),
            })
            .collect();
        Self {
            segments,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            cancel_at: None,
        }
    }
}

#[async_trait]
impl ChatBackend for ScriptedChat {
    async fn stream_reply(&self, prompt: &str) -> Result<ChatSegmentStream, ChatPortError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        let cancel_at = self.cancel_at.clone();
        let stream = futures_util::stream::iter(self.segments.clone()).map(move |segment| {
            if let Some((seq, canceller)) = &cancel_at {
                if *seq == segment.seq {
                    canceller.fire();
                }
            }
            Ok(segment)
        });
        Ok(stream.boxed())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Yields one segment and then never finishes.
struct StallingChat;

#[async_trait]
impl ChatBackend for StallingChat {
    async fn stream_reply(&self, _prompt: &str) -> Result<ChatSegmentStream, ChatPortError> {
        let first = futures_util::stream::once(async {
            Ok(ChatSegment {
                seq: 0,
                text: "Thinking.".into(),
            })
        });
        Ok(first.chain(futures_util::stream::pending()).boxed())
    }

    fn name(&self) -> &'static str {
        "stalling"
    }
}

/// Yields one segment, then ends without a final one. The turn can be
/// cancelled as the stream runs dry.
struct TruncatedChat {
    cancel_on_end: Option<TurnCanceller>,
}

#[async_trait]
impl ChatBackend for TruncatedChat {
    async fn stream_reply(&self, _prompt: &str) -> Result<ChatSegmentStream, ChatPortError> {
        let first = futures_util::stream::iter(vec![Ok(ChatSegment {
            seq: 0,
            text: "Partial.".into(),
        })]);
        let cancel_on_end = self.cancel_on_end.clone();
        let end = futures_util::stream::unfold(cancel_on_end, |canceller| async move {
            if let Some(canceller) = canceller {
                canceller.fire();
            }
            None::<(Result<ChatSegment, ChatPortError>, Option<TurnCanceller>)>
        });
        Ok(first.chain(end).boxed())
    }

    fn name(&self) -> &'static str {
        "truncated"
    }
}

/// Always refuses.
struct FailingChat;

#[async_trait]
impl ChatBackend for FailingChat {
    async fn stream_reply(&self, _prompt: &str) -> Result<ChatSegmentStream, ChatPortError> {
        Err(ChatPortError::Status {
            status: 503,
            body: "busy".into(),
        })
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

// ── Harness ────────────────────────────────────────────────────────

struct Harness {
    _hub: MemoryHub,
    asr: Arc<MemoryBus>,
    tts: MemoryBus,
    node: ChatNode,
}

impl Harness {
    fn launched(backend: Arc<dyn ChatBackend>) -> Self {
        let (hub, asr) = Self::bus();
        Self::with_bus(hub, asr, backend)
    }

    fn bus() -> (MemoryHub, Arc<MemoryBus>) {
        let hub = MemoryHub::new();
        let asr = Arc::new(hub.connect("asr", &[]));
        asr.start_transport().unwrap();
        (hub, asr)
    }

    fn with_bus(hub: MemoryHub, asr: Arc<MemoryBus>, backend: Arc<dyn ChatBackend>) -> Self {
        let tts = hub.connect("tts", &[topics::CHAT_ANSWER]);
        tts.start_transport().unwrap();
        let config = ChatNodeConfig::from_app(&AppConfig::default());
        let bus = Arc::new(hub.connect("chat", &SUBSCRIPTIONS));
        let node = ChatNode::new(config, bus, backend);
        node.launch().unwrap();
        Self {
            _hub: hub,
            asr,
            tts,
            node,
        }
    }

    fn utterance(&self, chat_id: i64, text: &str) {
        let msg = AsrResponse {
            chat_id,
            text: text.into(),
        };
        self.asr
            .send(&Envelope::new("asr", topics::ASR_RESPONSE, &msg).unwrap())
            .unwrap();
    }

    fn cancel(&self, chat_id: i64) {
        TurnCanceller {
            bus: Arc::clone(&self.asr),
            chat_id,
        }
        .fire();
    }

    async fn drain(&mut self) {
        while self.node.poll_once().await {}
    }

    fn answers(&self) -> Vec<TextChunk> {
        std::iter::from_fn(|| self.tts.read())
            .map(|e| e.decode::<TextChunk>().unwrap())
            .collect()
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn publishes_reply_segments_in_order() {
    let backend = Arc::new(ScriptedChat::new(&["Hi there.", " How can I help?", ""]));
    let mut h = Harness::launched(backend.clone());
    h.utterance(1, "hello");
    h.drain().await;

    let answers = h.answers();
    let seqs: Vec<(i64, i64, &str)> = answers
        .iter()
        .map(|c| (c.turn_id, c.seq, c.text.as_str()))
        .collect();
    assert_eq!(
        seqs,
        vec![(1, 0, "Hi there."), (1, 1, " How can I help?"), (1, FINAL_SEQ, "")]
    );
    assert_eq!(*backend.prompts.lock().unwrap(), vec!["hello"]);
}

#[tokio::test(start_paused = true)]
async fn cancelled_turn_never_reaches_backend() {
    let backend = Arc::new(ScriptedChat::new(&["Sure.", ""]));
    let mut h = Harness::launched(backend.clone());
    h.cancel(5);
    h.utterance(5, "tell me a story");
    h.drain().await;

    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    assert!(h.answers().is_empty());

    h.utterance(6, "never mind");
    h.drain().await;
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.answers().last().unwrap().seq, FINAL_SEQ);
}

#[tokio::test(start_paused = true)]
async fn cancel_mid_reply_stops_publishing() {
    let (hub, asr) = Harness::bus();
    let mut backend = ScriptedChat::new(&["One.", " Two.", " Three.", ""]);
    backend.cancel_at = Some((
        1,
        TurnCanceller {
            bus: Arc::clone(&asr),
            chat_id: 2,
        },
    ));
    let mut h = Harness::with_bus(hub, asr, Arc::new(backend));

    let outcome = h
        .node
        .reply(&AsrResponse {
            chat_id: 2,
            text: "count".into(),
        })
        .await;

    assert_eq!(outcome, ReplyOutcome::Cancelled { chunks: 1 });
    let answers = h.answers();
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0].text, "One.");
    h.drain().await;
    assert!(h.answers().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancel_while_backend_stalls_drops_stream() {
    let mut h = Harness::launched(Arc::new(StallingChat));
    let canceller = TurnCanceller {
        bus: Arc::clone(&h.asr),
        chat_id: 3,
    };

    let request = AsrResponse {
        chat_id: 3,
        text: "hmm".into(),
    };
    let reply = h.node.reply(&request);
    let cancel_later = async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        canceller.fire();
    };
    let (outcome, ()) = tokio::join!(reply, cancel_later);

    assert_eq!(outcome, ReplyOutcome::Cancelled { chunks: 1 });
    assert_eq!(h.answers().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn backend_failure_closes_turn_with_empty_final() {
    let mut h = Harness::launched(Arc::new(FailingChat));
    h.utterance(4, "hello");
    h.drain().await;

    let answers = h.answers();
    assert_eq!(answers.len(), 1);
    assert_eq!((answers[0].turn_id, answers[0].seq), (4, FINAL_SEQ));
    assert!(answers[0].text.is_empty());
}

#[tokio::test(start_paused = true)]
async fn echo_backend_round_trip() {
    let mut h = Harness::launched(Arc::new(EchoChat::new(1)));
    h.utterance(9, "Good morning. How are you?");
    h.drain().await;

    let answers = h.answers();
    let text: String = answers.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(text, "Good morning. How are you?");
    assert!(answers.iter().all(|c| c.turn_id == 9));
    assert_eq!(answers.last().unwrap().seq, FINAL_SEQ);
}

#[tokio::test(start_paused = true)]
async fn node_tracks_current_turn() {
    let mut h = Harness::launched(Arc::new(EchoChat::new(1)));
    h.utterance(12, "hi");
    h.drain().await;
    assert_eq!(h.node.tracker().current(), 12);
}

#[tokio::test(start_paused = true)]
async fn truncated_stream_closes_turn_with_empty_final() {
    let mut h = Harness::launched(Arc::new(TruncatedChat { cancel_on_end: None }));
    let outcome = h
        .node
        .reply(&AsrResponse {
            chat_id: 8,
            text: "go".into(),
        })
        .await;

    assert_eq!(outcome, ReplyOutcome::Completed { chunks: 2 });
    let seqs: Vec<i64> = h.answers().iter().map(|c| c.seq).collect();
    assert_eq!(seqs, vec![0, FINAL_SEQ]);
}

#[tokio::test(start_paused = true)]
async fn truncated_stream_of_cancelled_turn_reports_cancelled() {
    let (hub, asr) = Harness::bus();
    let backend = TruncatedChat {
        cancel_on_end: Some(TurnCanceller {
            bus: Arc::clone(&asr),
            chat_id: 8,
        }),
    };
    let mut h = Harness::with_bus(hub, asr, Arc::new(backend));
    let outcome = h
        .node
        .reply(&AsrResponse {
            chat_id: 8,
            text: "go".into(),
        })
        .await;

    assert_eq!(outcome, ReplyOutcome::Cancelled { chunks: 1 });
    let answers = h.answers();
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0].seq, 0);
}
