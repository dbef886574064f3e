//! Sentence segmentation of streamed reply text.
//!
//! Backends stream reply text in arbitrary deltas (tokens, words). The TTS
//! side wants whole sentences, so deltas are cut at sentence punctuation
//! once enough text is pending, and every segment gets the next sequence
//! number. The stream always ends with one [`FINAL_SEQ`] segment carrying
//! whatever text is left, possibly none.

use std::collections::VecDeque;

use futures_util::{Stream, StreamExt};

use ailinker_core::{ChatPortError, ChatSegment, ChatSegmentStream, FINAL_SEQ};

/// Characters that may close a segment.
pub const SENTENCE_BOUNDARIES: [char; 9] = ['.', '!', '?', ';', '。', '！', '？', '；', '\n'];

/// Incremental sentence splitter.
#[derive(Debug, Clone)]
pub struct Segmenter {
    min_chars: usize,
    pending: String,
    pending_chars: usize,
    next_seq: i64,
}

impl Segmenter {
    #[must_use]
    pub const fn new(min_chars: usize) -> Self {
        Self {
            min_chars,
            pending: String::new(),
            pending_chars: 0,
            next_seq: 0,
        }
    }

    /// Feed a delta and return the segments it completes.
    pub fn push(&mut self, delta: &str) -> Vec<ChatSegment> {
        let mut segments = Vec::new();
        for c in delta.chars() {
            self.pending.push(c);
            self.pending_chars += 1;
            if SENTENCE_BOUNDARIES.contains(&c) && self.pending_chars >= self.min_chars {
                segments.push(self.take(self.next_seq));
                self.next_seq += 1;
            }
        }
        segments
    }

    /// Close the reply: the remaining text as the final segment.
    pub fn finish(&mut self) -> ChatSegment {
        let segment = self.take(FINAL_SEQ);
        self.next_seq = 0;
        segment
    }

    fn take(&mut self, seq: i64) -> ChatSegment {
        self.pending_chars = 0;
        ChatSegment {
            seq,
            text: std::mem::take(&mut self.pending),
        }
    }
}

struct SegmentState {
    deltas: futures_util::stream::BoxStream<'static, Result<String, ChatPortError>>,
    segmenter: Segmenter,
    ready: VecDeque<ChatSegment>,
    done: bool,
}

/// Turn a stream of text deltas into a sequenced segment stream.
///
/// An error from `deltas` is passed through and ends the stream without a
/// final segment.
pub fn segment_stream<S>(deltas: S, min_chars: usize) -> ChatSegmentStream
where
    S: Stream<Item = Result<String, ChatPortError>> + Send + 'static,
{
    let state = SegmentState {
        deltas: deltas.boxed(),
        segmenter: Segmenter::new(min_chars),
        ready: VecDeque::new(),
        done: false,
    };

    futures_util::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(segment) = st.ready.pop_front() {
                return Some((Ok(segment), st));
            }
            if st.done {
                return None;
            }
            match st.deltas.next().await {
                Some(Ok(delta)) => {
                    let segments = st.segmenter.push(&delta);
                    st.ready.extend(segments);
                }
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(e), st));
                }
                None => {
                    st.done = true;
                    let last = st.segmenter.finish();
                    st.ready.push_back(last);
                }
            }
        }
    })
    .boxed()
}
