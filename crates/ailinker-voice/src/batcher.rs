//! Turn-scoped text batching.
//!
//! The first few chunks of a turn go to synthesis straight away so speech
//! starts quickly. Later chunks are accumulated and sent in batches bounded
//! by a byte budget, which keeps the number of synthesis requests low.

use ailinker_core::{TextChunk, TurnId, TurnTracker};

/// Batching thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPolicy {
    /// Leading chunks per turn synthesized without batching.
    pub direct_n: usize,
    /// Upper bound on the byte length of one batched request.
    pub text_bytes_max: usize,
}

/// What the node should do in response to a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchAction {
    /// Synthesize `text`. `end_of_turn` marks the last call of the turn.
    Synthesize {
        turn_id: TurnId,
        text: String,
        end_of_turn: bool,
    },
    /// The turn is over and nothing is left to synthesize.
    TurnEnd { turn_id: TurnId },
}

/// Per-turn chunk accumulator.
#[derive(Debug, Clone)]
pub struct ChunkBatcher {
    policy: BatchPolicy,
    turn_id: Option<TurnId>,
    direct_sent: usize,
    accumulator: String,
}

impl ChunkBatcher {
    /// Create an empty batcher.
    #[must_use]
    pub const fn new(policy: BatchPolicy) -> Self {
        Self {
            policy,
            turn_id: None,
            direct_sent: 0,
            accumulator: String::new(),
        }
    }

    /// Batching thresholds.
    #[must_use]
    pub const fn policy(&self) -> BatchPolicy {
        self.policy
    }

    /// Bytes currently held for the active turn.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.accumulator.len()
    }

    /// Decide what to do with one chunk.
    ///
    /// Chunks of cancelled turns produce no action and leave the batcher
    /// untouched. A chunk of a different turn than the one in progress
    /// discards whatever the previous turn left behind.
    pub fn accept(&mut self, chunk: &TextChunk, tracker: &TurnTracker) -> Vec<BatchAction> {
        if tracker.is_cancelled(chunk.turn_id) {
            tracing::debug!(turn_id = chunk.turn_id, seq = chunk.seq, "Dropping chunk of cancelled turn");
            return Vec::new();
        }
        self.enter_turn(chunk.turn_id);

        let turn_id = chunk.turn_id;
        let mut actions = Vec::new();

        if !chunk.is_final() {
            if self.direct_sent < self.policy.direct_n {
                self.direct_sent += 1;
                actions.push(BatchAction::Synthesize {
                    turn_id,
                    text: chunk.text.clone(),
                    end_of_turn: false,
                });
            } else {
                self.append(turn_id, &chunk.text, &mut actions);
            }
            return actions;
        }

        self.append(turn_id, &chunk.text, &mut actions);
        let rest = std::mem::take(&mut self.accumulator);
        if rest.trim().is_empty() {
            actions.push(BatchAction::TurnEnd { turn_id });
        } else {
            actions.push(BatchAction::Synthesize {
                turn_id,
                text: rest,
                end_of_turn: true,
            });
        }
        self.reset();
        actions
    }

    /// Forget the turn in progress.
    pub fn reset(&mut self) {
        self.turn_id = None;
        self.direct_sent = 0;
        self.accumulator.clear();
    }

    fn enter_turn(&mut self, turn_id: TurnId) {
        if self.turn_id == Some(turn_id) {
            return;
        }
        if let Some(previous) = self.turn_id {
            if !self.accumulator.is_empty() {
                tracing::debug!(
                    previous,
                    turn_id,
                    discarded_bytes = self.accumulator.len(),
                    "New turn started before previous one finished"
                );
            }
        }
        self.reset();
        self.turn_id = Some(turn_id);
    }

    /// Add `text` to the accumulator, flushing first if it would overflow.
    fn append(&mut self, turn_id: TurnId, text: &str, actions: &mut Vec<BatchAction>) {
        if !self.accumulator.is_empty()
            && self.accumulator.len() + text.len() > self.policy.text_bytes_max
        {
            actions.push(BatchAction::Synthesize {
                turn_id,
                text: std::mem::take(&mut self.accumulator),
                end_of_turn: false,
            });
        }
        self.accumulator.push_str(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ailinker_core::FINAL_SEQ;

    fn batcher(direct_n: usize, text_bytes_max: usize) -> ChunkBatcher {
        ChunkBatcher::new(BatchPolicy {
            direct_n,
            text_bytes_max,
        })
    }

    fn synth(turn_id: TurnId, text: &str, end_of_turn: bool) -> BatchAction {
        BatchAction::Synthesize {
            turn_id,
            text: text.to_string(),
            end_of_turn,
        }
    }

    fn feed(b: &mut ChunkBatcher, t: &TurnTracker, chunks: &[(TurnId, i64, &str)]) -> Vec<BatchAction> {
        chunks
            .iter()
            .flat_map(|&(turn, seq, text)| b.accept(&TextChunk::new(turn, seq, text), t))
            .collect()
    }

    #[test]
    fn leading_chunks_go_direct_then_batch_until_final() {
        let tracker = TurnTracker::new();
        let mut b = batcher(2, 1024);
        let actions = feed(
            &mut b,
            &tracker,
            &[(7, 0, "Hi."), (7, 1, "How"), (7, 2, "are"), (7, 3, "you"), (7, FINAL_SEQ, "?")],
        );
        assert_eq!(
            actions,
            vec![synth(7, "Hi.", false), synth(7, "How", false), synth(7, "areyou?", true)]
        );
    }

    #[test]
    fn empty_final_with_empty_accumulator_ends_turn() {
        let tracker = TurnTracker::new();
        let mut b = batcher(2, 1024);
        let actions = feed(&mut b, &tracker, &[(3, 0, "a"), (3, 1, "b"), (3, FINAL_SEQ, "")]);
        assert_eq!(
            actions,
            vec![synth(3, "a", false), synth(3, "b", false), BatchAction::TurnEnd { turn_id: 3 }]
        );
    }

    #[test]
    fn overflow_flushes_accumulator_before_appending() {
        let tracker = TurnTracker::new();
        let mut b = batcher(0, 10);
        let actions = feed(
            &mut b,
            &tracker,
            &[(1, 0, "12345"), (1, 1, "67890"), (1, 2, "abcde"), (1, FINAL_SEQ, "")],
        );
        assert_eq!(actions, vec![synth(1, "1234567890", false), synth(1, "abcde", true)]);
    }

    #[test]
    fn oversize_final_does_not_exceed_budget() {
        let tracker = TurnTracker::new();
        let mut b = batcher(0, 10);
        let actions = feed(&mut b, &tracker, &[(1, 0, "123456"), (1, FINAL_SEQ, "abcdef")]);
        assert_eq!(actions, vec![synth(1, "123456", false), synth(1, "abcdef", true)]);
    }

    #[test]
    fn batched_requests_stay_within_budget() {
        let tracker = TurnTracker::new();
        let mut b = batcher(1, 16);
        let words = ["alpha ", "beta ", "gamma ", "delta ", "epsilon ", "zeta ", "eta ", "theta "];
        let mut chunks: Vec<(TurnId, i64, &str)> =
            words.iter().enumerate().map(|(i, w)| (4, i as i64, *w)).collect();
        chunks.push((4, FINAL_SEQ, "end"));

        let actions = feed(&mut b, &tracker, &chunks);
        let mut rebuilt = String::new();
        for (i, action) in actions.iter().enumerate() {
            let BatchAction::Synthesize { text, end_of_turn, .. } = action else {
                panic!("unexpected {action:?}");
            };
            if i > 0 {
                assert!(text.len() <= 16, "{text:?} exceeds budget");
            }
            assert_eq!(*end_of_turn, i + 1 == actions.len());
            rebuilt.push_str(text);
        }
        assert_eq!(rebuilt, words.concat() + "end");
    }

    #[test]
    fn cancelled_turn_produces_nothing_and_keeps_state() {
        let tracker = TurnTracker::new();
        let mut b = batcher(0, 1024);
        feed(&mut b, &tracker, &[(9, 0, "kept")]);
        tracker.cancel(8);

        assert!(feed(&mut b, &tracker, &[(8, 1, "late"), (8, FINAL_SEQ, "x")]).is_empty());
        assert_eq!(b.pending_bytes(), 4);
    }

    #[test]
    fn new_turn_discards_previous_accumulator_and_direct_count() {
        let tracker = TurnTracker::new();
        let mut b = batcher(1, 1024);
        feed(&mut b, &tracker, &[(1, 0, "first"), (1, 1, "stale")]);

        let actions = feed(&mut b, &tracker, &[(2, 0, "fresh"), (2, FINAL_SEQ, "!")]);
        assert_eq!(actions, vec![synth(2, "fresh", false), synth(2, "!", true)]);
    }

    #[test]
    fn empty_direct_chunk_still_counts() {
        let tracker = TurnTracker::new();
        let mut b = batcher(1, 1024);
        let actions = feed(&mut b, &tracker, &[(5, 0, ""), (5, 1, "held"), (5, FINAL_SEQ, "")]);
        assert_eq!(actions, vec![synth(5, "", false), synth(5, "held", true)]);
    }

    #[test]
    fn whitespace_only_remainder_ends_turn() {
        let tracker = TurnTracker::new();
        let mut b = batcher(0, 1024);
        let actions = feed(&mut b, &tracker, &[(6, 0, " "), (6, FINAL_SEQ, "\n")]);
        assert_eq!(actions, vec![BatchAction::TurnEnd { turn_id: 6 }]);
    }
}
