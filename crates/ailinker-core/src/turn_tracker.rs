//! Turn tracker: the current turn plus the cancellation watermark.
//!
//! A turn is cancelled iff `turn_id <= cancelled_upto`. The watermark only
//! ever rises, so once a turn reads as cancelled it stays cancelled. Both
//! values are atomics: the owning node mutates them from its processing path,
//! and the watermark may also be raised while a synthesis call is mid-flush.

use std::sync::atomic::{AtomicI64, Ordering};

use crate::domain::{NO_TURN, TurnId};

/// Tracks the node's current turn and which turns are cancelled.
#[derive(Debug)]
pub struct TurnTracker {
    current: AtomicI64,
    cancelled_upto: AtomicI64,
}

impl TurnTracker {
    /// Create a tracker with no current turn and nothing cancelled.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            current: AtomicI64::new(0),
            cancelled_upto: AtomicI64::new(NO_TURN),
        }
    }

    /// Record the turn the node is now working on.
    pub fn observe(&self, turn_id: TurnId) {
        let previous = self.current.swap(turn_id, Ordering::SeqCst);
        if previous != turn_id {
            tracing::debug!(previous, current = turn_id, "Turn changed");
        }
    }

    /// The turn most recently passed to [`observe`](Self::observe).
    #[must_use]
    pub fn current(&self) -> TurnId {
        self.current.load(Ordering::SeqCst)
    }

    /// Raise the watermark to `max(cancelled_upto, turn_id)`.
    ///
    /// Lower values are ignored. Returns `true` if the watermark moved.
    pub fn cancel(&self, turn_id: TurnId) -> bool {
        let previous = self.cancelled_upto.fetch_max(turn_id, Ordering::SeqCst);
        let raised = turn_id > previous;
        if raised {
            tracing::info!(
                current = self.current(),
                cancelled_upto = turn_id,
                "Cancellation watermark raised"
            );
        }
        raised
    }

    /// Highest cancelled turn, or [`NO_TURN`] if nothing was cancelled.
    #[must_use]
    pub fn cancelled_upto(&self) -> TurnId {
        self.cancelled_upto.load(Ordering::SeqCst)
    }

    /// Whether work for `turn_id` must be suppressed.
    #[must_use]
    pub fn is_cancelled(&self, turn_id: TurnId) -> bool {
        turn_id <= self.cancelled_upto.load(Ordering::SeqCst)
    }

    /// Whether the current turn is cancelled.
    #[must_use]
    pub fn is_current_cancelled(&self) -> bool {
        self.is_cancelled(self.current())
    }
}

impl Default for TurnTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn nothing_is_cancelled_initially() {
        let tracker = TurnTracker::new();
        assert_eq!(tracker.cancelled_upto(), NO_TURN);
        assert!(!tracker.is_cancelled(0));
        assert!(!tracker.is_cancelled(1));
    }

    #[test]
    fn cancel_covers_every_turn_up_to_watermark() {
        let tracker = TurnTracker::new();
        assert!(tracker.cancel(5));
        assert!(tracker.is_cancelled(1));
        assert!(tracker.is_cancelled(5));
        assert!(!tracker.is_cancelled(6));
    }

    #[test]
    fn lower_cancel_is_ignored() {
        let tracker = TurnTracker::new();
        tracker.cancel(8);
        assert!(!tracker.cancel(3));
        assert_eq!(tracker.cancelled_upto(), 8);
        assert!(!tracker.cancel(8), "repeating the same cancel is a no-op");
    }

    #[test]
    fn cancellation_is_monotonic_over_any_sequence() {
        let tracker = TurnTracker::new();
        let sequence = [3, 1, 7, 2, 7, 4, 10, 9];
        let mut seen_cancelled = vec![false; 12];

        for k in sequence {
            tracker.cancel(k);
            for (turn, seen) in seen_cancelled.iter_mut().enumerate() {
                let now = tracker.is_cancelled(turn as TurnId);
                assert!(!(*seen && !now), "turn {turn} was un-cancelled");
                *seen = now;
            }
            // Monotonic in turn id: a cancelled turn implies all lower ones are.
            for turn in 1..12 {
                if tracker.is_cancelled(turn) {
                    assert!(tracker.is_cancelled(turn - 1));
                }
            }
        }
        assert_eq!(tracker.cancelled_upto(), 10);
    }

    #[test]
    fn observe_tracks_current_turn() {
        let tracker = TurnTracker::new();
        tracker.observe(4);
        assert_eq!(tracker.current(), 4);
        assert!(!tracker.is_current_cancelled());
        tracker.cancel(4);
        assert!(tracker.is_current_cancelled());
    }

    #[test]
    fn concurrent_cancels_keep_the_maximum() {
        let tracker = Arc::new(TurnTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let t = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for k in 0..100 {
                        t.cancel(i * 100 + k);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(tracker.cancelled_upto(), 799);
    }
}
