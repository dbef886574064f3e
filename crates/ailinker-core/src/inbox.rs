//! Control inbox: keeps cancellation live while a node is busy.
//!
//! A node processes one message at a time, and a single message (a chat
//! reply, a synthesis call) can keep it busy for seconds. While busy, the
//! node calls [`ControlInbox::pump`] between polls: every pending
//! `request/cancel` is applied to the [`TurnTracker`] at once, and every
//! other envelope is parked in arrival order. The main loop then drains the
//! parked envelopes before reading the bus again, so per-topic order is
//! preserved.
//!
//! The backlog is bounded like the bus queue it drains: once `capacity`
//! envelopes are parked, the oldest is dropped.

use std::collections::VecDeque;

use crate::domain::{CancelRequest, Envelope, topics};
use crate::ports::{BusPort, DEFAULT_INBOUND_QUEUE_MAX};
use crate::turn_tracker::TurnTracker;

/// Apply a `request/cancel` envelope to the tracker.
///
/// Returns `true` if the envelope was a cancel request (well-formed or not).
pub fn apply_cancel(envelope: &Envelope, tracker: &TurnTracker) -> bool {
    if !envelope.is_topic(topics::REQUEST_CANCEL) {
        return false;
    }
    match envelope.decode::<CancelRequest>() {
        Ok(req) => {
            tracker.cancel(req.chat_id);
        }
        Err(e) => tracing::warn!(error = %e, node = %envelope.node, "Ignoring malformed cancel"),
    }
    true
}

/// Parked inbound envelopes plus the cancel fast-path.
#[derive(Debug)]
pub struct ControlInbox {
    backlog: VecDeque<Envelope>,
    capacity: usize,
    dropped: u64,
}

impl Default for ControlInbox {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlInbox {
    /// Create an empty inbox bounded at [`DEFAULT_INBOUND_QUEUE_MAX`].
    #[must_use]
    pub const fn new() -> Self {
        Self::with_capacity(DEFAULT_INBOUND_QUEUE_MAX)
    }

    /// Create an empty inbox parking at most `capacity` envelopes.
    #[must_use]
    pub const fn with_capacity(capacity: usize) -> Self {
        Self {
            backlog: VecDeque::new(),
            capacity,
            dropped: 0,
        }
    }

    /// Next envelope to dispatch: parked envelopes first, then the bus.
    pub fn next(&mut self, bus: &dyn BusPort) -> Option<Envelope> {
        self.backlog.pop_front().or_else(|| bus.read())
    }

    /// Drain the bus, applying cancels immediately and parking the rest.
    ///
    /// Returns the number of cancel requests applied.
    pub fn pump(&mut self, bus: &dyn BusPort, tracker: &TurnTracker) -> usize {
        let mut cancels = 0;
        while let Some(envelope) = bus.read() {
            if apply_cancel(&envelope, tracker) {
                cancels += 1;
            } else {
                self.park(envelope);
            }
        }
        cancels
    }

    fn park(&mut self, envelope: Envelope) {
        let capacity = self.capacity.max(1);
        while self.backlog.len() >= capacity {
            if let Some(oldest) = self.backlog.pop_front() {
                self.dropped += 1;
                tracing::warn!(
                    topic = %oldest.topic,
                    capacity,
                    dropped = self.dropped,
                    "Control backlog full, dropping oldest envelope"
                );
            }
        }
        self.backlog.push_back(envelope);
    }

    /// Parked envelopes discarded because the backlog was full.
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Number of parked envelopes.
    #[must_use]
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }
}
