//! Message bus port.
//!
//! The transport itself (broker connection, topic subscription, the thread
//! that moves bytes) lives behind this trait. Nodes only ever poll for the
//! next envelope and publish envelopes.

use thiserror::Error;

use crate::domain::Envelope;

/// Default bound of the inbound queue.
pub const DEFAULT_INBOUND_QUEUE_MAX: usize = 5000;

/// Errors surfaced by a bus transport.
#[derive(Debug, Error)]
pub enum BusError {
    /// The transport has not been started or was already closed.
    #[error("Bus transport is not running")]
    NotRunning,
}

/// Typed pub/sub access for one node.
///
/// Implementations must be `Send + Sync` so a node can be moved onto a
/// runtime task. All methods are non-blocking.
#[cfg_attr(test, mockall::automock)]
pub trait BusPort: Send + Sync {
    /// Pop the next inbound envelope, if any.
    fn read(&self) -> Option<Envelope>;

    /// Publish an envelope.
    fn send(&self, envelope: &Envelope) -> Result<(), BusError>;

    /// Bound the inbound queue. What happens on overflow is up to the
    /// transport.
    fn set_inbound_capacity(&self, capacity: usize);

    /// Begin background delivery of inbound messages.
    fn start_transport(&self) -> Result<(), BusError>;

    /// Tear down the bus connection. Must be idempotent.
    fn close(&self);
}
