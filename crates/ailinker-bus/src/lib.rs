//! In-process message bus.
//!
//! [`MemoryHub`] routes envelopes by topic between [`MemoryBus`] endpoints
//! living in the same process. Each endpoint owns a bounded inbound queue;
//! when the queue is full the oldest envelope is dropped, the same overflow
//! policy as a fixed-length deque in front of a broker consumer.
//!
//! Delivery only happens to endpoints whose transport has been started and
//! not yet closed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ailinker_core::ports::{BusError, BusPort, DEFAULT_INBOUND_QUEUE_MAX};
use ailinker_core::Envelope;

/// Topic filter that matches every topic.
pub const ALL_TOPICS: &str = "#";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Endpoint state ─────────────────────────────────────────────────

#[derive(Debug)]
struct Endpoint {
    name: String,
    topics: Vec<String>,
    queue: Mutex<VecDeque<Envelope>>,
    capacity: AtomicUsize,
    running: AtomicBool,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl Endpoint {
    fn accepts(&self, topic: &str) -> bool {
        self.running.load(Ordering::SeqCst)
            && !self.closed.load(Ordering::SeqCst)
            && self.topics.iter().any(|t| t == ALL_TOPICS || t == topic)
    }

    fn deliver(&self, envelope: Envelope) {
        let capacity = self.capacity.load(Ordering::SeqCst).max(1);
        let mut queue = lock(&self.queue);
        while queue.len() >= capacity {
            queue.pop_front();
            let dropped = self.dropped.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::warn!(
                node = %self.name,
                capacity,
                dropped,
                "Inbound queue full, dropping oldest envelope"
            );
        }
        queue.push_back(envelope);
    }
}

// ── Hub ────────────────────────────────────────────────────────────

/// Topic router shared by every endpoint in the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
    endpoints: Arc<Mutex<Vec<Arc<Endpoint>>>>,
}

impl MemoryHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint subscribed to `topics`.
    ///
    /// Use [`ALL_TOPICS`] to receive everything.
    pub fn connect(&self, name: impl Into<String>, topics: &[&str]) -> MemoryBus {
        let endpoint = Arc::new(Endpoint {
            name: name.into(),
            topics: topics.iter().map(ToString::to_string).collect(),
            queue: Mutex::new(VecDeque::new()),
            capacity: AtomicUsize::new(DEFAULT_INBOUND_QUEUE_MAX),
            running: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        });
        lock(&self.endpoints).push(Arc::clone(&endpoint));
        tracing::debug!(node = %endpoint.name, topics = ?endpoint.topics, "Bus endpoint connected");
        MemoryBus {
            hub: self.clone(),
            endpoint,
        }
    }

    /// Number of endpoints that have not been closed.
    #[must_use]
    pub fn open_endpoints(&self) -> usize {
        lock(&self.endpoints).len()
    }

    fn publish(&self, envelope: &Envelope) -> usize {
        let endpoints = lock(&self.endpoints);
        let mut delivered = 0;
        for endpoint in endpoints.iter().filter(|e| e.accepts(&envelope.topic)) {
            endpoint.deliver(envelope.clone());
            delivered += 1;
        }
        delivered
    }

    fn detach(&self, endpoint: &Arc<Endpoint>) {
        lock(&self.endpoints).retain(|e| !Arc::ptr_eq(e, endpoint));
    }
}

// ── Endpoint handle ────────────────────────────────────────────────

/// One node's connection to a [`MemoryHub`].
#[derive(Debug)]
pub struct MemoryBus {
    hub: MemoryHub,
    endpoint: Arc<Endpoint>,
}

impl MemoryBus {
    /// Endpoint name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.endpoint.name
    }

    /// Envelopes waiting in the inbound queue.
    #[must_use]
    pub fn pending(&self) -> usize {
        lock(&self.endpoint.queue).len()
    }

    /// Envelopes discarded because the inbound queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.endpoint.dropped.load(Ordering::SeqCst)
    }

    /// Whether [`close`](BusPort::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.endpoint.closed.load(Ordering::SeqCst)
    }
}

impl BusPort for MemoryBus {
    fn read(&self) -> Option<Envelope> {
        lock(&self.endpoint.queue).pop_front()
    }

    fn send(&self, envelope: &Envelope) -> Result<(), BusError> {
        if self.is_closed() || !self.endpoint.running.load(Ordering::SeqCst) {
            return Err(BusError::NotRunning);
        }
        let delivered = self.hub.publish(envelope);
        tracing::trace!(topic = %envelope.topic, delivered, "Published envelope");
        Ok(())
    }

    fn set_inbound_capacity(&self, capacity: usize) {
        self.endpoint.capacity.store(capacity, Ordering::SeqCst);
    }

    fn start_transport(&self) -> Result<(), BusError> {
        if self.is_closed() {
            return Err(BusError::NotRunning);
        }
        self.endpoint.running.store(true, Ordering::SeqCst);
        tracing::info!(node = %self.endpoint.name, "Bus transport started");
        Ok(())
    }

    fn close(&self) {
        if self.endpoint.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.endpoint.running.store(false, Ordering::SeqCst);
        self.hub.detach(&self.endpoint);
        lock(&self.endpoint.queue).clear();
        tracing::info!(node = %self.endpoint.name, "Bus closed");
    }
}

impl Drop for MemoryBus {
    fn drop(&mut self) {
        self.close();
    }
}
