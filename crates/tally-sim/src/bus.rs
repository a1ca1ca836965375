//! Broadcast event bus.
//!
//! Committed engine events are numbered and fanned out to any number of
//! subscribers over a `tokio::sync::broadcast` channel. A subscriber that
//! falls more than the channel capacity behind loses the oldest events and
//! is told how many it missed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

use tally_engine::host::EventSink;
use tally_types::EngineEvent;

/// A numbered event as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusEvent {
    /// Position in the run, starting at 1.
    pub sequence: u64,
    /// The event.
    #[serde(flatten)]
    pub event: EngineEvent,
}

/// Event bus for broadcasting events to subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BusEvent>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number and broadcast `event`.
    pub fn publish(&self, event: EngineEvent) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        // No subscribers is fine.
        let _ = self.sender.send(BusEvent { sequence, event });
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }

    /// Number of events published so far.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

/// [`EventSink`] publishing to an [`EventBus`].
#[derive(Clone)]
pub struct BusSink {
    bus: EventBus,
}

impl BusSink {
    /// Sink publishing to `bus`.
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

impl EventSink for BusSink {
    fn emit(&mut self, event: &EngineEvent) {
        self.bus.publish(event.clone());
    }
}
