//! Source lifecycle notifications.
//!
//! Observers are called after the registry mutation that caused the event
//! has completed and its lock has been released, so they may freely query
//! the registry or create views from inside the callback.

use crate::pipeline::id::SourceId;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// Channel capacity for lifecycle events.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// First message from a previously unseen source.
    NewSource(SourceId),
    /// A source timed out or its sink was destroyed.
    RemovedSource(SourceId),
}

impl SessionEvent {
    pub fn source_id(&self) -> SourceId {
        match self {
            SessionEvent::NewSource(id) | SessionEvent::RemovedSource(id) => *id,
        }
    }
}

/// Receives source lifecycle notifications.
pub trait SessionObserver: Send + Sync {
    fn on_new_source(&self, source_id: SourceId);

    fn on_removed_source(&self, source_id: SourceId);
}

/// Forwards lifecycle notifications into another execution context.
impl SessionObserver for Sender<SessionEvent> {
    fn on_new_source(&self, source_id: SourceId) {
        forward(self, SessionEvent::NewSource(source_id));
    }

    fn on_removed_source(&self, source_id: SourceId) {
        forward(self, SessionEvent::RemovedSource(source_id));
    }
}

fn forward(tx: &Sender<SessionEvent>, event: SessionEvent) {
    match tx.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => {
            tracing::warn!("Session event channel full, dropping {:?}", event);
        }
        Err(TrySendError::Disconnected(_)) => {
            tracing::trace!("Session event receiver gone");
        }
    }
}

/// Create a bounded channel suitable for registering as an observer.
pub fn session_event_channel() -> (Sender<SessionEvent>, Receiver<SessionEvent>) {
    bounded(EVENT_CHANNEL_CAPACITY)
}
