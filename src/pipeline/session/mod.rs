//! Multi-source session tracking for sinks.
//!
//! One session per logical source: created on the first message, refreshed
//! on every later one, evicted once idle for longer than the configured
//! timeout. Eviction is checked on every `push` instead of on a timer, so
//! detection latency follows the message rate of the busiest source.

pub mod events;
pub mod registry;
pub mod tracker;

pub use events::{session_event_channel, SessionEvent, SessionObserver};
pub use registry::{EvictedSession, SessionInfo, SessionRegistry, SourceQuery, Upsert};
pub use tracker::{SessionResources, SourceDirectory, SourceSessions};
