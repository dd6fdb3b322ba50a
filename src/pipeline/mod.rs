//! Component-based media pipeline.
//!
//! Media messages flow through components that share one push/pull
//! contract: sources (tone, test pattern) → transformers (frame encoder) →
//! multi-source sinks (audio, video). A [`Chain`] drives them once per
//! iteration; sinks track every logical source in a session registry and
//! hand frames to consumer loops through single-slot mailboxes.
//!
//! # Architecture
//!
//! ```text
//! [TestPatternSource] ────────────────────────► [VideoOutput] ──► FrameView (consumer loop)
//! [ToneSource] ──► [FrameEncoderComponent] ──► ...
//!             └──────────────────────────────► [AudioOutput] ──► AudioBackend voices
//! ```
//!
//! # Design
//!
//! - **One capability interface**: every kind implements [`Component`].
//! - **Centralized locking**: the session registry only exposes
//!   upsert-and-evict and snapshots.
//! - **Latest wins**: a mailbox holds at most one undelivered frame.
//! - **Observers after unlock**: lifecycle events fire once the registry
//!   lock is released.

pub mod chain;
pub mod clock;
pub mod component;
pub mod components;
pub mod dispatch;
pub mod id;
pub mod message;
pub mod output_queue;
pub mod session;

pub use chain::{Chain, ComponentFailure, IterationReport, Link};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use component::{Component, Diagnostics, Initialize, IterationStep, IterationTracker, Lifecycle};
pub use dispatch::{FrameRenderer, FrameView, Mailbox, PolledFrame, RenderProgram, Resize, ViewDirectory};
pub use id::{ComponentId, Iteration, LinkId, SourceId, ViewId};
pub use message::{
    AudioCodec, AudioSamples, EncodedAudio, MediaMessage, MessageSubtype, MessageType, Payload,
    PixelFormat, RawAudio, RawVideo, SampleFormat,
};
pub use output_queue::OutputQueue;
pub use session::{
    session_event_channel, SessionEvent, SessionInfo, SessionObserver, SessionRegistry,
    SessionResources, SourceDirectory, SourceSessions,
};
