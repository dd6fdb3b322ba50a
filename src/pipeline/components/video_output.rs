//! Multi-source video sink.
//!
//! Frames are tracked per source (see [`crate::pipeline::session`]) and
//! handed to consumer-side [`FrameView`]s through single-slot mailboxes.
//! When a source times out, every view of it is detached.

use crate::config::OutputConfig;
use crate::error::{MediaFlowError, Result};
use crate::pipeline::clock::{Clock, MonotonicClock};
use crate::pipeline::component::{Component, Diagnostics, Initialize, IterationTracker, Lifecycle};
use crate::pipeline::dispatch::{FrameView, ViewDirectory};
use crate::pipeline::id::{Iteration, SourceId};
use crate::pipeline::message::MediaMessage;
use crate::pipeline::session::{SessionObserver, SessionResources, SourceDirectory, SourceSessions};
use std::sync::Arc;

/// Per-source statistics kept as the session resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoFeed {
    pub frames: u64,
    pub geometry: Option<(u32, u32)>,
}

/// Hands out feeds and detaches views when a feed is released.
struct VideoFeeds {
    views: Arc<ViewDirectory>,
}

impl SessionResources for VideoFeeds {
    type Handle = VideoFeed;

    fn acquire(&mut self, _source_id: SourceId) -> Result<VideoFeed> {
        Ok(VideoFeed::default())
    }

    fn release(&mut self, source_id: SourceId, feed: VideoFeed) {
        let detached = self.views.detach_source(source_id);
        tracing::debug!(
            "Video feed {} closed after {} frames, {} views detached",
            source_id,
            feed.frames,
            detached
        );
    }
}

pub struct VideoOutput {
    name: String,
    views: Arc<ViewDirectory>,
    observers: Vec<Arc<dyn SessionObserver>>,
    clock: Arc<dyn Clock>,
    sessions: Option<SourceSessions<VideoFeeds>>,
    iterations: IterationTracker,
    lifecycle: Lifecycle,
    diagnostics: Diagnostics,
}

impl VideoOutput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            views: Arc::new(ViewDirectory::new()),
            observers: Vec::new(),
            clock: Arc::new(MonotonicClock::new()),
            sessions: None,
            iterations: IterationTracker::new(),
            lifecycle: Lifecycle::default(),
            diagnostics: Diagnostics::default(),
        }
    }

    /// Use `clock` for activity timestamps. Takes effect at the next `init`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register a lifecycle observer. Takes effect at the next `init`.
    pub fn add_observer(&mut self, observer: Arc<dyn SessionObserver>) {
        self.observers.push(observer);
    }

    /// Shared view registry, for consumers living in another context.
    pub fn view_directory(&self) -> Arc<ViewDirectory> {
        self.views.clone()
    }

    /// Create a consumer view of `source_id`.
    pub fn create_view(&self, source_id: SourceId) -> FrameView {
        self.views.attach(source_id)
    }

    /// Query handle for the active sources, `None` before `init`.
    pub fn source_directory(&self) -> Option<SourceDirectory> {
        self.sessions.as_ref().map(SourceSessions::directory)
    }

    pub fn feed(&self, source_id: SourceId) -> Option<VideoFeed> {
        self.sessions
            .as_ref()?
            .registry()
            .with_resource(source_id, |feed| feed.clone())
    }

    fn try_push(&mut self, iteration: Iteration, message: MediaMessage) -> Result<()> {
        self.lifecycle.ensure_initialized(&self.name)?;
        self.iterations.check(iteration)?;

        let video = message.as_raw_video().ok_or_else(|| {
            MediaFlowError::invalid_message(format!(
                "{} accepts raw video, got {:?}",
                self.name,
                message.message_type()
            ))
        })?;
        let geometry = (video.width(), video.height());

        let sessions = self
            .sessions
            .as_mut()
            .ok_or_else(|| MediaFlowError::config(format!("{} has no sessions", self.name)))?;
        sessions.record_activity(message.source_id(), |feed| {
            feed.frames += 1;
            feed.geometry = Some(geometry);
        })?;
        self.iterations.commit(iteration);

        let delivered = self.views.dispatch(&message);
        tracing::trace!(
            "{}: frame from source {} to {} views",
            self.name,
            message.source_id(),
            delivered
        );
        Ok(())
    }

    fn try_pull(&mut self, iteration: Iteration) -> Result<Option<MediaMessage>> {
        self.lifecycle.ensure_initialized(&self.name)?;
        self.iterations.observe(iteration)?;
        Ok(None)
    }

    fn try_destroy(&mut self) -> Result<()> {
        self.lifecycle.ensure_initialized(&self.name)?;
        let closed = self.sessions.take().map_or(0, |mut s| s.close_all());
        let detached = self.views.detach_all();
        self.iterations.reset();
        self.lifecycle = Lifecycle::Uninitialized;
        tracing::info!(
            "{} destroyed ({} sessions closed, {} views detached)",
            self.name,
            closed,
            detached
        );
        Ok(())
    }
}

impl Initialize for VideoOutput {
    type Config = OutputConfig;

    fn init(&mut self, config: OutputConfig) -> Result<()> {
        let result = self
            .lifecycle
            .ensure_uninitialized(&self.name)
            .and_then(|()| config.source_timeout());
        let timeout = self.diagnostics.record(&self.name, result)?;

        self.sessions = Some(SourceSessions::new(
            timeout,
            VideoFeeds {
                views: self.views.clone(),
            },
            self.observers.clone(),
            self.clock.clone(),
        ));
        self.lifecycle = Lifecycle::Initialized;
        tracing::info!(
            "{} initialized (source timeout {:?})",
            self.name,
            timeout.as_duration()
        );
        Ok(())
    }
}

impl Component for VideoOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_initialized(&self) -> bool {
        self.lifecycle.is_initialized()
    }

    fn push(&mut self, iteration: Iteration, message: MediaMessage) -> Result<()> {
        let result = self.try_push(iteration, message);
        self.diagnostics.record(&self.name, result)
    }

    fn pull(&mut self, iteration: Iteration) -> Result<Option<MediaMessage>> {
        let result = self.try_pull(iteration);
        self.diagnostics.record(&self.name, result)
    }

    fn destroy(&mut self) -> Result<()> {
        let result = self.try_destroy();
        self.diagnostics.record(&self.name, result)
    }

    fn last_error(&self) -> Option<&str> {
        self.diagnostics.last_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::pipeline::clock::ManualClock;
    use crate::pipeline::message::PixelFormat;
    use crate::pipeline::session::{session_event_channel, SessionEvent};

    fn frame(source: SourceId, w: u32, h: u32) -> MediaMessage {
        MediaMessage::raw_video(
            source,
            PixelFormat::Yuv420p,
            w,
            h,
            vec![0; PixelFormat::Yuv420p.frame_len(w, h)],
        )
        .unwrap()
    }

    fn output(clock: &ManualClock) -> (VideoOutput, crossbeam_channel::Receiver<SessionEvent>) {
        let (tx, rx) = session_event_channel();
        let mut out = VideoOutput::new("video").with_clock(Arc::new(clock.clone()));
        out.add_observer(Arc::new(tx));
        out.init(OutputConfig::with_timeout_secs(2.0)).unwrap();
        (out, rx)
    }

    #[test]
    fn test_non_positive_timeout_fails_init() {
        for bad in [0.0, -3.0] {
            let mut out = VideoOutput::new("video");
            let err = out.init(OutputConfig::with_timeout_secs(bad)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration);
            assert!(!out.is_initialized());
            assert!(out.source_directory().is_none());
        }
    }

    #[test]
    fn test_frames_reach_views_of_their_source() {
        let clock = ManualClock::new();
        let (mut out, rx) = output(&clock);
        let mut view = out.create_view(4);

        out.push(Iteration(1), frame(4, 2, 2)).unwrap();
        out.push(Iteration(1), frame(5, 2, 2)).unwrap();

        assert!(view.poll().is_some());
        assert!(view.poll().is_none());
        assert_eq!(out.feed(4).unwrap().frames, 1);
        assert_eq!(
            rx.try_iter().collect::<Vec<_>>(),
            vec![SessionEvent::NewSource(4), SessionEvent::NewSource(5)]
        );
    }

    #[test]
    fn test_eviction_detaches_views() {
        let clock = ManualClock::new();
        let (mut out, _rx) = output(&clock);
        let view = out.create_view(1);

        out.push(Iteration(1), frame(1, 2, 2)).unwrap();
        clock.set_secs(5.0);
        out.push(Iteration(2), frame(2, 2, 2)).unwrap();

        assert!(!view.is_attached());
        assert!(out.feed(1).is_none());
    }

    #[test]
    fn test_rejects_audio() {
        let clock = ManualClock::new();
        let (mut out, rx) = output(&clock);
        let audio = MediaMessage::raw_audio_s16(1, 8000, 1, vec![0; 8]).unwrap();
        let err = out.push(Iteration(1), audio).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidMessage);
        assert!(out.source_directory().unwrap().list_active_sources().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_pull_is_always_exhausted() {
        let clock = ManualClock::new();
        let (mut out, _rx) = output(&clock);
        out.push(Iteration(1), frame(1, 2, 2)).unwrap();
        assert_eq!(out.pull(Iteration(1)).unwrap(), None);
    }

    #[test]
    fn test_destroy_notifies_and_detaches() {
        let clock = ManualClock::new();
        let (mut out, rx) = output(&clock);
        let view = out.create_view(1);
        out.push(Iteration(1), frame(1, 2, 2)).unwrap();
        out.push(Iteration(1), frame(2, 2, 2)).unwrap();
        let _ = rx.try_iter().count();

        out.destroy().unwrap();
        assert!(!view.is_attached());
        assert_eq!(rx.try_iter().count(), 2);
        assert!(out.destroy().is_err());
    }
}
