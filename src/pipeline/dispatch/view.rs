//! Consumer-side frame views fed through per-view mailboxes.
//!
//! A [`ViewDirectory`] is shared between a video sink (producer side, the
//! chain-driving context) and any number of [`FrameView`]s living in a
//! consumer loop. The sink dispatches a deep copy of every frame into the
//! mailbox of each view attached to the frame's source. A view may be
//! dropped at any time; it removes itself from the directory under the
//! directory lock before its teardown completes. The sink detaches every
//! view of a source when that source is evicted.

use crate::error::{MediaFlowError, Result};
use crate::pipeline::dispatch::mailbox::Mailbox;
use crate::pipeline::id::{SourceId, ViewId};
use crate::pipeline::message::{MediaMessage, PixelFormat, RawVideo};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Shader program a renderer needs for a pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderProgram {
    Yuv420,
    Rgb,
    Yuyv,
}

impl RenderProgram {
    pub fn for_format(format: PixelFormat) -> Self {
        match format {
            PixelFormat::Yuv420p => RenderProgram::Yuv420,
            PixelFormat::Rgb24 | PixelFormat::Rgb32 => RenderProgram::Rgb,
            PixelFormat::Yuyv => RenderProgram::Yuyv,
        }
    }
}

/// Emitted once per distinct change of frame dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resize {
    pub width: u32,
    pub height: u32,
    pub width_changed: bool,
    pub height_changed: bool,
}

/// One frame taken from a view's mailbox.
#[derive(Debug)]
pub struct PolledFrame {
    pub message: MediaMessage,
    /// Set when the geometry differs from the last processed frame.
    pub resize: Option<Resize>,
    /// Set when the pixel format needs a different program than before.
    pub program: Option<RenderProgram>,
}

impl PolledFrame {
    pub fn video(&self) -> Option<&RawVideo> {
        self.message.as_raw_video()
    }
}

/// Native drawing collaborator driven from the consumer loop.
pub trait FrameRenderer {
    fn set_program(&mut self, program: RenderProgram);

    fn resize(&mut self, resize: Resize);

    fn render(&mut self, frame: &RawVideo) -> Result<()>;
}

#[derive(Debug, Default)]
struct ViewShared {
    mailbox: Mailbox<MediaMessage>,
    detached: AtomicBool,
}

#[derive(Debug)]
struct Attachment {
    source_id: SourceId,
    shared: Arc<ViewShared>,
}

/// Registry of live views, keyed by view id.
#[derive(Debug, Default)]
pub struct ViewDirectory {
    next_id: AtomicU64,
    views: Mutex<HashMap<ViewId, Attachment>>,
}

impl ViewDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ViewId, Attachment>> {
        self.views.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new view of `source_id`.
    pub fn attach(self: &Arc<Self>, source_id: SourceId) -> FrameView {
        let id = ViewId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let shared = Arc::new(ViewShared::default());
        self.lock().insert(
            id,
            Attachment {
                source_id,
                shared: shared.clone(),
            },
        );
        tracing::debug!("Attached view {:?} to source {}", id, source_id);
        FrameView {
            id,
            source_id,
            shared,
            directory: Arc::downgrade(self),
            geometry: None,
            program: None,
            frames: 0,
        }
    }

    /// Hand a deep copy of `message` to every view of its source.
    ///
    /// Returns how many views received it.
    pub fn dispatch(&self, message: &MediaMessage) -> usize {
        let targets: Vec<Arc<ViewShared>> = self
            .lock()
            .values()
            .filter(|a| a.source_id == message.source_id())
            .map(|a| a.shared.clone())
            .collect();

        for shared in &targets {
            if shared.mailbox.inject(message.duplicate()) {
                tracing::trace!(
                    "Replaced unconsumed frame for source {}",
                    message.source_id()
                );
            }
        }
        targets.len()
    }

    /// Detach every view of `source_id`; pending frames are dropped.
    pub fn detach_source(&self, source_id: SourceId) -> usize {
        let mut detached = Vec::new();
        self.lock().retain(|_, a| {
            if a.source_id == source_id {
                detached.push(a.shared.clone());
                false
            } else {
                true
            }
        });
        for shared in &detached {
            shared.detached.store(true, Ordering::Release);
            shared.mailbox.clear();
        }
        detached.len()
    }

    /// Detach every view.
    pub fn detach_all(&self) -> usize {
        let all: Vec<Attachment> = self.lock().drain().map(|(_, a)| a).collect();
        for a in &all {
            a.shared.detached.store(true, Ordering::Release);
            a.shared.mailbox.clear();
        }
        all.len()
    }

    fn remove(&self, id: ViewId) -> bool {
        self.lock().remove(&id).is_some()
    }

    pub fn views_of(&self, source_id: SourceId) -> Vec<ViewId> {
        let mut ids: Vec<ViewId> = self
            .lock()
            .iter()
            .filter(|(_, a)| a.source_id == source_id)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_by_key(|id| id.0);
        ids
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Consumer handle onto one source's frames.
///
/// Lives in the consumer context. Dropping it deregisters it from its
/// directory, if the directory still exists.
#[derive(Debug)]
pub struct FrameView {
    id: ViewId,
    source_id: SourceId,
    shared: Arc<ViewShared>,
    directory: Weak<ViewDirectory>,
    geometry: Option<(u32, u32)>,
    program: Option<RenderProgram>,
    frames: u64,
}

impl FrameView {
    pub fn id(&self) -> ViewId {
        self.id
    }

    pub fn source_id(&self) -> SourceId {
        self.source_id
    }

    /// False once the source was evicted or its sink destroyed.
    pub fn is_attached(&self) -> bool {
        !self.shared.detached.load(Ordering::Acquire)
    }

    /// Dimensions of the last processed frame.
    pub fn video_size(&self) -> Option<(u32, u32)> {
        self.geometry
    }

    pub fn program(&self) -> Option<RenderProgram> {
        self.program
    }

    /// Frames processed so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Frames that were replaced before this view got to them.
    pub fn dropped_frames(&self) -> u64 {
        self.shared.mailbox.discarded()
    }

    /// Take the pending frame, if any, comparing its geometry and format
    /// with the previously processed one.
    pub fn poll(&mut self) -> Option<PolledFrame> {
        let message = self.shared.mailbox.take()?;
        let (resize, program) = match message.as_raw_video() {
            Some(video) => (
                self.update_geometry(video.width(), video.height()),
                self.update_program(RenderProgram::for_format(video.format())),
            ),
            None => (None, None),
        };
        self.frames += 1;
        Some(PolledFrame {
            message,
            resize,
            program,
        })
    }

    fn update_geometry(&mut self, width: u32, height: u32) -> Option<Resize> {
        let (width_changed, height_changed) = match self.geometry {
            Some((w, h)) => (w != width, h != height),
            None => (true, true),
        };
        self.geometry = Some((width, height));
        (width_changed || height_changed).then_some(Resize {
            width,
            height,
            width_changed,
            height_changed,
        })
    }

    fn update_program(&mut self, program: RenderProgram) -> Option<RenderProgram> {
        if self.program == Some(program) {
            return None;
        }
        self.program = Some(program);
        Some(program)
    }

    /// Poll and, if a frame was pending, drive `renderer` with it.
    ///
    /// Returns whether a frame was rendered.
    pub fn render_pending(&mut self, renderer: &mut dyn FrameRenderer) -> Result<bool> {
        let Some(frame) = self.poll() else {
            return Ok(false);
        };
        let video = frame.video().ok_or_else(|| {
            MediaFlowError::invalid_message("frame view received a non-video message")
        })?;
        if let Some(program) = frame.program {
            renderer.set_program(program);
        }
        if let Some(resize) = frame.resize {
            renderer.resize(resize);
        }
        renderer.render(video)?;
        Ok(true)
    }
}

impl Drop for FrameView {
    fn drop(&mut self) {
        if let Some(directory) = self.directory.upgrade() {
            if directory.remove(self.id) {
                tracing::debug!("View {:?} of source {} closed", self.id, self.source_id);
            }
        }
    }
}
