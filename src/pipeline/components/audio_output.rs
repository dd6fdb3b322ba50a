//! Multi-source positional audio sink.
//!
//! Every source gets its own voice on an [`AudioBackend`], acquired on the
//! source's first message and released when the source times out or the
//! sink is destroyed. Positions set for a source are remembered and applied
//! whenever a voice is created for it.
//!
//! The playback format (S16 at a fixed rate and channel count) is chosen at
//! `init`; messages in any other format are rejected.

use crate::config::{AudioOutputConfig, DEFAULT_AUDIO_CHANNELS, DEFAULT_SAMPLE_RATE};
use crate::error::{MediaFlowError, Result};
use crate::pipeline::clock::{Clock, MonotonicClock};
use crate::pipeline::component::{Component, Diagnostics, Initialize, IterationTracker, Lifecycle};
use crate::pipeline::id::{Iteration, SourceId};
use crate::pipeline::message::{MediaMessage, RawAudio};
use crate::pipeline::session::{SessionObserver, SessionResources, SourceDirectory, SourceSessions};
use std::collections::HashMap;
use std::sync::Arc;

/// Backend handle of one playing voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Where the listener is and which way it faces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Listener {
    pub position: Position,
    pub forward: Position,
    pub up: Position,
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            position: Position::default(),
            forward: Position::new(0.0, 0.0, -1.0),
            up: Position::new(0.0, 1.0, 0.0),
        }
    }
}

/// Native playback collaborator.
#[cfg_attr(test, mockall::automock)]
pub trait AudioBackend {
    /// Fails with `ResourceUnavailable` when no voice can be allocated.
    fn create_voice(&mut self, source_id: SourceId) -> Result<VoiceId>;

    fn enqueue(&mut self, voice: VoiceId, audio: &RawAudio) -> Result<()>;

    fn release_voice(&mut self, voice: VoiceId);

    fn set_voice_position(&mut self, voice: VoiceId, position: Position) -> Result<()>;

    fn set_listener(&mut self, listener: Listener) -> Result<()>;
}

/// Headless backend that only counts what it is asked to play.
#[derive(Debug, Default)]
pub struct NullAudioBackend {
    next_voice: u32,
    live: HashMap<VoiceId, SourceId>,
    voice_limit: Option<usize>,
    enqueued_frames: u64,
    listener: Listener,
}

impl NullAudioBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse to allocate more than `limit` simultaneous voices.
    pub fn with_voice_limit(mut self, limit: usize) -> Self {
        self.voice_limit = Some(limit);
        self
    }

    pub fn live_voices(&self) -> usize {
        self.live.len()
    }

    pub fn enqueued_frames(&self) -> u64 {
        self.enqueued_frames
    }

    pub fn listener(&self) -> Listener {
        self.listener
    }
}

impl AudioBackend for NullAudioBackend {
    fn create_voice(&mut self, source_id: SourceId) -> Result<VoiceId> {
        if self.voice_limit.is_some_and(|limit| self.live.len() >= limit) {
            return Err(MediaFlowError::unavailable(format!(
                "no free voice for source {}",
                source_id
            )));
        }
        let voice = VoiceId(self.next_voice);
        self.next_voice += 1;
        self.live.insert(voice, source_id);
        Ok(voice)
    }

    fn enqueue(&mut self, voice: VoiceId, audio: &RawAudio) -> Result<()> {
        if !self.live.contains_key(&voice) {
            return Err(MediaFlowError::external(format!("unknown voice {:?}", voice)));
        }
        self.enqueued_frames += audio.frames() as u64;
        Ok(())
    }

    fn release_voice(&mut self, voice: VoiceId) {
        self.live.remove(&voice);
    }

    fn set_voice_position(&mut self, voice: VoiceId, _position: Position) -> Result<()> {
        if !self.live.contains_key(&voice) {
            return Err(MediaFlowError::external(format!("unknown voice {:?}", voice)));
        }
        Ok(())
    }

    fn set_listener(&mut self, listener: Listener) -> Result<()> {
        self.listener = listener;
        Ok(())
    }
}

/// Session resource of one audio source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Voice {
    pub id: VoiceId,
    pub messages: u64,
}

/// Backend plus the per-source positions that outlive voices.
struct Voices<B> {
    backend: B,
    positions: HashMap<SourceId, Position>,
}

impl<B: AudioBackend + Send> SessionResources for Voices<B> {
    type Handle = Voice;

    fn acquire(&mut self, source_id: SourceId) -> Result<Voice> {
        let id = self.backend.create_voice(source_id)?;
        if let Some(&position) = self.positions.get(&source_id) {
            if let Err(e) = self.backend.set_voice_position(id, position) {
                tracing::warn!("Could not position voice for source {}: {}", source_id, e);
            }
        }
        Ok(Voice { id, messages: 0 })
    }

    fn release(&mut self, source_id: SourceId, voice: Voice) {
        tracing::debug!(
            "Releasing voice {:?} of source {} after {} messages",
            voice.id,
            source_id,
            voice.messages
        );
        self.backend.release_voice(voice.id);
    }
}

pub struct AudioOutput<B: AudioBackend + Send> {
    name: String,
    observers: Vec<Arc<dyn SessionObserver>>,
    clock: Arc<dyn Clock>,
    sample_rate: u32,
    channels: u16,
    /// Owned here while not initialized, by `sessions` while running.
    idle: Option<Voices<B>>,
    sessions: Option<SourceSessions<Voices<B>>>,
    iterations: IterationTracker,
    lifecycle: Lifecycle,
    diagnostics: Diagnostics,
}

impl<B: AudioBackend + Send> AudioOutput<B> {
    pub fn new(name: impl Into<String>, backend: B) -> Self {
        Self {
            name: name.into(),
            observers: Vec::new(),
            clock: Arc::new(MonotonicClock::new()),
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_AUDIO_CHANNELS,
            idle: Some(Voices {
                backend,
                positions: HashMap::new(),
            }),
            sessions: None,
            iterations: IterationTracker::new(),
            lifecycle: Lifecycle::default(),
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn add_observer(&mut self, observer: Arc<dyn SessionObserver>) {
        self.observers.push(observer);
    }

    pub fn source_directory(&self) -> Option<SourceDirectory> {
        self.sessions.as_ref().map(SourceSessions::directory)
    }

    fn voices(&self) -> Option<&Voices<B>> {
        match &self.sessions {
            Some(sessions) => Some(sessions.resources()),
            None => self.idle.as_ref(),
        }
    }

    fn voices_mut(&mut self) -> Option<&mut Voices<B>> {
        match &mut self.sessions {
            Some(sessions) => Some(sessions.resources_mut()),
            None => self.idle.as_mut(),
        }
    }

    pub fn backend(&self) -> Option<&B> {
        self.voices().map(|v| &v.backend)
    }

    pub fn voice(&self, source_id: SourceId) -> Option<Voice> {
        self.sessions
            .as_ref()?
            .registry()
            .with_resource(source_id, |voice| *voice)
    }

    /// Place a source in space. Applied now if it has a voice, and to every
    /// voice created for it later.
    pub fn set_source_position(&mut self, source_id: SourceId, position: Position) -> Result<()> {
        let live = self.voice(source_id).map(|v| v.id);
        let voices = self
            .voices_mut()
            .ok_or_else(|| MediaFlowError::external("audio backend is gone"))?;
        voices.positions.insert(source_id, position);
        let result = match live {
            Some(voice) => voices.backend.set_voice_position(voice, position),
            None => Ok(()),
        };
        self.diagnostics.record(&self.name, result)
    }

    pub fn set_listener(&mut self, listener: Listener) -> Result<()> {
        let result = match self.voices_mut() {
            Some(voices) => voices.backend.set_listener(listener),
            None => Err(MediaFlowError::external("audio backend is gone")),
        };
        self.diagnostics.record(&self.name, result)
    }

    fn check_format(&self, message: &MediaMessage, audio: &RawAudio) -> Result<()> {
        if audio.s16().is_none() {
            return Err(MediaFlowError::invalid_message(format!(
                "{} plays S16 samples, got {:?}",
                self.name,
                message.subtype()
            )));
        }
        if audio.sample_rate() != self.sample_rate || audio.channels() != self.channels {
            return Err(MediaFlowError::invalid_message(format!(
                "{} plays {} Hz with {} channels, got {} Hz with {} channels",
                self.name,
                self.sample_rate,
                self.channels,
                audio.sample_rate(),
                audio.channels()
            )));
        }
        Ok(())
    }

    fn try_push(&mut self, iteration: Iteration, message: MediaMessage) -> Result<()> {
        self.lifecycle.ensure_initialized(&self.name)?;
        self.iterations.check(iteration)?;

        let audio = message.as_raw_audio().ok_or_else(|| {
            MediaFlowError::invalid_message(format!(
                "{} accepts raw audio, got {:?}",
                self.name,
                message.message_type()
            ))
        })?;
        self.check_format(&message, audio)?;

        let sessions = self
            .sessions
            .as_mut()
            .ok_or_else(|| MediaFlowError::config(format!("{} has no sessions", self.name)))?;
        let voice = sessions.deliver(message.source_id(), |voices, voice| {
            voices.backend.enqueue(voice.id, audio)?;
            voice.messages += 1;
            Ok(voice.id)
        })?;
        self.iterations.commit(iteration);

        tracing::trace!(
            "{}: {} frames from source {} to {:?}",
            self.name,
            audio.frames(),
            message.source_id(),
            voice
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
        if let Some(sessions) = self.sessions.take() {
            self.idle = Some(sessions.into_resources());
        }
        self.iterations.reset();
        self.lifecycle = Lifecycle::Uninitialized;
        tracing::info!("{} destroyed", self.name);
        Ok(())
    }
}

impl<B: AudioBackend + Send> Initialize for AudioOutput<B> {
    type Config = AudioOutputConfig;

    fn init(&mut self, config: AudioOutputConfig) -> Result<()> {
        let result = self
            .lifecycle
            .ensure_uninitialized(&self.name)
            .and_then(|()| config.validate());
        let timeout = self.diagnostics.record(&self.name, result)?;

        let voices = self
            .idle
            .take()
            .ok_or_else(|| MediaFlowError::external("audio backend is gone"));
        let voices = self.diagnostics.record(&self.name, voices)?;
        self.sessions = Some(SourceSessions::new(
            timeout,
            voices,
            self.observers.clone(),
            self.clock.clone(),
        ));
        self.sample_rate = config.sample_rate;
        self.channels = config.channels;
        self.lifecycle = Lifecycle::Initialized;
        tracing::info!(
            "{} initialized ({} Hz, {} channels, source timeout {:?})",
            self.name,
            config.sample_rate,
            config.channels,
            timeout.as_duration()
        );
        Ok(())
    }
}

impl<B: AudioBackend + Send> Component for AudioOutput<B> {
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
    use crate::pipeline::session::{session_event_channel, SessionEvent};
    use mockall::predicate::eq;

    fn samples(source: SourceId) -> MediaMessage {
        MediaMessage::raw_audio_s16(source, 8000, 1, vec![0; 80]).unwrap()
    }

    fn running<B: AudioBackend + Send>(
        backend: B,
        clock: &ManualClock,
    ) -> (AudioOutput<B>, crossbeam_channel::Receiver<SessionEvent>) {
        let (tx, rx) = session_event_channel();
        let mut out = AudioOutput::new("audio", backend).with_clock(Arc::new(clock.clone()));
        out.add_observer(Arc::new(tx));
        out.init(AudioOutputConfig::with_timeout_secs(2.0)).unwrap();
        (out, rx)
    }

    #[test]
    fn test_voice_per_source() {
        let clock = ManualClock::new();
        let (mut out, _rx) = running(NullAudioBackend::new(), &clock);
        out.push(Iteration(1), samples(1)).unwrap();
        out.push(Iteration(1), samples(2)).unwrap();
        out.push(Iteration(2), samples(1)).unwrap();

        let backend = out.backend().unwrap();
        assert_eq!(backend.live_voices(), 2);
        assert_eq!(backend.enqueued_frames(), 240);
        assert_eq!(out.voice(1).unwrap().messages, 2);
    }

    #[test]
    fn test_voice_released_on_timeout() {
        let clock = ManualClock::new();
        let (mut out, rx) = running(NullAudioBackend::new(), &clock);
        out.push(Iteration(1), samples(1)).unwrap();
        clock.set_secs(3.0);
        out.push(Iteration(2), samples(2)).unwrap();

        assert_eq!(out.backend().unwrap().live_voices(), 1);
        assert!(out.voice(1).is_none());
        assert_eq!(
            rx.try_iter().collect::<Vec<_>>(),
            vec![
                SessionEvent::NewSource(1),
                SessionEvent::RemovedSource(1),
                SessionEvent::NewSource(2),
            ]
        );
    }

    #[test]
    fn test_voice_exhaustion_creates_no_session() {
        let clock = ManualClock::new();
        let (mut out, rx) = running(NullAudioBackend::new().with_voice_limit(1), &clock);
        out.push(Iteration(1), samples(1)).unwrap();
        let err = out.push(Iteration(1), samples(2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceUnavailable);

        let active = out.source_directory().unwrap().list_active_sources();
        assert_eq!(active.into_iter().collect::<Vec<_>>(), vec![1]);
        assert_eq!(rx.try_iter().count(), 1);
        assert!(out.last_error().unwrap().contains("no free voice"));
    }

    #[test]
    fn test_position_applied_to_new_voice() {
        let mut backend = MockAudioBackend::new();
        backend
            .expect_create_voice()
            .with(eq(9))
            .times(1)
            .returning(|_| Ok(VoiceId(42)));
        backend
            .expect_set_voice_position()
            .with(eq(VoiceId(42)), eq(Position::new(1.0, 0.0, 0.0)))
            .times(1)
            .returning(|_, _| Ok(()));
        backend.expect_enqueue().times(1).returning(|_, _| Ok(()));
        backend.expect_release_voice().with(eq(VoiceId(42))).times(1).return_const(());

        let clock = ManualClock::new();
        let (mut out, _rx) = running(backend, &clock);
        out.set_source_position(9, Position::new(1.0, 0.0, 0.0)).unwrap();
        out.push(Iteration(1), samples(9)).unwrap();
        out.destroy().unwrap();
    }

    #[test]
    fn test_listener_forwarded() {
        let clock = ManualClock::new();
        let (mut out, _rx) = running(NullAudioBackend::new(), &clock);
        let listener = Listener {
            position: Position::new(0.0, 2.0, 0.0),
            ..Listener::default()
        };
        out.set_listener(listener).unwrap();
        assert_eq!(out.backend().unwrap().listener(), listener);
    }

    #[test]
    fn test_destroy_releases_voices_and_allows_reinit() {
        let clock = ManualClock::new();
        let (mut out, rx) = running(NullAudioBackend::new(), &clock);
        out.push(Iteration(1), samples(1)).unwrap();
        out.push(Iteration(1), samples(2)).unwrap();
        out.destroy().unwrap();

        assert_eq!(out.backend().unwrap().live_voices(), 0);
        assert_eq!(
            rx.try_iter()
                .filter(|e| matches!(e, SessionEvent::RemovedSource(_)))
                .count(),
            2
        );
        out.init(AudioOutputConfig::default()).unwrap();
        out.push(Iteration(1), samples(1)).unwrap();
    }

    #[test]
    fn test_rejects_video() {
        let clock = ManualClock::new();
        let (mut out, _rx) = running(NullAudioBackend::new(), &clock);
        let video = MediaMessage::raw_video(
            1,
            crate::pipeline::message::PixelFormat::Rgb32,
            1,
            1,
            vec![0; 4],
        )
        .unwrap();
        let err = out.push(Iteration(1), video).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidMessage);
        assert_eq!(out.backend().unwrap().live_voices(), 0);
    }

    #[test]
    fn test_failed_enqueue_leaves_no_session() {
        let mut backend = MockAudioBackend::new();
        backend
            .expect_create_voice()
            .with(eq(5))
            .times(1)
            .returning(|_| Ok(VoiceId(7)));
        backend
            .expect_enqueue()
            .times(1)
            .returning(|_, _| Err(MediaFlowError::external("device lost")));
        backend
            .expect_release_voice()
            .with(eq(VoiceId(7)))
            .times(1)
            .return_const(());

        let clock = ManualClock::new();
        let (mut out, rx) = running(backend, &clock);
        let err = out.push(Iteration(1), samples(5)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalFailure);

        assert!(out.source_directory().unwrap().list_active_sources().is_empty());
        assert!(out.voice(5).is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_failed_enqueue_on_live_voice_changes_nothing() {
        let mut backend = MockAudioBackend::new();
        backend
            .expect_create_voice()
            .returning(|source| Ok(VoiceId(source as u32)));
        let mut calls = 0;
        backend.expect_enqueue().returning(move |_, _| {
            calls += 1;
            if calls <= 2 {
                Ok(())
            } else {
                Err(MediaFlowError::external("device lost"))
            }
        });
        backend.expect_release_voice().return_const(());

        let clock = ManualClock::new();
        let (mut out, rx) = running(backend, &clock);
        out.push(Iteration(1), samples(2)).unwrap();
        clock.set_secs(1.0);
        out.push(Iteration(2), samples(1)).unwrap();
        let _ = rx.try_iter().count();

        // Source 2 is past its timeout, source 1 is still live.
        clock.set_secs(2.5);
        let err = out.push(Iteration(3), samples(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalFailure);

        let directory = out.source_directory().unwrap();
        assert_eq!(
            directory.list_active_sources().into_iter().collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(
            directory.session_info(1).unwrap().last_active,
            std::time::Duration::from_secs(1)
        );
        assert_eq!(out.voice(1).unwrap().messages, 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_rejects_other_sample_formats() {
        let clock = ManualClock::new();
        let (mut out, rx) = running(NullAudioBackend::new(), &clock);
        out.push(Iteration(1), samples(1)).unwrap();
        let _ = rx.try_iter().count();

        let float = MediaMessage::raw_audio_f32(2, 8000, 1, vec![0.0; 80]).unwrap();
        let stereo = MediaMessage::raw_audio_s16(3, 8000, 2, vec![0; 160]).unwrap();
        let fast = MediaMessage::raw_audio_s16(4, 44100, 1, vec![0; 80]).unwrap();
        for message in [float, stereo, fast] {
            let err = out.push(Iteration(2), message).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidMessage);
        }

        assert_eq!(out.backend().unwrap().live_voices(), 1);
        assert_eq!(out.backend().unwrap().enqueued_frames(), 80);
        assert_eq!(
            out.source_directory()
                .unwrap()
                .list_active_sources()
                .into_iter()
                .collect::<Vec<_>>(),
            vec![1]
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_configured_format_accepted() {
        let (tx, _rx) = session_event_channel();
        let mut out = AudioOutput::new("audio", NullAudioBackend::new());
        out.add_observer(Arc::new(tx));
        out.init(AudioOutputConfig::default().with_format(44100, 2))
            .unwrap();

        let stereo = MediaMessage::raw_audio_s16(1, 44100, 2, vec![0; 200]).unwrap();
        out.push(Iteration(1), stereo).unwrap();
        assert_eq!(out.backend().unwrap().enqueued_frames(), 100);
        assert!(out.push(Iteration(2), samples(1)).is_err());
    }

    #[test]
    fn test_zero_channel_config_rejected() {
        let mut out = AudioOutput::new("audio", NullAudioBackend::new());
        let err = out
            .init(AudioOutputConfig::default().with_format(8000, 0))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(!out.is_initialized());
        assert!(out.backend().is_some());
    }
}
