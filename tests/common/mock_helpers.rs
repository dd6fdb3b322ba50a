//! Clock, observer and renderer helpers

use crossbeam_channel::Receiver;
use mediaflow_rs::config::{AudioOutputConfig, OutputConfig};
use mediaflow_rs::pipeline::components::{AudioOutput, NullAudioBackend, VideoOutput};
use mediaflow_rs::pipeline::{
    session_event_channel, FrameRenderer, Initialize, ManualClock, RawVideo, RenderProgram,
    Resize, SessionEvent,
};
use std::sync::Arc;

/// A video sink on a manual clock with its lifecycle events
pub fn create_test_video_output(
    timeout_secs: f64,
) -> (VideoOutput, ManualClock, Receiver<SessionEvent>) {
    let clock = ManualClock::new();
    let (tx, rx) = session_event_channel();
    let mut output = VideoOutput::new("test-video").with_clock(Arc::new(clock.clone()));
    output.add_observer(Arc::new(tx));
    output
        .init(OutputConfig::with_timeout_secs(timeout_secs))
        .unwrap();
    (output, clock, rx)
}

/// An audio sink with a headless backend on a manual clock
pub fn create_test_audio_output(
    timeout_secs: f64,
) -> (
    AudioOutput<NullAudioBackend>,
    ManualClock,
    Receiver<SessionEvent>,
) {
    let clock = ManualClock::new();
    let (tx, rx) = session_event_channel();
    let mut output =
        AudioOutput::new("test-audio", NullAudioBackend::new()).with_clock(Arc::new(clock.clone()));
    output.add_observer(Arc::new(tx));
    output
        .init(AudioOutputConfig::with_timeout_secs(timeout_secs))
        .unwrap();
    (output, clock, rx)
}

/// Renderer that records every call
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    pub programs: Vec<RenderProgram>,
    pub resizes: Vec<Resize>,
    pub frames: Vec<(u32, u32, u8)>,
}

impl FrameRenderer for RecordingRenderer {
    fn set_program(&mut self, program: RenderProgram) {
        self.programs.push(program);
    }

    fn resize(&mut self, resize: Resize) {
        self.resizes.push(resize);
    }

    fn render(&mut self, frame: &RawVideo) -> mediaflow_rs::Result<()> {
        self.frames
            .push((frame.width(), frame.height(), frame.data()[0]));
        Ok(())
    }
}
