//! MediaFlow-RS - headless demo
//!
//! Runs a small chain on a producer thread while the main thread plays the
//! consumer loop: it opens a view whenever a new video source shows up,
//! renders whatever frames are pending, and closes views of sources that
//! went away.

use anyhow::Context;
use crossbeam_channel::RecvTimeoutError;
use mediaflow_rs::config::{AudioOutputConfig, MediaFlowConfig};
use mediaflow_rs::pipeline::components::{
    AudioOutput, FrameEncoderComponent, NullAudioBackend, PcmFrameEncoder, TestPatternConfig,
    TestPatternSource, ToneConfig, ToneSource, VideoOutput,
};
use mediaflow_rs::pipeline::{
    session_event_channel, Chain, FrameRenderer, FrameView, Initialize, Iteration, RawVideo,
    RenderProgram, Resize, SessionEvent, SourceId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Stand-in for a native renderer; logs what it is asked to do.
#[derive(Default)]
struct LoggingRenderer {
    frames: u64,
}

impl FrameRenderer for LoggingRenderer {
    fn set_program(&mut self, program: RenderProgram) {
        tracing::info!("Switching to {:?} program", program);
    }

    fn resize(&mut self, resize: Resize) {
        tracing::info!(
            "Resize to {}x{} (width changed: {}, height changed: {})",
            resize.width,
            resize.height,
            resize.width_changed,
            resize.height_changed
        );
    }

    fn render(&mut self, _frame: &RawVideo) -> mediaflow_rs::Result<()> {
        self.frames += 1;
        Ok(())
    }
}

fn build_chain(config: &MediaFlowConfig, video: VideoOutput) -> anyhow::Result<Chain> {
    let quiet_after = Iteration((config.demo.iterations / 4).max(1));

    let mut steady = TestPatternSource::new("pattern-1");
    steady.init(TestPatternConfig {
        source_id: 1,
        geometries: vec![(64, 48), (128, 96)],
        iterations_per_geometry: 50,
        stop_after: None,
    })?;

    let mut fading = TestPatternSource::new("pattern-2");
    fading.init(TestPatternConfig {
        source_id: 2,
        geometries: vec![(32, 32)],
        iterations_per_geometry: 1,
        stop_after: Some(quiet_after),
    })?;

    let mut tone = ToneSource::new("tone");
    tone.init(ToneConfig {
        source_id: 10,
        sample_rate: config.encoder.sample_rate,
        samples_per_iteration: config.encoder.frame_size,
        ..ToneConfig::default()
    })?;

    let mut encoder =
        FrameEncoderComponent::new("pcm-encoder", PcmFrameEncoder::new(&config.encoder)?)?;
    encoder.init(())?;

    let mut speaker = AudioOutput::new("speaker", NullAudioBackend::new());
    speaker.init(AudioOutputConfig {
        output: config.output.clone(),
        sample_rate: config.encoder.sample_rate,
        channels: 1,
    })?;

    let mut chain = Chain::new();
    let video = chain.add_component(video);
    let steady = chain.add_component(steady);
    let fading = chain.add_component(fading);
    let tone = chain.add_component(tone);
    let encoder = chain.add_component(encoder);
    let speaker = chain.add_component(speaker);

    chain.link(steady, video)?;
    chain.link(fading, video)?;
    chain.link(tone, encoder)?;
    chain.link(tone, speaker)?;
    Ok(chain)
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,mediaflow_rs=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting MediaFlow demo");

    let config = match std::env::args().nth(1) {
        Some(path) => MediaFlowConfig::load(&path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => MediaFlowConfig::default(),
    };
    let interval = config.demo.iteration_interval();

    let (event_tx, event_rx) = session_event_channel();
    let mut video = VideoOutput::new("video");
    video.add_observer(Arc::new(event_tx));
    video.init(config.output.clone())?;
    let views = video.view_directory();

    let mut chain = build_chain(&config, video)?;
    let iterations = config.demo.iterations;

    // Producer: drives the chain, then tears it down.
    let producer = std::thread::spawn(move || {
        for _ in 0..iterations {
            let report = chain.run_iteration();
            for failure in &report.failures {
                tracing::warn!("{}: {}", failure.name, failure.error);
            }
            std::thread::sleep(interval);
        }
        for failure in chain.destroy_all() {
            tracing::warn!("Destroying {}: {}", failure.name, failure.error);
        }
    });

    // Consumer: one view per live video source.
    let mut open: HashMap<SourceId, FrameView> = HashMap::new();
    let mut renderer = LoggingRenderer::default();
    loop {
        match event_rx.recv_timeout(interval) {
            Ok(SessionEvent::NewSource(id)) => {
                tracing::info!("Opening view for source {}", id);
                open.insert(id, views.attach(id));
            }
            Ok(SessionEvent::RemovedSource(id)) => {
                if let Some(view) = open.remove(&id) {
                    tracing::info!(
                        "Closing view for source {} ({} frames, {} dropped)",
                        id,
                        view.frames(),
                        view.dropped_frames()
                    );
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        for view in open.values_mut() {
            if let Err(e) = view.render_pending(&mut renderer) {
                tracing::warn!("Rendering source {} failed: {}", view.source_id(), e);
            }
        }
    }

    producer
        .join()
        .map_err(|_| anyhow::anyhow!("producer thread panicked"))?;
    tracing::info!("Done, {} frames rendered", renderer.frames);
    Ok(())
}
