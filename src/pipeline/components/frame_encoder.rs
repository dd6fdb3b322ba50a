//! Frame-based audio encoding.
//!
//! Incoming samples are copied into a fixed-size frame buffer. Every time the
//! buffer fills up the frame is handed to a [`FrameEncoder`], whose output is
//! queued until pulled. Samples left over stay buffered for the next push,
//! including across skipped iterations.

use crate::config::EncoderConfig;
use crate::error::{MediaFlowError, Result};
use crate::pipeline::component::{
    Component, Diagnostics, Initialize, IterationStep, IterationTracker, Lifecycle,
};
use crate::pipeline::id::Iteration;
use crate::pipeline::message::{AudioCodec, MediaMessage};
use crate::pipeline::output_queue::OutputQueue;

/// Codec collaborator turning one full frame into encoded packets.
#[cfg_attr(test, mockall::automock)]
pub trait FrameEncoder {
    fn codec(&self) -> AudioCodec;

    fn sample_rate(&self) -> u32;

    /// Samples per frame.
    fn frame_size(&self) -> usize;

    /// Encode exactly `frame_size` samples. Usually yields one packet.
    fn encode_frame(&mut self, frame: &[i16]) -> Result<Vec<Vec<u8>>>;
}

/// Uncompressed 16 bit little-endian framing.
#[derive(Debug, Clone)]
pub struct PcmFrameEncoder {
    sample_rate: u32,
    frame_size: usize,
}

impl PcmFrameEncoder {
    pub fn new(config: &EncoderConfig) -> Result<Self> {
        if config.frame_size == 0 || config.sample_rate == 0 {
            return Err(MediaFlowError::config(format!(
                "PCM framer needs a non-zero frame size and rate (got {} @ {} Hz)",
                config.frame_size, config.sample_rate
            )));
        }
        Ok(Self {
            sample_rate: config.sample_rate,
            frame_size: config.frame_size,
        })
    }
}

impl FrameEncoder for PcmFrameEncoder {
    fn codec(&self) -> AudioCodec {
        AudioCodec::Pcm16
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn encode_frame(&mut self, frame: &[i16]) -> Result<Vec<Vec<u8>>> {
        let bytes = frame.iter().flat_map(|s| s.to_le_bytes()).collect();
        Ok(vec![bytes])
    }
}

/// Buffer of not-yet-framed samples. Occupancy stays below `frame_size`
/// between calls.
#[derive(Debug, Clone)]
pub struct FrameAccumulator {
    frame_size: usize,
    buffer: Vec<i16>,
}

impl FrameAccumulator {
    pub fn new(frame_size: usize) -> Result<Self> {
        if frame_size == 0 {
            return Err(MediaFlowError::config("frame size must be positive"));
        }
        Ok(Self {
            frame_size,
            buffer: Vec::with_capacity(frame_size),
        })
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn occupancy(&self) -> usize {
        self.buffer.len()
    }

    /// Append `samples`, calling `on_frame` with every frame they complete.
    ///
    /// Works on a staged copy of the buffer: if `on_frame` fails the buffer
    /// is left as it was before the call. Returns the number of completed
    /// frames.
    pub fn append<F>(&mut self, samples: &[i16], mut on_frame: F) -> Result<usize>
    where
        F: FnMut(&[i16]) -> Result<()>,
    {
        let mut staged = self.buffer.clone();
        let mut rest = samples;
        let mut completed = 0;

        loop {
            let needed = self.frame_size - staged.len();
            if rest.len() < needed {
                staged.extend_from_slice(rest);
                break;
            }
            staged.extend_from_slice(&rest[..needed]);
            rest = &rest[needed..];
            on_frame(&staged)?;
            staged.clear();
            completed += 1;
        }

        self.buffer = staged;
        Ok(completed)
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

/// Audio encoder component over any [`FrameEncoder`].
///
/// Accepts raw signed 16 bit mono audio at the encoder's rate. Encoded
/// messages carry the source id of the push that completed their frame.
pub struct FrameEncoderComponent<E: FrameEncoder> {
    name: String,
    encoder: E,
    accumulator: FrameAccumulator,
    queue: OutputQueue,
    iterations: IterationTracker,
    lifecycle: Lifecycle,
    diagnostics: Diagnostics,
}

impl<E: FrameEncoder> FrameEncoderComponent<E> {
    pub fn new(name: impl Into<String>, encoder: E) -> Result<Self> {
        let accumulator = FrameAccumulator::new(encoder.frame_size())?;
        Ok(Self {
            name: name.into(),
            encoder,
            accumulator,
            queue: OutputQueue::new(),
            iterations: IterationTracker::new(),
            lifecycle: Lifecycle::default(),
            diagnostics: Diagnostics::default(),
        })
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    /// Samples waiting for their frame to complete.
    pub fn buffered_samples(&self) -> usize {
        self.accumulator.occupancy()
    }

    /// Encoded messages not yet pulled.
    pub fn pending_outputs(&self) -> usize {
        self.queue.len()
    }

    fn try_push(&mut self, iteration: Iteration, message: MediaMessage) -> Result<()> {
        self.lifecycle.ensure_initialized(&self.name)?;
        let step = self.iterations.check(iteration)?;

        let audio = message.as_raw_audio().ok_or_else(|| {
            MediaFlowError::invalid_message(format!(
                "{} accepts raw audio, got {:?}",
                self.name,
                message.message_type()
            ))
        })?;
        let samples = audio.s16().ok_or_else(|| {
            MediaFlowError::invalid_message(format!(
                "{} accepts S16 samples, got {:?}",
                self.name,
                message.subtype()
            ))
        })?;
        if audio.channels() != 1 {
            return Err(MediaFlowError::invalid_message(format!(
                "{} accepts mono audio, got {} channels",
                self.name,
                audio.channels()
            )));
        }
        let rate = self.encoder.sample_rate();
        if audio.sample_rate() != rate {
            return Err(MediaFlowError::invalid_message(format!(
                "{} expects {} Hz, got {} Hz",
                self.name,
                rate,
                audio.sample_rate()
            )));
        }

        if let IterationStep::Skipped { gap } = step {
            tracing::debug!(
                "{}: {} iterations skipped, continuing with {} buffered samples",
                self.name,
                gap,
                self.accumulator.occupancy()
            );
        }

        let source_id = message.source_id();
        let codec = self.encoder.codec();
        let encoder = &mut self.encoder;
        let mut encoded = Vec::new();
        self.accumulator.append(samples, |frame| {
            for packet in encoder.encode_frame(frame)? {
                encoded.push(MediaMessage::encoded_audio(
                    source_id,
                    codec,
                    rate,
                    frame.len(),
                    packet,
                ));
            }
            Ok(())
        })?;

        self.iterations.commit(iteration);
        for msg in encoded {
            self.queue.enqueue(iteration, msg);
        }
        tracing::trace!(
            "{}: {} outputs pending, {} samples buffered",
            self.name,
            self.queue.len(),
            self.accumulator.occupancy()
        );
        Ok(())
    }

    fn try_pull(&mut self, iteration: Iteration) -> Result<Option<MediaMessage>> {
        self.lifecycle.ensure_initialized(&self.name)?;
        self.iterations.observe(iteration)?;
        Ok(self.queue.next_ready(iteration))
    }

    fn try_destroy(&mut self) -> Result<()> {
        self.lifecycle.ensure_initialized(&self.name)?;
        let dropped = self.queue.clear();
        if dropped > 0 || self.accumulator.occupancy() > 0 {
            tracing::debug!(
                "{}: discarding {} queued outputs and {} buffered samples",
                self.name,
                dropped,
                self.accumulator.occupancy()
            );
        }
        self.accumulator.reset();
        self.iterations.reset();
        self.lifecycle = Lifecycle::Uninitialized;
        tracing::info!("{} destroyed", self.name);
        Ok(())
    }
}

impl<E: FrameEncoder> Initialize for FrameEncoderComponent<E> {
    type Config = ();

    fn init(&mut self, _config: ()) -> Result<()> {
        let result = self.lifecycle.ensure_uninitialized(&self.name);
        self.diagnostics.record(&self.name, result)?;
        self.lifecycle = Lifecycle::Initialized;
        tracing::info!(
            "{} initialized ({:?}, {} samples per frame)",
            self.name,
            self.encoder.codec(),
            self.accumulator.frame_size()
        );
        Ok(())
    }
}

impl<E: FrameEncoder + Send> Component for FrameEncoderComponent<E> {
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
