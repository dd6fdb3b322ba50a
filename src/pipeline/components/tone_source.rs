//! Sine tone generator.

use crate::error::{MediaFlowError, Result};
use crate::pipeline::component::{Component, Diagnostics, Initialize, IterationTracker, Lifecycle};
use crate::pipeline::id::{Iteration, SourceId};
use crate::pipeline::message::MediaMessage;
use std::f64::consts::TAU;

#[derive(Debug, Clone)]
pub struct ToneConfig {
    pub source_id: SourceId,
    pub sample_rate: u32,
    pub frequency_hz: f64,
    /// Peak amplitude in `0.0..=1.0` of full scale.
    pub amplitude: f64,
    pub samples_per_iteration: usize,
    /// Produce nothing after this iteration.
    pub stop_after: Option<Iteration>,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            source_id: 1,
            sample_rate: 8000,
            frequency_hz: 440.0,
            amplitude: 0.5,
            samples_per_iteration: 160,
            stop_after: None,
        }
    }
}

/// Pure source emitting one block of mono S16 samples per iteration.
pub struct ToneSource {
    name: String,
    config: ToneConfig,
    phase: f64,
    last_emitted: Option<Iteration>,
    iterations: IterationTracker,
    lifecycle: Lifecycle,
    diagnostics: Diagnostics,
}

impl ToneSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: ToneConfig::default(),
            phase: 0.0,
            last_emitted: None,
            iterations: IterationTracker::new(),
            lifecycle: Lifecycle::default(),
            diagnostics: Diagnostics::default(),
        }
    }

    fn block(&mut self) -> Vec<i16> {
        let step = TAU * self.config.frequency_hz / self.config.sample_rate as f64;
        let scale = self.config.amplitude.clamp(0.0, 1.0) * i16::MAX as f64;
        (0..self.config.samples_per_iteration)
            .map(|_| {
                let sample = (self.phase.sin() * scale) as i16;
                self.phase = (self.phase + step) % TAU;
                sample
            })
            .collect()
    }

    fn try_pull(&mut self, iteration: Iteration) -> Result<Option<MediaMessage>> {
        self.lifecycle.ensure_initialized(&self.name)?;
        self.iterations.observe(iteration)?;

        if self.last_emitted == Some(iteration)
            || self.config.stop_after.is_some_and(|stop| iteration > stop)
        {
            return Ok(None);
        }
        let samples = self.block();
        let message = MediaMessage::raw_audio_s16(
            self.config.source_id,
            self.config.sample_rate,
            1,
            samples,
        )?;
        self.last_emitted = Some(iteration);
        Ok(Some(message))
    }
}

impl Initialize for ToneSource {
    type Config = ToneConfig;

    fn init(&mut self, config: ToneConfig) -> Result<()> {
        let result = self.lifecycle.ensure_uninitialized(&self.name).and_then(|()| {
            if config.sample_rate == 0 || config.samples_per_iteration == 0 {
                return Err(MediaFlowError::config(
                    "tone needs a non-zero rate and block size",
                ));
            }
            Ok(())
        });
        self.diagnostics.record(&self.name, result)?;
        tracing::info!(
            "{} initialized ({} Hz tone, source {})",
            self.name,
            config.frequency_hz,
            config.source_id
        );
        self.config = config;
        self.phase = 0.0;
        self.lifecycle = Lifecycle::Initialized;
        Ok(())
    }
}

impl Component for ToneSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_initialized(&self) -> bool {
        self.lifecycle.is_initialized()
    }

    fn push(&mut self, _iteration: Iteration, _message: MediaMessage) -> Result<()> {
        let result = Err(MediaFlowError::invalid_message(format!(
            "{} is a source and accepts no input",
            self.name
        )));
        self.diagnostics.record(&self.name, result)
    }

    fn pull(&mut self, iteration: Iteration) -> Result<Option<MediaMessage>> {
        let result = self.try_pull(iteration);
        self.diagnostics.record(&self.name, result)
    }

    fn destroy(&mut self) -> Result<()> {
        let result = self.lifecycle.ensure_initialized(&self.name);
        self.diagnostics.record(&self.name, result)?;
        self.last_emitted = None;
        self.iterations.reset();
        self.lifecycle = Lifecycle::Uninitialized;
        Ok(())
    }

    fn last_error(&self) -> Option<&str> {
        self.diagnostics.last_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(stop_after: Option<u64>) -> ToneSource {
        let mut t = ToneSource::new("tone");
        t.init(ToneConfig {
            source_id: 3,
            stop_after: stop_after.map(Iteration),
            ..ToneConfig::default()
        })
        .unwrap();
        t
    }

    #[test]
    fn test_one_block_per_iteration() {
        let mut t = tone(None);
        let msg = t.pull(Iteration(1)).unwrap().unwrap();
        assert_eq!(msg.source_id(), 3);
        assert_eq!(msg.as_raw_audio().unwrap().frames(), 160);
        assert!(t.pull(Iteration(1)).unwrap().is_none());
        assert!(t.pull(Iteration(2)).unwrap().is_some());
    }

    #[test]
    fn test_stops_after_configured_iteration() {
        let mut t = tone(Some(2));
        assert!(t.pull(Iteration(2)).unwrap().is_some());
        assert!(t.pull(Iteration(3)).unwrap().is_none());
    }

    #[test]
    fn test_tone_is_not_silent() {
        let mut t = tone(None);
        let msg = t.pull(Iteration(1)).unwrap().unwrap();
        let peak = msg
            .as_raw_audio()
            .unwrap()
            .s16()
            .unwrap()
            .iter()
            .map(|s| s.unsigned_abs())
            .max()
            .unwrap();
        assert!(peak > 10_000);
    }

    #[test]
    fn test_push_rejected() {
        let mut t = tone(None);
        let msg = MediaMessage::raw_audio_s16(1, 8000, 1, vec![0; 4]).unwrap();
        assert!(t.push(Iteration(1), msg).is_err());
        assert!(t.last_error().is_some());
    }
}
