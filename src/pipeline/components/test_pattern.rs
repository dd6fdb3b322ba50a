//! Synthetic RGB24 video source.
//!
//! Cycles through a list of geometries, holding each for a fixed number of
//! iterations, so consumers see the frame size change over time.

use crate::error::{MediaFlowError, Result};
use crate::pipeline::component::{Component, Diagnostics, Initialize, IterationTracker, Lifecycle};
use crate::pipeline::id::{Iteration, SourceId};
use crate::pipeline::message::{MediaMessage, PixelFormat};

#[derive(Debug, Clone)]
pub struct TestPatternConfig {
    pub source_id: SourceId,
    /// Frame sizes to cycle through.
    pub geometries: Vec<(u32, u32)>,
    /// Iterations each geometry is held for.
    pub iterations_per_geometry: u64,
    pub stop_after: Option<Iteration>,
}

impl Default for TestPatternConfig {
    fn default() -> Self {
        Self {
            source_id: 1,
            geometries: vec![(64, 48)],
            iterations_per_geometry: 100,
            stop_after: None,
        }
    }
}

pub struct TestPatternSource {
    name: String,
    config: TestPatternConfig,
    first: Option<Iteration>,
    last_emitted: Option<Iteration>,
    iterations: IterationTracker,
    lifecycle: Lifecycle,
    diagnostics: Diagnostics,
}

impl TestPatternSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: TestPatternConfig::default(),
            first: None,
            last_emitted: None,
            iterations: IterationTracker::new(),
            lifecycle: Lifecycle::default(),
            diagnostics: Diagnostics::default(),
        }
    }

    /// Geometry in effect at `iteration`.
    pub fn geometry_at(&self, iteration: Iteration) -> (u32, u32) {
        let elapsed = self
            .first
            .map_or(0, |first| iteration.distance_from(first));
        let slot = elapsed / self.config.iterations_per_geometry.max(1);
        let index = (slot % self.config.geometries.len().max(1) as u64) as usize;
        self.config.geometries.get(index).copied().unwrap_or((1, 1))
    }

    fn render(width: u32, height: u32, shade: u8) -> Vec<u8> {
        let mut data = Vec::with_capacity(PixelFormat::Rgb24.frame_len(width, height));
        for y in 0..height {
            for x in 0..width {
                data.push((x * 255 / width.max(1)) as u8);
                data.push((y * 255 / height.max(1)) as u8);
                data.push(shade);
            }
        }
        data
    }

    fn try_pull(&mut self, iteration: Iteration) -> Result<Option<MediaMessage>> {
        self.lifecycle.ensure_initialized(&self.name)?;
        self.iterations.observe(iteration)?;

        if self.last_emitted == Some(iteration)
            || self.config.stop_after.is_some_and(|stop| iteration > stop)
        {
            return Ok(None);
        }
        self.first.get_or_insert(iteration);
        let (width, height) = self.geometry_at(iteration);
        let data = Self::render(width, height, iteration.0 as u8);
        let message =
            MediaMessage::raw_video(self.config.source_id, PixelFormat::Rgb24, width, height, data)?;
        self.last_emitted = Some(iteration);
        Ok(Some(message))
    }
}

impl Initialize for TestPatternSource {
    type Config = TestPatternConfig;

    fn init(&mut self, config: TestPatternConfig) -> Result<()> {
        let result = self.lifecycle.ensure_uninitialized(&self.name).and_then(|()| {
            if config.geometries.is_empty()
                || config.geometries.iter().any(|&(w, h)| w == 0 || h == 0)
            {
                return Err(MediaFlowError::config(
                    "test pattern needs at least one non-empty geometry",
                ));
            }
            Ok(())
        });
        self.diagnostics.record(&self.name, result)?;
        tracing::info!(
            "{} initialized (source {}, {} geometries)",
            self.name,
            config.source_id,
            config.geometries.len()
        );
        self.config = config;
        self.first = None;
        self.lifecycle = Lifecycle::Initialized;
        Ok(())
    }
}

impl Component for TestPatternSource {
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
        self.first = None;
        self.last_emitted = None;
        self.iterations.reset();
        self.lifecycle = Lifecycle::Uninitialized;
        Ok(())
    }

    fn last_error(&self) -> Option<&str> {
        self.diagnostics.last_error()
    }
}
