//! Configuration module for MediaFlow-RS
//!
//! The core has a single tunable: the inactivity timeout after which a
//! multi-source sink forgets a source. The remaining sections configure the
//! built-in PCM framer and the demo binary.
//!
//! # Files
//!
//! Configuration files may be TOML (`.toml`) or JSON (any other extension),
//! e.g.
//!
//! ```toml
//! [output]
//! source_timeout_secs = 2.0
//!
//! [encoder]
//! frame_size = 160
//! sample_rate = 8000
//! ```

use crate::error::{MediaFlowError, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default inactivity timeout in seconds
pub const DEFAULT_SOURCE_TIMEOUT_SECS: f64 = 10.0;

/// Default frame size of the PCM framer in samples
pub const DEFAULT_FRAME_SIZE: usize = 160;

/// Default sampling rate of the PCM framer in Hz
pub const DEFAULT_SAMPLE_RATE: u32 = 8000;

// ==================== Source Timeout ====================

/// Strictly positive inactivity timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceTimeout(Duration);

impl SourceTimeout {
    /// Fails with a configuration error for zero, negative or non-finite values.
    pub fn from_secs_f64(secs: f64) -> Result<Self> {
        if !secs.is_finite() || secs <= 0.0 {
            return Err(MediaFlowError::config(format!(
                "A positive timeout must be specified (got {})",
                secs
            )));
        }
        Ok(Self(Duration::from_secs_f64(secs)))
    }

    pub fn from_duration(duration: Duration) -> Result<Self> {
        if duration.is_zero() {
            return Err(MediaFlowError::config("A positive timeout must be specified"));
        }
        Ok(Self(duration))
    }

    pub fn as_duration(self) -> Duration {
        self.0
    }
}

// ==================== Output Config ====================

/// Settings for multi-source sinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Seconds without a message before a source is evicted
    #[serde(default = "default_source_timeout_secs")]
    pub source_timeout_secs: f64,
}

fn default_source_timeout_secs() -> f64 {
    DEFAULT_SOURCE_TIMEOUT_SECS
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            source_timeout_secs: DEFAULT_SOURCE_TIMEOUT_SECS,
        }
    }
}

impl OutputConfig {
    pub fn with_timeout_secs(secs: f64) -> Self {
        Self {
            source_timeout_secs: secs,
        }
    }

    /// The validated timeout.
    pub fn source_timeout(&self) -> Result<SourceTimeout> {
        SourceTimeout::from_secs_f64(self.source_timeout_secs)
    }
}

// ==================== Audio Output Config ====================

/// Channel count of the audio sink unless configured otherwise
pub const DEFAULT_AUDIO_CHANNELS: u16 = 1;

/// Settings for the positional audio sink.
///
/// The playback format is fixed when the sink is initialized: signed 16 bit
/// samples at `sample_rate` with `channels` interleaved channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioOutputConfig {
    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_audio_channels")]
    pub channels: u16,
}

fn default_audio_channels() -> u16 {
    DEFAULT_AUDIO_CHANNELS
}

impl Default for AudioOutputConfig {
    fn default() -> Self {
        Self {
            output: OutputConfig::default(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_AUDIO_CHANNELS,
        }
    }
}

impl AudioOutputConfig {
    pub fn with_timeout_secs(secs: f64) -> Self {
        Self {
            output: OutputConfig::with_timeout_secs(secs),
            ..Self::default()
        }
    }

    pub fn with_format(mut self, sample_rate: u32, channels: u16) -> Self {
        self.sample_rate = sample_rate;
        self.channels = channels;
        self
    }

    /// Check the playback format and return the validated timeout.
    pub fn validate(&self) -> Result<SourceTimeout> {
        if self.sample_rate == 0 || self.channels == 0 {
            return Err(MediaFlowError::config(format!(
                "Audio output needs a non-zero rate and channel count (got {} Hz, {} channels)",
                self.sample_rate, self.channels
            )));
        }
        self.output.source_timeout()
    }
}

// ==================== Encoder Config ====================

/// Settings for the built-in PCM framer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

fn default_frame_size() -> usize {
    DEFAULT_FRAME_SIZE
}

fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            frame_size: DEFAULT_FRAME_SIZE,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

// ==================== Demo Config ====================

/// Settings for the demo binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoConfig {
    /// Milliseconds between chain iterations
    #[serde(default = "default_iteration_interval_ms")]
    pub iteration_interval_ms: u64,

    /// Number of iterations to run
    #[serde(default = "default_iterations")]
    pub iterations: u64,
}

fn default_iteration_interval_ms() -> u64 {
    20
}

fn default_iterations() -> u64 {
    500
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            iteration_interval_ms: default_iteration_interval_ms(),
            iterations: default_iterations(),
        }
    }
}

impl DemoConfig {
    pub fn iteration_interval(&self) -> Duration {
        Duration::from_millis(self.iteration_interval_ms)
    }
}

// ==================== MediaFlow Config ====================

/// Complete configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MediaFlowConfig {
    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub encoder: EncoderConfig,

    #[serde(default)]
    pub demo: DemoConfig,
}

fn is_toml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "toml")
}

impl MediaFlowConfig {
    /// Load from a TOML or JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(MediaFlowError::from)
            .with_context(|| format!("Failed to read {:?}", path))?;

        let config: Self = if is_toml(path) {
            toml::from_str(&content).map_err(|e| {
                MediaFlowError::Serialization(format!("Failed to parse {:?}: {}", path, e))
            })?
        } else {
            serde_json::from_str(&content).map_err(|e| {
                MediaFlowError::Serialization(format!("Failed to parse {:?}: {}", path, e))
            })?
        };

        config
            .output
            .source_timeout()
            .context("Invalid [output] section")?;
        Ok(config)
    }

    /// Load from a file, falling back to defaults on any failure.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Using default configuration: {}", e);
                Self::default()
            }
        }
    }

    /// Save as TOML or JSON depending on the extension.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_toml(path) {
            toml::to_string_pretty(self)
                .map_err(|e| MediaFlowError::Serialization(e.to_string()))?
        } else {
            serde_json::to_string_pretty(self)
                .map_err(|e| MediaFlowError::Serialization(e.to_string()))?
        };
        std::fs::write(path, content)?;
        tracing::debug!("Saved configuration to {:?}", path);
        Ok(())
    }
}
