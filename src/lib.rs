//! # MediaFlow-RS: component framework for real-time media pipelines
//!
//! Audio/video pipelines are assembled from interchangeable components that
//! exchange typed media messages once per iteration.
//!
//! ## Architecture
//!
//! - **Components**: one push/pull/destroy interface for sources, encoders
//!   and sinks, with kind-specific initialization
//! - **Frame accumulation**: encoders buffer samples into fixed-size frames
//!   and queue the encoded output until pulled
//! - **Source sessions**: multi-source sinks keep one session per logical
//!   source and evict sources that go quiet for longer than a timeout
//! - **Cross-domain dispatch**: frames reach consumer loops through
//!   single-slot, most-recent-wins mailboxes, so producers never block
//!
//! ## Configuration
//!
//! The only core tunable is the inactivity timeout of multi-source sinks
//! (`output.source_timeout_secs`). See [`config::MediaFlowConfig`].
//!
//! ## Example
//!
//! ```no_run
//! use mediaflow_rs::config::OutputConfig;
//! use mediaflow_rs::pipeline::components::{TestPatternConfig, TestPatternSource, VideoOutput};
//! use mediaflow_rs::pipeline::{Chain, Initialize};
//!
//! fn main() -> mediaflow_rs::Result<()> {
//!     let mut pattern = TestPatternSource::new("pattern");
//!     pattern.init(TestPatternConfig::default())?;
//!
//!     let mut video = VideoOutput::new("video");
//!     video.init(OutputConfig::with_timeout_secs(2.0))?;
//!     let mut view = video.create_view(1);
//!
//!     let mut chain = Chain::new();
//!     let src = chain.add_component(pattern);
//!     let sink = chain.add_component(video);
//!     chain.link(src, sink)?;
//!
//!     chain.run_iteration();
//!     if let Some(frame) = view.poll() {
//!         println!("resize: {:?}", frame.resize);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod pipeline;

// Re-export commonly used types
pub use config::{AudioOutputConfig, MediaFlowConfig, OutputConfig, SourceTimeout};
pub use error::{ErrorKind, MediaFlowError, Result, ResultExt};
pub use pipeline::{Chain, Component, Initialize, Iteration, MediaMessage, SourceId};
