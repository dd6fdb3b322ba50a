//! Built-in component implementations.

pub mod audio_output;
pub mod frame_encoder;
pub mod test_pattern;
pub mod tone_source;
pub mod video_output;

pub use audio_output::{
    AudioBackend, AudioOutput, Listener, NullAudioBackend, Position, Voice, VoiceId,
};
pub use frame_encoder::{FrameAccumulator, FrameEncoder, FrameEncoderComponent, PcmFrameEncoder};
pub use test_pattern::{TestPatternConfig, TestPatternSource};
pub use tone_source::{ToneConfig, ToneSource};
pub use video_output::{VideoFeed, VideoOutput};
