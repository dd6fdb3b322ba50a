//! Media messages: the unit of data exchanged between components.
//!
//! A `MediaMessage` is immutable once built: fields are private and only
//! read accessors are exposed. Type and subtype are derived from the payload,
//! so a message can never claim one format while carrying another.
//! Ownership moves with the message; fan-out to several receivers goes
//! through [`MediaMessage::duplicate`], which makes an independent deep copy.

use crate::error::{MediaFlowError, Result};
use crate::pipeline::id::SourceId;
use std::fmt;

/// Top-level message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    RawAudio,
    EncodedAudio,
    RawVideo,
}

/// Sample encoding of raw audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Signed 16 bit, native endian.
    S16Native,
    /// 32 bit float.
    F32,
}

/// Codec of encoded audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioCodec {
    Lpc,
    Pcm16,
    Custom(u32),
}

/// Pixel layout of raw video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Planar Y plane followed by quarter-size U and V planes.
    Yuv420p,
    Rgb24,
    Rgb32,
    /// Packed Y0 U Y1 V.
    Yuyv,
}

impl PixelFormat {
    /// Number of payload bytes a frame of `width` x `height` occupies.
    pub fn frame_len(self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            PixelFormat::Yuv420p => pixels + pixels / 2,
            PixelFormat::Rgb24 => pixels * 3,
            PixelFormat::Rgb32 => pixels * 4,
            PixelFormat::Yuyv => pixels * 2,
        }
    }
}

/// Message subtype, scoped by [`MessageType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageSubtype {
    Samples(SampleFormat),
    Codec(AudioCodec),
    Pixels(PixelFormat),
}

/// Interleaved raw samples.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioSamples {
    S16(Vec<i16>),
    F32(Vec<f32>),
}

impl AudioSamples {
    pub fn len(&self) -> usize {
        match self {
            AudioSamples::S16(s) => s.len(),
            AudioSamples::F32(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn format(&self) -> SampleFormat {
        match self {
            AudioSamples::S16(_) => SampleFormat::S16Native,
            AudioSamples::F32(_) => SampleFormat::F32,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawAudio {
    sample_rate: u32,
    channels: u16,
    samples: AudioSamples,
}

impl RawAudio {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn samples(&self) -> &AudioSamples {
        &self.samples
    }

    /// Signed 16 bit samples, if that is the encoding.
    pub fn s16(&self) -> Option<&[i16]> {
        match &self.samples {
            AudioSamples::S16(s) => Some(s),
            AudioSamples::F32(_) => None,
        }
    }

    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodedAudio {
    codec: AudioCodec,
    sample_rate: u32,
    frames: usize,
    data: Vec<u8>,
}

impl EncodedAudio {
    pub fn codec(&self) -> AudioCodec {
        self.codec
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of sample frames this payload decodes to.
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

#[derive(Clone, PartialEq)]
pub struct RawVideo {
    format: PixelFormat,
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl RawVideo {
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for RawVideo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawVideo")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    RawAudio(RawAudio),
    EncodedAudio(EncodedAudio),
    RawVideo(RawVideo),
}

/// Immutable unit of media data tagged with a type/subtype and a source.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaMessage {
    source_id: SourceId,
    payload: Payload,
}

impl MediaMessage {
    /// Raw signed 16 bit interleaved audio.
    pub fn raw_audio_s16(
        source_id: SourceId,
        sample_rate: u32,
        channels: u16,
        samples: Vec<i16>,
    ) -> Result<Self> {
        Self::raw_audio(source_id, sample_rate, channels, AudioSamples::S16(samples))
    }

    /// Raw float interleaved audio.
    pub fn raw_audio_f32(
        source_id: SourceId,
        sample_rate: u32,
        channels: u16,
        samples: Vec<f32>,
    ) -> Result<Self> {
        Self::raw_audio(source_id, sample_rate, channels, AudioSamples::F32(samples))
    }

    fn raw_audio(
        source_id: SourceId,
        sample_rate: u32,
        channels: u16,
        samples: AudioSamples,
    ) -> Result<Self> {
        if sample_rate == 0 || channels == 0 {
            return Err(MediaFlowError::invalid_message(
                "audio needs a non-zero sampling rate and channel count",
            ));
        }
        if samples.len() % channels as usize != 0 {
            return Err(MediaFlowError::invalid_message(format!(
                "{} samples do not divide into {} channels",
                samples.len(),
                channels
            )));
        }
        Ok(Self {
            source_id,
            payload: Payload::RawAudio(RawAudio {
                sample_rate,
                channels,
                samples,
            }),
        })
    }

    /// Encoded audio produced by a codec.
    pub fn encoded_audio(
        source_id: SourceId,
        codec: AudioCodec,
        sample_rate: u32,
        frames: usize,
        data: Vec<u8>,
    ) -> Self {
        Self {
            source_id,
            payload: Payload::EncodedAudio(EncodedAudio {
                codec,
                sample_rate,
                frames,
                data,
            }),
        }
    }

    /// Raw video; `data` must hold exactly one frame of the given geometry.
    pub fn raw_video(
        source_id: SourceId,
        format: PixelFormat,
        width: u32,
        height: u32,
        data: Vec<u8>,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(MediaFlowError::invalid_message(format!(
                "video geometry {}x{} is empty",
                width, height
            )));
        }
        let expected = format.frame_len(width, height);
        if data.len() != expected {
            return Err(MediaFlowError::invalid_message(format!(
                "{:?} frame of {}x{} needs {} bytes, got {}",
                format,
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            source_id,
            payload: Payload::RawVideo(RawVideo {
                format,
                width,
                height,
                data,
            }),
        })
    }

    pub fn message_type(&self) -> MessageType {
        match &self.payload {
            Payload::RawAudio(_) => MessageType::RawAudio,
            Payload::EncodedAudio(_) => MessageType::EncodedAudio,
            Payload::RawVideo(_) => MessageType::RawVideo,
        }
    }

    pub fn subtype(&self) -> MessageSubtype {
        match &self.payload {
            Payload::RawAudio(a) => MessageSubtype::Samples(a.samples.format()),
            Payload::EncodedAudio(e) => MessageSubtype::Codec(e.codec),
            Payload::RawVideo(v) => MessageSubtype::Pixels(v.format),
        }
    }

    pub fn source_id(&self) -> SourceId {
        self.source_id
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn as_raw_audio(&self) -> Option<&RawAudio> {
        match &self.payload {
            Payload::RawAudio(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_encoded_audio(&self) -> Option<&EncodedAudio> {
        match &self.payload {
            Payload::EncodedAudio(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_raw_video(&self) -> Option<&RawVideo> {
        match &self.payload {
            Payload::RawVideo(v) => Some(v),
            _ => None,
        }
    }

    /// Independent deep copy for fan-out.
    pub fn duplicate(&self) -> Self {
        self.clone()
    }

    /// Re-tag the message with another source, consuming it.
    pub fn with_source_id(mut self, source_id: SourceId) -> Self {
        self.source_id = source_id;
        self
    }
}
