//! Test data builders for creating messages and components

use mediaflow_rs::pipeline::{MediaMessage, PixelFormat, SourceId};

/// Builder for raw video frames filled with a constant byte
pub struct FrameBuilder {
    source_id: SourceId,
    format: PixelFormat,
    width: u32,
    height: u32,
    fill: u8,
}

impl FrameBuilder {
    pub fn new(source_id: SourceId) -> Self {
        Self {
            source_id,
            format: PixelFormat::Rgb24,
            width: 4,
            height: 4,
            fill: 0,
        }
    }

    pub fn format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn fill(mut self, fill: u8) -> Self {
        self.fill = fill;
        self
    }

    pub fn build(self) -> MediaMessage {
        let len = self.format.frame_len(self.width, self.height);
        MediaMessage::raw_video(
            self.source_id,
            self.format,
            self.width,
            self.height,
            vec![self.fill; len],
        )
        .unwrap()
    }
}

/// Mono S16 audio at 8 kHz
pub fn mono_audio(source_id: SourceId, samples: usize) -> MediaMessage {
    MediaMessage::raw_audio_s16(source_id, 8000, 1, vec![100; samples]).unwrap()
}
