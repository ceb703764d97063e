//! Decoded frames in presentation format.
//!
//! Frames are created by the decoder, owned by a queue until popped, then
//! handed to the presentation layer. Buffers sit behind `Arc` so handing a
//! frame to several observers never copies pixel or sample data, and nobody
//! downstream mutates them.

use std::sync::Arc;

use crate::stream::{PixelFormat, SampleFormat};

// ============================================================================
// Video
// ============================================================================

/// An owned image buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl Image {
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self { width, height, format, data }
    }
}

/// A decoded picture tagged with its presentation index (frame number).
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub index: i64,
    pub image: Arc<Image>,
}

impl VideoFrame {
    pub fn new(index: i64, image: Image) -> Self {
        Self { index, image: Arc::new(image) }
    }
}

impl PartialEq for VideoFrame {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && Arc::ptr_eq(&self.image, &other.image)
    }
}

// ============================================================================
// Audio
// ============================================================================

/// Interleaved `f32` samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub channels: u16,
    pub sample_rate: u32,
    pub format: SampleFormat,
    pub samples: Vec<f32>,
}

impl AudioBuffer {
    pub fn new(channels: u16, sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            channels,
            sample_rate,
            format: SampleFormat::F32,
            samples,
        }
    }

    /// Samples per channel.
    pub fn sample_count(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }
}

/// A decoded sample block tagged with the offset (in samples per channel)
/// of its first sample.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub offset: i64,
    pub buffer: Arc<AudioBuffer>,
}

impl AudioFrame {
    pub fn new(offset: i64, buffer: AudioBuffer) -> Self {
        Self { offset, buffer: Arc::new(buffer) }
    }

    /// Offset one past the last sample.
    pub fn end(&self) -> i64 {
        self.offset + self.buffer.sample_count() as i64
    }

    /// Drop the first `count` samples per channel.
    pub fn trim_front(&self, count: usize) -> AudioFrame {
        let channels = self.buffer.channels as usize;
        let count = count.min(self.buffer.sample_count());
        let samples = self.buffer.samples[count * channels..].to_vec();
        AudioFrame::new(
            self.offset + count as i64,
            AudioBuffer::new(self.buffer.channels, self.buffer.sample_rate, samples),
        )
    }
}

impl PartialEq for AudioFrame {
    fn eq(&self, other: &Self) -> bool {
        self.offset == other.offset && Arc::ptr_eq(&self.buffer, &other.buffer)
    }
}

// ============================================================================
// Presentation Position
// ============================================================================

/// Frames that carry an integer presentation position (frame index or
/// sample offset). The queue and the clock order and compare on this.
pub trait Timestamped {
    fn position(&self) -> i64;
}

impl Timestamped for VideoFrame {
    fn position(&self) -> i64 {
        self.index
    }
}

impl Timestamped for AudioFrame {
    fn position(&self) -> i64 {
        self.offset
    }
}
