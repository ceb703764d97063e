//! Stream metadata established once at open time.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::time::{MediaTime, Rational};

// ============================================================================
// Formats
// ============================================================================

/// Pixel layouts understood by the converter. `Rgba8` is the presentation
/// format every decoded image ends up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    Gray8,
    Yuv420p,
    Yuv422p,
    Yuv444p,
    Rgb8,
    Rgba8,
}

impl PixelFormat {
    /// Chroma subsampling shifts (x, y) for planar YUV formats.
    pub fn chroma_shift(&self) -> (u32, u32) {
        match self {
            Self::Yuv420p => (1, 1),
            Self::Yuv422p => (1, 0),
            _ => (0, 0),
        }
    }

    /// Width and height of the chroma planes.
    pub fn chroma_size(&self, width: u32, height: u32) -> (usize, usize) {
        let (sx, sy) = self.chroma_shift();
        let cw = (width as usize + (1 << sx) - 1) >> sx;
        let ch = (height as usize + (1 << sy) - 1) >> sy;
        (cw, ch)
    }

    /// Bytes needed for one tightly packed image.
    pub fn buffer_size(&self, width: u32, height: u32) -> usize {
        let luma = width as usize * height as usize;
        match self {
            Self::Gray8 => luma,
            Self::Yuv420p | Self::Yuv422p | Self::Yuv444p => {
                let (cw, ch) = self.chroma_size(width, height);
                luma + 2 * cw * ch
            }
            Self::Rgb8 => luma * 3,
            Self::Rgba8 => luma * 4,
        }
    }
}

/// Source sample formats. Decoded audio is always presented as interleaved
/// `F32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleFormat {
    U8,
    S16,
    S24,
    S32,
    F32,
    F64,
}

// ============================================================================
// Stream Info
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    /// Source pixel format (before conversion to RGBA).
    pub pixel_format: PixelFormat,
    pub frame_rate: Rational,
    /// Unit of packet timestamps for this stream.
    pub time_base: Rational,
    /// Total frames; filled from the stream duration when the container
    /// does not state it.
    pub frame_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioInfo {
    pub codec: String,
    pub sample_rate: u32,
    /// Channel count of the source stream.
    pub channels: u16,
    pub sample_format: SampleFormat,
    pub time_base: Rational,
    pub sample_count: Option<u64>,
}

/// Everything the session and UI need to know about an opened resource.
/// Immutable once the container reader has produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub path: PathBuf,
    /// Name of the format handler that opened the resource.
    pub format: String,
    pub video: Option<VideoInfo>,
    pub audio: Option<AudioInfo>,
    /// Container duration, if known.
    pub duration: Option<MediaTime>,
}

impl StreamInfo {
    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    /// Fill frame/sample counts from the container duration where the
    /// stream itself did not provide them, and the container duration from
    /// the streams where it is missing.
    pub fn resolve_counts(mut self) -> Self {
        if let Some(duration) = self.duration {
            if let Some(video) = self.video.as_mut() {
                if video.frame_count.is_none() && video.frame_rate.is_positive() {
                    video.frame_count = Some(duration.to_frame_index(video.frame_rate).max(0) as u64);
                }
            }
            if let Some(audio) = self.audio.as_mut() {
                if audio.sample_count.is_none() && audio.sample_rate > 0 {
                    audio.sample_count = Some(duration.to_sample_offset(audio.sample_rate).max(0) as u64);
                }
            }
        }

        if self.duration.is_none() {
            let video_end = self.video.as_ref().and_then(|v| {
                let count = v.frame_count?;
                v.frame_rate
                    .is_positive()
                    .then(|| MediaTime::from_frame_index(count as i64, v.frame_rate))
            });
            let audio_end = self.audio.as_ref().and_then(|a| {
                let count = a.sample_count?;
                (a.sample_rate > 0).then(|| MediaTime::from_sample_offset(count as i64, a.sample_rate))
            });
            self.duration = match (video_end, audio_end) {
                (Some(v), Some(a)) => Some(v.max(a)),
                (v, a) => v.or(a),
            };
        }
        self
    }
}
