//! Animated GIF reader.
//!
//! Frames are decoded and composited up front with the `image` crate, so
//! packets already carry full-canvas RGBA pictures. Timestamps are in
//! milliseconds. The nominal frame rate is `1000 / gcd(delays)`, which puts
//! every frame start on a whole frame index.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use bytes::Bytes;
use image::codecs::gif::GifDecoder;
use image::AnimationDecoder;
use tracing::{debug, info};

use crate::container::{CodecPair, ContainerReader, FormatHandler, Packet, Probe, StreamKind};
use crate::decoder::raw::RawVideoCodec;
use crate::error::{MediaError, MediaResult};
use crate::stream::{PixelFormat, StreamInfo, VideoInfo};
use crate::time::{MediaTime, Rational};

/// Shorter delays are clamped, as browsers do.
pub const MIN_DELAY_MS: u32 = 20;

const MILLISECOND: Rational = Rational::new_raw(1, 1000);

struct GifFrame {
    pts_ms: i64,
    delay_ms: u32,
    data: Bytes,
}

pub struct GifReader {
    frames: Vec<GifFrame>,
    width: u32,
    height: u32,
    info: StreamInfo,
    next: usize,
}

impl GifReader {
    pub fn open(path: &Path) -> MediaResult<Self> {
        let file = File::open(path).map_err(|e| MediaError::OpenFailed(format!("{}: {}", path.display(), e)))?;
        let decoder = GifDecoder::new(BufReader::new(file))
            .map_err(|e| MediaError::OpenFailed(format!("Failed to decode GIF: {}", e)))?;
        let decoded = decoder
            .into_frames()
            .collect_frames()
            .map_err(|e| MediaError::OpenFailed(format!("GIF frame error: {}", e)))?;

        let (width, height) = match decoded.first() {
            Some(first) => first.buffer().dimensions(),
            None => return Err(MediaError::OpenFailed("GIF has no frames".into())),
        };

        let mut frames = Vec::with_capacity(decoded.len());
        let mut pts_ms = 0i64;
        for frame in decoded {
            let (numer, denom) = frame.delay().numer_denom_ms();
            let delay_ms = if denom == 0 { 0 } else { (numer + denom / 2) / denom };
            let delay_ms = delay_ms.max(MIN_DELAY_MS);
            frames.push(GifFrame {
                pts_ms,
                delay_ms,
                data: Bytes::from(frame.into_buffer().into_raw()),
            });
            pts_ms += i64::from(delay_ms);
        }

        let tick = frames.iter().map(|f| f.delay_ms).fold(0, gcd);
        let frame_rate = Rational::new(1000, i64::from(tick));
        let total_ms = pts_ms;

        info!(path = %path.display(), width, height, frames = frames.len(), rate = %frame_rate, "Loaded GIF");

        let info = StreamInfo {
            path: path.to_path_buf(),
            format: "gif".into(),
            video: Some(VideoInfo {
                codec: "gif".into(),
                width,
                height,
                pixel_format: PixelFormat::Rgba8,
                frame_rate,
                time_base: MILLISECOND,
                frame_count: Some((total_ms / i64::from(tick)) as u64),
            }),
            audio: None,
            duration: Some(MediaTime::from_timestamp(total_ms, MILLISECOND)),
        };

        Ok(Self {
            frames,
            width,
            height,
            info,
            next: 0,
        })
    }

    pub fn frame_delays_ms(&self) -> Vec<u32> {
        self.frames.iter().map(|f| f.delay_ms).collect()
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

impl ContainerReader for GifReader {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn read_packet(&mut self) -> MediaResult<Option<Packet>> {
        let Some(frame) = self.frames.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;
        Ok(Some(Packet {
            stream: StreamKind::Video,
            pts: Some(frame.pts_ms),
            duration: Some(i64::from(frame.delay_ms)),
            keyframe: true,
            data: frame.data.clone(),
        }))
    }

    fn seek_near(&mut self, target: MediaTime) -> MediaResult<()> {
        let target_ms = target.to_timestamp(MILLISECOND);
        // Last frame starting at or before the target.
        self.next = self
            .frames
            .iter()
            .rposition(|f| f.pts_ms <= target_ms)
            .unwrap_or(0);
        debug!(target = %target, frame = self.next, "GIF seek");
        Ok(())
    }

    fn open_codecs(&mut self) -> MediaResult<CodecPair> {
        let codec = RawVideoCodec::new(self.width, self.height, PixelFormat::Rgba8);
        Ok((Some(Box::new(codec)), None))
    }
}

pub struct GifHandler;

impl FormatHandler for GifHandler {
    fn name(&self) -> &'static str {
        "gif"
    }

    fn can_read(&self, probe: &Probe) -> bool {
        probe.header.starts_with(b"GIF87a") || probe.header.starts_with(b"GIF89a")
    }

    fn open(&self, path: &Path) -> MediaResult<Box<dyn ContainerReader>> {
        Ok(Box::new(GifReader::open(path)?))
    }
}
