//! # Frame Decoder
//!
//! Codec backends behind two small traits, plus [`FrameDecoder`] which
//! drives them packet by packet, drains every frame a codec is ready to
//! emit, converts to presentation format and stamps each frame with its
//! presentation index (video) or sample offset (audio).
//!
//! Codecs follow a send/receive model: a packet goes in, then
//! `receive_*` is called until it returns `None` ("need more input"). A
//! codec may buffer and emit zero, one or many frames per packet.

use bytes::Bytes;
use tracing::{trace, warn};

use crate::container::Packet;
use crate::convert::{to_presentation_audio, RgbaConverter};
use crate::error::{MediaError, MediaResult};
use crate::frame::{AudioBuffer, AudioFrame, Image, VideoFrame};
use crate::stream::{AudioInfo, PixelFormat, StreamInfo, VideoInfo};
use crate::time::Rational;

pub mod audio;
pub mod raw;

// ============================================================================
// Codec Traits
// ============================================================================

/// A decoded picture in source layout.
#[derive(Debug, Clone)]
pub struct RawPicture {
    /// Output timestamp in the stream time base.
    pub pts: Option<i64>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Bytes,
}

/// A decoded sample block, one `Vec` per channel.
#[derive(Debug, Clone)]
pub struct RawAudio {
    pub pts: Option<i64>,
    pub sample_rate: u32,
    pub planes: Vec<Vec<f32>>,
}

pub trait VideoCodec: Send {
    fn name(&self) -> &str;

    fn send_packet(&mut self, packet: &Packet) -> MediaResult<()>;

    /// No more input; buffered frames may now be released.
    fn send_eof(&mut self) -> MediaResult<()>;

    /// Next ready frame, or `None` when the codec needs more input.
    fn receive_picture(&mut self) -> MediaResult<Option<RawPicture>>;

    /// Drop internal state after a seek.
    fn reset(&mut self);
}

pub trait AudioCodec: Send {
    fn name(&self) -> &str;

    fn send_packet(&mut self, packet: &Packet) -> MediaResult<()>;

    fn send_eof(&mut self) -> MediaResult<()>;

    fn receive_audio(&mut self) -> MediaResult<Option<RawAudio>>;

    fn reset(&mut self);
}

// ============================================================================
// Frame Decoder
// ============================================================================

struct VideoPath {
    codec: Box<dyn VideoCodec>,
    time_base: Rational,
    frame_rate: Rational,
    converter: Option<RgbaConverter>,
    last_index: Option<i64>,
}

struct AudioPath {
    codec: Box<dyn AudioCodec>,
    time_base: Rational,
    sample_rate: u32,
    next_offset: Option<i64>,
}

/// Packets in, presentation-format frames out.
pub struct FrameDecoder {
    video: Option<VideoPath>,
    audio: Option<AudioPath>,
}

impl FrameDecoder {
    pub fn new(
        info: &StreamInfo,
        video_codec: Option<Box<dyn VideoCodec>>,
        audio_codec: Option<Box<dyn AudioCodec>>,
    ) -> MediaResult<Self> {
        let video = match (&info.video, video_codec) {
            (Some(vi), Some(codec)) => Some(VideoPath::new(vi, codec)?),
            (Some(vi), None) => {
                return Err(MediaError::OpenFailed(format!("no decoder for video codec {}", vi.codec)));
            }
            (None, _) => None,
        };
        let audio = match (&info.audio, audio_codec) {
            (Some(ai), Some(codec)) => Some(AudioPath::new(ai, codec)?),
            (Some(ai), None) => {
                return Err(MediaError::OpenFailed(format!("no decoder for audio codec {}", ai.codec)));
            }
            (None, _) => None,
        };

        if video.is_none() && audio.is_none() {
            return Err(MediaError::OpenFailed("no decodable stream".into()));
        }

        Ok(Self { video, audio })
    }

    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    /// Feed one video packet (`None` flushes) and drain every ready frame.
    pub fn decode_video(&mut self, packet: Option<&Packet>) -> MediaResult<Vec<VideoFrame>> {
        match self.video.as_mut() {
            Some(path) => path.decode(packet),
            None => Ok(Vec::new()),
        }
    }

    /// Feed one audio packet (`None` flushes) and drain every ready block.
    pub fn decode_audio(&mut self, packet: Option<&Packet>) -> MediaResult<Vec<AudioFrame>> {
        match self.audio.as_mut() {
            Some(path) => path.decode(packet),
            None => Ok(Vec::new()),
        }
    }

    /// Forget buffered codec state and timestamp history (after a seek).
    pub fn reset(&mut self) {
        if let Some(video) = self.video.as_mut() {
            video.codec.reset();
            video.last_index = None;
        }
        if let Some(audio) = self.audio.as_mut() {
            audio.codec.reset();
            audio.next_offset = None;
        }
    }

    pub fn codec_names(&self) -> (Option<&str>, Option<&str>) {
        (
            self.video.as_ref().map(|v| v.codec.name()),
            self.audio.as_ref().map(|a| a.codec.name()),
        )
    }
}

impl VideoPath {
    fn new(info: &VideoInfo, codec: Box<dyn VideoCodec>) -> MediaResult<Self> {
        if !info.frame_rate.is_positive() || !info.time_base.is_positive() {
            return Err(MediaError::OpenFailed(format!(
                "invalid video timing: rate {} time base {}",
                info.frame_rate, info.time_base
            )));
        }
        Ok(Self {
            codec,
            time_base: info.time_base,
            frame_rate: info.frame_rate,
            converter: None,
            last_index: None,
        })
    }

    fn decode(&mut self, packet: Option<&Packet>) -> MediaResult<Vec<VideoFrame>> {
        match packet {
            Some(packet) => self.codec.send_packet(packet)?,
            None => self.codec.send_eof()?,
        }

        let mut frames = Vec::new();
        loop {
            let picture = match self.codec.receive_picture() {
                Ok(Some(picture)) => picture,
                Ok(None) => break,
                Err(e) => {
                    warn!(codec = self.codec.name(), error = %e, "Video receive failed");
                    break;
                }
            };

            let index = match picture.pts {
                Some(pts) => Rational::rescale_round(pts, self.time_base, self.frame_rate.recip()),
                None => self.last_index.map_or(0, |last| last + 1),
            };
            self.last_index = Some(index);

            match self.convert(&picture) {
                Ok(image) => {
                    trace!(index, "Decoded video frame");
                    frames.push(VideoFrame::new(index, image));
                }
                Err(e) => warn!(index, error = %e, "Dropping unconvertible frame"),
            }
        }
        Ok(frames)
    }

    fn convert(&mut self, picture: &RawPicture) -> MediaResult<Image> {
        let stale = self.converter.as_ref().map_or(true, |c| {
            c.source_format() != picture.format || c.size() != (picture.width, picture.height)
        });
        if stale {
            self.converter = Some(RgbaConverter::new(picture.format, picture.width, picture.height)?);
        }
        match self.converter.as_ref() {
            Some(converter) => converter.convert(&picture.data),
            None => Err(MediaError::DecodeFailed("no converter".into())),
        }
    }
}

impl AudioPath {
    fn new(info: &AudioInfo, codec: Box<dyn AudioCodec>) -> MediaResult<Self> {
        if info.sample_rate == 0 || !info.time_base.is_positive() {
            return Err(MediaError::OpenFailed(format!(
                "invalid audio timing: rate {} time base {}",
                info.sample_rate, info.time_base
            )));
        }
        Ok(Self {
            codec,
            time_base: info.time_base,
            sample_rate: info.sample_rate,
            next_offset: None,
        })
    }

    fn decode(&mut self, packet: Option<&Packet>) -> MediaResult<Vec<AudioFrame>> {
        match packet {
            Some(packet) => self.codec.send_packet(packet)?,
            None => self.codec.send_eof()?,
        }

        let samples_per_second = Rational::from_integer(i64::from(self.sample_rate)).recip();
        let mut frames = Vec::new();
        loop {
            let block = match self.codec.receive_audio() {
                Ok(Some(block)) => block,
                Ok(None) => break,
                Err(e) => {
                    warn!(codec = self.codec.name(), error = %e, "Audio receive failed");
                    break;
                }
            };

            let offset = match block.pts {
                Some(pts) => Rational::rescale_round(pts, self.time_base, samples_per_second),
                None => self.next_offset.unwrap_or(0),
            };

            let (channels, samples) = to_presentation_audio(&block.planes);
            let buffer = AudioBuffer::new(channels, block.sample_rate, samples);
            let frame = AudioFrame::new(offset, buffer);
            self.next_offset = Some(frame.end());
            trace!(offset, samples = frame.buffer.sample_count(), "Decoded audio block");
            frames.push(frame);
        }
        Ok(frames)
    }
}
