//! Scripted container for pipeline tests.
//!
//! Video frame `i` is a 2x2 RGBA picture whose first byte is `i as u8`,
//! stamped in a 1/90000 time base. With audio enabled, each video packet is
//! followed by one stereo block covering the same span at 48 kHz.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use crate::container::{CodecPair, ContainerReader, Packet, StreamKind};
use crate::decoder::{AudioCodec, RawAudio, RawPicture, VideoCodec};
use crate::error::{MediaError, MediaResult};
use crate::stream::{AudioInfo, PixelFormat, SampleFormat, StreamInfo, VideoInfo};
use crate::time::{MediaTime, Rational};

pub(crate) const VIDEO_TIME_BASE: Rational = Rational::new_raw(1, 90_000);
pub(crate) const SAMPLE_RATE: u32 = 48_000;

#[derive(Debug, Clone)]
pub(crate) struct Fixture {
    video_frames: Option<u64>,
    frame_rate: Rational,
    audio: bool,
    keyframe_interval: u64,
    codec_delay: usize,
    fail_read_at: Option<usize>,
    fail_decode_at: Option<u64>,
    fail_seek: bool,
    reads: Arc<AtomicUsize>,
}

impl Fixture {
    /// Finite video-only stream at 24 fps.
    pub(crate) fn video(frames: u64) -> Self {
        Self {
            video_frames: Some(frames),
            frame_rate: Rational::from_integer(24),
            audio: false,
            keyframe_interval: 1,
            codec_delay: 0,
            fail_read_at: None,
            fail_decode_at: None,
            fail_seek: false,
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Never reaches end of stream.
    pub(crate) fn infinite() -> Self {
        Self {
            video_frames: None,
            ..Self::video(0)
        }
    }

    pub(crate) fn with_audio(mut self) -> Self {
        self.audio = true;
        self
    }

    pub(crate) fn keyframe_interval(mut self, interval: u64) -> Self {
        self.keyframe_interval = interval.max(1);
        self
    }

    pub(crate) fn codec_delay(mut self, delay: usize) -> Self {
        self.codec_delay = delay;
        self
    }

    /// The `n`th `read_packet` call (0-based) fails.
    pub(crate) fn fail_read_at(mut self, n: usize) -> Self {
        self.fail_read_at = Some(n);
        self
    }

    /// Video frame `n` arrives as an empty packet the codec rejects.
    pub(crate) fn fail_decode_at(mut self, n: u64) -> Self {
        self.fail_decode_at = Some(n);
        self
    }

    pub(crate) fn fail_seek(mut self) -> Self {
        self.fail_seek = true;
        self
    }

    /// Shared count of `read_packet` calls.
    pub(crate) fn reads(&self) -> Arc<AtomicUsize> {
        self.reads.clone()
    }

    pub(crate) fn into_reader(self) -> FixtureReader {
        let info = StreamInfo {
            path: PathBuf::from("fixture"),
            format: "fixture".into(),
            video: Some(VideoInfo {
                codec: "fixture".into(),
                width: 2,
                height: 2,
                pixel_format: PixelFormat::Rgba8,
                frame_rate: self.frame_rate,
                time_base: VIDEO_TIME_BASE,
                frame_count: self.video_frames,
            }),
            audio: self.audio.then(|| AudioInfo {
                codec: "fixture-pcm".into(),
                sample_rate: SAMPLE_RATE,
                channels: 2,
                sample_format: SampleFormat::F32,
                time_base: Rational::new(1, i64::from(SAMPLE_RATE)),
                sample_count: None,
            }),
            duration: None,
        }
        .resolve_counts();

        FixtureReader {
            script: self,
            info,
            frame: 0,
            audio_next: false,
        }
    }

    /// Opener closure for `DecodeWorker::spawn_with`.
    pub(crate) fn opener(self) -> impl FnOnce() -> MediaResult<Box<dyn ContainerReader>> + Send + 'static {
        move || Ok(Box::new(self.into_reader()) as Box<dyn ContainerReader>)
    }
}

pub(crate) struct FixtureReader {
    script: Fixture,
    info: StreamInfo,
    frame: u64,
    audio_next: bool,
}

impl FixtureReader {
    fn sample_offset(&self, frame: u64) -> i64 {
        MediaTime::from_frame_index(frame as i64, self.script.frame_rate).to_sample_offset(SAMPLE_RATE)
    }

    fn video_packet(&self, frame: u64) -> Packet {
        let pts = Rational::rescale_round(frame as i64, self.script.frame_rate.recip(), VIDEO_TIME_BASE);
        let mut data = vec![0u8; 16];
        for px in data.chunks_exact_mut(4) {
            px.copy_from_slice(&[frame as u8, 0, 0, 255]);
        }
        if self.script.fail_decode_at == Some(frame) {
            data.clear();
        }
        Packet {
            stream: StreamKind::Video,
            pts: Some(pts),
            duration: None,
            keyframe: frame % self.script.keyframe_interval == 0,
            data: Bytes::from(data),
        }
    }

    fn audio_packet(&self, frame: u64) -> Packet {
        let start = self.sample_offset(frame);
        let end = self.sample_offset(frame + 1);
        Packet {
            stream: StreamKind::Audio,
            pts: Some(start),
            duration: Some(end - start),
            keyframe: true,
            data: Bytes::new(),
        }
    }
}

impl ContainerReader for FixtureReader {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn read_packet(&mut self) -> MediaResult<Option<Packet>> {
        let n = self.script.reads.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_read_at == Some(n) {
            return Err(MediaError::ReadFailed(format!("injected failure at read {}", n)));
        }
        if self.script.video_frames.is_some_and(|total| self.frame >= total) {
            return Ok(None);
        }

        if self.audio_next {
            let packet = self.audio_packet(self.frame);
            self.audio_next = false;
            self.frame += 1;
            return Ok(Some(packet));
        }

        let packet = self.video_packet(self.frame);
        if self.script.audio {
            self.audio_next = true;
        } else {
            self.frame += 1;
        }
        Ok(Some(packet))
    }

    fn seek_near(&mut self, target: MediaTime) -> MediaResult<()> {
        if self.script.fail_seek {
            return Err(MediaError::SeekFailed("injected seek failure".into()));
        }
        let frame = target.to_frame_index(self.script.frame_rate).max(0) as u64;
        let mut keyframe = frame - frame % self.script.keyframe_interval;
        if let Some(total) = self.script.video_frames {
            keyframe = keyframe.min(total);
        }
        self.frame = keyframe;
        self.audio_next = false;
        Ok(())
    }

    fn open_codecs(&mut self) -> MediaResult<CodecPair> {
        let video: Box<dyn VideoCodec> = Box::new(FixtureVideoCodec {
            delay: self.script.codec_delay,
            buffered: VecDeque::new(),
            eof: false,
        });
        let audio = self
            .script
            .audio
            .then(|| Box::new(FixtureAudioCodec { ready: VecDeque::new() }) as Box<dyn AudioCodec>);
        Ok((Some(video), audio))
    }
}

/// Holds `delay` pictures back until EOF, like a reordering codec.
struct FixtureVideoCodec {
    delay: usize,
    buffered: VecDeque<RawPicture>,
    eof: bool,
}

impl VideoCodec for FixtureVideoCodec {
    fn name(&self) -> &str {
        "fixture"
    }

    fn send_packet(&mut self, packet: &Packet) -> MediaResult<()> {
        if packet.data.is_empty() {
            return Err(MediaError::DecodeFailed("empty packet".into()));
        }
        self.buffered.push_back(RawPicture {
            pts: packet.pts,
            width: 2,
            height: 2,
            format: PixelFormat::Rgba8,
            data: packet.data.clone(),
        });
        Ok(())
    }

    fn send_eof(&mut self) -> MediaResult<()> {
        self.eof = true;
        Ok(())
    }

    fn receive_picture(&mut self) -> MediaResult<Option<RawPicture>> {
        if self.eof || self.buffered.len() > self.delay {
            Ok(self.buffered.pop_front())
        } else {
            Ok(None)
        }
    }

    fn reset(&mut self) {
        self.buffered.clear();
        self.eof = false;
    }
}

/// Silent stereo block per packet.
struct FixtureAudioCodec {
    ready: VecDeque<RawAudio>,
}

impl AudioCodec for FixtureAudioCodec {
    fn name(&self) -> &str {
        "fixture-pcm"
    }

    fn send_packet(&mut self, packet: &Packet) -> MediaResult<()> {
        let len = packet.duration.unwrap_or(0).max(0) as usize;
        self.ready.push_back(RawAudio {
            pts: packet.pts,
            sample_rate: SAMPLE_RATE,
            planes: vec![vec![0.0; len]; 2],
        });
        Ok(())
    }

    fn send_eof(&mut self) -> MediaResult<()> {
        Ok(())
    }

    fn receive_audio(&mut self) -> MediaResult<Option<RawAudio>> {
        Ok(self.ready.pop_front())
    }

    fn reset(&mut self) {
        self.ready.clear();
    }
}
