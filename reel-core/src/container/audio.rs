// Pure Rust audio demux through symphonia (WAV, FLAC, OGG, MP3, AAC/M4A...)

use std::fs::File;
use std::path::Path;

use bytes::Bytes;
use symphonia::core::codecs::{CodecParameters, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::SampleFormat as SymphoniaSampleFormat;
use tracing::{debug, error, info};

use crate::container::{CodecPair, ContainerReader, FormatHandler, Packet, Probe, StreamKind};
use crate::decoder::audio::SymphoniaAudioCodec;
use crate::error::{MediaError, MediaResult};
use crate::stream::{AudioInfo, SampleFormat, StreamInfo};
use crate::time::{MediaTime, Rational};

/// Extensions tried even when the header magic is not recognised.
const EXTENSIONS: &[&str] = &["wav", "wave", "flac", "ogg", "oga", "mp3", "m4a", "aac", "mka", "caf", "aiff", "aif"];

pub struct SymphoniaReader {
    format: Box<dyn FormatReader>,
    track_id: u32,
    params: CodecParameters,
    time_base: Rational,
    info: StreamInfo,
}

impl SymphoniaReader {
    pub fn open(path: &Path) -> MediaResult<Self> {
        let file = File::open(path).map_err(|e| MediaError::OpenFailed(format!("{}: {}", path.display(), e)))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| MediaError::OpenFailed(format!("Failed to probe file: {}", e)))?;
        let format = probed.format;

        // First track a registered codec can actually decode.
        let codecs = symphonia::default::get_codecs();
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL && codecs.get_codec(t.codec_params.codec).is_some())
            .ok_or_else(|| MediaError::OpenFailed("No decodable audio track found".into()))?;

        let params = track.codec_params.clone();
        let track_id = track.id;

        let sample_rate = params
            .sample_rate
            .filter(|&r| r > 0)
            .ok_or_else(|| MediaError::OpenFailed("audio track has no sample rate".into()))?;
        let time_base = params
            .time_base
            .map(|tb| Rational::new(i64::from(tb.numer), i64::from(tb.denom)))
            .filter(Rational::is_positive)
            .unwrap_or_else(|| Rational::new(1, i64::from(sample_rate)));

        let codec = codecs
            .get_codec(params.codec)
            .map(|c| c.short_name.to_string())
            .unwrap_or_else(|| format!("{:?}", params.codec));
        let channels = params.channels.map(|c| c.count() as u16).unwrap_or(2);

        let info = StreamInfo {
            path: path.to_path_buf(),
            format: "symphonia".into(),
            video: None,
            audio: Some(AudioInfo {
                codec,
                sample_rate,
                channels,
                sample_format: sample_format(&params),
                time_base,
                sample_count: None,
            }),
            // n_frames counts samples, whatever the track time base.
            duration: params
                .n_frames
                .map(|n| MediaTime::from_sample_offset(n as i64, sample_rate)),
        }
        .resolve_counts();

        info!(
            path = %path.display(),
            sample_rate,
            channels,
            duration = ?info.duration,
            "Opened audio container"
        );

        Ok(Self {
            format,
            track_id,
            params,
            time_base,
            info,
        })
    }
}

fn sample_format(params: &CodecParameters) -> SampleFormat {
    match params.sample_format {
        Some(SymphoniaSampleFormat::F32) => SampleFormat::F32,
        Some(SymphoniaSampleFormat::F64) => SampleFormat::F64,
        _ => match params.bits_per_sample {
            Some(8) => SampleFormat::U8,
            Some(16) => SampleFormat::S16,
            Some(24) => SampleFormat::S24,
            Some(32) => SampleFormat::S32,
            _ => SampleFormat::F32,
        },
    }
}

impl ContainerReader for SymphoniaReader {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn read_packet(&mut self) -> MediaResult<Option<Packet>> {
        let packet = match self.format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(None);
            }
            Err(e) => {
                error!(error = %e, "Packet read error");
                return Err(MediaError::ReadFailed(e.to_string()));
            }
        };

        let stream = if packet.track_id() == self.track_id {
            StreamKind::Audio
        } else {
            StreamKind::Other
        };

        Ok(Some(Packet {
            stream,
            pts: Some(packet.ts() as i64),
            duration: Some(packet.dur() as i64),
            keyframe: true,
            data: Bytes::from(packet.data),
        }))
    }

    fn seek_near(&mut self, target: MediaTime) -> MediaResult<()> {
        let ts = target.to_timestamp(self.time_base).max(0) as u64;
        let seeked = self
            .format
            .seek(SeekMode::Accurate, SeekTo::TimeStamp { ts, track_id: self.track_id })
            .map_err(|e| MediaError::SeekFailed(e.to_string()))?;
        debug!(required = seeked.required_ts, actual = seeked.actual_ts, "Audio seek");
        Ok(())
    }

    fn open_codecs(&mut self) -> MediaResult<CodecPair> {
        let codec = SymphoniaAudioCodec::new(&self.params, self.track_id)?;
        Ok((None, Some(Box::new(codec))))
    }
}

pub struct SymphoniaHandler;

impl FormatHandler for SymphoniaHandler {
    fn name(&self) -> &'static str {
        "symphonia"
    }

    fn can_read(&self, probe: &Probe) -> bool {
        let h = &probe.header;
        let magic = h.starts_with(b"RIFF")
            || h.starts_with(b"fLaC")
            || h.starts_with(b"OggS")
            || h.starts_with(b"ID3")
            || h.starts_with(b"FORM")
            || h.starts_with(b"caff")
            || (h.len() > 8 && &h[4..8] == b"ftyp")
            || (h.len() > 1 && h[0] == 0xFF && h[1] & 0xE0 == 0xE0);
        magic || probe.has_extension(EXTENSIONS)
    }

    fn open(&self, path: &Path) -> MediaResult<Box<dyn ContainerReader>> {
        Ok(Box::new(SymphoniaReader::open(path)?))
    }
}
