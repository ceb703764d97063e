//! YUV4MPEG2 reader.
//!
//! ```text
//! YUV4MPEG2 W<width> H<height> F<num>:<den> [C<chroma>] [...]\n
//! FRAME[ params]\n <raw planes>
//! FRAME[ params]\n <raw planes>
//! ...
//! ```
//!
//! Frame offsets are indexed at open, so seeks are exact and every frame is
//! a keyframe.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use bytes::Bytes;
use tracing::{debug, error, warn};

use crate::container::{CodecPair, ContainerReader, FormatHandler, Packet, Probe, StreamKind};
use crate::decoder::raw::RawVideoCodec;
use crate::error::{MediaError, MediaResult};
use crate::stream::{PixelFormat, StreamInfo, VideoInfo};
use crate::time::{MediaTime, Rational};

const MAGIC: &[u8] = b"YUV4MPEG2";
const FRAME_TAG: &[u8] = b"FRAME";
/// Header lines longer than this are treated as corrupt.
const MAX_LINE: usize = 4096;

// ============================================================================
// Header
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Y4mHeader {
    pub width: u32,
    pub height: u32,
    pub frame_rate: Rational,
    pub pixel_format: PixelFormat,
}

impl Y4mHeader {
    pub fn parse(line: &str) -> MediaResult<Self> {
        let mut tokens = line.split_ascii_whitespace();
        if tokens.next() != Some("YUV4MPEG2") {
            return Err(MediaError::OpenFailed("missing YUV4MPEG2 signature".into()));
        }

        let mut width = None;
        let mut height = None;
        let mut frame_rate = None;
        let mut pixel_format = PixelFormat::Yuv420p;

        for token in tokens {
            let mut chars = token.chars();
            let Some(tag) = chars.next() else { continue };
            let value = chars.as_str();
            match tag {
                'W' => width = value.parse::<u32>().ok(),
                'H' => height = value.parse::<u32>().ok(),
                'F' => frame_rate = Rational::parse(value),
                'C' => pixel_format = chroma_format(value)?,
                // Interlacing, aspect, extensions: not needed for decode.
                _ => {}
            }
        }

        let width = width.filter(|&w| w > 0).ok_or_else(|| MediaError::OpenFailed("missing or zero W".into()))?;
        let height = height.filter(|&h| h > 0).ok_or_else(|| MediaError::OpenFailed("missing or zero H".into()))?;
        let frame_rate = frame_rate
            .filter(Rational::is_positive)
            .ok_or_else(|| MediaError::OpenFailed("missing or invalid F".into()))?;

        Ok(Self {
            width,
            height,
            frame_rate,
            pixel_format,
        })
    }

    pub fn frame_size(&self) -> usize {
        self.pixel_format.buffer_size(self.width, self.height)
    }
}

fn chroma_format(tag: &str) -> MediaResult<PixelFormat> {
    match tag {
        "420jpeg" | "420paldv" | "420mpeg2" | "420" => Ok(PixelFormat::Yuv420p),
        "422" => Ok(PixelFormat::Yuv422p),
        "444" => Ok(PixelFormat::Yuv444p),
        "mono" => Ok(PixelFormat::Gray8),
        other => Err(MediaError::Unsupported(format!("Y4M chroma {}", other))),
    }
}

/// Read one `\n`-terminated line, without the terminator.
fn read_line<R: BufRead>(reader: &mut R) -> std::io::Result<Option<Vec<u8>>> {
    let mut line = Vec::new();
    let n = reader.by_ref().take(MAX_LINE as u64).read_until(b'\n', &mut line)?;
    if n == 0 {
        return Ok(None);
    }
    if line.last() != Some(&b'\n') {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "unterminated header line"));
    }
    line.pop();
    Ok(Some(line))
}

// ============================================================================
// Reader
// ============================================================================

pub struct Y4mReader {
    reader: BufReader<File>,
    header: Y4mHeader,
    info: StreamInfo,
    /// Byte offset of each frame's plane data.
    offsets: Vec<u64>,
    next: usize,
}

impl Y4mReader {
    pub fn open(path: &Path) -> MediaResult<Self> {
        let file = File::open(path).map_err(|e| MediaError::OpenFailed(format!("{}: {}", path.display(), e)))?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let header_line = read_line(&mut reader)?
            .ok_or_else(|| MediaError::OpenFailed("empty file".into()))?;
        let header = Y4mHeader::parse(&String::from_utf8_lossy(&header_line))?;
        let offsets = index_frames(&mut reader, header.frame_size() as u64, file_len)?;

        if offsets.is_empty() {
            return Err(MediaError::OpenFailed(format!("{}: no frames", path.display())));
        }

        debug!(
            path = %path.display(),
            width = header.width,
            height = header.height,
            rate = %header.frame_rate,
            frames = offsets.len(),
            "Indexed Y4M"
        );

        let info = StreamInfo {
            path: path.to_path_buf(),
            format: "y4m".into(),
            video: Some(VideoInfo {
                codec: "rawvideo".into(),
                width: header.width,
                height: header.height,
                pixel_format: header.pixel_format,
                frame_rate: header.frame_rate,
                time_base: header.frame_rate.recip(),
                frame_count: Some(offsets.len() as u64),
            }),
            audio: None,
            duration: None,
        }
        .resolve_counts();

        Ok(Self {
            reader,
            header,
            info,
            offsets,
            next: 0,
        })
    }

    pub fn header(&self) -> &Y4mHeader {
        &self.header
    }

    pub fn frame_count(&self) -> usize {
        self.offsets.len()
    }
}

/// Walk `FRAME` headers from the current position, skipping plane data.
fn index_frames(reader: &mut BufReader<File>, frame_size: u64, file_len: u64) -> MediaResult<Vec<u64>> {
    let mut offsets = Vec::new();
    loop {
        let line = match read_line(reader)? {
            Some(line) => line,
            None => break,
        };
        if !line.starts_with(FRAME_TAG) {
            return Err(MediaError::OpenFailed(format!(
                "expected FRAME at frame {}, found {:?}",
                offsets.len(),
                String::from_utf8_lossy(&line[..line.len().min(16)])
            )));
        }

        let data_start = reader.stream_position()?;
        if data_start + frame_size > file_len {
            warn!(frame = offsets.len(), "Truncated final Y4M frame ignored");
            break;
        }
        offsets.push(data_start);
        reader.seek(SeekFrom::Start(data_start + frame_size))?;
    }
    Ok(offsets)
}

impl ContainerReader for Y4mReader {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn read_packet(&mut self) -> MediaResult<Option<Packet>> {
        let Some(&offset) = self.offsets.get(self.next) else {
            return Ok(None);
        };

        let mut data = vec![0u8; self.header.frame_size()];
        let read = self
            .reader
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.reader.read_exact(&mut data));
        if let Err(e) = read {
            error!(frame = self.next, error = %e, "Y4M read failed");
            return Err(MediaError::ReadFailed(e.to_string()));
        }

        let pts = self.next as i64;
        self.next += 1;
        Ok(Some(Packet {
            stream: StreamKind::Video,
            pts: Some(pts),
            duration: Some(1),
            keyframe: true,
            data: Bytes::from(data),
        }))
    }

    fn seek_near(&mut self, target: MediaTime) -> MediaResult<()> {
        let index = target.to_frame_index(self.header.frame_rate).max(0);
        self.next = (index as usize).min(self.offsets.len());
        debug!(target = %target, frame = self.next, "Y4M seek");
        Ok(())
    }

    fn open_codecs(&mut self) -> MediaResult<CodecPair> {
        let codec = RawVideoCodec::new(self.header.width, self.header.height, self.header.pixel_format);
        Ok((Some(Box::new(codec)), None))
    }
}

pub struct Y4mHandler;

impl FormatHandler for Y4mHandler {
    fn name(&self) -> &'static str {
        "y4m"
    }

    fn can_read(&self, probe: &Probe) -> bool {
        probe.header.starts_with(MAGIC)
    }

    fn open(&self, path: &Path) -> MediaResult<Box<dyn ContainerReader>> {
        Ok(Box::new(Y4mReader::open(path)?))
    }
}

// ============================================================================
// Tests
// ============================================================================
