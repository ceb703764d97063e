//! Container demux facade.
//!
//! A [`FormatRegistry`] holds format handlers in priority order; the first
//! whose `can_read` accepts the probe opens the resource into a
//! [`ContainerReader`].

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, error};

use crate::decoder::{AudioCodec, VideoCodec};
use crate::error::{MediaError, MediaResult};
use crate::stream::StreamInfo;
use crate::time::MediaTime;

pub mod audio;
pub mod gif;
pub mod y4m;

#[cfg(test)]
pub(crate) mod fixture;

/// Bytes read from the start of a file for magic-number checks.
const PROBE_LEN: usize = 64;

// ============================================================================
// Packets
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
    /// Present in the container but not selected.
    Other,
}

/// One compressed, demuxed unit of a single stream.
#[derive(Debug, Clone)]
pub struct Packet {
    pub stream: StreamKind,
    /// Presentation timestamp in the stream's time base.
    pub pts: Option<i64>,
    pub duration: Option<i64>,
    pub keyframe: bool,
    pub data: Bytes,
}

/// Codecs negotiated for the selected streams.
pub type CodecPair = (Option<Box<dyn VideoCodec>>, Option<Box<dyn AudioCodec>>);

// ============================================================================
// Reader / Handler
// ============================================================================

/// An opened resource. Owned exclusively by the decode worker; dropping it
/// releases every file handle and codec context it holds.
pub trait ContainerReader: Send {
    fn info(&self) -> &StreamInfo;

    /// Next packet in demux order, `Ok(None)` at end of stream.
    fn read_packet(&mut self) -> MediaResult<Option<Packet>>;

    /// Reposition at or before `target`, on a keyframe. Decoder state is the
    /// caller's to reset.
    fn seek_near(&mut self, target: MediaTime) -> MediaResult<()>;

    /// Build codecs for the selected streams.
    fn open_codecs(&mut self) -> MediaResult<CodecPair>;
}

/// What a handler sees when deciding whether it can open a resource.
#[derive(Debug, Clone)]
pub struct Probe {
    pub path: PathBuf,
    /// Lowercased extension, empty if none.
    pub extension: String,
    pub header: Vec<u8>,
}

impl Probe {
    pub fn read(path: &Path) -> MediaResult<Self> {
        let mut file = File::open(path)
            .map_err(|e| MediaError::OpenFailed(format!("{}: {}", path.display(), e)))?;
        let mut header = Vec::with_capacity(PROBE_LEN);
        file.by_ref()
            .take(PROBE_LEN as u64)
            .read_to_end(&mut header)
            .map_err(|e| MediaError::OpenFailed(format!("{}: {}", path.display(), e)))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        Ok(Self {
            path: path.to_path_buf(),
            extension,
            header,
        })
    }

    pub fn has_extension(&self, candidates: &[&str]) -> bool {
        candidates.contains(&self.extension.as_str())
    }
}

pub trait FormatHandler: Send + Sync {
    fn name(&self) -> &'static str;
    fn can_read(&self, probe: &Probe) -> bool;
    fn open(&self, path: &Path) -> MediaResult<Box<dyn ContainerReader>>;
}

// ============================================================================
// Registry
// ============================================================================

/// Ordered list of format handlers; first match wins.
#[derive(Default)]
pub struct FormatRegistry {
    handlers: Vec<Box<dyn FormatHandler>>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Y4M, GIF, then everything symphonia can demux.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(y4m::Y4mHandler));
        registry.register(Box::new(gif::GifHandler));
        registry.register(Box::new(audio::SymphoniaHandler));
        registry
    }

    pub fn register(&mut self, handler: Box<dyn FormatHandler>) {
        self.handlers.push(handler);
    }

    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    pub fn find(&self, probe: &Probe) -> Option<&dyn FormatHandler> {
        self.handlers
            .iter()
            .find(|h| h.can_read(probe))
            .map(|h| h.as_ref())
    }

    pub fn open(&self, path: &Path) -> MediaResult<Box<dyn ContainerReader>> {
        let probe = Probe::read(path)?;
        let Some(handler) = self.find(&probe) else {
            error!(path = %path.display(), "No format handler accepts this file");
            return Err(MediaError::OpenFailed(format!(
                "{}: unrecognized container",
                path.display()
            )));
        };

        debug!(path = %path.display(), handler = handler.name(), "Opening container");
        handler.open(path)
    }
}

impl std::fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatRegistry")
            .field("handlers", &self.handler_names())
            .finish()
    }
}
