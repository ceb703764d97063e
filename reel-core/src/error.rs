//! Pipeline error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    /// Container cannot be opened, has no usable stream, or no codec fits.
    #[error("Open failed: {0}")]
    OpenFailed(String),
    /// Demux read cannot continue.
    #[error("Read failed: {0}")]
    ReadFailed(String),
    /// A single packet could not be decoded or converted.
    #[error("Decode failed: {0}")]
    DecodeFailed(String),
    /// The underlying seek primitive failed.
    #[error("Seek failed: {0}")]
    SeekFailed(String),
    #[error("Unsupported: {0}")]
    Unsupported(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// Open-time errors are fatal to the decode worker; everything else is
    /// handled inside the loop.
    pub fn is_open_failure(&self) -> bool {
        matches!(self, MediaError::OpenFailed(_) | MediaError::Unsupported(_))
    }
}

pub type MediaResult<T> = Result<T, MediaError>;
