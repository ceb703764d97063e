//! # reel core
//!
//! Media decode pipeline for the reel viewer: container demux, frame decode,
//! bounded frame queues, the background decode worker and the playback clock
//! that drains those queues in timestamp order.

// ============================================================================
// Foundations
// ============================================================================
pub mod config;
pub mod error;
pub mod time;

// ============================================================================
// Data Model
// ============================================================================
pub mod frame;
pub mod stream;

// ============================================================================
// Container Demux / Frame Decode
// ============================================================================
pub mod container;
pub mod convert;
pub mod decoder;

// ============================================================================
// Pipeline
// ============================================================================
pub mod clock;
pub mod queue;
pub mod session;
pub mod worker;

pub use clock::{ClockStats, PlaybackClock, PlaybackMode, PlaybackState, TickReport};
pub use config::PipelineConfig;
pub use container::{ContainerReader, FormatHandler, FormatRegistry};
pub use error::{MediaError, MediaResult};
pub use frame::{AudioBuffer, AudioFrame, Image, VideoFrame};
pub use queue::{FrameQueue, MediaQueues};
pub use session::{MediaSession, Observers, OpenStatus};
pub use stream::{AudioInfo, PixelFormat, SampleFormat, StreamInfo, VideoInfo};
pub use time::{MediaTime, Rational};
pub use worker::{DecodeWorker, PlaybackDirection, SeekRequest, WorkerState};

// ============================================================================
// Version
// ============================================================================
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
