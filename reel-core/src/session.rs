//! # Media Session
//!
//! Orchestrates one decode worker, the playback clock and the observer
//! channels the UI layer watches. All methods run on the caller's (UI or
//! timer) thread and never block on decode; `open` and `close` join the
//! previous worker, which exits within one poll interval.
//!
//! Commands take the wall-clock `Instant` at which they happened so the
//! playback anchor is rebased exactly, independent of when `tick` runs.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::clock::{ClockStats, PlaybackClock, PlaybackMode, PlaybackState, TickReport};
use crate::config::PipelineConfig;
use crate::container::{ContainerReader, FormatRegistry};
use crate::error::{MediaError, MediaResult};
use crate::frame::{AudioFrame, VideoFrame};
use crate::queue::{MediaQueues, QueueStats};
use crate::stream::StreamInfo;
use crate::time::{MediaTime, Rational};
use crate::worker::{DecodeWorker, PlaybackDirection, StreamInfoReceiver, WorkerState};

// ============================================================================
// Observers
// ============================================================================

/// Push-based outputs. Each field is a `watch` channel holding the latest
/// value; receivers see only the newest.
#[derive(Debug)]
pub struct Observers {
    current_image: watch::Sender<Option<VideoFrame>>,
    current_audio: watch::Sender<Option<AudioFrame>>,
    video_queue_size: watch::Sender<usize>,
    audio_queue_size: watch::Sender<usize>,
    playback_mode: watch::Sender<PlaybackMode>,
    stream_info: watch::Sender<Option<StreamInfo>>,
    position: watch::Sender<MediaTime>,
}

impl Observers {
    fn new() -> Self {
        Self {
            current_image: watch::channel(None).0,
            current_audio: watch::channel(None).0,
            video_queue_size: watch::channel(0).0,
            audio_queue_size: watch::channel(0).0,
            playback_mode: watch::channel(PlaybackMode::Stopped).0,
            stream_info: watch::channel(None).0,
            position: watch::channel(MediaTime::ZERO).0,
        }
    }

    pub fn subscribe_current_image(&self) -> watch::Receiver<Option<VideoFrame>> {
        self.current_image.subscribe()
    }

    pub fn subscribe_current_audio(&self) -> watch::Receiver<Option<AudioFrame>> {
        self.current_audio.subscribe()
    }

    pub fn subscribe_video_queue_size(&self) -> watch::Receiver<usize> {
        self.video_queue_size.subscribe()
    }

    pub fn subscribe_audio_queue_size(&self) -> watch::Receiver<usize> {
        self.audio_queue_size.subscribe()
    }

    pub fn subscribe_playback_mode(&self) -> watch::Receiver<PlaybackMode> {
        self.playback_mode.subscribe()
    }

    pub fn subscribe_stream_info(&self) -> watch::Receiver<Option<StreamInfo>> {
        self.stream_info.subscribe()
    }

    pub fn subscribe_position(&self) -> watch::Receiver<MediaTime> {
        self.position.subscribe()
    }

    fn reset(&self) {
        self.current_image.send_replace(None);
        self.current_audio.send_replace(None);
        self.video_queue_size.send_replace(0);
        self.audio_queue_size.send_replace(0);
        self.stream_info.send_replace(None);
        self.position.send_replace(MediaTime::ZERO);
    }

    fn publish_tick(&self, report: &TickReport) {
        if let Some(frame) = &report.video {
            self.current_image.send_replace(Some(frame.clone()));
        }
        if let Some(block) = &report.audio {
            self.current_audio.send_replace(Some(block.clone()));
        }
        self.video_queue_size.send_replace(report.video_queue_size);
        self.audio_queue_size.send_replace(report.audio_queue_size);
        self.position.send_replace(report.stream_time);
    }

    fn publish_mode(&self, mode: PlaybackMode) {
        self.playback_mode.send_if_modified(|current| {
            let changed = *current != mode;
            *current = mode;
            changed
        });
    }
}

// ============================================================================
// Open Status
// ============================================================================

enum InfoSlot {
    Closed,
    Pending(StreamInfoReceiver),
    Ready(StreamInfo),
    Failed(MediaError),
}

/// Result of a non-blocking poll of the open result.
#[derive(Debug)]
pub enum OpenStatus<'a> {
    /// Nothing opened.
    Closed,
    /// Worker still probing the container.
    Pending,
    Ready(&'a StreamInfo),
    Failed(&'a MediaError),
}

// ============================================================================
// Session
// ============================================================================

pub struct MediaSession {
    config: PipelineConfig,
    registry: Arc<FormatRegistry>,
    worker: Option<DecodeWorker>,
    info: InfoSlot,
    playback: PlaybackState,
    clock: PlaybackClock,
    observers: Observers,
}

impl MediaSession {
    pub fn new(config: PipelineConfig, registry: Arc<FormatRegistry>) -> Self {
        Self {
            config,
            registry,
            worker: None,
            info: InfoSlot::Closed,
            playback: PlaybackState::new(Instant::now()),
            clock: PlaybackClock::detached(),
            observers: Observers::new(),
        }
    }

    /// Start decoding `path`. Returns once the worker thread is running;
    /// the stream info arrives later through [`poll_stream_info`](Self::poll_stream_info).
    pub fn open(&mut self, path: impl AsRef<Path>) -> MediaResult<()> {
        let path = path.as_ref().to_path_buf();
        info!(path = %path.display(), "Opening");
        self.close();
        let (worker, info_rx) = DecodeWorker::spawn(path, Arc::clone(&self.registry), &self.config)?;
        self.attach(worker, info_rx);
        Ok(())
    }

    /// Like [`open`](Self::open) with a caller-supplied container opener.
    pub fn open_with<F>(&mut self, opener: F) -> MediaResult<()>
    where
        F: FnOnce() -> MediaResult<Box<dyn ContainerReader>> + Send + 'static,
    {
        self.close();
        let (worker, info_rx) = DecodeWorker::spawn_with(opener, &self.config)?;
        self.attach(worker, info_rx);
        Ok(())
    }

    fn attach(&mut self, worker: DecodeWorker, info_rx: StreamInfoReceiver) {
        self.worker = Some(worker);
        self.info = InfoSlot::Pending(info_rx);
        self.playback = PlaybackState {
            speed: self.playback.speed,
            ..PlaybackState::new(Instant::now())
        };
        self.clock = PlaybackClock::detached();
    }

    /// Stop and join the worker. The session can be reopened afterwards.
    pub fn close(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
            debug!(stats = ?self.clock.stats(), "Session closed");
        }
        self.info = InfoSlot::Closed;
        self.playback.mode = PlaybackMode::Stopped;
        self.clock = PlaybackClock::detached();
        self.observers.reset();
        self.observers.publish_mode(PlaybackMode::Stopped);
    }

    /// Non-blocking check of the open result. Resolves exactly once; later
    /// calls keep returning the same outcome.
    pub fn poll_stream_info(&mut self) -> OpenStatus<'_> {
        let received = match &mut self.info {
            InfoSlot::Pending(rx) => Some(rx.try_recv()),
            _ => None,
        };
        match received {
            Some(Ok(Ok(info))) => self.on_opened(info),
            Some(Ok(Err(e))) => self.info = InfoSlot::Failed(e),
            Some(Err(TryRecvError::Closed)) => {
                self.info = InfoSlot::Failed(MediaError::OpenFailed("decode worker exited before opening".into()));
            }
            Some(Err(TryRecvError::Empty)) | None => {}
        }

        match &self.info {
            InfoSlot::Closed => OpenStatus::Closed,
            InfoSlot::Pending(_) => OpenStatus::Pending,
            InfoSlot::Ready(info) => OpenStatus::Ready(info),
            InfoSlot::Failed(e) => OpenStatus::Failed(e),
        }
    }

    fn on_opened(&mut self, info: StreamInfo) {
        self.clock = PlaybackClock::new(&info);
        self.observers.stream_info.send_replace(Some(info.clone()));
        self.info = InfoSlot::Ready(info);
    }

    pub fn stream_info(&self) -> Option<&StreamInfo> {
        match &self.info {
            InfoSlot::Ready(info) => Some(info),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    pub fn play_forward(&mut self, now: Instant) {
        self.set_mode(PlaybackMode::Forward, now);
    }

    /// Runs the clock backwards. Decode stays forward-only, so only frames
    /// already queued behind the position can be shown.
    pub fn play_reverse(&mut self, now: Instant) {
        self.set_mode(PlaybackMode::Reverse, now);
    }

    pub fn stop(&mut self, now: Instant) {
        self.set_mode(PlaybackMode::Stopped, now);
    }

    fn set_mode(&mut self, mode: PlaybackMode, now: Instant) {
        self.playback.rebase(now);
        self.playback.mode = mode;

        let direction = match mode {
            PlaybackMode::Reverse => PlaybackDirection::Reverse,
            _ => PlaybackDirection::Forward,
        };
        if let Some(worker) = &self.worker {
            worker.set_direction(direction);
        }
        if mode == PlaybackMode::Reverse {
            warn!("Reverse playback has no reverse decode; showing queued frames only");
        }
        debug!(mode = ?mode, position = %self.playback.anchor_time, "Playback mode");
        self.observers.publish_mode(mode);
    }

    /// Jump to `target`. Playback mode and speed are kept.
    pub fn seek(&mut self, target: MediaTime, now: Instant) {
        let target = target.max(MediaTime::ZERO);
        self.playback.reanchor(target, now);
        self.observers.position.send_replace(target);
        if let Some(worker) = &self.worker {
            worker.seek(target);
        }
        debug!(target = %target, "Seek requested");
    }

    /// Change speed at `now`. Speed must be positive; direction is the mode.
    pub fn set_speed(&mut self, speed: Rational, now: Instant) -> MediaResult<()> {
        if !speed.is_positive() {
            return Err(MediaError::Unsupported(format!("playback speed must be positive, got {}", speed)));
        }
        self.playback.rebase(now);
        self.playback.speed = speed.reduced();
        debug!(speed = %self.playback.speed, "Playback speed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Clock
    // ------------------------------------------------------------------

    /// One playback clock step. `None` when nothing is open.
    pub fn tick(&mut self, now: Instant) -> Option<TickReport> {
        if matches!(self.info, InfoSlot::Pending(_)) {
            let _ = self.poll_stream_info();
        }
        let worker = self.worker.as_ref()?;
        let report = self.clock.tick(worker.queues(), &self.playback, now);
        self.observers.publish_tick(&report);

        if report.end_of_stream && self.playback.is_playing() {
            info!(position = %report.stream_time, stats = ?self.clock.stats(), "End of stream");
            self.stop(now);
        }
        Some(report)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn observers(&self) -> &Observers {
        &self.observers
    }

    pub fn playback(&self) -> &PlaybackState {
        &self.playback
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn clock_stats(&self) -> ClockStats {
        self.clock.stats()
    }

    pub fn queues(&self) -> Option<&Arc<MediaQueues>> {
        self.worker.as_ref().map(DecodeWorker::queues)
    }

    pub fn queue_stats(&self) -> Option<QueueStats> {
        self.queues().map(|q| q.stats())
    }

    pub fn worker_state(&self) -> Option<WorkerState> {
        self.worker.as_ref().map(DecodeWorker::state)
    }
}

impl Drop for MediaSession {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// Tests
// ============================================================================
