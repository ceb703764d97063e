//! # Decode Worker
//!
//! Owns the container reader and frame decoder on a dedicated thread and
//! keeps both frame queues topped up.
//!
//! ```text
//!            open ok                 queues full / staged frames
//!   Idle ──────────────► Filling ────────────────────────────► Waiting
//!    │                    ▲  │ ◄──────────────────────────────── │
//!    │ open failed        │  │ seek request        room again    │
//!    ▼                    │  ▼                                   │
//!  Stopped            Seeking (discard below target)             │
//!    ▲                       │ EndOfStream / read error          │
//!    └─────── shutdown ───── Draining (flush codecs, finish) ◄───┘
//! ```
//!
//! The shared lock is taken once per iteration for the control phase
//! (shutdown, seek, hand-off of staged frames, backpressure wait) and is
//! never held across `read_packet` or a decode call. Decoded frames that do
//! not fit are staged here and handed over as space appears, so the queue
//! capacity is never exceeded and nothing decoded is lost.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::MutexGuard;
use tokio::sync::oneshot;
use tracing::{debug, error, info, trace, warn};

use crate::config::PipelineConfig;
use crate::container::{ContainerReader, FormatRegistry, Packet, StreamKind};
use crate::decoder::FrameDecoder;
use crate::error::{MediaError, MediaResult};
use crate::frame::{AudioFrame, VideoFrame};
use crate::queue::{MediaQueues, SharedState};
use crate::stream::StreamInfo;
use crate::time::{MediaTime, Rational};

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Thread not started, or container still opening.
    Idle,
    /// Reading and decoding; some queue has room.
    Filling,
    /// Parked on the condition variable until room, a seek or shutdown.
    Waiting,
    /// Decoding toward a seek target, discarding earlier output.
    Seeking,
    /// Input exhausted; codecs flushed and queues marked finished.
    Draining,
    /// Thread exited.
    Stopped,
}

/// Playback direction as seen by the worker. Decode only ever runs
/// forward; the flag is carried so reverse decode can be added later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackDirection {
    #[default]
    Forward,
    Reverse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekRequest {
    pub target: MediaTime,
}

/// Resolves once with the opened stream's info or the open error.
pub type StreamInfoReceiver = oneshot::Receiver<MediaResult<StreamInfo>>;

// ============================================================================
// Worker Handle
// ============================================================================

pub struct DecodeWorker {
    queues: Arc<MediaQueues>,
    handle: Option<JoinHandle<()>>,
}

impl DecodeWorker {
    /// Open `path` through `registry` on a new decode thread.
    pub fn spawn(
        path: PathBuf,
        registry: Arc<FormatRegistry>,
        config: &PipelineConfig,
    ) -> MediaResult<(Self, StreamInfoReceiver)> {
        Self::spawn_with(move || registry.open(&path), config)
    }

    /// Like [`spawn`](Self::spawn) with a custom container opener. The
    /// opener runs on the decode thread.
    pub fn spawn_with<F>(opener: F, config: &PipelineConfig) -> MediaResult<(Self, StreamInfoReceiver)>
    where
        F: FnOnce() -> MediaResult<Box<dyn ContainerReader>> + Send + 'static,
    {
        let queues = Arc::new(MediaQueues::new(
            config.video_queue_capacity,
            config.audio_queue_capacity,
        ));
        let (info_tx, info_rx) = oneshot::channel();
        let poll = config.worker_poll_interval();

        let thread_queues = Arc::clone(&queues);
        let handle = thread::Builder::new()
            .name("reel-decode".into())
            .spawn(move || run(opener, thread_queues, info_tx, poll))?;

        Ok((
            Self {
                queues,
                handle: Some(handle),
            },
            info_rx,
        ))
    }

    pub fn queues(&self) -> &Arc<MediaQueues> {
        &self.queues
    }

    pub fn seek(&self, target: MediaTime) {
        self.queues.request_seek(target);
    }

    pub fn set_direction(&self, direction: PlaybackDirection) {
        self.queues.set_direction(direction);
    }

    pub fn state(&self) -> WorkerState {
        self.queues.worker_state()
    }

    /// Signal shutdown and join. Idempotent.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.queues.shutdown();
        if handle.join().is_err() {
            error!("Decode thread panicked");
        }
    }
}

impl Drop for DecodeWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Thread Body
// ============================================================================

fn run<F>(opener: F, queues: Arc<MediaQueues>, info_tx: oneshot::Sender<MediaResult<StreamInfo>>, poll: Duration)
where
    F: FnOnce() -> MediaResult<Box<dyn ContainerReader>>,
{
    let (reader, decoder) = match open(opener) {
        Ok(opened) => opened,
        Err(e) => {
            error!(error = %e, "Open failed");
            {
                let mut state = queues.lock();
                state.finish_all();
                state.worker_state = WorkerState::Stopped;
            }
            let _ = info_tx.send(Err(e));
            return;
        }
    };

    let info = reader.info().clone();
    let (video_codec, audio_codec) = decoder.codec_names();
    info!(
        path = %info.path.display(),
        format = %info.format,
        video_codec = ?video_codec,
        audio_codec = ?audio_codec,
        "Stream opened"
    );
    let _ = info_tx.send(Ok(info));

    DecodeLoop::new(reader, decoder, queues, poll).run();
}

fn open<F>(opener: F) -> MediaResult<(Box<dyn ContainerReader>, FrameDecoder)>
where
    F: FnOnce() -> MediaResult<Box<dyn ContainerReader>>,
{
    let mut reader = opener()?;
    let info = reader.info();
    if !info.has_video() && !info.has_audio() {
        return Err(MediaError::OpenFailed("no audio or video stream".into()));
    }
    let (video_codec, audio_codec) = reader.open_codecs()?;
    let decoder = FrameDecoder::new(reader.info(), video_codec, audio_codec)?;
    Ok((reader, decoder))
}

enum Step {
    Seek(MediaTime),
    Read,
    Idle,
}

#[derive(Debug, Default)]
struct LoopStats {
    packets: u64,
    video_frames: u64,
    audio_frames: u64,
    discarded: u64,
    out_of_order: u64,
    decode_errors: u64,
    seeks: u64,
}

struct DecodeLoop {
    reader: Box<dyn ContainerReader>,
    decoder: FrameDecoder,
    queues: Arc<MediaQueues>,
    poll: Duration,

    frame_rate: Option<Rational>,
    sample_rate: Option<u32>,

    pending_video: VecDeque<VideoFrame>,
    pending_audio: VecDeque<AudioFrame>,
    last_video: Option<i64>,
    last_audio: Option<i64>,
    /// Discard thresholds while a seek is in progress.
    video_target: Option<i64>,
    audio_target: Option<i64>,

    end_of_stream: bool,
    finished_marked: bool,
    direction: PlaybackDirection,
    stats: LoopStats,
}

impl DecodeLoop {
    fn new(reader: Box<dyn ContainerReader>, decoder: FrameDecoder, queues: Arc<MediaQueues>, poll: Duration) -> Self {
        let info = reader.info();
        let frame_rate = info.video.as_ref().map(|v| v.frame_rate);
        let sample_rate = info.audio.as_ref().map(|a| a.sample_rate);
        Self {
            reader,
            decoder,
            queues,
            poll,
            frame_rate,
            sample_rate,
            pending_video: VecDeque::new(),
            pending_audio: VecDeque::new(),
            last_video: None,
            last_audio: None,
            video_target: None,
            audio_target: None,
            end_of_stream: false,
            finished_marked: false,
            direction: PlaybackDirection::Forward,
            stats: LoopStats::default(),
        }
    }

    fn run(mut self) {
        let queues = Arc::clone(&self.queues);
        loop {
            let step = {
                let mut state = queues.lock();
                if !state.running {
                    state.worker_state = WorkerState::Stopped;
                    break;
                }
                self.control(&queues, &mut state)
            };

            match step {
                Step::Seek(target) => self.seek(target),
                Step::Read => self.read_one(),
                Step::Idle => {}
            }
        }

        debug!(stats = ?self.stats, "Decode worker exiting");
        // Reader and decoder drop here, before the thread exits.
    }

    /// Everything that needs the lock. Waits in place when there is nothing
    /// to do.
    fn control(&mut self, queues: &MediaQueues, state: &mut MutexGuard<'_, SharedState>) -> Step {
        state.decode_errors = self.stats.decode_errors;

        if state.direction != self.direction {
            // Decode stays forward-only; the direction is informational.
            debug!(direction = ?state.direction, "Playback direction changed");
            self.direction = state.direction;
        }

        if let Some(request) = state.seek.take() {
            state.reset_for_seek();
            set_state(state, WorkerState::Seeking);
            return Step::Seek(request.target);
        }

        self.hand_off(state);

        if self.end_of_stream {
            if self.pending_video.is_empty() && self.pending_audio.is_empty() && !self.finished_marked {
                state.finish_all();
                self.finished_marked = true;
                debug!("Queues marked finished");
            }
            set_state(state, WorkerState::Draining);
            queues.wait(state, self.poll);
            return Step::Idle;
        }

        let staged = !self.pending_video.is_empty() || !self.pending_audio.is_empty();
        if !staged && self.has_room(state) {
            let next = if self.is_seeking() {
                WorkerState::Seeking
            } else {
                WorkerState::Filling
            };
            set_state(state, next);
            return Step::Read;
        }

        set_state(state, WorkerState::Waiting);
        queues.wait(state, self.poll);
        Step::Idle
    }

    fn has_room(&self, state: &SharedState) -> bool {
        (self.decoder.has_video() && !state.video.is_full()) || (self.decoder.has_audio() && !state.audio.is_full())
    }

    fn is_seeking(&self) -> bool {
        self.video_target.is_some() || self.audio_target.is_some()
    }

    /// Move staged frames into the queues while they have room.
    fn hand_off(&mut self, state: &mut SharedState) {
        while !state.video.is_full() {
            match self.pending_video.pop_front() {
                Some(frame) => state.video.push(frame),
                None => break,
            }
        }
        while !state.audio.is_full() {
            match self.pending_audio.pop_front() {
                Some(frame) => state.audio.push(frame),
                None => break,
            }
        }
    }

    fn seek(&mut self, target: MediaTime) {
        self.stats.seeks += 1;
        self.pending_video.clear();
        self.pending_audio.clear();
        self.last_video = None;
        self.last_audio = None;
        self.end_of_stream = false;
        self.finished_marked = false;

        let result = self.reader.seek_near(target);
        self.decoder.reset();

        match result {
            Ok(()) => {
                self.video_target = self.frame_rate.map(|rate| target.to_frame_index(rate));
                self.audio_target = self.sample_rate.map(|rate| target.to_sample_offset(rate));
                debug!(
                    target = %target,
                    video_target = ?self.video_target,
                    audio_target = ?self.audio_target,
                    "Seeking"
                );
            }
            Err(e) => {
                warn!(target = %target, error = %e, "Seek failed, finishing stream");
                self.video_target = None;
                self.audio_target = None;
                self.end_of_stream = true;
            }
        }
    }

    fn read_one(&mut self) {
        match self.reader.read_packet() {
            Ok(Some(packet)) => {
                self.stats.packets += 1;
                self.decode(&packet);
            }
            Ok(None) => {
                debug!(seeking = self.is_seeking(), "End of stream");
                self.drain();
            }
            Err(e) => {
                error!(error = %e, "Read failed, draining");
                self.drain();
            }
        }
    }

    fn decode(&mut self, packet: &Packet) {
        match packet.stream {
            StreamKind::Video => match self.decoder.decode_video(Some(packet)) {
                Ok(frames) => self.stage_video(frames),
                Err(e) => {
                    self.stats.decode_errors += 1;
                    warn!(pts = ?packet.pts, error = %e, "Video packet skipped");
                }
            },
            StreamKind::Audio => match self.decoder.decode_audio(Some(packet)) {
                Ok(frames) => self.stage_audio(frames),
                Err(e) => {
                    self.stats.decode_errors += 1;
                    warn!(pts = ?packet.pts, error = %e, "Audio packet skipped");
                }
            },
            StreamKind::Other => trace!("Ignoring packet from unselected stream"),
        }
    }

    /// Flush both codecs once and mark input exhausted.
    fn drain(&mut self) {
        match self.decoder.decode_video(None) {
            Ok(frames) => self.stage_video(frames),
            Err(e) => warn!(error = %e, "Video flush failed"),
        }
        match self.decoder.decode_audio(None) {
            Ok(frames) => self.stage_audio(frames),
            Err(e) => warn!(error = %e, "Audio flush failed"),
        }
        self.video_target = None;
        self.audio_target = None;
        self.end_of_stream = true;
    }

    fn stage_video(&mut self, frames: Vec<VideoFrame>) {
        for frame in frames {
            if let Some(target) = self.video_target {
                if frame.index < target {
                    self.stats.discarded += 1;
                    continue;
                }
                trace!(index = frame.index, "Video seek target reached");
                self.video_target = None;
            }
            if self.last_video.is_some_and(|last| frame.index <= last) {
                self.stats.out_of_order += 1;
                debug!(index = frame.index, last = ?self.last_video, "Dropping non-increasing video frame");
                continue;
            }
            self.last_video = Some(frame.index);
            self.stats.video_frames += 1;
            self.pending_video.push_back(frame);
        }
    }

    fn stage_audio(&mut self, frames: Vec<AudioFrame>) {
        for mut frame in frames {
            if let Some(target) = self.audio_target {
                if frame.end() <= target {
                    self.stats.discarded += 1;
                    continue;
                }
                if frame.offset < target {
                    frame = frame.trim_front((target - frame.offset) as usize);
                }
                trace!(offset = frame.offset, "Audio seek target reached");
                self.audio_target = None;
            }
            if self.last_audio.is_some_and(|last| frame.offset <= last) {
                self.stats.out_of_order += 1;
                debug!(offset = frame.offset, last = ?self.last_audio, "Dropping non-increasing audio block");
                continue;
            }
            self.last_audio = Some(frame.offset);
            self.stats.audio_frames += 1;
            self.pending_audio.push_back(frame);
        }
    }
}

fn set_state(state: &mut SharedState, next: WorkerState) {
    if state.worker_state != next {
        trace!(from = ?state.worker_state, to = ?next, "Worker state");
        state.worker_state = next;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::fixture::{Fixture, SAMPLE_RATE};
    use crate::container::y4m::tests::write_y4m;
    use std::io::Write;
    use std::sync::atomic::Ordering;
    use std::time::Instant;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn config(video: usize, audio: usize) -> PipelineConfig {
        PipelineConfig {
            video_queue_capacity: video,
            audio_queue_capacity: audio,
            worker_poll_interval_ms: 2,
            ..PipelineConfig::default()
        }
    }

    fn wait_until(queues: &MediaQueues, mut cond: impl FnMut(&SharedState) -> bool) -> bool {
        let deadline = Instant::now() + TIMEOUT;
        while Instant::now() < deadline {
            if cond(&queues.lock()) {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    fn pop_video(queues: &MediaQueues) -> Option<i64> {
        let index = queues.lock().video.pop().map(|f| f.index);
        queues.notify();
        index
    }

    #[test]
    fn test_finite_stream_fills_and_finishes() {
        let (worker, info) = DecodeWorker::spawn_with(Fixture::video(10).opener(), &config(24, 8)).unwrap();
        let info = info.blocking_recv().unwrap().unwrap();
        assert_eq!(info.video.unwrap().frame_count, Some(10));

        let queues = worker.queues();
        assert!(wait_until(queues, |s| s.video.is_finished() && s.audio.is_finished()));
        let mut state = queues.lock();
        assert_eq!(state.video.len(), 10);
        assert_eq!(state.worker_state, WorkerState::Draining);
        let indices: Vec<_> = std::iter::from_fn(|| state.video.pop().map(|f| f.index)).collect();
        assert_eq!(indices, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_backpressure_waits_at_capacity() {
        let fixture = Fixture::infinite();
        let reads = fixture.reads();
        let (worker, _info) = DecodeWorker::spawn_with(fixture.opener(), &config(2, 2)).unwrap();
        let queues = worker.queues();

        assert!(wait_until(queues, |s| s.worker_state == WorkerState::Waiting && s.video.len() == 2));
        let reads_at_wait = reads.load(Ordering::SeqCst);
        assert!(reads_at_wait <= 3, "read {reads_at_wait} packets for 2 slots");

        // Still parked after several poll intervals.
        thread::sleep(Duration::from_millis(30));
        assert_eq!(reads.load(Ordering::SeqCst), reads_at_wait);
        assert_eq!(queues.lock().video.len(), 2);

        assert_eq!(pop_video(queues), Some(0));
        assert!(wait_until(queues, |s| s.video.len() == 2));
        assert!(reads.load(Ordering::SeqCst) > reads_at_wait);
        assert_eq!(pop_video(queues), Some(1));
        assert_eq!(pop_video(queues), Some(2));
    }

    #[test]
    fn test_capacity_never_exceeded_with_codec_delay() {
        let fixture = Fixture::infinite().codec_delay(3).with_audio();
        let (worker, _info) = DecodeWorker::spawn_with(fixture.opener(), &config(3, 2)).unwrap();
        let queues = worker.queues();
        for _ in 0..50 {
            {
                let mut state = queues.lock();
                assert!(state.video.len() <= 3);
                assert!(state.audio.len() <= 2);
                state.video.pop();
                state.audio.pop();
            }
            queues.notify();
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_seek_during_fill() {
        let fixture = Fixture::infinite().keyframe_interval(4);
        let (worker, _info) = DecodeWorker::spawn_with(fixture.opener(), &config(3, 3)).unwrap();
        let queues = worker.queues();
        assert!(wait_until(queues, |s| s.video.len() == 3));
        assert_eq!(queues.lock().video.peek_oldest().map(|f| f.index), Some(0));

        worker.seek(MediaTime::from_frame_index(7, Rational::from_integer(24)));
        assert!(wait_until(queues, |s| s.seek.is_none()));

        let mut seen = Vec::new();
        while seen.len() < 6 {
            assert!(wait_until(queues, |s| !s.video.is_empty()));
            seen.extend(pop_video(queues));
        }
        assert_eq!(seen[0], 7);
        assert!(seen.windows(2).all(|w| w[0] < w[1]), "{seen:?}");
    }

    #[test]
    fn test_seek_trims_audio_to_target() {
        let fixture = Fixture::infinite().with_audio();
        let (worker, _info) = DecodeWorker::spawn_with(fixture.opener(), &config(4, 4)).unwrap();
        let queues = worker.queues();
        assert!(wait_until(queues, |s| s.audio.len() == 4));

        // Mid-way through audio block 7 ([14000, 16000) at 24 fps / 48 kHz).
        worker.seek(MediaTime::from_sample_offset(15_000, SAMPLE_RATE));
        assert!(wait_until(queues, |s| s.seek.is_none()));
        assert!(wait_until(queues, |s| !s.audio.is_empty() && !s.video.is_empty()));

        let state = queues.lock();
        let first_audio = state.audio.peek_oldest().unwrap();
        assert_eq!(first_audio.offset, 15_000);
        assert_eq!(first_audio.buffer.sample_count(), 1_000);
        assert_eq!(state.video.peek_oldest().unwrap().index, 7);
    }

    #[test]
    fn test_seek_after_end_of_stream_reopens_queues() {
        let (worker, _info) = DecodeWorker::spawn_with(Fixture::video(10).opener(), &config(24, 4)).unwrap();
        let queues = worker.queues();
        assert!(wait_until(queues, |s| s.video.is_finished()));

        worker.seek(MediaTime::from_frame_index(2, Rational::from_integer(24)));
        assert!(wait_until(queues, |s| s.seek.is_none()));
        assert!(wait_until(queues, |s| s.video.is_finished()));
        let mut state = queues.lock();
        assert_eq!(state.video.len(), 8);
        assert_eq!(state.video.pop().map(|f| f.index), Some(2));
    }

    #[test]
    fn test_seek_past_end_finishes_cleanly() {
        let fixture = Fixture::video(10).keyframe_interval(4);
        let (worker, _info) = DecodeWorker::spawn_with(fixture.opener(), &config(2, 2)).unwrap();
        let queues = worker.queues();
        assert!(wait_until(queues, |s| s.video.len() == 2));

        worker.seek(MediaTime::from_frame_index(50, Rational::from_integer(24)));
        assert!(wait_until(queues, |s| s.seek.is_none() && s.is_exhausted()));
    }

    #[test]
    fn test_codec_delay_flushed_at_end() {
        let fixture = Fixture::video(10).codec_delay(3);
        let (worker, _info) = DecodeWorker::spawn_with(fixture.opener(), &config(16, 4)).unwrap();
        let queues = worker.queues();
        assert!(wait_until(queues, |s| s.video.is_finished()));
        assert_eq!(queues.lock().video.len(), 10);
    }

    #[test]
    fn test_read_failure_drains() {
        let fixture = Fixture::video(10).fail_read_at(4);
        let (worker, _info) = DecodeWorker::spawn_with(fixture.opener(), &config(16, 4)).unwrap();
        let queues = worker.queues();
        assert!(wait_until(queues, |s| s.video.is_finished() && s.audio.is_finished()));
        assert_eq!(queues.lock().video.len(), 4);
    }

    #[test]
    fn test_decode_error_skips_one_frame() {
        let fixture = Fixture::video(10).fail_decode_at(3);
        let (worker, _info) = DecodeWorker::spawn_with(fixture.opener(), &config(16, 4)).unwrap();
        let queues = worker.queues();
        assert!(wait_until(queues, |s| s.video.is_finished() && s.audio.is_finished()));

        let mut state = queues.lock();
        assert_eq!(state.decode_errors, 1);
        let indices: Vec<_> = std::iter::from_fn(|| state.video.pop().map(|f| f.index)).collect();
        assert_eq!(indices, vec![0, 1, 2, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_seek_failure_finishes_stream() {
        let fixture = Fixture::infinite().fail_seek();
        let (worker, _info) = DecodeWorker::spawn_with(fixture.opener(), &config(2, 2)).unwrap();
        let queues = worker.queues();
        assert!(wait_until(queues, |s| s.video.len() == 2));

        worker.seek(MediaTime::from_nanos(1_000_000_000));
        assert!(wait_until(queues, |s| s.seek.is_none() && s.is_exhausted()));
    }

    #[test]
    fn test_open_failure_resolves_error_without_push() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        writeln!(file, "plain text").unwrap();

        let registry = Arc::new(FormatRegistry::with_defaults());
        let (mut worker, info) =
            DecodeWorker::spawn(file.path().to_path_buf(), registry, &PipelineConfig::default()).unwrap();

        let result = info.blocking_recv().unwrap();
        assert!(matches!(result, Err(ref e) if e.is_open_failure()));

        worker.stop();
        let state = worker.queues().lock();
        assert_eq!(state.video.total_pushed(), 0);
        assert_eq!(state.audio.total_pushed(), 0);
        assert!(state.is_exhausted());
        assert_eq!(state.worker_state, WorkerState::Stopped);
    }

    #[test]
    fn test_shutdown_is_prompt() {
        let (worker, _info) = DecodeWorker::spawn_with(Fixture::infinite().opener(), &config(2, 2)).unwrap();
        let queues = Arc::clone(worker.queues());
        assert!(wait_until(&queues, |s| s.worker_state == WorkerState::Waiting));

        let started = Instant::now();
        drop(worker);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(queues.worker_state(), WorkerState::Stopped);
    }

    #[test]
    fn test_real_y4m_through_registry() {
        let file = write_y4m(5, 4, 2, "25:1");
        let registry = Arc::new(FormatRegistry::with_defaults());
        let (worker, info) = DecodeWorker::spawn(file.path().to_path_buf(), registry, &config(8, 8)).unwrap();

        let info = info.blocking_recv().unwrap().unwrap();
        assert_eq!(info.format, "y4m");

        let queues = worker.queues();
        assert!(wait_until(queues, |s| s.video.is_finished()));
        let mut state = queues.lock();
        assert_eq!(state.video.len(), 5);
        let first = state.video.pop().unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.image.width, 4);
        // Luma 16 with neutral chroma is black.
        assert_eq!(&first.image.data[..4], &[0, 0, 0, 255]);
    }
}
