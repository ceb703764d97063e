//! # Frame Queues - decode worker to playback clock hand-off
//!
//! ```text
//! ┌──────────┐  push   ┌─────────────────────┐  pop   ┌──────────┐
//! │  Decode  │───────► │ video  FrameQueue   │──────► │ Playback │
//! │  Worker  │         │ audio  FrameQueue   │        │  Clock   │
//! │ (thread) │ ◄────── │ seek slot, running  │ ◄───── │  (tick)  │
//! └──────────┘  wait   └─────────────────────┘ notify └──────────┘
//! ```
//!
//! Both queues, the pending seek and the worker flags sit behind one
//! `parking_lot::Mutex`, so clear-both on seek and finish-both on drain are
//! atomic to the consumer. Critical sections are O(1) or a short queue scan;
//! the lock is never held across a read or a decode call.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::frame::{AudioFrame, Timestamped, VideoFrame};
use crate::time::MediaTime;
use crate::worker::{PlaybackDirection, SeekRequest, WorkerState};

// ============================================================================
// Bounded Frame Queue
// ============================================================================

/// Capacity-limited FIFO. The queue does not block or reject: `push` is
/// unconditional and the producer checks `is_full()` first. That check is
/// what implements backpressure.
#[derive(Debug)]
pub struct FrameQueue<T> {
    frames: VecDeque<T>,
    capacity: usize,
    finished: bool,
    pushed: u64,
    popped: u64,
}

impl<T> FrameQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
            finished: false,
            pushed: 0,
            popped: 0,
        }
    }

    pub fn push(&mut self, frame: T) {
        debug_assert!(self.frames.len() < self.capacity, "push on a full queue");
        self.frames.push_back(frame);
        self.pushed += 1;
    }

    /// Oldest frame, or `None` when empty.
    pub fn pop(&mut self) -> Option<T> {
        let frame = self.frames.pop_front();
        if frame.is_some() {
            self.popped += 1;
        }
        frame
    }

    pub fn peek_oldest(&self) -> Option<&T> {
        self.frames.front()
    }

    /// Drop every queued frame. Leaves `finished` alone.
    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn set_finished(&mut self, finished: bool) {
        self.finished = finished;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Finished and drained: nothing more will ever come out.
    pub fn is_exhausted(&self) -> bool {
        self.finished && self.frames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.frames.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames ever pushed, across seeks.
    pub fn total_pushed(&self) -> u64 {
        self.pushed
    }

    pub fn total_popped(&self) -> u64 {
        self.popped
    }
}

impl<T: Timestamped> FrameQueue<T> {
    pub fn oldest_position(&self) -> Option<i64> {
        self.peek_oldest().map(Timestamped::position)
    }

    /// Pop every frame positioned strictly before `target`. Returns the last
    /// one popped and how many earlier ones were superseded.
    pub fn pop_due(&mut self, target: i64) -> (Option<T>, usize) {
        let mut last = None;
        let mut superseded = 0;
        while self.oldest_position().is_some_and(|pos| pos < target) {
            if last.is_some() {
                superseded += 1;
            }
            last = self.pop();
        }
        (last, superseded)
    }
}

// ============================================================================
// Shared State
// ============================================================================

/// Everything the worker and the clock share.
#[derive(Debug)]
pub struct SharedState {
    pub video: FrameQueue<VideoFrame>,
    pub audio: FrameQueue<AudioFrame>,
    /// Latest unconsumed seek. A newer request overwrites it.
    pub seek: Option<SeekRequest>,
    pub direction: PlaybackDirection,
    pub running: bool,
    pub worker_state: WorkerState,
    /// Packets the worker logged and skipped so far.
    pub decode_errors: u64,
}

impl SharedState {
    /// Seek half of the protocol: empty both queues and reopen them.
    pub fn reset_for_seek(&mut self) {
        self.video.clear();
        self.audio.clear();
        self.video.set_finished(false);
        self.audio.set_finished(false);
    }

    pub fn finish_all(&mut self) {
        self.video.set_finished(true);
        self.audio.set_finished(true);
    }

    pub fn is_exhausted(&self) -> bool {
        self.video.is_exhausted() && self.audio.is_exhausted()
    }
}

/// Snapshot of queue depths for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub video_len: usize,
    pub audio_len: usize,
    pub video_finished: bool,
    pub audio_finished: bool,
    pub worker_state: WorkerState,
    pub decode_errors: u64,
}

/// The queue pair plus the condition variable the worker parks on.
#[derive(Debug)]
pub struct MediaQueues {
    state: Mutex<SharedState>,
    wake: Condvar,
}

impl MediaQueues {
    pub fn new(video_capacity: usize, audio_capacity: usize) -> Self {
        Self {
            state: Mutex::new(SharedState {
                video: FrameQueue::new(video_capacity),
                audio: FrameQueue::new(audio_capacity),
                seek: None,
                direction: PlaybackDirection::Forward,
                running: true,
                worker_state: WorkerState::Idle,
                decode_errors: 0,
            }),
            wake: Condvar::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock()
    }

    /// Post a seek. Overwrites any unconsumed request.
    pub fn request_seek(&self, target: MediaTime) {
        let replaced = self.state.lock().seek.replace(SeekRequest { target });
        if let Some(old) = replaced {
            tracing::debug!(old = %old.target, new = %target, "Seek request superseded");
        }
        self.wake.notify_one();
    }

    pub fn set_direction(&self, direction: PlaybackDirection) {
        self.state.lock().direction = direction;
        self.wake.notify_one();
    }

    /// Ask the worker to exit. It observes this within one poll interval.
    pub fn shutdown(&self) {
        self.state.lock().running = false;
        self.wake.notify_all();
    }

    /// Wake the worker, e.g. after the consumer freed queue space.
    pub fn notify(&self) {
        self.wake.notify_one();
    }

    /// Park the worker for at most `timeout`. Returns true on timeout.
    pub fn wait(&self, guard: &mut MutexGuard<'_, SharedState>, timeout: Duration) -> bool {
        self.wake.wait_for(guard, timeout).timed_out()
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        QueueStats {
            video_len: state.video.len(),
            audio_len: state.audio.len(),
            video_finished: state.video.is_finished(),
            audio_finished: state.audio.is_finished(),
            worker_state: state.worker_state,
            decode_errors: state.decode_errors,
        }
    }

    pub fn worker_state(&self) -> WorkerState {
        self.state.lock().worker_state
    }
}

// ============================================================================
// Tests
// ============================================================================
