//! Playback clock.
//!
//! Wall-clock time is mapped to stream time through an anchor pair
//! (`anchor_wall`, `anchor_time`) and a rational speed. Each tick pops every
//! frame whose position is already behind the target and keeps only the
//! last one; the rest were too late to show. A tick takes the shared lock
//! once, never waits on the decode thread and returns.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::frame::{AudioFrame, VideoFrame};
use crate::queue::MediaQueues;
use crate::stream::StreamInfo;
use crate::time::{MediaTime, Rational};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackMode {
    #[default]
    Stopped,
    Forward,
    Reverse,
}

/// Transport state, owned by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackState {
    pub mode: PlaybackMode,
    /// Always positive; direction comes from `mode`.
    pub speed: Rational,
    pub anchor_wall: Instant,
    pub anchor_time: MediaTime,
}

impl PlaybackState {
    pub fn new(now: Instant) -> Self {
        Self {
            mode: PlaybackMode::Stopped,
            speed: Rational::from_integer(1),
            anchor_wall: now,
            anchor_time: MediaTime::ZERO,
        }
    }

    /// `anchor_time ± (now - anchor_wall) * speed`, never below zero.
    pub fn stream_time(&self, now: Instant) -> MediaTime {
        let elapsed = now.saturating_duration_since(self.anchor_wall);
        let time = match self.mode {
            PlaybackMode::Stopped => self.anchor_time,
            PlaybackMode::Forward => self.anchor_time + MediaTime::scaled(elapsed, self.speed),
            PlaybackMode::Reverse => self.anchor_time - MediaTime::scaled(elapsed, self.speed),
        };
        time.max(MediaTime::ZERO)
    }

    /// Move the anchor to `now` without changing the stream position.
    pub fn rebase(&mut self, now: Instant) {
        self.anchor_time = self.stream_time(now);
        self.anchor_wall = now;
    }

    /// Jump to `time` at wall-clock `now`.
    pub fn reanchor(&mut self, time: MediaTime, now: Instant) {
        self.anchor_time = time.max(MediaTime::ZERO);
        self.anchor_wall = now;
    }

    pub fn is_playing(&self) -> bool {
        self.mode != PlaybackMode::Stopped
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub stream_time: MediaTime,
    pub video_target: Option<i64>,
    pub audio_target: Option<i64>,
    /// Last video frame popped this tick.
    pub video: Option<VideoFrame>,
    /// Last audio block popped this tick.
    pub audio: Option<AudioFrame>,
    pub video_dropped: usize,
    pub audio_dropped: usize,
    pub video_queue_size: usize,
    pub audio_queue_size: usize,
    /// Both queues finished and empty.
    pub end_of_stream: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClockStats {
    pub ticks: u64,
    pub frames_presented: u64,
    pub frames_dropped: u64,
    pub audio_blocks: u64,
    pub audio_dropped: u64,
}

#[derive(Debug, Clone, Default)]
pub struct PlaybackClock {
    frame_rate: Option<Rational>,
    sample_rate: Option<u32>,
    stats: ClockStats,
}

impl PlaybackClock {
    pub fn new(info: &StreamInfo) -> Self {
        Self {
            frame_rate: info.video.as_ref().map(|v| v.frame_rate),
            sample_rate: info.audio.as_ref().map(|a| a.sample_rate),
            stats: ClockStats::default(),
        }
    }

    /// A clock with no stream attached. Ticks only report queue depths.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> ClockStats {
        self.stats
    }

    pub fn tick(&mut self, queues: &MediaQueues, playback: &PlaybackState, now: Instant) -> TickReport {
        let stream_time = playback.stream_time(now);
        let video_target = self.frame_rate.map(|rate| stream_time.to_frame_index(rate));
        let audio_target = self.sample_rate.map(|rate| stream_time.to_sample_offset(rate));

        let mut report = TickReport {
            stream_time,
            video_target,
            audio_target,
            ..TickReport::default()
        };

        {
            let mut state = queues.lock();
            // Queued frames predate an unconsumed seek; the worker clears them.
            let seek_pending = state.seek.is_some();
            if !seek_pending {
                if let Some(target) = video_target {
                    let (frame, dropped) = state.video.pop_due(target);
                    report.video = frame;
                    report.video_dropped = dropped;
                }
                if let Some(target) = audio_target {
                    let (block, dropped) = state.audio.pop_due(target);
                    report.audio = block;
                    report.audio_dropped = dropped;
                }
            }
            report.video_queue_size = state.video.len();
            report.audio_queue_size = state.audio.len();
            report.end_of_stream = !seek_pending && state.is_exhausted();
        }

        if report.video.is_some() || report.audio.is_some() {
            queues.notify();
        }

        self.stats.ticks += 1;
        if let Some(frame) = &report.video {
            self.stats.frames_presented += 1;
            self.stats.frames_dropped += report.video_dropped as u64;
            trace!(index = frame.index, dropped = report.video_dropped, "Present frame");
        }
        if report.audio.is_some() {
            self.stats.audio_blocks += 1;
            self.stats.audio_dropped += report.audio_dropped as u64;
        }
        if report.video_dropped > 0 {
            debug!(dropped = report.video_dropped, time = %stream_time, "Late frames dropped");
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{AudioBuffer, Image};
    use crate::stream::{AudioInfo, PixelFormat, SampleFormat, VideoInfo};
    use std::path::PathBuf;
    use std::time::Duration;

    const FPS: Rational = Rational::new_raw(24, 1);

    fn info(video: bool, audio: bool) -> StreamInfo {
        StreamInfo {
            path: PathBuf::from("clock-test"),
            format: "test".into(),
            video: video.then(|| VideoInfo {
                codec: "raw".into(),
                width: 1,
                height: 1,
                pixel_format: PixelFormat::Rgba8,
                frame_rate: FPS,
                time_base: FPS.recip(),
                frame_count: None,
            }),
            audio: audio.then(|| AudioInfo {
                codec: "pcm".into(),
                sample_rate: 48_000,
                channels: 2,
                sample_format: SampleFormat::F32,
                time_base: Rational::new(1, 48_000),
                sample_count: None,
            }),
            duration: None,
        }
    }

    fn frames(n: i64) -> Duration {
        Duration::from_nanos(MediaTime::from_frame_index(n, FPS).as_nanos() as u64)
    }

    fn fill_video(queues: &MediaQueues, count: i64) {
        let mut state = queues.lock();
        for i in 0..count {
            state
                .video
                .push(VideoFrame::new(i, Image::new(1, 1, PixelFormat::Rgba8, vec![0; 4])));
        }
    }

    fn playing(now: Instant) -> PlaybackState {
        PlaybackState {
            mode: PlaybackMode::Forward,
            ..PlaybackState::new(now)
        }
    }

    #[test]
    fn test_stream_time_forward_and_speed() {
        let t0 = Instant::now();
        let mut state = playing(t0);
        assert_eq!(state.stream_time(t0 + Duration::from_millis(500)), MediaTime::from_nanos(500_000_000));

        state.speed = Rational::new(1, 2);
        assert_eq!(state.stream_time(t0 + Duration::from_secs(1)), MediaTime::from_nanos(500_000_000));
    }

    #[test]
    fn test_stream_time_reverse_clamps_at_zero() {
        let t0 = Instant::now();
        let mut state = PlaybackState::new(t0);
        state.reanchor(MediaTime::from_nanos(1_000_000_000), t0);
        state.mode = PlaybackMode::Reverse;
        assert_eq!(state.stream_time(t0 + Duration::from_millis(250)), MediaTime::from_nanos(750_000_000));
        assert_eq!(state.stream_time(t0 + Duration::from_secs(5)), MediaTime::ZERO);
    }

    #[test]
    fn test_stopped_holds_position() {
        let t0 = Instant::now();
        let mut state = playing(t0);
        state.rebase(t0 + Duration::from_secs(2));
        state.mode = PlaybackMode::Stopped;
        assert_eq!(state.stream_time(t0 + Duration::from_secs(60)), MediaTime::from_nanos(2_000_000_000));
    }

    #[test]
    fn test_tick_pops_due_frames_and_drops_superseded() {
        let queues = MediaQueues::new(16, 16);
        fill_video(&queues, 10);
        let mut clock = PlaybackClock::new(&info(true, false));
        let t0 = Instant::now();
        let state = playing(t0);

        let report = clock.tick(&queues, &state, t0);
        assert_eq!(report.video_target, Some(0));
        assert!(report.video.is_none());
        assert_eq!(report.video_queue_size, 10);

        let report = clock.tick(&queues, &state, t0 + frames(5));
        assert_eq!(report.video_target, Some(5));
        assert_eq!(report.video.map(|f| f.index), Some(4));
        assert_eq!(report.video_dropped, 4);
        assert_eq!(report.video_queue_size, 5);
        assert!(!report.end_of_stream);
        assert_eq!(clock.stats().frames_presented, 1);
        assert_eq!(clock.stats().frames_dropped, 4);
    }

    #[test]
    fn test_tick_reports_end_of_stream() {
        let queues = MediaQueues::new(16, 16);
        fill_video(&queues, 3);
        queues.lock().finish_all();
        let mut clock = PlaybackClock::new(&info(true, false));
        let t0 = Instant::now();

        let report = clock.tick(&queues, &playing(t0), t0 + frames(1));
        assert!(!report.end_of_stream);
        let report = clock.tick(&queues, &playing(t0), t0 + frames(3));
        assert_eq!(report.video.map(|f| f.index), Some(2));
        assert!(report.end_of_stream);
    }

    #[test]
    fn test_tick_drains_audio_by_sample_offset() {
        let queues = MediaQueues::new(4, 16);
        {
            let mut state = queues.lock();
            for i in 0..4 {
                let block = AudioBuffer::new(2, 48_000, vec![0.0; 2 * 1_000]);
                state.audio.push(AudioFrame::new(i * 1_000, block));
            }
        }
        let mut clock = PlaybackClock::new(&info(false, true));
        let t0 = Instant::now();

        // 2500 samples in.
        let elapsed = Duration::from_nanos(MediaTime::from_sample_offset(2_500, 48_000).as_nanos() as u64);
        let report = clock.tick(&queues, &playing(t0), t0 + elapsed);
        assert_eq!(report.audio_target, Some(2_500));
        assert_eq!(report.audio.map(|a| a.offset), Some(2_000));
        assert_eq!(report.audio_dropped, 2);
        assert_eq!(report.audio_queue_size, 1);
        assert!(report.video_target.is_none());
    }

    #[test]
    fn test_pending_seek_holds_stale_frames() {
        let queues = MediaQueues::new(4, 4);
        fill_video(&queues, 3);
        queues.lock().finish_all();
        queues.request_seek(MediaTime::from_frame_index(7, FPS));
        let mut clock = PlaybackClock::new(&info(true, false));
        let t0 = Instant::now();
        let mut state = playing(t0);
        state.reanchor(MediaTime::from_frame_index(7, FPS), t0);

        let report = clock.tick(&queues, &state, t0);
        assert!(report.video.is_none());
        assert_eq!(report.video_queue_size, 3);
        assert!(!report.end_of_stream);
        assert_eq!(clock.stats().frames_presented, 0);
    }

    #[test]
    fn test_detached_clock_only_reports_depths() {
        let queues = MediaQueues::new(4, 4);
        fill_video(&queues, 2);
        let mut clock = PlaybackClock::detached();
        let t0 = Instant::now();
        let report = clock.tick(&queues, &playing(t0), t0 + Duration::from_secs(10));
        assert!(report.video.is_none());
        assert_eq!(report.video_queue_size, 2);
    }
}
