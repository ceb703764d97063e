//! # reel
//!
//! Headless player: opens a file through a `MediaSession`, drives the
//! playback clock from a timer until end of stream (or Ctrl-C) and logs what
//! was presented.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;

use reel_core::{
    FormatRegistry, Image, MediaSession, MediaTime, OpenStatus, PipelineConfig, PlaybackMode, Rational, StreamInfo,
};

// ============================================================================
// Arguments
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct PlayOptions {
    input: PathBuf,
    config: Option<PathBuf>,
    speed: Rational,
    seek: Option<MediaTime>,
    reverse: bool,
    snapshot: Option<PathBuf>,
    info_only: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Help,
    Play(PlayOptions),
}

fn parse_args(args: &[String]) -> Result<Command> {
    let mut input: Option<PathBuf> = None;
    let mut config = None;
    let mut speed = Rational::from_integer(1);
    let mut seek = None;
    let mut reverse = false;
    let mut snapshot = None;
    let mut info_only = false;

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--input" | "-i" => {
                input = Some(PathBuf::from(value_for(args, i)?));
                i += 2;
            }
            "--config" => {
                config = Some(PathBuf::from(value_for(args, i)?));
                i += 2;
            }
            "--speed" => {
                let value = value_for(args, i)?;
                speed = Rational::parse(value)
                    .filter(Rational::is_positive)
                    .ok_or_else(|| anyhow!("Invalid speed {:?}: expected a positive number like 2 or 1/2", value))?;
                i += 2;
            }
            "--seek" => {
                let value = value_for(args, i)?;
                let seconds = Rational::parse(value)
                    .filter(|r| r.num >= 0)
                    .ok_or_else(|| anyhow!("Invalid seek position {:?}: expected seconds", value))?;
                seek = Some(MediaTime::from_seconds(seconds));
                i += 2;
            }
            "--reverse" => {
                reverse = true;
                i += 1;
            }
            "--snapshot" => {
                snapshot = Some(PathBuf::from(value_for(args, i)?));
                i += 2;
            }
            "--info" => {
                info_only = true;
                i += 1;
            }
            "--help" | "-h" => return Ok(Command::Help),
            other => bail!("Unknown argument {:?}", other),
        }
    }

    let input = input.ok_or_else(|| anyhow!("Missing required --input"))?;
    Ok(Command::Play(PlayOptions {
        input,
        config,
        speed,
        seek,
        reverse,
        snapshot,
        info_only,
    }))
}

fn value_for(args: &[String], i: usize) -> Result<&str> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("Missing value for {}", args[i]))
}

fn print_usage() {
    eprintln!(
        "\nUsage:\n  reel --input <file> [--config <json>] [--speed <n|a/b>] [--seek <seconds>]\n       \
         [--reverse] [--snapshot <png>] [--info]\n"
    );
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("reel=info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let options = match parse_args(&args) {
        Ok(Command::Play(options)) => options,
        Ok(Command::Help) => {
            print_usage();
            return Ok(());
        }
        Err(e) => {
            print_usage();
            return Err(e);
        }
    };

    tracing::info!("reel v{}", reel_core::VERSION);
    play(options).await
}

async fn play(options: PlayOptions) -> Result<()> {
    let config = match &options.config {
        Some(path) => {
            PipelineConfig::load(path).with_context(|| format!("Failed to load config {}", path.display()))?
        }
        None => PipelineConfig::default(),
    };

    let registry = Arc::new(FormatRegistry::with_defaults());
    let mut session = MediaSession::new(config.clone(), registry);
    session.open(&options.input)?;

    let info = wait_for_info(&mut session, &options.input, &config).await?;
    if options.info_only {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    tracing::info!(
        input = %options.input.display(),
        video = info.has_video(),
        audio = info.has_audio(),
        duration = ?info.duration.map(MediaTime::as_secs_f64),
        speed = %options.speed,
        "Playback starting"
    );

    let images = session.observers().subscribe_current_image();
    let started = Instant::now();
    session.set_speed(options.speed, started)?;
    if let Some(target) = options.seek {
        session.seek(target, started);
    }
    if options.reverse {
        session.play_reverse(started);
    } else {
        session.play_forward(started);
    }

    let mut interval = tokio::time::interval(config.tick_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut position = options.seek.unwrap_or(MediaTime::ZERO);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = Instant::now();
                let Some(report) = session.tick(now) else {
                    break;
                };
                position = report.stream_time;
                if let Some(frame) = &report.video {
                    tracing::debug!(index = frame.index, queued = report.video_queue_size, "Frame");
                }
                // Reverse has no reverse decode, so it ends at the start.
                if session.playback().mode == PlaybackMode::Reverse && position == MediaTime::ZERO {
                    session.stop(now);
                }
                if !session.playback().is_playing() {
                    break;
                }
            }
            result = &mut ctrl_c => {
                result.context("Failed to listen for Ctrl-C")?;
                tracing::info!("Interrupted");
                session.stop(Instant::now());
                break;
            }
        }
    }

    let stats = session.clock_stats();
    tracing::info!(
        frames_presented = stats.frames_presented,
        frames_dropped = stats.frames_dropped,
        audio_blocks = stats.audio_blocks,
        audio_dropped = stats.audio_dropped,
        position = position.as_secs_f64(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Playback complete"
    );

    if let Some(path) = &options.snapshot {
        let frame = images.borrow().clone();
        match frame {
            Some(frame) => {
                save_snapshot(&frame.image, path)?;
                tracing::info!(path = %path.display(), index = frame.index, "Snapshot written");
            }
            None => tracing::warn!("No frame was presented; snapshot skipped"),
        }
    }

    session.close();
    Ok(())
}

async fn wait_for_info(session: &mut MediaSession, input: &Path, config: &PipelineConfig) -> Result<StreamInfo> {
    loop {
        match session.poll_stream_info() {
            OpenStatus::Ready(info) => return Ok(info.clone()),
            OpenStatus::Failed(e) => bail!("Failed to open {}: {}", input.display(), e),
            OpenStatus::Closed => bail!("Session closed before {} opened", input.display()),
            OpenStatus::Pending => {}
        }
        tokio::time::sleep(config.worker_poll_interval()).await;
    }
}

fn save_snapshot(image: &Image, path: &Path) -> Result<()> {
    let buffer = image::RgbaImage::from_raw(image.width, image.height, image.data.clone())
        .ok_or_else(|| anyhow!("Frame buffer does not match {}x{}", image.width, image.height))?;
    buffer
        .save(path)
        .with_context(|| format!("Failed to write snapshot {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("reel").chain(list.iter().copied()).map(String::from).collect()
    }

    fn play_options(list: &[&str]) -> PlayOptions {
        match parse_args(&args(list)).unwrap() {
            Command::Play(options) => options,
            Command::Help => panic!("expected play options"),
        }
    }

    #[test]
    fn test_defaults() {
        let options = play_options(&["-i", "clip.y4m"]);
        assert_eq!(options.input, PathBuf::from("clip.y4m"));
        assert_eq!(options.speed, Rational::from_integer(1));
        assert!(options.seek.is_none());
        assert!(!options.reverse);
        assert!(!options.info_only);
    }

    #[test]
    fn test_all_flags() {
        let options = play_options(&[
            "--input", "a.gif", "--config", "reel.json", "--speed", "1/2", "--seek", "1.5", "--reverse",
            "--snapshot", "out.png", "--info",
        ]);
        assert_eq!(options.config, Some(PathBuf::from("reel.json")));
        assert_eq!(options.speed, Rational::new(1, 2));
        assert_eq!(options.seek, Some(MediaTime::from_nanos(1_500_000_000)));
        assert!(options.reverse);
        assert_eq!(options.snapshot, Some(PathBuf::from("out.png")));
        assert!(options.info_only);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["-i"])).is_err());
        assert!(parse_args(&args(&["-i", "a.wav", "--speed", "0"])).is_err());
        assert!(parse_args(&args(&["-i", "a.wav", "--speed", "fast"])).is_err());
        assert!(parse_args(&args(&["-i", "a.wav", "--seek", "-1"])).is_err());
        assert!(parse_args(&args(&["-i", "a.wav", "--loop"])).is_err());
    }

    #[test]
    fn test_help() {
        assert_eq!(parse_args(&args(&["--help"])).unwrap(), Command::Help);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        let image = Image::new(2, 1, reel_core::PixelFormat::Rgba8, vec![255, 0, 0, 255, 0, 0, 255, 255]);
        save_snapshot(&image, &path).unwrap();

        let loaded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(loaded.dimensions(), (2, 1));
        assert_eq!(loaded.get_pixel(1, 0).0, [0, 0, 255, 255]);
    }
}
