mod cli;

use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::{Cli, Commands, format_time};
use playback_engine::{
    AbsoluteTime, Direction, EngineConfig, Event, FfmpegMediaBackend, HeadlessOutput, MediaBackend,
    SegmentIndex, SegmentStore, SqliteSegmentStore, load_config_or_default, resolve, spawn_session,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "playback_engine=debug,media_ffmpeg=debug,playback=debug".to_string()
        } else {
            "playback_engine=info,media_ffmpeg=warn,playback=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config_or_default(cli.config.as_deref())?;
    let store =
        SqliteSegmentStore::new(config.paths.database_path(), config.paths.data_root_path());
    tracing::debug!(database = %store.database().display(), "using metadata database");

    match cli.command {
        Commands::Segments { from, to } => list_segments(&store, from, to),
        Commands::Resolve {
            time,
            direction,
            json,
        } => resolve_time(store, time, direction.into(), json),
        Commands::Stats { json } => show_stats(&store, json),
        Commands::Still { time, out } => write_still(store, time, &out),
        Commands::Replay { time, seconds } => replay(config, store, time, seconds),
    }
}

fn list_segments(
    store: &SqliteSegmentStore,
    from: Option<AbsoluteTime>,
    to: Option<AbsoluteTime>,
) -> Result<()> {
    let segments = match (from, to) {
        (None, None) => store.segments()?,
        (from, to) => store.segments_between(from.unwrap_or(f64::MIN), to.unwrap_or(f64::MAX))?,
    };

    if segments.is_empty() {
        println!("No segments recorded.");
        return Ok(());
    }

    let mut previous_end: Option<AbsoluteTime> = None;
    for segment in &segments {
        if let Some(end) = previous_end
            && segment.start_ts > end
        {
            println!("  -- gap {:.1}s --", segment.start_ts - end);
        }
        let fps = segment
            .fps
            .map(|fps| format!("{fps:.1} fps"))
            .unwrap_or_else(|| "fps unknown".to_string());
        println!(
            "{}  {} -> {}  {:>7.1}s  {} frames  {}  {}",
            segment.id,
            format_time(segment.start_ts),
            format_time(segment.end_ts),
            segment.duration(),
            segment.frame_count,
            fps,
            segment.video_path.display()
        );
        previous_end = Some(segment.end_ts);
    }
    println!("{} segments", segments.len());
    Ok(())
}

fn resolve_time(
    store: SqliteSegmentStore,
    time: AbsoluteTime,
    direction: Direction,
    json: bool,
) -> Result<()> {
    let index = SegmentIndex::open(Arc::new(store));
    let Some(resolved) = resolve(&index.snapshot(), time, direction) else {
        bail!("no segments indexed");
    };

    if json {
        let value = serde_json::json!({
            "requested_time": time,
            "clamped_time": resolved.clamped_time,
            "offset": resolved.offset,
            "segment": resolved.segment,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Requested: {}", format_time(time));
    if resolved.clamped_time != time {
        println!("Clamped:   {}", format_time(resolved.clamped_time));
    }
    println!(
        "Segment:   {} ({} -> {})",
        resolved.segment.id,
        format_time(resolved.segment.start_ts),
        format_time(resolved.segment.end_ts)
    );
    println!("File:      {}", resolved.segment.video_path.display());
    println!("Offset:    {:.3}s", resolved.offset);
    Ok(())
}

fn show_stats(store: &SqliteSegmentStore, json: bool) -> Result<()> {
    let stats = store.stats()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Database:    {}", store.database().display());
    println!("Segments:    {}", stats.segment_count);
    match (stats.earliest_ts, stats.latest_ts) {
        (Some(earliest), Some(latest)) => {
            println!("Earliest:    {}", format_time(earliest));
            println!("Latest:      {}", format_time(latest));
        }
        _ => println!("Range:       empty"),
    }
    println!("Frames:      {}", stats.total_frames);
    println!("Video bytes: {}", stats.total_video_bytes);
    Ok(())
}

fn write_still(store: SqliteSegmentStore, time: AbsoluteTime, out: &Path) -> Result<()> {
    let index = SegmentIndex::open(Arc::new(store));
    let Some(resolved) = resolve(&index.snapshot(), time, Direction::Still) else {
        bail!("no segments indexed");
    };

    let backend = FfmpegMediaBackend::from_env();
    let still = backend
        .decode_still(&resolved.segment.video_path, resolved.offset)
        .with_context(|| format!("decoding {}", resolved.segment.video_path.display()))?;
    let image = image::RgbaImage::from_raw(still.width, still.height, still.bytes.to_vec())
        .context("decoded frame does not match its dimensions")?;
    image
        .save(out)
        .with_context(|| format!("writing {}", out.display()))?;

    println!(
        "Wrote {}x{} frame from {} @ {:.3}s to {}",
        still.width,
        still.height,
        resolved.segment.id,
        resolved.offset,
        out.display()
    );
    Ok(())
}

fn replay(
    config: EngineConfig,
    store: SqliteSegmentStore,
    time: AbsoluteTime,
    seconds: u64,
) -> Result<()> {
    let index = SegmentIndex::open(Arc::new(store));
    if index.is_empty() {
        bail!("no segments indexed");
    }

    let backend: Arc<dyn MediaBackend> = Arc::new(FfmpegMediaBackend::from_env());
    let runtime = spawn_session(config, index, backend, HeadlessOutput::new());
    if !runtime.handle.update(time) {
        bail!("session stopped before accepting the jump");
    }

    let deadline = Instant::now() + Duration::from_secs(seconds);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match runtime.events.recv_timeout(remaining) {
            Ok(event) => log_event(&event),
            Err(RecvTimeoutError::Timeout) => break,
            Err(RecvTimeoutError::Disconnected) => {
                tracing::warn!("session ended early");
                break;
            }
        }
    }

    runtime.join();
    Ok(())
}

fn log_event(event: &Event) {
    match event {
        Event::TimeChanged { time } => tracing::debug!(time = %format_time(*time), "time"),
        Event::SegmentChanged { segment_id } => tracing::info!(?segment_id, "segment changed"),
        Event::PlayStateChanged { playing } => tracing::info!(playing, "play state"),
        Event::StateChanged(state) => tracing::info!(?state, "state"),
        Event::FrozenFrameReady(frame) => tracing::info!(
            segment_id = %frame.segment_id,
            at = %format_time(frame.at),
            width = frame.frame.width,
            height = frame.frame.height,
            "frozen frame ready"
        ),
        Event::FrozenFrameVisibility { visible } => {
            tracing::info!(visible, "frozen frame visibility")
        }
        Event::PlaybackError(Some(kind)) => tracing::warn!(%kind, "playback error"),
        Event::PlaybackError(None) => tracing::info!("playback error cleared"),
        Event::PreloadReady { segment_id } => tracing::info!(%segment_id, "next segment preloaded"),
        Event::IndexRefreshed { segments } => tracing::info!(segments, "index refreshed"),
    }
}
