// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! bagdeck-replay - Play a container back and print field values.
//!
//! Usage:
//!   bagdeck-replay --input drive.bdk --path /imu.linear_acceleration.z
//!   bagdeck-replay --input drive.bdk --speed 4.0 --topics '/odom,/tf'
//!   bagdeck-replay --input drive.bdk --start 12.5 --loop

use bagdeck::codec::{decode_container, TimestampSource};
use bagdeck::config::Config;
use bagdeck::filter::TopicFilter;
use bagdeck::format::ContainerReader;
use bagdeck::path::{resolve, TopicPath};
use bagdeck::playback::{PlaybackEngine, PlaybackStatus};
use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "bagdeck-replay")]
#[command(about = "Replay a bagdeck container and print message fields")]
#[command(version)]
struct Args {
    /// Input container (.bdk)
    #[arg(short, long)]
    input: PathBuf,

    /// Engine configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Playback speed multiplier
    #[arg(short, long)]
    speed: Option<f64>,

    /// Loop playback
    #[arg(short, long)]
    loop_playback: bool,

    /// Topics to select (comma-separated patterns, supports wildcards)
    #[arg(short, long)]
    topics: Option<String>,

    /// Field paths to print, e.g. `/imu.angular_velocity.z` (repeatable)
    #[arg(short, long = "path")]
    paths: Vec<String>,

    /// Start offset (seconds from beginning)
    #[arg(long, default_value = "0")]
    start: f64,

    /// Use `header.stamp` instead of log time
    #[arg(long)]
    header_stamp: bool,

    /// Scheduler rate (ticks per second)
    #[arg(long, default_value = "30")]
    tick_hz: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Quiet mode (values only)
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = args.log_level.parse().unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_target(false)
        .init();

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(speed) = args.speed {
        config.playback_speed = speed;
    }
    if args.loop_playback {
        config.loop_playback = true;
    }
    if args.header_stamp {
        config.timestamp_source = TimestampSource::HeaderStamp;
    }
    if let Some(pattern) = &args.topics {
        let patterns: Vec<String> = pattern.split(',').map(|s| s.trim().to_string()).collect();
        config.topics = Some(TopicFilter::include(patterns));
    }
    config.validate()?;

    let paths = args
        .paths
        .iter()
        .map(|p| TopicPath::parse(p).map_err(|e| anyhow::anyhow!("Invalid path {}: {}", p, e)))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut reader = ContainerReader::open(&args.input)?;
    let messages = decode_container(&mut reader, &config.decode_options())?;

    let mut engine = PlaybackEngine::new(config.playback_config());
    engine.load(messages);

    // Paths select their topics even when a filter excludes them
    for path in &paths {
        if !engine.snapshot().selected_topics.contains(&path.topic) {
            if let Err(e) = engine.toggle_topic(&path.topic) {
                warn!("{}", e);
            }
        }
    }

    if !args.quiet {
        info!("bagdeck replay v{}", env!("CARGO_PKG_VERSION"));
        info!("Input: {}", args.input.display());
        info!(
            "Messages: {} over {:.1}s",
            engine.messages().len(),
            engine.duration_ms() / 1000.0
        );
        info!("Selected topics: {:?}", engine.snapshot().selected_topics);
        info!("Playback speed: {:.1}x", engine.speed());
        info!("Starting playback. Press Ctrl+C to stop.");
    }

    if args.start > 0.0 {
        engine.seek(args.start * 1000.0)?;
    }
    engine.play()?;

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let tick = Duration::from_secs_f64(1.0 / f64::from(args.tick_hz.max(1)));
    let mut printed: HashMap<String, u64> = HashMap::new();

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(tick);
        engine.tick();

        for path in &paths {
            let Some(msg) = engine.latest(&path.topic) else {
                continue;
            };
            let key = path.to_string();
            if printed.get(&key) == Some(&msg.log_time) {
                continue;
            }
            printed.insert(key.clone(), msg.log_time);

            let rel_secs = (msg.timestamp_ms - engine.origin_ms()) / 1000.0;
            match msg.value().map(|v| resolve(v, &path.path)) {
                Some(Ok(value)) => println!("{:>10.3}s {} = {}", rel_secs, key, value.to_json()),
                Some(Err(e)) => println!("{:>10.3}s {} ! {}", rel_secs, key, e),
                None => println!("{:>10.3}s {} ! payload not decoded", rel_secs, key),
            }
        }

        if engine.status() == PlaybackStatus::Stopped {
            break;
        }
    }

    if !args.quiet {
        info!("Playback stopped at {:.1}s", engine.cursor_ms() / 1000.0);
        info!("  Messages read: {}", engine.read_index());
    }

    Ok(())
}
