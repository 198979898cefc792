// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! bagdeck-info - Summarize a container.
//!
//! Usage:
//!   bagdeck-info --input drive.bdk
//!   bagdeck-info --input drive.bdk --json
//!   bagdeck-info --input drive.bdk --frames
//!   bagdeck-info --input drive.bdk --export-mcap drive.mcap   (feature `mcap`)

use bagdeck::codec::{decode_container, DecodeOptions};
use bagdeck::filter::TopicFilter;
use bagdeck::format::ContainerReader;
use bagdeck::transform::{FrameTree, TF_STATIC_TOPIC, TF_TOPIC};
use clap::Parser;
use serde_json::json;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "bagdeck-info")]
#[command(about = "Show the summary of a bagdeck container")]
#[command(version)]
struct Args {
    /// Input container (.bdk)
    #[arg(short, long)]
    input: PathBuf,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,

    /// Decode /tf and /tf_static and list the frame tree
    #[arg(long)]
    frames: bool,

    /// Export the container to MCAP
    #[cfg(feature = "mcap")]
    #[arg(long)]
    export_mcap: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = args.log_level.parse().unwrap_or(tracing::Level::WARN);
    tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_target(false)
        .init();

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let mut reader = ContainerReader::open(&args.input)?;
    let stats = reader.statistics().clone();

    if args.json {
        let channels: Vec<_> = reader
            .channels_by_id()
            .values()
            .map(|c| {
                json!({
                    "id": c.id,
                    "topic": c.topic,
                    "type": c.type_name(),
                    "encoding": c.message_encoding,
                    "schema_id": c.schema_id,
                    "messages": stats.channel_message_counts.get(&c.id).copied().unwrap_or(0),
                })
            })
            .collect();
        let summary = json!({
            "profile": reader.profile(),
            "library": reader.library(),
            "statistics": stats,
            "schemas": reader.schemas_by_id().values().map(|s| &s.name).collect::<Vec<_>>(),
            "channels": channels,
            "metadata": reader.metadata(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("File:      {}", args.input.display());
        println!("Profile:   {}", reader.profile());
        println!("Library:   {}", reader.library());
        println!("Messages:  {}", stats.message_count);
        println!(
            "Duration:  {:.3}s ({} - {})",
            stats.duration_nanos() as f64 / 1e9,
            stats.message_start_time,
            stats.message_end_time
        );
        println!("Chunks:    {}", stats.chunk_count);
        println!("Schemas:   {}", stats.schema_count);
        println!("Channels:  {}", stats.channel_count);
        for channel in reader.channels_by_id().values() {
            println!(
                "  {:<32} {:<36} {:>8} msgs ({})",
                channel.topic,
                channel.type_name().unwrap_or("-"),
                stats.channel_message_counts.get(&channel.id).copied().unwrap_or(0),
                channel.message_encoding
            );
        }
        for meta in reader.metadata() {
            println!("Metadata [{}]", meta.name);
            for (key, value) in &meta.entries {
                println!("  {}: {}", key, value);
            }
        }
    }

    if args.frames {
        let tf_topics = TopicFilter::include([TF_TOPIC, TF_STATIC_TOPIC]);
        let options = DecodeOptions::new().topic_filter(tf_topics);
        let messages = decode_container(&mut reader, &options)?;
        let mut tree = FrameTree::new();
        let applied = tree.ingest(messages.iter().map(|m| m.as_ref()));

        println!("Frames ({} transforms applied):", applied);
        for frame in tree.frames() {
            match tree.get(&frame) {
                Some(node) => println!(
                    "  {} -> {}{}",
                    node.parent,
                    node.name,
                    if node.is_static { " (static)" } else { "" }
                ),
                None => println!("  {} (root)", frame),
            }
        }
    }

    #[cfg(feature = "mcap")]
    {
        if let Some(output) = &args.export_mcap {
            let count = bagdeck::format::export_to_mcap(&args.input, output)?;
            println!("Exported {} messages to {}", count, output.display());
        }
    }

    Ok(())
}
