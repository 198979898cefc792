// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! bagdeck - robot telemetry bags, indexed containers and playback.
//!
//! - Schema-aware conversion of legacy bags into the `.bdk` container
//! - Indexed, CRC-checked container reading into decoded messages
//! - Deterministic playback cursor with seek, speed and per-topic snapshots
//! - Message path resolution and plot series extraction
//! - Frame tree composition from `/tf` and `/tf_static`
//! - MCAP export (optional `mcap` feature)
//!
//! # Quick Start
//!
//! ```bash
//! # Container summary, frame tree
//! bagdeck-info --input drive.bdk --frames
//!
//! # Replay at 2x, printing a field
//! bagdeck-replay --input drive.bdk --speed 2.0 --path /imu.angular_velocity.z
//! ```
//!
//! # Pipeline
//!
//! ```text
//! BagSource ──► Converter ──► .bdk ──► ContainerReader ──► decode_container
//!                 │                                             │
//!           SchemaResolver                              Vec<SharedMessage>
//!                                                               │
//!                        path::resolve ◄── snapshot ◄── PlaybackEngine
//!                        FrameTree::ingest ◄────────────────────┘
//! ```

pub mod bag;
pub mod codec;
pub mod config;
pub mod convert;
pub mod filter;
pub mod format;
pub mod path;
pub mod playback;
pub mod schema;
pub mod transform;
pub mod worker;

pub use bag::{BagSource, MemoryBag};
pub use codec::{decode_container, DecodeOptions, DecodedMessage, Payload, SharedMessage, Value};
pub use config::Config;
pub use convert::{ConversionMetadata, ConvertOptions, Converter};
pub use filter::{TopicFilter, TypeFilter};
pub use format::{ContainerReader, ContainerWriter, FormatError, WriterOptions};
pub use path::{MessagePath, TopicPath};
pub use playback::{PlaybackConfig, PlaybackEngine, PlaybackSnapshot, PlaybackStatus};
pub use schema::{SchemaResolver, TypeRegistry};
pub use transform::{FrameTree, Transform};
pub use worker::{DecodeWorker, WorkerHandle};

// MCAP support (requires "mcap" feature)
#[cfg(feature = "mcap")]
pub use format::{export_to_mcap, McapError, McapExporter};
