// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Container file formats.
//!
//! Supports:
//! - Native `.bdk` container (default)
//! - MCAP export (optional feature)

pub mod container;

#[cfg(feature = "mcap")]
mod mcap_export;

pub use container::{
    ChunkIndex, ContainerReader, ContainerWriter, FormatError, MessageIter, Statistics,
    WriterOptions, DEFAULT_CHUNK_SIZE, FORMAT_VERSION, MAGIC,
};

#[cfg(feature = "mcap")]
pub use mcap_export::{export_to_mcap, McapError, McapExporter};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A schema stored in a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Schema ID (never 0).
    pub id: u16,

    /// Type name the schema describes.
    pub name: String,

    /// Schema encoding (e.g. `ros1msg`).
    pub encoding: String,

    /// Opaque definition blob.
    pub data: Vec<u8>,
}

/// A topic bound to a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel ID.
    pub id: u16,

    /// Referenced schema (0 = schemaless).
    pub schema_id: u16,

    /// Topic name.
    pub topic: String,

    /// Payload encoding (e.g. `ros1`, `json`).
    pub message_encoding: String,

    /// Free-form metadata (original type name under `type`).
    pub metadata: BTreeMap<String, String>,
}

impl Channel {
    /// Original type name recorded in the channel metadata.
    pub fn type_name(&self) -> Option<&str> {
        self.metadata.get(METADATA_TYPE_KEY).map(String::as_str)
    }
}

/// Channel metadata key holding the original type name.
pub const METADATA_TYPE_KEY: &str = "type";

/// A time-stamped binary message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    /// Channel the message belongs to.
    pub channel_id: u16,

    /// Per-channel sequence number.
    pub sequence: u32,

    /// Publish time (nanoseconds).
    pub publish_time: u64,

    /// Log time (nanoseconds).
    pub log_time: u64,

    /// Serialized payload.
    pub data: Vec<u8>,
}

/// Named key/value metadata stored in the container summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerMetadata {
    pub name: String,
    pub entries: BTreeMap<String, String>,
}
