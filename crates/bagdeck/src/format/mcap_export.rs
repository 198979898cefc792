// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MCAP export support.
//!
//! Converts `.bdk` containers to MCAP for Foxglove Studio and other
//! MCAP-compatible tools. Schemas, channels and message times are carried
//! over unchanged; the container summary goes into a JSON attachment.

use super::{Channel, ContainerReader, MessageRecord, Schema};
use serde::Serialize;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Name of the attachment holding the container summary.
pub const SUMMARY_ATTACHMENT: &str = "bagdeck_summary.json";

/// MCAP export errors.
#[derive(Debug, Error)]
pub enum McapError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("MCAP encoding error: {0}")]
    Mcap(#[from] mcap::McapError),

    #[error("Source format error: {0}")]
    Source(String),
}

/// MCAP file exporter.
pub struct McapExporter<'a> {
    writer: mcap::Writer<'a, BufWriter<File>>,
    // container channel id -> MCAP channel id
    channels: HashMap<u16, u16>,
}

impl<'a> McapExporter<'a> {
    /// Create a new MCAP exporter.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, McapError> {
        let file = File::create(path)?;
        let writer = mcap::Writer::new(BufWriter::new(file))?;

        Ok(Self {
            writer,
            channels: HashMap::new(),
        })
    }

    /// Attach a JSON document.
    pub fn attach_json<T: Serialize>(&mut self, name: &str, value: &T) -> Result<(), McapError> {
        let json = serde_json::to_vec(value).map_err(|e| McapError::Source(e.to_string()))?;
        let attachment = mcap::Attachment {
            log_time: 0,
            create_time: 0,
            name: name.to_string(),
            media_type: "application/json".to_string(),
            data: Cow::Owned(json),
        };
        self.writer.attach(&attachment)?;
        Ok(())
    }

    /// Declare a container channel and its schema.
    pub fn add_channel(
        &mut self,
        channel: &Channel,
        schema: Option<&Schema>,
    ) -> Result<u16, McapError> {
        if let Some(&id) = self.channels.get(&channel.id) {
            return Ok(id);
        }

        let schema = schema.map(|s| {
            Arc::new(mcap::Schema {
                name: s.name.clone(),
                encoding: s.encoding.clone(),
                data: Cow::Owned(s.data.clone()),
            })
        });

        let mcap_channel = mcap::Channel {
            topic: channel.topic.clone(),
            schema,
            message_encoding: channel.message_encoding.clone(),
            metadata: channel.metadata.clone(),
        };

        let id = self.writer.add_channel(&mcap_channel)?;
        self.channels.insert(channel.id, id);
        tracing::debug!("MCAP channel {} for {}", id, channel.topic);
        Ok(id)
    }

    /// Write one container record.
    pub fn write_record(&mut self, record: &MessageRecord) -> Result<(), McapError> {
        let channel_id = *self.channels.get(&record.channel_id).ok_or_else(|| {
            McapError::Source(format!("channel {} was not declared", record.channel_id))
        })?;

        self.writer.write_to_known_channel(
            &mcap::records::MessageHeader {
                channel_id,
                sequence: record.sequence,
                log_time: record.log_time,
                publish_time: record.publish_time,
            },
            &record.data,
        )?;
        Ok(())
    }

    /// Finalize the MCAP file.
    pub fn finalize(mut self) -> Result<(), McapError> {
        self.writer.finish()?;
        Ok(())
    }
}

#[derive(Serialize)]
struct ExportSummary<'s> {
    profile: &'s str,
    library: &'s str,
    statistics: &'s super::Statistics,
    metadata: BTreeMap<&'s str, &'s BTreeMap<String, String>>,
}

/// Convert a `.bdk` container to MCAP. Returns the number of messages.
pub fn export_to_mcap<P1: AsRef<Path>, P2: AsRef<Path>>(
    input_path: P1,
    output_path: P2,
) -> Result<u64, McapError> {
    let mut reader =
        ContainerReader::open(input_path).map_err(|e| McapError::Source(e.to_string()))?;
    let mut exporter = McapExporter::create(output_path)?;

    let summary = ExportSummary {
        profile: reader.profile(),
        library: reader.library(),
        statistics: reader.statistics(),
        metadata: reader
            .metadata()
            .iter()
            .map(|m| (m.name.as_str(), &m.entries))
            .collect(),
    };
    exporter.attach_json(SUMMARY_ATTACHMENT, &summary)?;

    for (id, channel) in reader.channels_by_id() {
        exporter.add_channel(channel, reader.schema_for_channel(*id))?;
    }

    let mut count = 0u64;
    for result in reader.read_messages() {
        let record = result.map_err(|e| McapError::Source(e.to_string()))?;
        exporter.write_record(&record)?;
        count += 1;
    }

    exporter.finalize()?;
    tracing::info!("Exported {} messages to MCAP", count);
    Ok(count)
}
