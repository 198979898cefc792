// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Payload decoding.
//!
//! Turns container records into [`DecodedMessage`]s:
//!
//! ```text
//! ContainerReader ──records──► ChannelDecoder ──► DecodedMessage (Arc)
//!                               │ ros1 + schema blob → Payload::Structured
//!                               │ json               → Payload::Structured
//!                               └ other / failure    → Payload::Raw
//! ```
//!
//! A payload that fails to decode is kept raw and logged; only container
//! errors abort decoding.

pub mod ros1;
mod value;

pub use value::Value;

use crate::filter::TopicFilter;
use crate::format::{Channel, ContainerReader, FormatError, MessageRecord, Schema};
use crate::schema::{TypeRegistry, SCHEMA_ENCODING};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};
use std::sync::Arc;
use thiserror::Error;

/// Decoding errors.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Container error: {0}")]
    Format(#[from] FormatError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload truncated while reading {field} at offset {offset}")]
    Truncated { field: String, offset: usize },

    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("Type nesting too deep at {0}")]
    TooDeep(String),

    #[error("Field {field}: expected {expected}")]
    Mismatch {
        field: String,
        expected: &'static str,
    },

    #[error("Unsupported message encoding: {0}")]
    UnsupportedEncoding(String),
}

/// Message payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Undecoded bytes.
    Raw(Vec<u8>),
    /// Deserialized value.
    Structured(Value),
}

impl Payload {
    /// Structured value, if decoded.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Structured(value) => Some(value),
            Self::Raw(_) => None,
        }
    }
}

/// A decoded, immutable message.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage {
    pub topic: String,
    pub type_name: String,

    /// Log time from the container (nanoseconds).
    pub log_time: u64,

    /// Playback timestamp (milliseconds since the epoch).
    pub timestamp_ms: f64,

    pub payload: Payload,
}

/// Shared handle to a decoded message.
pub type SharedMessage = Arc<DecodedMessage>;

impl DecodedMessage {
    /// Message timestamped by its log time.
    pub fn new(topic: &str, type_name: &str, log_time: u64, payload: Payload) -> Self {
        Self {
            topic: topic.to_string(),
            type_name: type_name.to_string(),
            log_time,
            timestamp_ms: log_time as f64 / 1_000_000.0,
            payload,
        }
    }

    /// Structured message at a given millisecond timestamp.
    pub fn structured(topic: &str, type_name: &str, timestamp_ms: f64, value: Value) -> Self {
        Self {
            topic: topic.to_string(),
            type_name: type_name.to_string(),
            log_time: (timestamp_ms.max(0.0) * 1_000_000.0) as u64,
            timestamp_ms,
            payload: Payload::Structured(value),
        }
    }

    /// Structured value, if decoded.
    pub fn value(&self) -> Option<&Value> {
        self.payload.value()
    }

    /// `header.stamp` in milliseconds, when the message carries one.
    pub fn header_stamp_ms(&self) -> Option<f64> {
        let stamp = self.value()?.get("header")?.get("stamp")?;
        let sec = stamp.get("sec")?.as_f64()?;
        let nsec = stamp
            .get("nsec")
            .or_else(|| stamp.get("nanosec"))?
            .as_f64()?;
        Some(sec * 1000.0 + nsec / 1_000_000.0)
    }
}

/// Where playback timestamps come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampSource {
    /// Container log time.
    #[default]
    LogTime,
    /// The message's `header.stamp`, falling back to log time.
    HeaderStamp,
}

/// Decoding options.
#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    pub timestamp_source: TimestampSource,

    /// Topics to decode (None = all).
    pub topic_filter: Option<TopicFilter>,

    /// Keep payloads raw instead of deserializing them.
    pub raw_only: bool,
}

impl DecodeOptions {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timestamp source.
    pub fn timestamp_source(mut self, source: TimestampSource) -> Self {
        self.timestamp_source = source;
        self
    }

    /// Set topic filter.
    pub fn topic_filter(mut self, filter: TopicFilter) -> Self {
        self.topic_filter = Some(filter);
        self
    }

    /// Skip payload deserialization.
    pub fn raw_only(mut self, raw: bool) -> Self {
        self.raw_only = raw;
        self
    }
}

enum DecoderKind {
    Ros1 { registry: TypeRegistry, root: String },
    Json,
    Raw,
}

/// Decoder bound to one channel.
pub struct ChannelDecoder {
    topic: String,
    type_name: String,
    kind: DecoderKind,
}

impl ChannelDecoder {
    /// Build a decoder for a channel and its schema.
    ///
    /// Channels whose schema cannot be used fall back to raw payloads.
    pub fn new(channel: &Channel, schema: Option<&Schema>) -> Self {
        let type_name = channel
            .type_name()
            .map(str::to_string)
            .or_else(|| schema.map(|s| s.name.clone()))
            .unwrap_or_default();

        let kind = match channel.message_encoding.as_str() {
            "json" => DecoderKind::Json,
            "ros1" => match schema {
                Some(s) if s.encoding == SCHEMA_ENCODING && !s.data.is_empty() => {
                    let text = String::from_utf8_lossy(&s.data);
                    match TypeRegistry::from_schema_blob(&s.name, &text) {
                        Ok(registry) => DecoderKind::Ros1 {
                            registry,
                            root: s.name.clone(),
                        },
                        Err(e) => {
                            tracing::warn!(
                                "Schema for {} unusable, keeping raw: {}",
                                channel.topic,
                                e
                            );
                            DecoderKind::Raw
                        }
                    }
                }
                _ => {
                    tracing::debug!("No schema for {}, keeping raw payloads", channel.topic);
                    DecoderKind::Raw
                }
            },
            other => {
                tracing::debug!("Encoding {} on {} not decoded", other, channel.topic);
                DecoderKind::Raw
            }
        };

        Self {
            topic: channel.topic.clone(),
            type_name,
            kind,
        }
    }

    /// Topic this decoder serves.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Decode a payload.
    pub fn decode_payload(&self, data: &[u8]) -> Result<Value, CodecError> {
        match &self.kind {
            DecoderKind::Ros1 { registry, root } => ros1::decode(registry, root, data),
            DecoderKind::Json => {
                let json: serde_json::Value = serde_json::from_slice(data)?;
                Ok(Value::from(json))
            }
            DecoderKind::Raw => Err(CodecError::UnsupportedEncoding(self.topic.clone())),
        }
    }

    /// Decode a record into a message; payload failures keep it raw.
    pub fn decode_record(&self, record: MessageRecord, options: &DecodeOptions) -> DecodedMessage {
        let payload = if options.raw_only || matches!(self.kind, DecoderKind::Raw) {
            Payload::Raw(record.data)
        } else {
            match self.decode_payload(&record.data) {
                Ok(value) => Payload::Structured(value),
                Err(e) => {
                    tracing::warn!(
                        "Failed to decode {} message at {}: {}",
                        self.topic,
                        record.log_time,
                        e
                    );
                    Payload::Raw(record.data)
                }
            }
        };

        let mut msg = DecodedMessage::new(&self.topic, &self.type_name, record.log_time, payload);
        if options.timestamp_source == TimestampSource::HeaderStamp {
            if let Some(stamp) = msg.header_stamp_ms() {
                msg.timestamp_ms = stamp;
            }
        }
        msg
    }
}

/// Decode every message of a container, sorted by playback timestamp.
///
/// Messages with equal timestamps keep container log-time order.
pub fn decode_container<R: Read + Seek>(
    reader: &mut ContainerReader<R>,
    options: &DecodeOptions,
) -> Result<Vec<SharedMessage>, CodecError> {
    let decoders: HashMap<u16, ChannelDecoder> = reader
        .channels_by_id()
        .iter()
        .filter(|(_, c)| options.topic_filter.as_ref().map_or(true, |f| f.matches(&c.topic)))
        .map(|(id, c)| (*id, ChannelDecoder::new(c, reader.schema_for_channel(*id))))
        .collect();

    let records = reader.read_messages_time_ordered()?;
    let mut messages: Vec<SharedMessage> = records
        .into_iter()
        .filter_map(|record| {
            let decoder = decoders.get(&record.channel_id)?;
            Some(Arc::new(decoder.decode_record(record, options)))
        })
        .collect();

    messages.sort_by(|a, b| a.timestamp_ms.total_cmp(&b.timestamp_ms));

    tracing::debug!(
        "Decoded {} messages on {} channels",
        messages.len(),
        decoders.len()
    );
    Ok(messages)
}

/// Decode a container held in memory.
pub fn decode_bytes(
    bytes: Vec<u8>,
    options: &DecodeOptions,
) -> Result<Vec<SharedMessage>, CodecError> {
    let mut reader = ContainerReader::initialize(Cursor::new(bytes))?;
    decode_container(&mut reader, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{ContainerWriter, WriterOptions, METADATA_TYPE_KEY};
    use crate::schema::SchemaResolver;
    use std::collections::BTreeMap;

    fn write_sample() -> Vec<u8> {
        let builtins = TypeRegistry::with_builtins();
        let schema_text = SchemaResolver::new(&builtins)
            .resolve("geometry_msgs/PoseStamped")
            .to_schema_text();

        let mut writer = ContainerWriter::new(Vec::new(), WriterOptions::new().chunk_size(64));
        writer.start("ros1", "test").expect("start");
        let schema = writer
            .register_schema(
                "geometry_msgs/msg/PoseStamped",
                SCHEMA_ENCODING,
                schema_text.as_bytes(),
            )
            .expect("schema");

        let mut meta = BTreeMap::new();
        meta.insert(METADATA_TYPE_KEY.to_string(), "geometry_msgs/PoseStamped".to_string());
        let pose = writer.register_channel(schema, "/pose", "ros1", meta).expect("pose");
        let json = writer.register_channel(0, "/status", "json", BTreeMap::new()).expect("json");
        let raw = writer.register_channel(0, "/blob", "cdr", BTreeMap::new()).expect("raw");

        for i in 0..5u32 {
            let value = Value::from([
                (
                    "header",
                    Value::from([
                        ("seq", Value::UInt(i.into())),
                        // Stamps run backwards relative to log time
                        (
                            "stamp",
                            Value::from([
                                ("sec", Value::UInt(u64::from(10 - i))),
                                ("nsec", Value::UInt(0)),
                            ]),
                        ),
                        ("frame_id", Value::from("map")),
                    ]),
                ),
                (
                    "pose",
                    Value::from([
                        (
                            "position",
                            Value::from([
                                ("x", Value::Float(f64::from(i))),
                                ("y", Value::Float(0.0)),
                                ("z", Value::Float(0.0)),
                            ]),
                        ),
                        (
                            "orientation",
                            Value::from([
                                ("x", Value::Float(0.0)),
                                ("y", Value::Float(0.0)),
                                ("z", Value::Float(0.0)),
                                ("w", Value::Float(1.0)),
                            ]),
                        ),
                    ]),
                ),
            ]);
            let bytes =
                ros1::encode(&builtins, "geometry_msgs/PoseStamped", &value).expect("encode");
            let t = u64::from(i) * 1_000_000;
            writer.add_message(pose, i, t, t, &bytes).expect("pose msg");
        }
        writer.add_message(json, 0, 2_500_000, 2_500_000, br#"{"ok": true}"#).expect("json msg");
        writer.add_message(raw, 0, 500_000, 500_000, &[1, 2, 3]).expect("raw msg");
        writer.add_message(json, 1, 3_500_000, 3_500_000, b"not json").expect("bad json");

        writer.end().expect("end");
        writer.into_inner()
    }

    #[test]
    fn test_decode_container_structured_and_sorted() {
        let messages = decode_bytes(write_sample(), &DecodeOptions::new()).expect("decode");
        assert_eq!(messages.len(), 8);

        let times: Vec<f64> = messages.iter().map(|m| m.timestamp_ms).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));

        let pose = messages.iter().find(|m| m.topic == "/pose").expect("pose");
        assert_eq!(pose.type_name, "geometry_msgs/PoseStamped");
        let x = pose
            .value()
            .and_then(|v| v.get("pose"))
            .and_then(|v| v.get("position"))
            .and_then(|v| v.get("x"));
        assert_eq!(x, Some(&Value::Float(0.0)));

        let status = messages.iter().find(|m| m.topic == "/status").expect("status");
        assert_eq!(status.value().and_then(|v| v.get("ok")), Some(&Value::Bool(true)));

        let blob = messages.iter().find(|m| m.topic == "/blob").expect("blob");
        assert_eq!(blob.payload, Payload::Raw(vec![1, 2, 3]));
    }

    #[test]
    fn test_undecodable_payload_kept_raw() {
        let messages = decode_bytes(write_sample(), &DecodeOptions::new()).expect("decode");
        let bad = messages
            .iter()
            .filter(|m| m.topic == "/status")
            .nth(1)
            .expect("second status");
        assert_eq!(bad.payload, Payload::Raw(b"not json".to_vec()));
    }

    #[test]
    fn test_header_stamp_timestamps() {
        let options = DecodeOptions::new()
            .timestamp_source(TimestampSource::HeaderStamp)
            .topic_filter(TopicFilter::include(["/pose"]));
        let messages = decode_bytes(write_sample(), &options).expect("decode");

        assert_eq!(messages.len(), 5);
        let seqs: Vec<u64> = messages
            .iter()
            .filter_map(|m| m.value()?.get("header")?.get("seq")?.as_f64())
            .map(|s| s as u64)
            .collect();
        assert_eq!(seqs, [4, 3, 2, 1, 0]);
        assert_eq!(messages[0].timestamp_ms, 6000.0);
    }

    #[test]
    fn test_raw_only() {
        let messages =
            decode_bytes(write_sample(), &DecodeOptions::new().raw_only(true)).expect("decode");
        assert!(messages.iter().all(|m| matches!(m.payload, Payload::Raw(_))));
    }
}
