// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bag to container conversion.
//!
//! ```text
//! BagSource ──topics──► SchemaResolver ──schema blob──┐
//!     │                                               ▼
//!     └──────────messages (sec, nsec)──────────► ContainerWriter ──► .bdk
//! ```
//!
//! Conversion is a single synchronous pass. Any error aborts the run and
//! the partial output must be discarded; [`Converter::convert_to_path`]
//! does that by writing to a `.partial` file that is only renamed once the
//! container is finalized.

use crate::bag::{BagError, BagSource, BagTopic};
use crate::filter::{TopicFilter, TypeFilter};
use crate::format::{ContainerWriter, FormatError, WriterOptions, METADATA_TYPE_KEY};
use crate::schema::{
    normalize_type_name, SchemaError, SchemaResolver, TypeRegistry, SCHEMA_ENCODING,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default profile written to the container header.
pub const DEFAULT_PROFILE: &str = "ros1";

/// Message encoding of converted channels.
pub const ROS1_ENCODING: &str = "ros1";

/// Conversion errors.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Source error: {0}")]
    Source(#[from] BagError),

    #[error("Container error: {0}")]
    Format(#[from] FormatError),

    #[error("Invalid message definition: {0}")]
    Schema(#[from] SchemaError),

    #[error("Schema for {type_name} is incomplete (missing: {})", .gaps.join(", "))]
    IncompleteSchema {
        type_name: String,
        gaps: Vec<String>,
    },

    #[error("Message on undeclared topic {0}")]
    UndeclaredTopic(String),
}

/// Conversion options.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Container writer options.
    pub writer: WriterOptions,

    /// Profile stored in the container header.
    pub profile: String,

    /// Library string stored in the container header.
    pub library: String,

    /// Topic filter (None = all topics).
    pub topic_filter: Option<TopicFilter>,

    /// Type filter (None = all types).
    pub type_filter: Option<TypeFilter>,

    /// Fail on unresolved types instead of writing partial schemas.
    pub strict_schemas: bool,

    /// Report progress every N written messages.
    pub progress_interval: u64,
}

impl ConvertOptions {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self {
            writer: WriterOptions::new(),
            profile: DEFAULT_PROFILE.to_string(),
            library: format!("bagdeck {}", env!("CARGO_PKG_VERSION")),
            topic_filter: None,
            type_filter: None,
            strict_schemas: false,
            progress_interval: 1000,
        }
    }

    /// Set the chunk size in bytes.
    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.writer = self.writer.chunk_size(bytes);
        self
    }

    /// Set the container profile.
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    /// Set the library string.
    pub fn library(mut self, library: impl Into<String>) -> Self {
        self.library = library.into();
        self
    }

    /// Set topic filter.
    pub fn topic_filter(mut self, filter: TopicFilter) -> Self {
        self.topic_filter = Some(filter);
        self
    }

    /// Set type filter.
    pub fn type_filter(mut self, filter: TypeFilter) -> Self {
        self.type_filter = Some(filter);
        self
    }

    /// Reject unresolved types.
    pub fn strict_schemas(mut self, strict: bool) -> Self {
        self.strict_schemas = strict;
        self
    }

    /// Set the progress reporting interval.
    pub fn progress_interval(mut self, messages: u64) -> Self {
        self.progress_interval = messages.max(1);
        self
    }

    fn selects(&self, topic: &BagTopic) -> bool {
        self.topic_filter
            .as_ref()
            .map_or(true, |f| f.matches(&topic.name))
            && self
                .type_filter
                .as_ref()
                .map_or(true, |f| f.matches(&topic.type_name))
    }
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Conversion stage reported to progress callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConversionStage {
    Opening,
    EnumeratingTopics,
    RegisteringSchemas,
    WritingMessages,
    Finalizing,
    Done,
}

impl fmt::Display for ConversionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Opening => "Opening source",
            Self::EnumeratingTopics => "Enumerating topics",
            Self::RegisteringSchemas => "Registering schemas",
            Self::WritingMessages => "Writing messages",
            Self::Finalizing => "Finalizing",
            Self::Done => "Done",
        })
    }
}

/// Progress event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionProgress {
    pub stage: ConversionStage,

    /// Human-readable status.
    pub message: String,

    /// Running message count, while messages are written.
    pub messages_written: Option<u64>,
}

/// Conversion result summary.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionMetadata {
    pub topic_count: usize,
    pub message_count: u64,

    /// Latest minus earliest message time (nanoseconds).
    pub duration_nanos: u64,
    pub start_time_nanos: Option<u64>,
    pub end_time_nanos: Option<u64>,

    /// Source size, when the source reports it.
    pub input_bytes: Option<u64>,
    pub output_bytes: u64,
    pub topic_message_counts: BTreeMap<String, u64>,

    /// Types that could not be resolved.
    pub schema_gaps: Vec<String>,
    pub converted_at: DateTime<Utc>,
}

impl ConversionMetadata {
    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.duration_nanos as f64 / 1_000_000_000.0
    }
}

/// Per-run memo tables.
///
/// Types shared between topics map to one schema; each topic maps to one
/// channel.
#[derive(Debug, Clone)]
pub struct ConversionSession {
    registry: TypeRegistry,
    schema_ids: HashMap<String, u16>,
    channel_ids: HashMap<String, u16>,
    sequences: HashMap<u16, u32>,
    gaps: BTreeSet<String>,
}

impl ConversionSession {
    /// Start a session resolving types against `registry`.
    pub fn new(registry: TypeRegistry) -> Self {
        Self {
            registry,
            schema_ids: HashMap::new(),
            channel_ids: HashMap::new(),
            sequences: HashMap::new(),
            gaps: BTreeSet::new(),
        }
    }

    /// Schema registered for a type, if any.
    pub fn schema_id(&self, type_name: &str) -> Option<u16> {
        self.schema_ids.get(&normalize_type_name(type_name)).copied()
    }

    /// Channel registered for a topic, if any.
    pub fn channel_id(&self, topic: &str) -> Option<u16> {
        self.channel_ids.get(topic).copied()
    }

    /// Number of distinct schemas registered.
    pub fn schema_count(&self) -> usize {
        self.schema_ids.len()
    }

    /// Unresolved type names seen so far.
    pub fn gaps(&self) -> impl Iterator<Item = &str> {
        self.gaps.iter().map(String::as_str)
    }

    fn schema_for<W: Write>(
        &mut self,
        writer: &mut ContainerWriter<W>,
        type_name: &str,
        strict: bool,
    ) -> Result<u16, ConvertError> {
        let key = normalize_type_name(type_name);
        if let Some(&id) = self.schema_ids.get(&key) {
            return Ok(id);
        }

        let resolved = SchemaResolver::new(&self.registry).resolve(&key);
        if !resolved.is_complete() {
            if strict {
                return Err(ConvertError::IncompleteSchema {
                    type_name: key,
                    gaps: resolved.gaps,
                });
            }
            self.gaps.extend(resolved.gaps.iter().cloned());
        }

        let text = resolved.to_schema_text();
        let id = writer.register_schema(&key, SCHEMA_ENCODING, text.as_bytes())?;
        tracing::debug!(
            "Registered schema {} for {} ({} definitions)",
            id,
            key,
            resolved.definitions.len()
        );

        self.schema_ids.insert(key, id);
        Ok(id)
    }

    fn next_sequence(&mut self, channel_id: u16) -> u32 {
        let seq = self.sequences.entry(channel_id).or_default();
        let current = *seq;
        *seq = seq.wrapping_add(1);
        current
    }
}

/// Bag to container converter.
pub struct Converter {
    options: ConvertOptions,
}

impl Converter {
    /// Create a converter.
    pub fn new(options: ConvertOptions) -> Self {
        Self { options }
    }

    /// Options in use.
    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// Convert `source` into a container written to `target`.
    ///
    /// Types are resolved against `registry` plus any definitions the
    /// source carries. Returns the summary and the write target.
    pub fn convert<S, W, F>(
        &self,
        source: &mut S,
        registry: &TypeRegistry,
        target: W,
        mut progress: F,
    ) -> Result<(ConversionMetadata, W), ConvertError>
    where
        S: BagSource + ?Sized,
        W: Write,
        F: FnMut(&ConversionProgress),
    {
        let mut report = |stage: ConversionStage, message: String, count: Option<u64>| {
            progress(&ConversionProgress {
                stage,
                message,
                messages_written: count,
            })
        };

        report(ConversionStage::Opening, ConversionStage::Opening.to_string(), None);

        let mut session = ConversionSession::new(registry.clone());
        for (type_name, text) in source.definitions() {
            match session.registry.register_schema_blob(&type_name, &text) {
                Ok(count) => {
                    tracing::debug!("Loaded {} definitions from bag for {}", count, type_name)
                }
                Err(e) if self.options.strict_schemas => return Err(e.into()),
                Err(e) => tracing::warn!("Ignoring bag definition for {}: {}", type_name, e),
            }
        }

        let mut writer = ContainerWriter::new(target, self.options.writer.clone());
        writer.start(&self.options.profile, &self.options.library)?;

        // Topics
        let topics = source.topics();
        let declared: HashSet<String> = topics.iter().map(|t| t.name.clone()).collect();
        let selected: Vec<&BagTopic> = topics.iter().filter(|t| self.options.selects(t)).collect();
        report(
            ConversionStage::EnumeratingTopics,
            format!("Found {} topics ({} selected)", topics.len(), selected.len()),
            None,
        );

        // Schemas and channels
        for topic in &selected {
            if session.channel_ids.contains_key(&topic.name) {
                continue;
            }
            let schema_id =
                session.schema_for(&mut writer, &topic.type_name, self.options.strict_schemas)?;

            let mut metadata = BTreeMap::new();
            metadata.insert(METADATA_TYPE_KEY.to_string(), topic.type_name.clone());
            let channel_id =
                writer.register_channel(schema_id, &topic.name, ROS1_ENCODING, metadata)?;
            session.channel_ids.insert(topic.name.clone(), channel_id);
        }
        report(
            ConversionStage::RegisteringSchemas,
            format!(
                "Registered {} schemas for {} channels",
                session.schema_count(),
                session.channel_ids.len()
            ),
            None,
        );

        // Messages
        let mut topic_counts: BTreeMap<String, u64> = selected
            .iter()
            .map(|t| (t.name.clone(), 0))
            .collect();
        let mut written = 0u64;
        let mut skipped = 0u64;
        let mut time_range: Option<(u64, u64)> = None;

        for result in source.messages() {
            let msg = result?;
            let Some(channel_id) = session.channel_id(&msg.topic) else {
                if declared.contains(&msg.topic) {
                    skipped += 1;
                    continue;
                }
                return Err(ConvertError::UndeclaredTopic(msg.topic));
            };

            let nanos = msg.time.to_nanos();
            let sequence = session.next_sequence(channel_id);
            writer.add_message(channel_id, sequence, nanos, nanos, &msg.data)?;

            time_range = Some(match time_range {
                Some((start, end)) => (start.min(nanos), end.max(nanos)),
                None => (nanos, nanos),
            });
            *topic_counts.entry(msg.topic).or_default() += 1;
            written += 1;

            if written % self.options.progress_interval.max(1) == 0 {
                report(
                    ConversionStage::WritingMessages,
                    format!("Wrote {} messages", written),
                    Some(written),
                );
            }
        }
        report(
            ConversionStage::WritingMessages,
            format!("Wrote {} messages ({} filtered)", written, skipped),
            Some(written),
        );

        // Finalize
        report(ConversionStage::Finalizing, ConversionStage::Finalizing.to_string(), Some(written));

        let converted_at = Utc::now();
        let schema_gaps: Vec<String> = session.gaps().map(str::to_string).collect();
        let mut entries = BTreeMap::new();
        entries.insert("converted_at".to_string(), converted_at.to_rfc3339());
        if !schema_gaps.is_empty() {
            entries.insert("schema_gaps".to_string(), schema_gaps.join(","));
        }
        writer.add_metadata("conversion", entries)?;

        writer.end()?;
        let output_bytes = writer.bytes_written();
        let target = writer.into_inner();

        let metadata = ConversionMetadata {
            topic_count: session.channel_ids.len(),
            message_count: written,
            duration_nanos: time_range.map_or(0, |(start, end)| end - start),
            start_time_nanos: time_range.map(|(start, _)| start),
            end_time_nanos: time_range.map(|(_, end)| end),
            input_bytes: source.size_bytes(),
            output_bytes,
            topic_message_counts: topic_counts,
            schema_gaps,
            converted_at,
        };

        tracing::info!(
            "Converted {} messages on {} topics ({:.1}s, {} bytes)",
            metadata.message_count,
            metadata.topic_count,
            metadata.duration_secs(),
            metadata.output_bytes
        );
        report(
            ConversionStage::Done,
            format!("Converted {} messages", written),
            Some(written),
        );

        Ok((metadata, target))
    }

    /// Convert into a file at `path`.
    ///
    /// Output goes to `<path>.partial` first and is renamed on success; the
    /// partial file is removed on failure.
    pub fn convert_to_path<S, P, F>(
        &self,
        source: &mut S,
        registry: &TypeRegistry,
        path: P,
        progress: F,
    ) -> Result<ConversionMetadata, ConvertError>
    where
        S: BagSource + ?Sized,
        P: AsRef<Path>,
        F: FnMut(&ConversionProgress),
    {
        let path = path.as_ref();
        let partial = partial_path(path);

        let result = File::create(&partial)
            .map_err(ConvertError::from)
            .and_then(|file| self.convert(source, registry, BufWriter::new(file), progress))
            .and_then(|(metadata, mut out)| {
                out.flush()?;
                Ok(metadata)
            });

        match result {
            Ok(metadata) => {
                fs::rename(&partial, path)?;
                tracing::info!("Wrote {}", path.display());
                Ok(metadata)
            }
            Err(e) => {
                if let Err(rm) = fs::remove_file(&partial) {
                    tracing::warn!("Could not remove {}: {}", partial.display(), rm);
                }
                Err(e)
            }
        }
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bag::{BagTime, MemoryBag};
    use crate::format::ContainerReader;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn ros1_string(s: &str) -> Vec<u8> {
        let mut out = (s.len() as u32).to_le_bytes().to_vec();
        out.extend_from_slice(s.as_bytes());
        out
    }

    fn two_topic_bag() -> MemoryBag {
        let mut bag = MemoryBag::new();
        bag.add_topic("/chatter", "std_msgs/String")
            .add_topic("/count", "std_msgs/Int32");

        let start = 1_700_000_000u64 * 1_000_000_000;
        for i in 0..300u64 {
            let time = BagTime::from_nanos(start + i * 10_000_000 + i);
            if i % 3 == 0 {
                bag.push("/chatter", time, ros1_string(&format!("hello {}", i)));
            } else {
                bag.push("/count", time, (i as i32).to_le_bytes().to_vec());
            }
        }
        bag
    }

    fn convert_bytes(
        bag: &mut MemoryBag,
        options: ConvertOptions,
    ) -> Result<(ConversionMetadata, Vec<u8>), ConvertError> {
        let registry = TypeRegistry::with_builtins();
        Converter::new(options).convert(bag, &registry, Vec::new(), |_| {})
    }

    #[test]
    fn test_two_topic_conversion_metadata() {
        let mut bag = two_topic_bag();
        let (start, end) = bag.time_range().expect("range");

        let options = ConvertOptions::new().chunk_size(4096);
        let (meta, bytes) = convert_bytes(&mut bag, options).expect("convert");

        assert_eq!(meta.topic_count, 2);
        assert_eq!(meta.message_count, 300);
        assert_eq!(meta.duration_nanos, end.to_nanos() - start.to_nanos());
        assert_eq!(meta.start_time_nanos, Some(start.to_nanos()));
        assert_eq!(meta.topic_message_counts["/chatter"], 100);
        assert_eq!(meta.topic_message_counts["/count"], 200);
        assert!(meta.schema_gaps.is_empty());
        assert_eq!(meta.output_bytes, bytes.len() as u64);

        let mut reader = ContainerReader::initialize(Cursor::new(bytes)).expect("init");
        assert_eq!(reader.message_count(), 300);
        let chatter = reader.channel_by_topic("/chatter").expect("channel").clone();
        assert_eq!(chatter.type_name(), Some("std_msgs/String"));
        assert_eq!(chatter.message_encoding, "ros1");
        assert_eq!(reader.metadata()[0].name, "conversion");

        let records: Vec<_> = reader.read_messages().collect::<Result<_, _>>().expect("read");
        let chatter_seqs: Vec<u32> = records
            .iter()
            .filter(|r| r.channel_id == chatter.id)
            .map(|r| r.sequence)
            .collect();
        assert_eq!(chatter_seqs, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_identical_types_share_schema() {
        let mut bag = MemoryBag::new();
        bag.add_topic("/left", "geometry_msgs/Pose")
            .add_topic("/right", "geometry_msgs/msg/Pose");
        bag.push("/left", BagTime::new(1, 0), vec![0; 56]);
        bag.push("/right", BagTime::new(2, 0), vec![0; 56]);

        let (_, bytes) = convert_bytes(&mut bag, ConvertOptions::new()).expect("convert");
        let reader = ContainerReader::initialize(Cursor::new(bytes)).expect("init");

        assert_eq!(reader.schemas_by_id().len(), 1);
        let schema = &reader.schemas_by_id()[&1];
        assert_eq!(schema.name, "geometry_msgs/msg/Pose");
        let text = String::from_utf8(schema.data.clone()).expect("utf8");
        assert!(text.contains("MSG: geometry_msgs/Quaternion"));
        assert!(reader.channels_by_id().values().all(|c| c.schema_id == 1));
    }

    #[test]
    fn test_progress_stages_in_order() {
        let mut bag = two_topic_bag();
        let registry = TypeRegistry::with_builtins();
        let mut events = Vec::new();

        Converter::new(ConvertOptions::new().progress_interval(100))
            .convert(&mut bag, &registry, Vec::new(), |p| events.push(p.clone()))
            .expect("convert");

        let mut stages: Vec<ConversionStage> = events.iter().map(|e| e.stage).collect();
        stages.dedup();
        assert_eq!(
            stages,
            [
                ConversionStage::Opening,
                ConversionStage::EnumeratingTopics,
                ConversionStage::RegisteringSchemas,
                ConversionStage::WritingMessages,
                ConversionStage::Finalizing,
                ConversionStage::Done,
            ]
        );
        let counts: Vec<u64> = events
            .iter()
            .filter(|e| e.stage == ConversionStage::WritingMessages)
            .filter_map(|e| e.messages_written)
            .collect();
        assert_eq!(counts, [100, 200, 300, 300]);
        assert_eq!(events[0].message, "Opening source");
    }

    #[test]
    fn test_unknown_type_is_lenient_by_default() {
        let mut bag = MemoryBag::new();
        bag.add_topic("/custom", "acme_msgs/Widget");
        bag.push("/custom", BagTime::new(1, 0), vec![1, 2, 3]);

        let (meta, bytes) = convert_bytes(&mut bag, ConvertOptions::new()).expect("convert");
        assert_eq!(meta.schema_gaps, ["acme_msgs/msg/Widget"]);
        assert_eq!(meta.message_count, 1);

        let reader = ContainerReader::initialize(Cursor::new(bytes)).expect("init");
        assert!(reader.schemas_by_id()[&1].data.is_empty());
    }

    #[test]
    fn test_unknown_type_fails_when_strict() {
        let mut bag = MemoryBag::new();
        bag.add_topic("/custom", "acme_msgs/Widget");

        let err = convert_bytes(&mut bag, ConvertOptions::new().strict_schemas(true))
            .expect_err("strict");
        assert!(matches!(err, ConvertError::IncompleteSchema { .. }));
    }

    #[test]
    fn test_bag_definitions_fill_registry() {
        let mut bag = MemoryBag::new();
        bag.add_topic("/custom", "acme_msgs/Widget")
            .add_definition("acme_msgs/Widget", "Header header\nfloat32 level\n");
        bag.push("/custom", BagTime::new(1, 0), vec![]);

        let (meta, _) = convert_bytes(&mut bag, ConvertOptions::new().strict_schemas(true))
            .expect("convert");
        assert!(meta.schema_gaps.is_empty());
    }

    #[test]
    fn test_filtered_topics_skipped() {
        let mut bag = two_topic_bag();
        let options = ConvertOptions::new().topic_filter(TopicFilter::exclude(["/count"]));

        let (meta, bytes) = convert_bytes(&mut bag, options).expect("convert");
        assert_eq!(meta.topic_count, 1);
        assert_eq!(meta.message_count, 100);

        let reader = ContainerReader::initialize(Cursor::new(bytes)).expect("init");
        assert!(reader.channel_by_topic("/count").is_none());
    }

    #[test]
    fn test_type_filter_excludes_topics() {
        let mut bag = two_topic_bag();
        let options =
            ConvertOptions::new().type_filter(TypeFilter::exclude(["std_msgs/Int32"]));

        let (meta, bytes) = convert_bytes(&mut bag, options).expect("convert");
        assert_eq!(meta.topic_count, 1);
        assert_eq!(meta.message_count, 100);
        assert!(!meta.topic_message_counts.contains_key("/count"));

        let reader = ContainerReader::initialize(Cursor::new(bytes)).expect("init");
        assert_eq!(reader.message_count(), 100);
        assert!(reader.channel_by_topic("/count").is_none());
        assert!(reader.channel_by_topic("/chatter").is_some());
    }

    #[test]
    fn test_zero_progress_interval_reports_every_message() {
        let mut bag = two_topic_bag();
        let registry = TypeRegistry::with_builtins();
        let mut options = ConvertOptions::new();
        options.progress_interval = 0;

        let mut writes = 0;
        Converter::new(options)
            .convert(&mut bag, &registry, Vec::new(), |p| {
                if p.stage == ConversionStage::WritingMessages && p.messages_written.is_some() {
                    writes += 1;
                }
            })
            .expect("convert");
        // One report per message plus the closing summary
        assert_eq!(writes, 301);
    }

    #[test]
    fn test_undeclared_topic_aborts() {
        let mut bag = MemoryBag::new();
        bag.add_topic("/a", "std_msgs/String");
        bag.push("/ghost", BagTime::new(1, 0), vec![]);

        assert!(convert_bytes(&mut bag, ConvertOptions::new()).is_err());
    }

    #[test]
    fn test_convert_to_path_renames_partial() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("drive.bdk");
        let mut bag = two_topic_bag();

        let meta = Converter::new(ConvertOptions::new())
            .convert_to_path(&mut bag, &TypeRegistry::with_builtins(), &path, |_| {})
            .expect("convert");

        assert!(path.exists());
        assert!(!dir.path().join("drive.bdk.partial").exists());
        assert_eq!(std::fs::metadata(&path).expect("stat").len(), meta.output_bytes);
        assert_eq!(ContainerReader::open(&path).expect("open").message_count(), 300);
    }

    #[test]
    fn test_convert_to_path_failure_leaves_nothing() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("bad.bdk");
        let mut bag = MemoryBag::new();
        bag.add_topic("/custom", "acme_msgs/Widget");

        let result = Converter::new(ConvertOptions::new().strict_schemas(true))
            .convert_to_path(&mut bag, &TypeRegistry::new(), &path, |_| {});

        assert!(result.is_err());
        assert!(!path.exists());
        assert!(!dir.path().join("bad.bdk.partial").exists());
    }
}
