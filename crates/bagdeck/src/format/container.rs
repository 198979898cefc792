// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Native container format (.bdk)
//!
//! # Format Overview
//!
//! ```text
//! +---------------------------------------------------------+
//! |  Magic (8) | Version (4) | Header record (profile, lib)  |
//! +---------------------------------------------------------+
//! |                    Data section                          |
//! |  Schema / Channel records, in registration order         |
//! |  Chunk: start (8) | end (8) | count (4) | len (8) |      |
//! |         Message[] | CRC32 (4)                            |
//! +---------------------------------------------------------+
//! |                    Summary section                       |
//! |  Schema[] | Channel[] | ChunkIndex[] | Metadata[] |      |
//! |  Statistics                                              |
//! +---------------------------------------------------------+
//! |  Footer: SummaryOffset (8) | SummaryCRC32 (4) | Magic (8)|
//! +---------------------------------------------------------+
//! ```
//!
//! Every record is framed as `opcode (1) | length (8) | body`.
//!
//! # Message Format
//!
//! ```text
//! +---------------------------------------------------------+
//! | channel_id (2) | sequence (4) | log_time (8) |          |
//! | publish_time (8) | data_len (4) | data (var)            |
//! +---------------------------------------------------------+
//! ```
//!
//! Readers locate the summary through the footer, so message iteration is
//! lazy: chunks are loaded one at a time as the iterator advances.

use super::{Channel, ContainerMetadata, MessageRecord, Schema};
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use thiserror::Error;

/// Magic bytes: "BAGDECK\0"
pub const MAGIC: [u8; 8] = [0x42, 0x41, 0x47, 0x44, 0x45, 0x43, 0x4b, 0x00];

/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

/// Default chunk size in bytes of buffered message data.
pub const DEFAULT_CHUNK_SIZE: usize = 768 * 1024;

const PREAMBLE_SIZE: u64 = 12;
const FOOTER_SIZE: u64 = 20;
const RECORD_HEADER_SIZE: u64 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Opcode {
    Header = 0x01,
    Schema = 0x02,
    Channel = 0x03,
    Chunk = 0x04,
    ChunkIndex = 0x05,
    Metadata = 0x06,
    Statistics = 0x07,
}

impl Opcode {
    fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x01 => Self::Header,
            0x02 => Self::Schema,
            0x03 => Self::Channel,
            0x04 => Self::Chunk,
            0x05 => Self::ChunkIndex,
            0x06 => Self::Metadata,
            0x07 => Self::Statistics,
            _ => return None,
        })
    }
}

/// Container format errors.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: expected {expected}, got {got}")]
    VersionMismatch { expected: u32, got: u32 },

    #[error("CRC mismatch in chunk at offset {offset}")]
    CrcMismatch { offset: u64 },

    #[error("CRC mismatch in summary section")]
    SummaryCrcMismatch,

    #[error("Writer not started")]
    NotStarted,

    #[error("Writer already started")]
    AlreadyStarted,

    #[error("Writer already ended")]
    AlreadyEnded,

    #[error("Unknown schema id {0}")]
    UnknownSchema(u16),

    #[error("Unknown channel id {0}")]
    UnknownChannel(u16),

    #[error("Too many {0} registered")]
    IdsExhausted(&'static str),
}

/// Location and time range of one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkIndex {
    /// Offset of the chunk record from the start of the file.
    pub offset: u64,
    /// Length of the framed chunk record.
    pub length: u64,
    pub message_start_time: u64,
    pub message_end_time: u64,
    pub message_count: u32,
}

/// Container-wide statistics stored in the summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub message_count: u64,
    pub schema_count: u16,
    pub channel_count: u32,
    pub chunk_count: u32,
    /// Earliest log time (nanoseconds).
    pub message_start_time: u64,
    /// Latest log time (nanoseconds).
    pub message_end_time: u64,
    pub channel_message_counts: BTreeMap<u16, u64>,
}

impl Statistics {
    /// Span between earliest and latest log time.
    pub fn duration_nanos(&self) -> u64 {
        self.message_end_time.saturating_sub(self.message_start_time)
    }
}

/// Writer options.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Buffered message bytes that trigger a chunk flush.
    pub chunk_size: usize,
}

impl WriterOptions {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set chunk size in bytes.
    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes.max(1);
        self
    }
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Created,
    Started,
    Ended,
}

struct ChunkBuffer {
    data: Vec<u8>,
    start_time: u64,
    end_time: u64,
    count: u32,
}

impl ChunkBuffer {
    fn new() -> Self {
        Self {
            data: Vec::new(),
            start_time: u64::MAX,
            end_time: 0,
            count: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn push(
        &mut self,
        channel_id: u16,
        sequence: u32,
        publish_time: u64,
        log_time: u64,
        data: &[u8],
    ) -> Result<(), FormatError> {
        self.data.write_u16::<LittleEndian>(channel_id)?;
        self.data.write_u32::<LittleEndian>(sequence)?;
        self.data.write_u64::<LittleEndian>(log_time)?;
        self.data.write_u64::<LittleEndian>(publish_time)?;
        put_bytes(&mut self.data, data)?;

        self.start_time = self.start_time.min(log_time);
        self.end_time = self.end_time.max(log_time);
        self.count += 1;
        Ok(())
    }
}

/// Streaming container writer.
///
/// Call [`start`](Self::start) once, register schemas and channels, add
/// messages, then [`end`](Self::end) exactly once.
pub struct ContainerWriter<W: Write> {
    writer: W,
    options: WriterOptions,
    state: WriterState,
    position: u64,
    schemas: BTreeMap<u16, Schema>,
    channels: BTreeMap<u16, Channel>,
    metadata: Vec<ContainerMetadata>,
    chunk: ChunkBuffer,
    chunk_indexes: Vec<ChunkIndex>,
    stats: Statistics,
}

impl ContainerWriter<BufWriter<File>> {
    /// Create a writer targeting a new file.
    pub fn create<P: AsRef<Path>>(path: P, options: WriterOptions) -> Result<Self, FormatError> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file), options))
    }
}

impl<W: Write> ContainerWriter<W> {
    /// Wrap a write target.
    pub fn new(writer: W, options: WriterOptions) -> Self {
        Self {
            writer,
            options,
            state: WriterState::Created,
            position: 0,
            schemas: BTreeMap::new(),
            channels: BTreeMap::new(),
            metadata: Vec::new(),
            chunk: ChunkBuffer::new(),
            chunk_indexes: Vec::new(),
            stats: Statistics::default(),
        }
    }

    /// Write the preamble and header record.
    pub fn start(&mut self, profile: &str, library: &str) -> Result<(), FormatError> {
        match self.state {
            WriterState::Created => {}
            WriterState::Started => return Err(FormatError::AlreadyStarted),
            WriterState::Ended => return Err(FormatError::AlreadyEnded),
        }

        self.writer.write_all(&MAGIC)?;
        self.writer.write_u32::<LittleEndian>(FORMAT_VERSION)?;
        self.position = PREAMBLE_SIZE;

        let mut body = Vec::new();
        put_str(&mut body, profile)?;
        put_str(&mut body, library)?;
        self.write_record(Opcode::Header, &body)?;

        self.state = WriterState::Started;
        Ok(())
    }

    /// Register a schema. Every call allocates a new ID.
    pub fn register_schema(
        &mut self,
        name: &str,
        encoding: &str,
        data: &[u8],
    ) -> Result<u16, FormatError> {
        self.ensure_started()?;

        let id = u16::try_from(self.schemas.len() + 1)
            .map_err(|_| FormatError::IdsExhausted("schemas"))?;
        let schema = Schema {
            id,
            name: name.to_string(),
            encoding: encoding.to_string(),
            data: data.to_vec(),
        };

        self.write_record(Opcode::Schema, &encode_schema(&schema)?)?;
        self.schemas.insert(id, schema);
        Ok(id)
    }

    /// Register a channel. Every call allocates a new ID.
    ///
    /// `schema_id` 0 registers a schemaless channel.
    pub fn register_channel(
        &mut self,
        schema_id: u16,
        topic: &str,
        message_encoding: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<u16, FormatError> {
        self.ensure_started()?;

        if schema_id != 0 && !self.schemas.contains_key(&schema_id) {
            return Err(FormatError::UnknownSchema(schema_id));
        }

        let id = u16::try_from(self.channels.len() + 1)
            .map_err(|_| FormatError::IdsExhausted("channels"))?;
        let channel = Channel {
            id,
            schema_id,
            topic: topic.to_string(),
            message_encoding: message_encoding.to_string(),
            metadata,
        };

        self.write_record(Opcode::Channel, &encode_channel(&channel)?)?;
        self.channels.insert(id, channel);
        Ok(id)
    }

    /// Append a message. Fails for channels that were never registered.
    pub fn add_message(
        &mut self,
        channel_id: u16,
        sequence: u32,
        publish_time: u64,
        log_time: u64,
        data: &[u8],
    ) -> Result<(), FormatError> {
        self.ensure_started()?;

        if !self.channels.contains_key(&channel_id) {
            return Err(FormatError::UnknownChannel(channel_id));
        }

        self.chunk
            .push(channel_id, sequence, publish_time, log_time, data)?;

        if self.stats.message_count == 0 {
            self.stats.message_start_time = log_time;
            self.stats.message_end_time = log_time;
        } else {
            self.stats.message_start_time = self.stats.message_start_time.min(log_time);
            self.stats.message_end_time = self.stats.message_end_time.max(log_time);
        }
        self.stats.message_count += 1;
        *self
            .stats
            .channel_message_counts
            .entry(channel_id)
            .or_default() += 1;

        if self.chunk.data.len() >= self.options.chunk_size {
            self.flush_chunk()?;
        }

        Ok(())
    }

    /// Attach named metadata, stored in the summary.
    pub fn add_metadata(
        &mut self,
        name: &str,
        entries: BTreeMap<String, String>,
    ) -> Result<(), FormatError> {
        self.ensure_started()?;
        self.metadata.push(ContainerMetadata {
            name: name.to_string(),
            entries,
        });
        Ok(())
    }

    /// Flush pending messages, write the summary and footer.
    pub fn end(&mut self) -> Result<Statistics, FormatError> {
        self.ensure_started()?;
        self.flush_chunk()?;

        self.stats.schema_count = self.schemas.len() as u16;
        self.stats.channel_count = self.channels.len() as u32;
        self.stats.chunk_count = self.chunk_indexes.len() as u32;

        let summary_start = self.position;
        let mut summary = Vec::new();
        for schema in self.schemas.values() {
            frame_into(&mut summary, Opcode::Schema, &encode_schema(schema)?)?;
        }
        for channel in self.channels.values() {
            frame_into(&mut summary, Opcode::Channel, &encode_channel(channel)?)?;
        }
        for index in &self.chunk_indexes {
            frame_into(&mut summary, Opcode::ChunkIndex, &encode_chunk_index(index)?)?;
        }
        for meta in &self.metadata {
            frame_into(&mut summary, Opcode::Metadata, &encode_metadata(meta)?)?;
        }
        frame_into(
            &mut summary,
            Opcode::Statistics,
            &encode_statistics(&self.stats)?,
        )?;

        let crc = crc32fast::hash(&summary);
        self.writer.write_all(&summary)?;
        self.writer.write_u64::<LittleEndian>(summary_start)?;
        self.writer.write_u32::<LittleEndian>(crc)?;
        self.writer.write_all(&MAGIC)?;
        self.writer.flush()?;

        self.position += summary.len() as u64 + FOOTER_SIZE;
        self.state = WriterState::Ended;

        tracing::debug!(
            "Container finalized: {} messages in {} chunks, {} bytes",
            self.stats.message_count,
            self.stats.chunk_count,
            self.position
        );

        Ok(self.stats.clone())
    }

    /// Bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.position
    }

    /// Running statistics.
    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    /// Registered schemas.
    pub fn schemas(&self) -> &BTreeMap<u16, Schema> {
        &self.schemas
    }

    /// Registered channels.
    pub fn channels(&self) -> &BTreeMap<u16, Channel> {
        &self.channels
    }

    /// True once [`end`](Self::end) succeeded.
    pub fn is_finished(&self) -> bool {
        self.state == WriterState::Ended
    }

    /// Recover the write target.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn ensure_started(&self) -> Result<(), FormatError> {
        match self.state {
            WriterState::Created => Err(FormatError::NotStarted),
            WriterState::Started => Ok(()),
            WriterState::Ended => Err(FormatError::AlreadyEnded),
        }
    }

    fn flush_chunk(&mut self) -> Result<(), FormatError> {
        if self.chunk.is_empty() {
            return Ok(());
        }

        let chunk = std::mem::replace(&mut self.chunk, ChunkBuffer::new());
        let crc = crc32fast::hash(&chunk.data);

        let mut body = Vec::with_capacity(chunk.data.len() + 32);
        body.write_u64::<LittleEndian>(chunk.start_time)?;
        body.write_u64::<LittleEndian>(chunk.end_time)?;
        body.write_u32::<LittleEndian>(chunk.count)?;
        body.write_u64::<LittleEndian>(chunk.data.len() as u64)?;
        body.write_all(&chunk.data)?;
        body.write_u32::<LittleEndian>(crc)?;

        let offset = self.position;
        self.write_record(Opcode::Chunk, &body)?;
        self.chunk_indexes.push(ChunkIndex {
            offset,
            length: self.position - offset,
            message_start_time: chunk.start_time,
            message_end_time: chunk.end_time,
            message_count: chunk.count,
        });

        tracing::debug!(
            "Flushed chunk {} ({} messages, {} bytes)",
            self.chunk_indexes.len() - 1,
            chunk.count,
            chunk.data.len()
        );

        Ok(())
    }

    fn write_record(&mut self, opcode: Opcode, body: &[u8]) -> Result<(), FormatError> {
        self.writer.write_u8(opcode as u8)?;
        self.writer.write_u64::<LittleEndian>(body.len() as u64)?;
        self.writer.write_all(body)?;
        self.position += RECORD_HEADER_SIZE + body.len() as u64;
        Ok(())
    }
}

/// Indexed container reader.
pub struct ContainerReader<R> {
    reader: R,
    profile: String,
    library: String,
    schemas: BTreeMap<u16, Schema>,
    channels: BTreeMap<u16, Channel>,
    chunk_indexes: Vec<ChunkIndex>,
    metadata: Vec<ContainerMetadata>,
    statistics: Statistics,
}

impl ContainerReader<BufReader<File>> {
    /// Open a container file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FormatError> {
        let file = File::open(path)?;
        Self::initialize(BufReader::new(file))
    }
}

impl<R: Read + Seek> ContainerReader<R> {
    /// Parse the header, footer and summary section.
    ///
    /// No message data is read until [`read_messages`](Self::read_messages)
    /// is iterated.
    pub fn initialize(mut reader: R) -> Result<Self, FormatError> {
        let file_len = reader.seek(SeekFrom::End(0))?;
        if file_len < PREAMBLE_SIZE + FOOTER_SIZE {
            return Err(FormatError::InvalidFormat(format!(
                "file too short ({} bytes)",
                file_len
            )));
        }

        reader.seek(SeekFrom::Start(0))?;
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(FormatError::InvalidFormat(
                "Invalid container magic".into(),
            ));
        }

        let version = reader.read_u32::<LittleEndian>()?;
        if version != FORMAT_VERSION {
            return Err(FormatError::VersionMismatch {
                expected: FORMAT_VERSION,
                got: version,
            });
        }

        let (opcode, body) = read_framed(&mut reader, file_len)?;
        if opcode != Opcode::Header as u8 {
            return Err(FormatError::InvalidFormat(
                "missing header record".into(),
            ));
        }
        let mut header = BodyReader::new(&body);
        let profile = header.string()?;
        let library = header.string()?;

        // Footer
        let summary_end = file_len - FOOTER_SIZE;
        reader.seek(SeekFrom::Start(summary_end))?;
        let summary_start = reader.read_u64::<LittleEndian>()?;
        let summary_crc = reader.read_u32::<LittleEndian>()?;
        reader.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(FormatError::InvalidFormat(
                "missing footer (container was not finalized)".into(),
            ));
        }
        if summary_start < PREAMBLE_SIZE || summary_start > summary_end {
            return Err(FormatError::InvalidFormat(format!(
                "summary offset {} out of range",
                summary_start
            )));
        }

        // Summary
        reader.seek(SeekFrom::Start(summary_start))?;
        let mut summary = vec![0u8; (summary_end - summary_start) as usize];
        reader.read_exact(&mut summary)?;
        if crc32fast::hash(&summary) != summary_crc {
            return Err(FormatError::SummaryCrcMismatch);
        }

        let mut this = Self {
            reader,
            profile,
            library,
            schemas: BTreeMap::new(),
            channels: BTreeMap::new(),
            chunk_indexes: Vec::new(),
            metadata: Vec::new(),
            statistics: Statistics::default(),
        };
        this.parse_summary(&summary)?;

        let indexed: u64 = this
            .chunk_indexes
            .iter()
            .map(|c| u64::from(c.message_count))
            .sum();
        if indexed != this.statistics.message_count {
            return Err(FormatError::InvalidFormat(format!(
                "chunk indexes hold {} messages, statistics say {}",
                indexed, this.statistics.message_count
            )));
        }

        tracing::debug!(
            "Parsed summary: {} schemas, {} channels, {} chunks",
            this.schemas.len(),
            this.channels.len(),
            this.chunk_indexes.len()
        );

        Ok(this)
    }

    fn parse_summary(&mut self, summary: &[u8]) -> Result<(), FormatError> {
        let mut records = BodyReader::new(summary);
        while !records.is_empty() {
            let opcode = records.u8()?;
            let len = usize::try_from(records.u64()?)
                .map_err(|_| FormatError::InvalidFormat("record too large".into()))?;
            let mut body = BodyReader::new(records.take(len)?);

            match Opcode::from_u8(opcode) {
                Some(Opcode::Schema) => {
                    let schema = decode_schema(&mut body)?;
                    self.schemas.insert(schema.id, schema);
                }
                Some(Opcode::Channel) => {
                    let channel = decode_channel(&mut body)?;
                    self.channels.insert(channel.id, channel);
                }
                Some(Opcode::ChunkIndex) => {
                    self.chunk_indexes.push(decode_chunk_index(&mut body)?);
                }
                Some(Opcode::Metadata) => {
                    self.metadata.push(decode_metadata(&mut body)?);
                }
                Some(Opcode::Statistics) => {
                    self.statistics = decode_statistics(&mut body)?;
                }
                _ => {
                    tracing::debug!("Skipping unknown summary record 0x{:02x}", opcode);
                }
            }
        }
        Ok(())
    }

    /// Profile written by [`ContainerWriter::start`].
    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Library string written by [`ContainerWriter::start`].
    pub fn library(&self) -> &str {
        &self.library
    }

    /// Schemas keyed by ID.
    pub fn schemas_by_id(&self) -> &BTreeMap<u16, Schema> {
        &self.schemas
    }

    /// Channels keyed by ID.
    pub fn channels_by_id(&self) -> &BTreeMap<u16, Channel> {
        &self.channels
    }

    /// Chunk index table.
    pub fn chunk_indexes(&self) -> &[ChunkIndex] {
        &self.chunk_indexes
    }

    /// Named metadata records.
    pub fn metadata(&self) -> &[ContainerMetadata] {
        &self.metadata
    }

    /// Summary statistics.
    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    /// Total message count.
    pub fn message_count(&self) -> u64 {
        self.statistics.message_count
    }

    /// Recording duration in nanoseconds.
    pub fn duration_nanos(&self) -> u64 {
        self.statistics.duration_nanos()
    }

    /// Schema bound to a channel, if any.
    pub fn schema_for_channel(&self, channel_id: u16) -> Option<&Schema> {
        let channel = self.channels.get(&channel_id)?;
        self.schemas.get(&channel.schema_id)
    }

    /// Find a channel by topic.
    pub fn channel_by_topic(&self, topic: &str) -> Option<&Channel> {
        self.channels.values().find(|c| c.topic == topic)
    }

    /// Lazily iterate messages in index order.
    ///
    /// Records whose channel is unknown are logged and skipped. The
    /// iterator stops after the first error.
    pub fn read_messages(&mut self) -> MessageIter<'_, R> {
        MessageIter {
            reader: &mut self.reader,
            channels: &self.channels,
            chunks: self.chunk_indexes.iter(),
            pending: VecDeque::new(),
            failed: false,
        }
    }

    /// All messages merged into global log-time order.
    ///
    /// Messages sharing a log time keep their index order.
    pub fn read_messages_time_ordered(&mut self) -> Result<Vec<MessageRecord>, FormatError> {
        let mut messages = self.read_messages().collect::<Result<Vec<_>, _>>()?;
        messages.sort_by_key(|m| m.log_time);
        Ok(messages)
    }
}

/// Iterator over messages of a container.
pub struct MessageIter<'a, R> {
    reader: &'a mut R,
    channels: &'a BTreeMap<u16, Channel>,
    chunks: std::slice::Iter<'a, ChunkIndex>,
    pending: VecDeque<MessageRecord>,
    failed: bool,
}

impl<R: Read + Seek> MessageIter<'_, R> {
    fn load_chunk(&mut self, index: &ChunkIndex) -> Result<(), FormatError> {
        self.reader.seek(SeekFrom::Start(index.offset))?;
        let opcode = self.reader.read_u8()?;
        let len = self.reader.read_u64::<LittleEndian>()?;

        if opcode != Opcode::Chunk as u8 {
            return Err(FormatError::InvalidFormat(format!(
                "expected chunk at offset {}",
                index.offset
            )));
        }
        if RECORD_HEADER_SIZE + len != index.length {
            return Err(FormatError::InvalidFormat(format!(
                "chunk at offset {} disagrees with its index",
                index.offset
            )));
        }

        let mut body = vec![0u8; len as usize];
        self.reader.read_exact(&mut body)?;

        for record in decode_chunk(&body, index)? {
            if self.channels.contains_key(&record.channel_id) {
                self.pending.push_back(record);
            } else {
                tracing::warn!(
                    "Skipping message with unknown channel id {} (chunk at offset {})",
                    record.channel_id,
                    index.offset
                );
            }
        }
        Ok(())
    }
}

impl<R: Read + Seek> Iterator for MessageIter<'_, R> {
    type Item = Result<MessageRecord, FormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Some(Ok(record));
            }
            if self.failed {
                return None;
            }

            let index = self.chunks.next()?;
            if let Err(e) = self.load_chunk(index) {
                self.failed = true;
                return Some(Err(e));
            }
        }
    }
}

/// Smallest encoded message record: channel, sequence, two times, payload length.
const MIN_MESSAGE_RECORD_SIZE: usize = 2 + 4 + 8 + 8 + 4;

fn decode_chunk(body: &[u8], index: &ChunkIndex) -> Result<Vec<MessageRecord>, FormatError> {
    let offset = index.offset;
    let mut chunk = BodyReader::new(body);
    let _start_time = chunk.u64()?;
    let _end_time = chunk.u64()?;
    let count = chunk.u32()?;
    let data_len = usize::try_from(chunk.u64()?)
        .map_err(|_| FormatError::InvalidFormat("chunk too large".into()))?;
    let data = chunk.take(data_len)?;
    let crc = chunk.u32()?;

    if crc32fast::hash(data) != crc {
        return Err(FormatError::CrcMismatch { offset });
    }
    if count != index.message_count {
        return Err(FormatError::InvalidFormat(format!(
            "chunk at offset {} holds {} messages, index says {}",
            offset, count, index.message_count
        )));
    }
    let max_records = data.len() / MIN_MESSAGE_RECORD_SIZE;
    if count as usize > max_records {
        return Err(FormatError::InvalidFormat(format!(
            "chunk at offset {} claims {} messages in {} bytes",
            offset,
            count,
            data.len()
        )));
    }

    let mut messages = BodyReader::new(data);
    let mut records = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let channel_id = messages.u16()?;
        let sequence = messages.u32()?;
        let log_time = messages.u64()?;
        let publish_time = messages.u64()?;
        let data = messages.bytes()?.to_vec();
        records.push(MessageRecord {
            channel_id,
            sequence,
            publish_time,
            log_time,
            data,
        });
    }
    if !messages.is_empty() {
        return Err(FormatError::InvalidFormat(format!(
            "chunk at offset {} has trailing bytes after {} messages",
            offset, count
        )));
    }
    Ok(records)
}

fn read_framed<R: Read>(reader: &mut R, limit: u64) -> Result<(u8, Vec<u8>), FormatError> {
    let opcode = reader.read_u8()?;
    let len = reader.read_u64::<LittleEndian>()?;
    if len > limit {
        return Err(FormatError::InvalidFormat(format!(
            "record length {} exceeds file size",
            len
        )));
    }
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body)?;
    Ok((opcode, body))
}

fn frame_into(buf: &mut Vec<u8>, opcode: Opcode, body: &[u8]) -> io::Result<()> {
    buf.write_u8(opcode as u8)?;
    buf.write_u64::<LittleEndian>(body.len() as u64)?;
    buf.write_all(body)
}

// Encoding helpers

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> io::Result<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "field exceeds 4 GiB"))?;
    buf.write_u32::<LittleEndian>(len)?;
    buf.write_all(bytes)
}

fn put_str(buf: &mut Vec<u8>, s: &str) -> io::Result<()> {
    put_bytes(buf, s.as_bytes())
}

fn put_map(buf: &mut Vec<u8>, map: &BTreeMap<String, String>) -> io::Result<()> {
    buf.write_u32::<LittleEndian>(map.len() as u32)?;
    for (key, value) in map {
        put_str(buf, key)?;
        put_str(buf, value)?;
    }
    Ok(())
}

fn encode_schema(schema: &Schema) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.write_u16::<LittleEndian>(schema.id)?;
    put_str(&mut buf, &schema.name)?;
    put_str(&mut buf, &schema.encoding)?;
    put_bytes(&mut buf, &schema.data)?;
    Ok(buf)
}

fn encode_channel(channel: &Channel) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.write_u16::<LittleEndian>(channel.id)?;
    buf.write_u16::<LittleEndian>(channel.schema_id)?;
    put_str(&mut buf, &channel.topic)?;
    put_str(&mut buf, &channel.message_encoding)?;
    put_map(&mut buf, &channel.metadata)?;
    Ok(buf)
}

fn encode_chunk_index(index: &ChunkIndex) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(36);
    buf.write_u64::<LittleEndian>(index.offset)?;
    buf.write_u64::<LittleEndian>(index.length)?;
    buf.write_u64::<LittleEndian>(index.message_start_time)?;
    buf.write_u64::<LittleEndian>(index.message_end_time)?;
    buf.write_u32::<LittleEndian>(index.message_count)?;
    Ok(buf)
}

fn encode_metadata(meta: &ContainerMetadata) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    put_str(&mut buf, &meta.name)?;
    put_map(&mut buf, &meta.entries)?;
    Ok(buf)
}

fn encode_statistics(stats: &Statistics) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.write_u64::<LittleEndian>(stats.message_count)?;
    buf.write_u16::<LittleEndian>(stats.schema_count)?;
    buf.write_u32::<LittleEndian>(stats.channel_count)?;
    buf.write_u32::<LittleEndian>(stats.chunk_count)?;
    buf.write_u64::<LittleEndian>(stats.message_start_time)?;
    buf.write_u64::<LittleEndian>(stats.message_end_time)?;
    buf.write_u32::<LittleEndian>(stats.channel_message_counts.len() as u32)?;
    for (channel_id, count) in &stats.channel_message_counts {
        buf.write_u16::<LittleEndian>(*channel_id)?;
        buf.write_u64::<LittleEndian>(*count)?;
    }
    Ok(buf)
}

// Decoding helpers

struct BodyReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BodyReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        let remaining = self.data.len() - self.pos;
        if n > remaining {
            return Err(FormatError::InvalidFormat(format!(
                "truncated record: need {} bytes, have {}",
                n, remaining
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, FormatError> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    fn u32(&mut self) -> Result<u32, FormatError> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    fn u64(&mut self) -> Result<u64, FormatError> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    fn bytes(&mut self) -> Result<&'a [u8], FormatError> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    fn string(&mut self) -> Result<String, FormatError> {
        String::from_utf8(self.bytes()?.to_vec())
            .map_err(|_| FormatError::InvalidFormat("invalid UTF-8 string".into()))
    }

    fn map(&mut self) -> Result<BTreeMap<String, String>, FormatError> {
        let count = self.u32()?;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let key = self.string()?;
            let value = self.string()?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

fn decode_schema(r: &mut BodyReader<'_>) -> Result<Schema, FormatError> {
    Ok(Schema {
        id: r.u16()?,
        name: r.string()?,
        encoding: r.string()?,
        data: r.bytes()?.to_vec(),
    })
}

fn decode_channel(r: &mut BodyReader<'_>) -> Result<Channel, FormatError> {
    Ok(Channel {
        id: r.u16()?,
        schema_id: r.u16()?,
        topic: r.string()?,
        message_encoding: r.string()?,
        metadata: r.map()?,
    })
}

fn decode_chunk_index(r: &mut BodyReader<'_>) -> Result<ChunkIndex, FormatError> {
    Ok(ChunkIndex {
        offset: r.u64()?,
        length: r.u64()?,
        message_start_time: r.u64()?,
        message_end_time: r.u64()?,
        message_count: r.u32()?,
    })
}

fn decode_metadata(r: &mut BodyReader<'_>) -> Result<ContainerMetadata, FormatError> {
    Ok(ContainerMetadata {
        name: r.string()?,
        entries: r.map()?,
    })
}

fn decode_statistics(r: &mut BodyReader<'_>) -> Result<Statistics, FormatError> {
    let mut stats = Statistics {
        message_count: r.u64()?,
        schema_count: r.u16()?,
        channel_count: r.u32()?,
        chunk_count: r.u32()?,
        message_start_time: r.u64()?,
        message_end_time: r.u64()?,
        channel_message_counts: BTreeMap::new(),
    };
    let count = r.u32()?;
    for _ in 0..count {
        let channel_id = r.u16()?;
        let messages = r.u64()?;
        stats.channel_message_counts.insert(channel_id, messages);
    }
    Ok(stats)
}
