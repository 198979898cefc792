// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Engine configuration file.
//!
//! JSON, every field optional:
//!
//! ```json
//! {
//!   "chunk_size": 786432,
//!   "strict_schemas": false,
//!   "topics": { "mode": "exclude", "patterns": ["/camera/*"] },
//!   "playback_speed": 2.0,
//!   "timestamp_source": "header_stamp"
//! }
//! ```

use crate::codec::{DecodeOptions, TimestampSource};
use crate::convert::{ConvertOptions, DEFAULT_PROFILE};
use crate::filter::TopicFilter;
use crate::format::DEFAULT_CHUNK_SIZE;
use crate::playback::PlaybackConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Conversion, decoding and playback settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Container chunk size (bytes).
    pub chunk_size: usize,

    /// Container profile tag.
    pub profile: String,

    /// Fail conversion on unresolved types.
    pub strict_schemas: bool,

    /// Messages between conversion progress events.
    pub progress_interval: u64,

    /// Topics converted, decoded and selected for playback.
    pub topics: Option<TopicFilter>,

    /// Playback speed multiplier.
    pub playback_speed: f64,

    pub loop_playback: bool,

    pub timestamp_source: TimestampSource,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            profile: DEFAULT_PROFILE.to_string(),
            strict_schemas: false,
            progress_interval: 1000,
            topics: None,
            playback_speed: 1.0,
            loop_playback: false,
            timestamp_source: TimestampSource::LogTime,
        }
    }
}

impl Config {
    /// Create a new config builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load and validate a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save as pretty JSON.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be > 0".into()));
        }
        if !self.playback_speed.is_finite() || self.playback_speed <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "playback_speed {} must be finite and > 0",
                self.playback_speed
            )));
        }
        if self.progress_interval == 0 {
            return Err(ConfigError::Invalid("progress_interval must be > 0".into()));
        }
        Ok(())
    }

    /// Conversion options for these settings.
    pub fn convert_options(&self) -> ConvertOptions {
        let options = ConvertOptions::new()
            .chunk_size(self.chunk_size)
            .profile(self.profile.clone())
            .strict_schemas(self.strict_schemas)
            .progress_interval(self.progress_interval);
        match &self.topics {
            Some(filter) => options.topic_filter(filter.clone()),
            None => options,
        }
    }

    /// Decode options for these settings.
    pub fn decode_options(&self) -> DecodeOptions {
        let options = DecodeOptions::new().timestamp_source(self.timestamp_source);
        match &self.topics {
            Some(filter) => options.topic_filter(filter.clone()),
            None => options,
        }
    }

    /// Playback configuration for these settings.
    pub fn playback_config(&self) -> PlaybackConfig {
        let config = PlaybackConfig::new()
            .speed(self.playback_speed)
            .loop_playback(self.loop_playback);
        match &self.topics {
            Some(filter) => config.initial_topics(filter.clone()),
            None => config.initial_topics(TopicFilter::all()),
        }
    }
}

/// Config builder for fluent API.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.config.chunk_size = bytes;
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config.profile = profile.into();
        self
    }

    pub fn strict_schemas(mut self, strict: bool) -> Self {
        self.config.strict_schemas = strict;
        self
    }

    pub fn progress_interval(mut self, messages: u64) -> Self {
        self.config.progress_interval = messages;
        self
    }

    pub fn topics(mut self, filter: TopicFilter) -> Self {
        self.config.topics = Some(filter);
        self
    }

    pub fn playback_speed(mut self, speed: f64) -> Self {
        self.config.playback_speed = speed;
        self
    }

    pub fn loop_playback(mut self, enable: bool) -> Self {
        self.config.loop_playback = enable;
        self
    }

    pub fn timestamp_source(mut self, source: TimestampSource) -> Self {
        self.config.timestamp_source = source;
        self
    }

    /// Build and validate.
    pub fn build(self) -> Result<Config, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
