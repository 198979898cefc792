// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Legacy bag source interface.
//!
//! Parsing of the legacy on-disk bag layout lives outside this crate; a
//! reader only has to implement [`BagSource`]. [`MemoryBag`] is the
//! in-process implementation used for synthetic data and tests.

use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised by a bag source.
#[derive(Debug, Error)]
pub enum BagError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt bag: {0}")]
    Corrupt(String),

    #[error("Message on undeclared topic {0}")]
    UndeclaredTopic(String),
}

/// A topic declared by a bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BagTopic {
    pub name: String,
    pub type_name: String,
}

/// Bag timestamp (seconds + nanoseconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct BagTime {
    pub sec: u32,
    pub nsec: u32,
}

impl BagTime {
    /// Create a timestamp.
    pub fn new(sec: u32, nsec: u32) -> Self {
        Self { sec, nsec }
    }

    /// Build from nanoseconds since the epoch.
    pub fn from_nanos(nanos: u64) -> Self {
        Self {
            sec: (nanos / 1_000_000_000) as u32,
            nsec: (nanos % 1_000_000_000) as u32,
        }
    }

    /// Nanoseconds since the epoch.
    pub fn to_nanos(self) -> u64 {
        u64::from(self.sec) * 1_000_000_000 + u64::from(self.nsec)
    }
}

/// A raw message read from a bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BagMessage {
    pub topic: String,
    pub time: BagTime,
    pub data: Vec<u8>,
}

/// Read access to a legacy bag.
pub trait BagSource {
    /// Declared topics.
    fn topics(&self) -> Vec<BagTopic>;

    /// Earliest and latest message time, if known.
    fn time_range(&self) -> Option<(BagTime, BagTime)>;

    /// Stream messages in storage order.
    fn messages(&mut self) -> Box<dyn Iterator<Item = Result<BagMessage, BagError>> + '_>;

    /// Source size in bytes, if known.
    fn size_bytes(&self) -> Option<u64> {
        None
    }

    /// Message definitions carried by the bag (type name to `.msg` blob).
    fn definitions(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

/// In-memory bag.
#[derive(Debug, Clone, Default)]
pub struct MemoryBag {
    topics: Vec<BagTopic>,
    messages: Vec<BagMessage>,
    definitions: BTreeMap<String, String>,
}

impl MemoryBag {
    /// Create an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a topic. Redeclaring a topic replaces its type.
    pub fn add_topic(&mut self, name: &str, type_name: &str) -> &mut Self {
        match self.topics.iter_mut().find(|t| t.name == name) {
            Some(topic) => topic.type_name = type_name.to_string(),
            None => self.topics.push(BagTopic {
                name: name.to_string(),
                type_name: type_name.to_string(),
            }),
        }
        self
    }

    /// Attach a message definition blob for a type.
    pub fn add_definition(&mut self, type_name: &str, text: &str) -> &mut Self {
        self.definitions
            .insert(type_name.to_string(), text.to_string());
        self
    }

    /// Append a message.
    pub fn push(&mut self, topic: &str, time: BagTime, data: Vec<u8>) -> &mut Self {
        self.messages.push(BagMessage {
            topic: topic.to_string(),
            time,
            data,
        });
        self
    }

    /// Number of stored messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True when no message is stored.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl BagSource for MemoryBag {
    fn topics(&self) -> Vec<BagTopic> {
        self.topics.clone()
    }

    fn time_range(&self) -> Option<(BagTime, BagTime)> {
        let start = self.messages.iter().map(|m| m.time).min()?;
        let end = self.messages.iter().map(|m| m.time).max()?;
        Some((start, end))
    }

    fn messages(&mut self) -> Box<dyn Iterator<Item = Result<BagMessage, BagError>> + '_> {
        let declared: Vec<&str> = self.topics.iter().map(|t| t.name.as_str()).collect();
        Box::new(self.messages.iter().map(move |m| {
            if declared.contains(&m.topic.as_str()) {
                Ok(m.clone())
            } else {
                Err(BagError::UndeclaredTopic(m.topic.clone()))
            }
        }))
    }

    fn size_bytes(&self) -> Option<u64> {
        Some(self.messages.iter().map(|m| m.data.len() as u64).sum())
    }

    fn definitions(&self) -> BTreeMap<String, String> {
        self.definitions.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bag_time_nanos() {
        let t = BagTime::new(12, 500);
        assert_eq!(t.to_nanos(), 12_000_000_500);
        assert_eq!(BagTime::from_nanos(12_000_000_500), t);
    }

    #[test]
    fn test_memory_bag_time_range() {
        let mut bag = MemoryBag::new();
        assert_eq!(bag.time_range(), None);

        bag.add_topic("/a", "std_msgs/String");
        bag.push("/a", BagTime::new(5, 0), vec![]);
        bag.push("/a", BagTime::new(2, 7), vec![]);
        bag.push("/a", BagTime::new(9, 1), vec![]);

        assert_eq!(
            bag.time_range(),
            Some((BagTime::new(2, 7), BagTime::new(9, 1)))
        );
    }

    #[test]
    fn test_memory_bag_rejects_undeclared_topic() {
        let mut bag = MemoryBag::new();
        bag.add_topic("/a", "std_msgs/String");
        bag.push("/a", BagTime::new(1, 0), vec![1]);
        bag.push("/b", BagTime::new(2, 0), vec![2]);

        let results: Vec<_> = bag.messages().collect();
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(BagError::UndeclaredTopic(ref t)) if t == "/b"));
    }

    #[test]
    fn test_redeclare_topic_replaces_type() {
        let mut bag = MemoryBag::new();
        bag.add_topic("/a", "x/A").add_topic("/a", "x/B");
        assert_eq!(bag.topics().len(), 1);
        assert_eq!(bag.topics()[0].type_name, "x/B");
    }
}
