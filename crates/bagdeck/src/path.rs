// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message path expressions.
//!
//! A path selects a value inside a decoded message:
//!
//! ```text
//! /imu.angular_velocity.x      topic, then member access
//! .transforms[0].child_frame_id
//! .ranges[:]                   whole array
//! .transforms[:].transform.translation.x   element-wise map
//! ```
//!
//! A slice followed by more segments resolves the rest against every
//! element; elements that fail to resolve become `null`.

use crate::codec::{DecodedMessage, Value};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// One step of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Field(String),
    Index(usize),
    Slice,
}

/// Parse failure, with the byte position in the expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid path at {position}: {reason}")]
pub struct PathParseError {
    pub position: usize,
    pub reason: &'static str,
}

/// Why a segment could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathErrorKind {
    MissingField(String),
    IndexOutOfBounds { index: usize, len: usize },
    NotAnArray,
    NotAStruct,
}

/// Resolution failure at segment `segment` (0-based).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("segment {segment}: {kind}")]
pub struct PathError {
    pub segment: usize,
    pub kind: PathErrorKind,
}

impl fmt::Display for PathErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField(name) => write!(f, "no field `{}`", name),
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "index {} out of bounds (len {})", index, len)
            }
            Self::NotAnArray => f.write_str("value is not an array"),
            Self::NotAStruct => f.write_str("value is not a struct"),
        }
    }
}

/// A parsed path expression.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessagePath {
    segments: Vec<PathSegment>,
}

impl MessagePath {
    /// Parse `.a.b[1][:]`. The leading dot is optional; an empty
    /// expression selects the whole message.
    pub fn parse(expr: &str) -> Result<Self, PathParseError> {
        let bytes = expr.as_bytes();
        let mut segments = Vec::new();
        let mut pos = 0;

        let err = |position, reason| PathParseError { position, reason };

        while pos < bytes.len() {
            match bytes[pos] {
                b'.' => {
                    let start = pos + 1;
                    let end = identifier_end(bytes, start);
                    if end == start {
                        return Err(err(start, "expected field name"));
                    }
                    segments.push(PathSegment::Field(expr[start..end].to_string()));
                    pos = end;
                }
                b'[' => {
                    let close = expr[pos..]
                        .find(']')
                        .map(|off| pos + off)
                        .ok_or_else(|| err(pos, "unclosed `[`"))?;
                    let inner = expr[pos + 1..close].trim();
                    if inner == ":" {
                        segments.push(PathSegment::Slice);
                    } else {
                        let index = inner
                            .parse()
                            .map_err(|_| err(pos + 1, "expected index or `:`"))?;
                        segments.push(PathSegment::Index(index));
                    }
                    pos = close + 1;
                }
                _ if pos == 0 => {
                    let end = identifier_end(bytes, 0);
                    if end == 0 {
                        return Err(err(0, "expected field name"));
                    }
                    segments.push(PathSegment::Field(expr[..end].to_string()));
                    pos = end;
                }
                _ => return Err(err(pos, "expected `.` or `[`")),
            }
        }

        Ok(Self { segments })
    }

    /// Build from segments.
    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// True for the path selecting the whole message.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// True when the path contains a slice.
    pub fn has_slice(&self) -> bool {
        self.segments.contains(&PathSegment::Slice)
    }

    /// Resolve against a value.
    pub fn resolve(&self, value: &Value) -> Result<Value, PathError> {
        resolve(value, self)
    }
}

impl fmt::Display for MessagePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                PathSegment::Field(name) => write!(f, ".{}", name)?,
                PathSegment::Index(i) => write!(f, "[{}]", i)?,
                PathSegment::Slice => f.write_str("[:]")?,
            }
        }
        Ok(())
    }
}

fn identifier_end(bytes: &[u8], start: usize) -> usize {
    let mut end = start;
    while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
        end += 1;
    }
    end
}

/// A path prefixed with the topic it applies to (`/imu.linear_acceleration.z`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPath {
    pub topic: String,
    pub path: MessagePath,
}

impl TopicPath {
    /// Parse `/topic` followed by an optional path. The topic ends at the
    /// first `.` or `[`.
    pub fn parse(expr: &str) -> Result<Self, PathParseError> {
        if !expr.starts_with('/') {
            return Err(PathParseError {
                position: 0,
                reason: "topic must start with `/`",
            });
        }
        let split = expr.find(|c: char| c == '.' || c == '[').unwrap_or(expr.len());
        let topic = &expr[..split];
        if topic.len() < 2 {
            return Err(PathParseError {
                position: 1,
                reason: "empty topic name",
            });
        }

        let path = MessagePath::parse(&expr[split..]).map_err(|e| PathParseError {
            position: e.position + split,
            reason: e.reason,
        })?;

        Ok(Self {
            topic: topic.to_string(),
            path,
        })
    }
}

impl fmt::Display for TopicPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.topic, self.path)
    }
}

/// Resolve `path` against `value`.
pub fn resolve(value: &Value, path: &MessagePath) -> Result<Value, PathError> {
    resolve_segments(value, &path.segments, 0)
}

fn resolve_segments(
    value: &Value,
    segments: &[PathSegment],
    index: usize,
) -> Result<Value, PathError> {
    let Some((segment, rest)) = segments.split_first() else {
        return Ok(value.clone());
    };
    let fail = |kind| PathError { segment: index, kind };

    match segment {
        PathSegment::Field(name) => {
            let fields = value.as_struct().ok_or_else(|| fail(PathErrorKind::NotAStruct))?;
            let child = fields
                .get(name)
                .ok_or_else(|| fail(PathErrorKind::MissingField(name.clone())))?;
            resolve_segments(child, rest, index + 1)
        }
        PathSegment::Index(i) => {
            let len = value.sequence_len().ok_or_else(|| fail(PathErrorKind::NotAnArray))?;
            let child = value.element(*i).ok_or_else(|| {
                fail(PathErrorKind::IndexOutOfBounds { index: *i, len })
            })?;
            resolve_segments(&child, rest, index + 1)
        }
        PathSegment::Slice => {
            if rest.is_empty() {
                return match value {
                    Value::Array(_) | Value::Bytes(_) => Ok(value.clone()),
                    _ => Err(fail(PathErrorKind::NotAnArray)),
                };
            }
            let items = value.elements().ok_or_else(|| fail(PathErrorKind::NotAnArray))?;
            Ok(Value::Array(
                items
                    .iter()
                    .map(|item| resolve_segments(item, rest, index + 1).unwrap_or(Value::Null))
                    .collect(),
            ))
        }
    }
}

/// A path offered for autocomplete.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathCandidate {
    pub path: String,

    /// Kind of the value the path selects (of the first element for slices).
    pub kind: &'static str,

    /// True when the selected value yields plot numbers.
    pub plottable: bool,
}

/// Enumerate paths reachable from a sample value, up to `max_depth`
/// segments. Arrays contribute a `[:]` path explored through their first
/// element.
pub fn candidate_paths(value: &Value, max_depth: usize) -> Vec<PathCandidate> {
    let mut out = Vec::new();
    collect_candidates(value, String::new(), 0, max_depth, &mut out);
    out
}

fn collect_candidates(
    value: &Value,
    prefix: String,
    depth: usize,
    max_depth: usize,
    out: &mut Vec<PathCandidate>,
) {
    if depth >= max_depth {
        return;
    }
    match value {
        Value::Struct(fields) => {
            for (name, child) in fields {
                let path = format!("{}.{}", prefix, name);
                out.push(candidate(&path, child));
                collect_candidates(child, path, depth + 1, max_depth, out);
            }
        }
        Value::Array(_) | Value::Bytes(_) => {
            let path = format!("{}[:]", prefix);
            match value.element(0) {
                Some(first) => {
                    out.push(candidate(&path, &first));
                    collect_candidates(&first, path, depth + 1, max_depth, out);
                }
                None => out.push(PathCandidate {
                    path,
                    kind: "null",
                    plottable: false,
                }),
            }
        }
        _ => {}
    }
}

fn candidate(path: &str, value: &Value) -> PathCandidate {
    PathCandidate {
        path: path.to_string(),
        kind: value.kind(),
        plottable: value.is_scalar() && value.as_plot_number().is_some(),
    }
}

/// One plot sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub timestamp_ms: f64,
    pub value: f64,
}

/// Extract plot points for `path` from the messages of `topic`.
///
/// Arrays flatten to several points sharing the message timestamp.
/// Messages where the path does not resolve, and non-numeric values, are
/// skipped.
pub fn extract_series<'a, I>(messages: I, topic: &str, path: &MessagePath) -> Vec<SeriesPoint>
where
    I: IntoIterator<Item = &'a DecodedMessage>,
{
    let mut points = Vec::new();
    for msg in messages.into_iter().filter(|m| m.topic == topic) {
        let Some(root) = msg.value() else {
            continue;
        };
        let Ok(resolved) = resolve(root, path) else {
            continue;
        };

        let values = resolved.elements().unwrap_or_else(|| vec![resolved]);
        points.extend(values.iter().filter_map(|v| {
            v.as_plot_number().map(|value| SeriesPoint {
                timestamp_ms: msg.timestamp_ms,
                value,
            })
        }));
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        Value::from([(
            "a",
            Value::Array(vec![
                Value::from([("x", Value::Int(1))]),
                Value::from([("x", Value::Int(2))]),
                Value::from([("x", Value::Int(3))]),
            ]),
        )])
    }

    fn path(expr: &str) -> MessagePath {
        MessagePath::parse(expr).expect("parse")
    }

    #[test]
    fn test_slice_maps_remaining_path() {
        assert_eq!(
            resolve(&sample(), &path(".a[:].x")),
            Ok(Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]))
        );
    }

    #[test]
    fn test_index_access() {
        assert_eq!(resolve(&sample(), &path(".a[1].x")), Ok(Value::Int(2)));
    }

    #[test]
    fn test_index_out_of_bounds() {
        assert_eq!(
            resolve(&sample(), &path(".a[5].x")),
            Err(PathError {
                segment: 1,
                kind: PathErrorKind::IndexOutOfBounds { index: 5, len: 3 },
            })
        );
    }

    #[test]
    fn test_final_slice_returns_array() {
        let resolved = resolve(&sample(), &path(".a[:]")).expect("resolve");
        assert_eq!(resolved.sequence_len(), Some(3));
    }

    #[test]
    fn test_slice_placeholders_for_unresolved_elements() {
        let value = Value::from([(
            "a",
            Value::Array(vec![
                Value::from([("x", Value::Int(1))]),
                Value::from([("y", Value::Int(2))]),
            ]),
        )]);
        assert_eq!(
            resolve(&value, &path(".a[:].x")),
            Ok(Value::Array(vec![Value::Int(1), Value::Null]))
        );
    }

    #[test]
    fn test_type_errors() {
        let value = sample();
        assert_eq!(
            resolve(&value, &path(".a.x")).map_err(|e| e.kind),
            Err(PathErrorKind::NotAStruct)
        );
        assert_eq!(
            resolve(&value, &path(".a[0].x[0]")).map_err(|e| e.kind),
            Err(PathErrorKind::NotAnArray)
        );
        assert_eq!(
            resolve(&value, &path(".b")),
            Err(PathError {
                segment: 0,
                kind: PathErrorKind::MissingField("b".into()),
            })
        );
    }

    #[test]
    fn test_bytes_behave_like_uint_arrays() {
        let value = Value::from([("data", Value::Bytes(vec![4, 5]))]);
        assert_eq!(resolve(&value, &path(".data[1]")), Ok(Value::UInt(5)));
        assert_eq!(
            resolve(&value, &path(".data[2]")).map_err(|e| e.kind),
            Err(PathErrorKind::IndexOutOfBounds { index: 2, len: 2 })
        );
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(path("a.b"), path(".a.b"));
        assert!(path("").is_empty());
        assert_eq!(path(".a[ 2 ][:]").to_string(), ".a[2][:]");
        assert!(MessagePath::parse(".a[").is_err());
        assert!(MessagePath::parse(".a[x]").is_err());
        assert!(MessagePath::parse(".a..b").is_err());
        assert!(MessagePath::parse(".a b").is_err());
    }

    #[test]
    fn test_topic_path() {
        let tp = TopicPath::parse("/robot/imu.angular_velocity.x").expect("parse");
        assert_eq!(tp.topic, "/robot/imu");
        assert_eq!(tp.path, path(".angular_velocity.x"));
        assert_eq!(tp.to_string(), "/robot/imu.angular_velocity.x");

        let bare = TopicPath::parse("/scan").expect("bare");
        assert!(bare.path.is_empty());

        assert!(TopicPath::parse("scan.x").is_err());
        assert_eq!(
            TopicPath::parse("/scan.x[").map_err(|e| e.position),
            Err(7)
        );
    }

    #[test]
    fn test_candidate_paths() {
        let value = Value::from([
            ("flag", Value::Bool(true)),
            ("name", Value::from("arm")),
            ("points", Value::Array(vec![Value::from([("x", Value::Float(1.0))])])),
        ]);
        let candidates = candidate_paths(&value, 4);
        let paths: Vec<(&str, bool)> = candidates
            .iter()
            .map(|c| (c.path.as_str(), c.plottable))
            .collect();

        assert_eq!(
            paths,
            [
                (".flag", true),
                (".name", false),
                (".points", false),
                (".points[:]", false),
                (".points[:].x", true),
            ]
        );
        assert_eq!(candidate_paths(&value, 1).len(), 3);
    }

    #[test]
    fn test_extract_series() {
        let messages = vec![
            DecodedMessage::structured("/a", "t", 10.0, sample()),
            DecodedMessage::structured("/b", "t", 15.0, sample()),
            DecodedMessage::structured("/a", "t", 20.0, Value::from([("a", Value::Null)])),
        ];

        let points = extract_series(&messages, "/a", &path(".a[:].x"));
        assert_eq!(points.len(), 3);
        assert!(points.iter().all(|p| p.timestamp_ms == 10.0));
        assert_eq!(points[2].value, 3.0);

        let single = extract_series(&messages, "/a", &path(".a[0].x"));
        assert_eq!(single, [SeriesPoint { timestamp_ms: 10.0, value: 1.0 }]);
    }
}
