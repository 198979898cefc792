// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Frame tree built from recorded transforms.

use super::{compose_transforms, ComposedTransform, Transform, TransformError};
use crate::codec::{DecodedMessage, Value};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

/// Dynamic transform topic.
pub const TF_TOPIC: &str = "/tf";

/// Static transform topic.
pub const TF_STATIC_TOPIC: &str = "/tf_static";

/// Frame query errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameQueryError {
    #[error("Unknown frame: {0}")]
    UnknownFrame(String),

    #[error("Frames {0} and {1} share no common ancestor")]
    Disjoint(String, String),
}

/// Latest transform for a child frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameNode {
    pub name: String,
    pub parent: String,
    pub transform: Transform,
    pub is_static: bool,
}

/// Frame graph keyed by child frame name.
#[derive(Debug, Clone, Default)]
pub struct FrameTree {
    nodes: HashMap<String, FrameNode>,
}

impl FrameTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the transform for `transform.child`.
    ///
    /// Returns `Ok(false)` when a static entry kept precedence.
    pub fn upsert(&mut self, transform: Transform) -> Result<bool, TransformError> {
        if let Some(existing) = self.nodes.get(&transform.child) {
            if existing.is_static && !transform.is_static {
                tracing::debug!(
                    "Keeping static {} -> {}, ignoring dynamic update",
                    existing.parent,
                    existing.name
                );
                return Ok(false);
            }
        }

        if self.creates_cycle(&transform.parent, &transform.child) {
            return Err(TransformError::Cycle {
                parent: transform.parent,
                child: transform.child,
            });
        }

        let node = FrameNode {
            name: transform.child.clone(),
            parent: transform.parent.clone(),
            is_static: transform.is_static,
            transform,
        };
        self.nodes.insert(node.name.clone(), node);
        Ok(true)
    }

    /// Ingest transforms from decoded `/tf` and `/tf_static` messages.
    ///
    /// Returns the number of transforms applied. Malformed entries are
    /// logged and skipped.
    pub fn ingest<'a, I>(&mut self, messages: I) -> usize
    where
        I: IntoIterator<Item = &'a DecodedMessage>,
    {
        let mut applied = 0;
        for msg in messages {
            let is_static = match msg.topic.as_str() {
                TF_TOPIC => false,
                TF_STATIC_TOPIC => true,
                _ => continue,
            };
            let entries = msg
                .value()
                .and_then(|v| v.get("transforms"))
                .and_then(Value::elements);
            let Some(entries) = entries else {
                tracing::warn!(
                    "Skipping {} message without transforms at {}",
                    msg.topic,
                    msg.log_time
                );
                continue;
            };

            for entry in &entries {
                match transform_from_value(entry, msg.log_time) {
                    Some(Ok(t)) => {
                        let t = if is_static { t.as_static() } else { t };
                        match self.upsert(t) {
                            Ok(true) => applied += 1,
                            Ok(false) => {}
                            Err(e) => tracing::warn!("Rejected transform: {}", e),
                        }
                    }
                    Some(Err(e)) => tracing::warn!("Rejected transform: {}", e),
                    None => tracing::warn!("Malformed transform entry on {}", msg.topic),
                }
            }
        }
        applied
    }

    /// Node for a child frame.
    pub fn get(&self, frame: &str) -> Option<&FrameNode> {
        self.nodes.get(frame)
    }

    /// Whether the frame appears as a child or a parent.
    pub fn contains(&self, frame: &str) -> bool {
        self.nodes.contains_key(frame) || self.nodes.values().any(|n| n.parent == frame)
    }

    /// All known frame names, sorted.
    pub fn frames(&self) -> BTreeSet<String> {
        self.nodes
            .values()
            .flat_map(|n| [n.name.clone(), n.parent.clone()])
            .collect()
    }

    /// Number of child frames with a transform.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Transforms taking frame `to` coordinates into frame `from`.
    ///
    /// Walks both frames up to their lowest common ancestor, inverting the
    /// `from` side.
    pub fn transform_chain(&self, from: &str, to: &str) -> Result<Vec<Transform>, FrameQueryError> {
        for frame in [from, to] {
            if !self.contains(frame) {
                return Err(FrameQueryError::UnknownFrame(frame.to_string()));
            }
        }

        let up_from = self.ancestors(from);
        let up_to = self.ancestors(to);

        let Some((i, j)) = up_from
            .iter()
            .enumerate()
            .find_map(|(i, f)| up_to.iter().position(|t| t == f).map(|j| (i, j)))
        else {
            return Err(FrameQueryError::Disjoint(from.to_string(), to.to_string()));
        };

        let mut chain: Vec<Transform> = up_from[..i]
            .iter()
            .filter_map(|f| self.nodes.get(f))
            .map(|n| n.transform.inverse())
            .collect();
        chain.extend(
            up_to[..j]
                .iter()
                .rev()
                .filter_map(|f| self.nodes.get(f))
                .map(|n| n.transform.clone()),
        );
        Ok(chain)
    }

    /// Pose of frame `to` expressed in frame `from`.
    pub fn lookup_transform(
        &self,
        from: &str,
        to: &str,
    ) -> Result<ComposedTransform, FrameQueryError> {
        Ok(compose_transforms(&self.transform_chain(from, to)?))
    }

    /// Euclidean distance between two frame origins.
    pub fn distance(&self, from: &str, to: &str) -> Result<f64, FrameQueryError> {
        Ok(self.lookup_transform(from, to)?.distance())
    }

    /// Rotation angle between two frames (radians).
    pub fn angular_difference(&self, from: &str, to: &str) -> Result<f64, FrameQueryError> {
        Ok(self.lookup_transform(from, to)?.angle())
    }

    // Frame followed by its ancestors up to the root.
    fn ancestors(&self, frame: &str) -> Vec<String> {
        let mut out = vec![frame.to_string()];
        let mut current = frame;
        while let Some(node) = self.nodes.get(current) {
            if out.len() > self.nodes.len() {
                break;
            }
            out.push(node.parent.clone());
            current = &node.parent;
        }
        out
    }

    fn creates_cycle(&self, parent: &str, child: &str) -> bool {
        parent == child || self.ancestors(parent).iter().any(|f| f == child)
    }
}

fn transform_from_value(entry: &Value, log_time: u64) -> Option<Result<Transform, TransformError>> {
    let header = entry.get("header")?;
    let parent = frame_name(header.get("frame_id")?.as_str()?);
    let child = frame_name(entry.get("child_frame_id")?.as_str()?);

    let tf = entry.get("transform")?;
    let translation = tf.get("translation")?;
    let rotation = tf.get("rotation")?;
    let component = |v: &Value, key: &str| v.get(key).and_then(Value::as_f64);

    let t = [
        component(translation, "x")?,
        component(translation, "y")?,
        component(translation, "z")?,
    ];
    let q = [
        component(rotation, "x")?,
        component(rotation, "y")?,
        component(rotation, "z")?,
        component(rotation, "w")?,
    ];

    let timestamp = header
        .get("stamp")
        .and_then(|s| {
            let sec = s.get("sec")?.as_f64()?;
            let nsec = s.get("nsec").or_else(|| s.get("nanosec"))?.as_f64()?;
            Some(sec as u64 * 1_000_000_000 + nsec as u64)
        })
        .unwrap_or(log_time);

    Some(Transform::new(parent, child, t, q).map(|t| t.with_timestamp(timestamp)))
}

// tf2 frame ids carry no leading slash
fn frame_name(id: &str) -> &str {
    id.trim_start_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::euler_to_quaternion;
    use std::f64::consts::FRAC_PI_2;

    const EPS: f64 = 1e-6;
    const IDENTITY: [f64; 4] = [0.0, 0.0, 0.0, 1.0];

    fn tf(parent: &str, child: &str, t: [f64; 3]) -> Transform {
        Transform::new(parent, child, t, IDENTITY).expect("transform")
    }

    fn robot() -> FrameTree {
        let mut tree = FrameTree::new();
        tree.upsert(tf("base", "sensor", [1.0, 0.0, 0.0])).expect("sensor");
        tree.upsert(tf("base", "arm", [0.0, 1.0, 0.0])).expect("arm");
        tree
    }

    #[test]
    fn test_sensor_to_arm() {
        let tree = robot();
        let composed = tree.lookup_transform("sensor", "arm").expect("lookup");
        let [x, y, z] = composed.translation;
        assert!((x + 1.0).abs() < EPS && (y - 1.0).abs() < EPS && z.abs() < EPS);
        assert!((tree.distance("sensor", "arm").expect("distance") - 2f64.sqrt()).abs() < EPS);
        assert!(tree.angular_difference("sensor", "arm").expect("angle") < EPS);
    }

    #[test]
    fn test_chain_through_deeper_ancestors() {
        let mut tree = FrameTree::new();
        tree.upsert(tf("map", "odom", [10.0, 0.0, 0.0])).expect("odom");
        let quarter_turn = euler_to_quaternion(0.0, 0.0, FRAC_PI_2);
        tree.upsert(Transform::new("odom", "base", [0.0, 0.0, 0.0], quarter_turn).expect("base"))
            .expect("base");
        tree.upsert(tf("base", "lidar", [1.0, 0.0, 0.0])).expect("lidar");

        assert_eq!(tree.transform_chain("map", "lidar").expect("chain").len(), 3);
        let composed = tree.lookup_transform("map", "lidar").expect("lookup");
        let [x, y, _] = composed.translation;
        assert!((x - 10.0).abs() < EPS && (y - 1.0).abs() < EPS);

        let back = tree.lookup_transform("lidar", "map").expect("reverse");
        let round = compose_transforms(
            &tree
                .transform_chain("map", "lidar")
                .expect("chain")
                .into_iter()
                .chain(tree.transform_chain("lidar", "map").expect("chain"))
                .collect::<Vec<_>>(),
        );
        assert!(round.distance() < EPS);
        assert!((back.angle() - FRAC_PI_2).abs() < EPS);
    }

    #[test]
    fn test_same_frame_is_identity() {
        let tree = robot();
        assert!(tree.transform_chain("arm", "arm").expect("chain").is_empty());
        assert!(tree.distance("base", "base").expect("distance") < EPS);
    }

    #[test]
    fn test_static_not_overwritten() {
        let mut tree = FrameTree::new();
        tree.upsert(tf("base", "camera", [0.5, 0.0, 0.0]).as_static()).expect("static");
        assert!(!tree.upsert(tf("base", "camera", [9.0, 0.0, 0.0])).expect("dynamic"));
        assert_eq!(tree.get("camera").map(|n| n.transform.translation[0]), Some(0.5));

        let restated = tf("base", "camera", [0.7, 0.0, 0.0]).as_static();
        assert!(tree.upsert(restated).expect("static again"));
        assert_eq!(tree.get("camera").map(|n| n.transform.translation[0]), Some(0.7));
    }

    #[test]
    fn test_dynamic_overwritten() {
        let mut tree = robot();
        tree.upsert(tf("base", "arm", [0.0, 2.0, 0.0])).expect("update");
        assert_eq!(tree.get("arm").map(|n| n.transform.translation[1]), Some(2.0));
    }

    #[test]
    fn test_disjoint_and_unknown() {
        let mut tree = robot();
        tree.upsert(tf("world", "beacon", [0.0; 3])).expect("beacon");

        assert_eq!(
            tree.lookup_transform("sensor", "beacon"),
            Err(FrameQueryError::Disjoint("sensor".into(), "beacon".into()))
        );
        assert_eq!(
            tree.distance("sensor", "ghost"),
            Err(FrameQueryError::UnknownFrame("ghost".into()))
        );
    }

    #[test]
    fn test_cycle_rejected() {
        let mut tree = FrameTree::new();
        tree.upsert(tf("a", "b", [0.0; 3])).expect("a->b");
        tree.upsert(tf("b", "c", [0.0; 3])).expect("b->c");

        let err = tree.upsert(tf("c", "a", [0.0; 3])).expect_err("cycle");
        assert!(matches!(err, TransformError::Cycle { .. }));
        assert!(tree.upsert(tf("x", "x", [0.0; 3])).is_err());
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_ingest_tf_messages() {
        let entry = |parent: &str, child: &str, x: f64| {
            Value::from([
                (
                    "header",
                    Value::from([
                        ("seq", Value::UInt(0)),
                        ("stamp", Value::from([("sec", Value::UInt(3)), ("nsec", Value::UInt(5))])),
                        ("frame_id", Value::from(parent)),
                    ]),
                ),
                ("child_frame_id", Value::from(child)),
                (
                    "transform",
                    Value::from([
                        (
                            "translation",
                            Value::from([
                                ("x", Value::Float(x)),
                                ("y", Value::Float(0.0)),
                                ("z", Value::Float(0.0)),
                            ]),
                        ),
                        (
                            "rotation",
                            Value::from([
                                ("x", Value::Float(0.0)),
                                ("y", Value::Float(0.0)),
                                ("z", Value::Float(0.0)),
                                ("w", Value::Float(1.0)),
                            ]),
                        ),
                    ]),
                ),
            ])
        };
        let message = |topic: &str, entries: Vec<Value>| {
            let value = Value::from([("transforms", Value::Array(entries))]);
            DecodedMessage::structured(topic, "tf2_msgs/TFMessage", 1000.0, value)
        };

        let messages = [
            message(TF_STATIC_TOPIC, vec![entry("/base", "camera", 0.5)]),
            message(TF_TOPIC, vec![entry("odom", "base", 2.0), entry("base", "camera", 9.0)]),
            message("/odom", vec![entry("map", "odom", 1.0)]),
        ];

        let mut tree = FrameTree::new();
        assert_eq!(tree.ingest(&messages), 2);

        let camera = tree.get("camera").expect("camera");
        assert!(camera.is_static);
        assert_eq!(camera.parent, "base");
        assert_eq!(camera.transform.timestamp, 3_000_000_005);
        assert!(!tree.contains("map"));

        let composed = tree.lookup_transform("odom", "camera").expect("lookup");
        assert!((composed.translation[0] - 2.5).abs() < EPS);
    }
}
