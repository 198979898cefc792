// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Rigid-body transforms and the frame tree.
//!
//! A [`Transform`] maps coordinates of its child frame into its parent
//! frame. Chains are folded left to right as 4x4 homogeneous matrices:
//!
//! ```text
//!            base
//!           /    \
//!   (1,0,0)/      \(0,1,0)
//!         /        \
//!     sensor       arm
//!
//!   sensor → arm = inverse(base→sensor) · (base→arm) = (-1, 1, 0)
//! ```

mod tree;

pub use tree::{FrameNode, FrameQueryError, FrameTree, TF_STATIC_TOPIC, TF_TOPIC};

use nalgebra::{
    Isometry3, Matrix3, Matrix4, Quaternion, Rotation3, Translation3, UnitQuaternion, Vector3,
};
use thiserror::Error;

/// Norm below which a quaternion cannot be normalised.
const MIN_QUATERNION_NORM: f64 = 1e-12;

/// Transform construction and tree errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error("Degenerate rotation for {parent} -> {child}")]
    DegenerateRotation { parent: String, child: String },

    #[error("Non-finite translation for {parent} -> {child}")]
    NonFinite { parent: String, child: String },

    #[error("Transform {parent} -> {child} would create a cycle")]
    Cycle { parent: String, child: String },
}

/// Parent-relative pose of a child frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    pub parent: String,
    pub child: String,
    pub translation: [f64; 3],

    /// Unit quaternion `[x, y, z, w]`.
    pub rotation: [f64; 4],

    /// Nanoseconds.
    pub timestamp: u64,

    /// Static transforms are never replaced by dynamic ones.
    pub is_static: bool,
}

impl Transform {
    /// Create a transform, normalising the rotation.
    pub fn new(
        parent: &str,
        child: &str,
        translation: [f64; 3],
        rotation: [f64; 4],
    ) -> Result<Self, TransformError> {
        if translation.iter().any(|v| !v.is_finite()) {
            return Err(TransformError::NonFinite {
                parent: parent.to_string(),
                child: child.to_string(),
            });
        }

        let [x, y, z, w] = rotation;
        let q = Quaternion::new(w, x, y, z);
        let norm = q.norm();
        if !norm.is_finite() || norm < MIN_QUATERNION_NORM {
            return Err(TransformError::DegenerateRotation {
                parent: parent.to_string(),
                child: child.to_string(),
            });
        }

        Ok(Self {
            parent: parent.to_string(),
            child: child.to_string(),
            translation,
            rotation: quaternion_array(&UnitQuaternion::new_normalize(q)),
            timestamp: 0,
            is_static: false,
        })
    }

    /// Identity transform between two frames.
    pub fn identity(parent: &str, child: &str) -> Self {
        Self {
            parent: parent.to_string(),
            child: child.to_string(),
            translation: [0.0; 3],
            rotation: [0.0, 0.0, 0.0, 1.0],
            timestamp: 0,
            is_static: false,
        }
    }

    /// Set timestamp (nanoseconds).
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Mark as static.
    pub fn as_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Homogeneous matrix mapping child coordinates into the parent.
    pub fn to_matrix(&self) -> Matrix4<f64> {
        self.isometry().to_homogeneous()
    }

    /// Transform from child to parent.
    pub fn inverse(&self) -> Self {
        let inv = self.isometry().inverse();
        Self {
            parent: self.child.clone(),
            child: self.parent.clone(),
            translation: [inv.translation.x, inv.translation.y, inv.translation.z],
            rotation: quaternion_array(&inv.rotation),
            timestamp: self.timestamp,
            is_static: self.is_static,
        }
    }

    fn isometry(&self) -> Isometry3<f64> {
        let [tx, ty, tz] = self.translation;
        Isometry3::from_parts(Translation3::new(tx, ty, tz), unit_quaternion(self.rotation))
    }
}

/// Result of folding a transform chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedTransform {
    pub translation: [f64; 3],

    /// Unit quaternion `[x, y, z, w]`.
    pub rotation: [f64; 4],

    pub matrix: Matrix4<f64>,
}

impl ComposedTransform {
    /// Euclidean length of the translation.
    pub fn distance(&self) -> f64 {
        Vector3::from(self.translation).norm()
    }

    /// Rotation angle in radians, in `[0, π]`.
    pub fn angle(&self) -> f64 {
        unit_quaternion(self.rotation).angle()
    }
}

/// Fold transforms in list order into one homogeneous matrix.
///
/// An empty list yields the identity.
pub fn compose_transforms(transforms: &[Transform]) -> ComposedTransform {
    let matrix = transforms
        .iter()
        .fold(Matrix4::identity(), |acc, t| acc * t.to_matrix());

    let translation = [matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)]];
    let block: Matrix3<f64> = matrix.fixed_view::<3, 3>(0, 0).into_owned();

    ComposedTransform {
        translation,
        rotation: matrix_to_quaternion(&block),
        matrix,
    }
}

/// Quaternion `[x, y, z, w]` to roll, pitch, yaw (radians).
pub fn quaternion_to_euler(q: [f64; 4]) -> [f64; 3] {
    let (roll, pitch, yaw) = unit_quaternion(q).euler_angles();
    [roll, pitch, yaw]
}

/// Roll, pitch, yaw (radians) to quaternion `[x, y, z, w]`.
pub fn euler_to_quaternion(roll: f64, pitch: f64, yaw: f64) -> [f64; 4] {
    quaternion_array(&UnitQuaternion::from_euler_angles(roll, pitch, yaw))
}

/// Quaternion `[x, y, z, w]` to a 3x3 rotation matrix.
pub fn quaternion_to_matrix(q: [f64; 4]) -> Matrix3<f64> {
    unit_quaternion(q).to_rotation_matrix().into_inner()
}

/// Rotation matrix to a normalised quaternion `[x, y, z, w]`.
pub fn matrix_to_quaternion(m: &Matrix3<f64>) -> [f64; 4] {
    let rotation = Rotation3::from_matrix(m);
    quaternion_array(&UnitQuaternion::from_rotation_matrix(&rotation))
}

fn unit_quaternion(q: [f64; 4]) -> UnitQuaternion<f64> {
    let [x, y, z, w] = q;
    UnitQuaternion::new_normalize(Quaternion::new(w, x, y, z))
}

fn quaternion_array(q: &UnitQuaternion<f64>) -> [f64; 4] {
    let c = q.quaternion().coords;
    [c.x, c.y, c.z, c.w]
}
