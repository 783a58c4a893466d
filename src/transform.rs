// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Image-plane to Cartesian conversion and rigid mounting transforms.
//!
//! Sensors report each return as an image coordinate pair with a focal
//! length of 1 plus the measured distance. The Cartesian point lies along
//! the ray `(-image_x, 1, -image_z)` at that distance:
//!
//! ```text
//! h     = sqrt(image_x² + image_z² + 1)
//! ratio = distance / h
//! x = -image_x · ratio    y = ratio    z = -image_z · ratio
//! ```

use crate::lidar::{CartesianPoint, RawPoint};

/// Convert an image point to a 3D point.
///
/// `h` is never below 1 so there is no division by zero; a zero distance
/// yields the origin.
#[inline]
pub fn convert(image_x: f32, image_z: f32, distance: f32) -> (f32, f32, f32) {
    let hypotenuse = (image_x * image_x + image_z * image_z + 1.0).sqrt();
    let ratio = distance / hypotenuse;
    (-image_x * ratio, ratio, -image_z * ratio)
}

/// Convert a raw feed point, carrying over timestamp, intensity and flags.
#[inline]
pub fn convert_point(point: &RawPoint) -> CartesianPoint {
    let (x, y, z) = convert(point.image_x, point.image_z, point.distance);
    CartesianPoint {
        timestamp: point.timestamp,
        x,
        y,
        z,
        intensity: point.intensity,
        return_number: point.return_number,
        valid: point.valid,
    }
}

/// Translation plus rotation compiled into a 3×3 matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RigidTransform {
    translation: [f32; 3],
    rotation: [[f32; 3]; 3],
}

impl RigidTransform {
    /// Compile a transform from a translation `(x, y, z)` and a rotation
    /// quaternion `(x, y, z, w)`.
    ///
    /// The quaternion must be unit length. It is not normalized here; a
    /// non-unit quaternion produces a scaled, sheared matrix.
    pub fn compile(translation: [f32; 3], rotation: [f32; 4]) -> Self {
        let [x, y, z, w] = rotation;
        let xx = x * x;
        let xy = x * y;
        let xz = x * z;
        let xw = x * w;
        let yy = y * y;
        let yz = y * z;
        let yw = y * w;
        let zz = z * z;
        let zw = z * w;

        Self {
            translation,
            rotation: [
                [1.0 - 2.0 * (yy + zz), 2.0 * (xy - zw), 2.0 * (xz + yw)],
                [2.0 * (xy + zw), 1.0 - 2.0 * (xx + zz), 2.0 * (yz - xw)],
                [2.0 * (xz - yw), 2.0 * (yz + xw), 1.0 - 2.0 * (xx + yy)],
            ],
        }
    }

    /// Identity transform.
    pub fn identity() -> Self {
        Self::compile([0.0; 3], [0.0, 0.0, 0.0, 1.0])
    }

    /// Returns true when applying the transform leaves points unchanged.
    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    /// Compute `R·p + t`.
    #[inline]
    pub fn apply_xyz(&self, x: f32, y: f32, z: f32) -> (f32, f32, f32) {
        let r = &self.rotation;
        let t = &self.translation;
        (
            x * r[0][0] + y * r[0][1] + z * r[0][2] + t[0],
            x * r[1][0] + y * r[1][1] + z * r[1][2] + t[1],
            x * r[2][0] + y * r[2][1] + z * r[2][2] + t[2],
        )
    }

    /// Transform the point in place.
    #[inline]
    pub fn apply(&self, point: &mut CartesianPoint) {
        let (x, y, z) = self.apply_xyz(point.x, point.y, point.z);
        point.x = x;
        point.y = y;
        point.z = z;
    }

    pub fn translation(&self) -> [f32; 3] {
        self.translation
    }
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}
