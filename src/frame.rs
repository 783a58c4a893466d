// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Point accumulation into publishable frames.
//!
//! Each delivery batch from the feed becomes exactly one [`Frame`]. The
//! [`FrameBuilder`] converts every raw point as it is added and tracks the
//! frame timestamp incrementally, so finishing a frame is O(1).
//!
//! # Example
//!
//! ```
//! use edgefirst_ceptonpub::{frame::begin_frame, lidar::RawPoint};
//!
//! let mut builder = begin_frame("12345", "cepton_12345", 2);
//! builder.add(&RawPoint { timestamp: 100, distance: 1.0, ..Default::default() });
//! builder.add(&RawPoint { timestamp: 300, distance: 2.0, ..Default::default() });
//!
//! let frame = builder.finish();
//! assert_eq!(frame.width(), 2);
//! assert_eq!(frame.timestamp(), 300);
//! ```

use crate::{
    lidar::{CartesianPoint, RawPoint},
    transform::{RigidTransform, convert_point},
};

/// Converted point batch ready for publication.
///
/// Points keep their arrival order. A frame is never split or merged after
/// construction.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    sensor_name: String,
    frame_label: String,
    timestamp: u64,
    points: Vec<CartesianPoint>,
}

impl Frame {
    /// Name of the sensor that produced every point in this frame.
    pub fn sensor_name(&self) -> &str {
        &self.sensor_name
    }

    /// Coordinate frame identity for downstream consumers.
    pub fn frame_label(&self) -> &str {
        &self.frame_label
    }

    /// Latest point timestamp in microseconds, 0 for an empty frame.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn points(&self) -> &[CartesianPoint] {
        &self.points
    }

    /// Number of points.
    #[inline]
    pub fn width(&self) -> usize {
        self.points.len()
    }

    /// Frames are unorganized clouds, always one row.
    #[inline]
    pub fn height(&self) -> usize {
        1
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Returns true when no point in the frame was clipped.
    pub fn is_dense(&self) -> bool {
        self.points.iter().all(|p| p.valid)
    }
}

/// Accumulates one delivery batch into a [`Frame`].
#[derive(Debug)]
pub struct FrameBuilder {
    frame: Frame,
    mount: Option<RigidTransform>,
}

/// Start a new frame for `sensor_name`, published under `frame_label`.
///
/// `capacity` is a hint for the number of points in the batch.
pub fn begin_frame(
    sensor_name: impl Into<String>,
    frame_label: impl Into<String>,
    capacity: usize,
) -> FrameBuilder {
    FrameBuilder {
        frame: Frame {
            sensor_name: sensor_name.into(),
            frame_label: frame_label.into(),
            timestamp: 0,
            points: Vec::with_capacity(capacity),
        },
        mount: None,
    }
}

impl FrameBuilder {
    /// Apply a mounting correction to every point added afterwards.
    pub fn with_transform(mut self, mount: Option<RigidTransform>) -> Self {
        self.mount = mount;
        self
    }

    /// Convert and append a raw point.
    #[inline]
    pub fn add(&mut self, raw: &RawPoint) {
        let mut point = convert_point(raw);
        if let Some(mount) = &self.mount {
            mount.apply(&mut point);
        }

        self.frame.timestamp = self.frame.timestamp.max(point.timestamp);
        self.frame.points.push(point);
    }

    /// Convert and append a whole batch.
    pub fn extend(&mut self, raw: &[RawPoint]) {
        self.frame.points.reserve(raw.len());
        for point in raw {
            self.add(point);
        }
    }

    /// Number of points accumulated so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.frame.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frame.points.is_empty()
    }

    /// Freeze the builder into a frame.
    pub fn finish(self) -> Frame {
        self.frame
    }
}
