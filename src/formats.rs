// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Frame formatting into ROS `sensor_msgs/PointCloud2` messages.
//!
//! # Point format (26-byte stride)
//! ```text
//! ┌───────┬───────┬───────┬───────────────┬───────────────┬────────┬───────┐
//! │ x:f32 │ y:f32 │ z:f32 │ intensity:f32 │ timestamp:f64 │ return │ valid │
//! │ 4B    │ 4B    │ 4B    │ 4B            │ 8B (seconds)  │ 1B     │ 1B    │
//! └───────┴───────┴───────┴───────────────┴───────────────┴────────┴───────┘
//! ```
//!
//! All values are little-endian.

use crate::frame::Frame;
use edgefirst_schemas::{
    builtin_interfaces::Time,
    sensor_msgs::{PointCloud2, PointField},
    serde_cdr,
    std_msgs::Header,
};
use tracing::instrument;

/// Bytes per formatted point.
pub const POINT_STEP: usize = 26;

/// Schema name of the encoded messages.
pub const POINT_CLOUD_SCHEMA: &str = "sensor_msgs/msg/PointCloud2";

/// Point field data types for PointCloud2 messages.
///
/// These values correspond to the ROS sensor_msgs/PointField datatype field.
/// All variants are defined for completeness, even if not all are currently
/// used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
#[allow(dead_code)]
pub enum PointFieldType {
    INT8 = 1,
    UINT8 = 2,
    INT16 = 3,
    UINT16 = 4,
    INT32 = 5,
    UINT32 = 6,
    FLOAT32 = 7,
    FLOAT64 = 8,
}

fn field(name: &str, offset: u32, datatype: PointFieldType) -> PointField {
    PointField {
        name: String::from(name),
        offset,
        datatype: datatype as u8,
        count: 1,
    }
}

/// Point fields of the 26-byte format.
pub fn point_fields() -> Vec<PointField> {
    vec![
        field("x", 0, PointFieldType::FLOAT32),
        field("y", 4, PointFieldType::FLOAT32),
        field("z", 8, PointFieldType::FLOAT32),
        field("intensity", 12, PointFieldType::FLOAT32),
        field("timestamp", 16, PointFieldType::FLOAT64),
        field("return_number", 24, PointFieldType::UINT8),
        field("valid", 25, PointFieldType::UINT8),
    ]
}

/// Format the frame's points into the packed 26-byte format.
#[inline(never)]
pub fn format_points(frame: &Frame) -> Vec<u8> {
    let mut data = vec![0u8; POINT_STEP * frame.width()];
    format_points_into(frame, &mut data);
    data
}

/// Format the frame's points into a pre-allocated buffer.
///
/// # Panics
///
/// Panics if `out` is smaller than `POINT_STEP * frame.width()` bytes.
pub fn format_points_into(frame: &Frame, out: &mut [u8]) {
    assert!(out.len() >= POINT_STEP * frame.width());

    for (point, chunk) in frame.points().iter().zip(out.chunks_exact_mut(POINT_STEP)) {
        chunk[0..4].copy_from_slice(&point.x.to_le_bytes());
        chunk[4..8].copy_from_slice(&point.y.to_le_bytes());
        chunk[8..12].copy_from_slice(&point.z.to_le_bytes());
        chunk[12..16].copy_from_slice(&point.intensity.to_le_bytes());
        chunk[16..24].copy_from_slice(&(point.timestamp as f64 / 1e6).to_le_bytes());
        chunk[24] = point.return_number;
        chunk[25] = point.valid as u8;
    }
}

/// Message stamp for a unix time in microseconds.
pub fn stamp(timestamp_us: u64) -> Time {
    Time {
        sec: (timestamp_us / 1_000_000) as i32,
        nanosec: (timestamp_us % 1_000_000) as u32 * 1000,
    }
}

/// Build the PointCloud2 message for a frame. The header frame id is the
/// frame label and the stamp is the frame timestamp.
pub fn to_point_cloud(frame: &Frame) -> PointCloud2 {
    let width = frame.width() as u32;
    PointCloud2 {
        header: Header {
            stamp: stamp(frame.timestamp()),
            frame_id: frame.frame_label().to_string(),
        },
        height: frame.height() as u32,
        width,
        fields: point_fields(),
        is_bigendian: false,
        point_step: POINT_STEP as u32,
        row_step: POINT_STEP as u32 * width,
        data: format_points(frame),
        is_dense: frame.is_dense(),
    }
}

/// Serialize a frame as a CDR encoded PointCloud2.
#[instrument(skip_all)]
pub fn encode_point_cloud(frame: &Frame) -> Result<Vec<u8>, serde_cdr::Error> {
    serde_cdr::serialize(&to_point_cloud(frame))
}
