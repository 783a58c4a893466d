// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Sensor packet decoding.
//!
//! Sensors emit two kinds of little-endian UDP packets.
//!
//! ## Image points - 8 byte header + 26 bytes per point
//! ```text
//! ┌──────────┬───────┬──────────┬────────────┐
//! │ "CPPT"   │ flags │ reserved │ n_points   │
//! │ 4B       │ 1B    │ 1B       │ u16        │
//! └──────────┴───────┴──────────┴────────────┘
//! ┌───────────┬─────────┬──────────┬─────────┬───────────┬────────┬───────┐
//! │ timestamp │ image_x │ distance │ image_z │ intensity │ return │ valid │
//! │ u64 µs    │ f32     │ f32      │ f32     │ f32       │ u8     │ u8    │
//! └───────────┴─────────┴──────────┴─────────┴───────────┴────────┴───────┘
//! ```
//! Bit 0 of `flags` marks the last packet of a scan frame.
//!
//! ## Sensor information - 96 bytes
//! Serial number, model, nul-terminated model name and firmware version,
//! environment readings, GPS timestamp, return count and status flags.

use crate::lidar::{
    Error, FIRMWARE_VERSION_MAX, GpsTimestamp, MODEL_NAME_MAX, RawPoint, SensorFlags, SensorInfo,
    SensorModel,
};

/// Image point packet sync bytes
pub const POINTS_SYNC: [u8; 4] = *b"CPPT";

/// Sensor information packet sync bytes
pub const INFO_SYNC: [u8; 4] = *b"CPIN";

/// Image point packet header size in bytes
pub const POINTS_HEADER_SIZE: usize = 8;

/// Size of each encoded image point in bytes
pub const POINT_SIZE: usize = 26;

/// Largest point count that fits a single UDP datagram
pub const MAX_POINTS_PER_PACKET: usize = 2048;

/// Sensor information packet size in bytes
pub const INFO_PACKET_SIZE: usize = 96;

/// Image points flag: last packet of a scan frame
const FLAG_END_OF_FRAME: u8 = 0x01;

const MODEL_NAME_FIELD: usize = MODEL_NAME_MAX + 1;
const FIRMWARE_VERSION_FIELD: usize = FIRMWARE_VERSION_MAX + 1;

/// Decoded sensor packet.
#[derive(Clone, Debug, PartialEq)]
pub enum Packet {
    Points {
        points: Vec<RawPoint>,
        end_of_frame: bool,
    },
    /// Sensor information; the handle is assigned by the receiver.
    Info(SensorInfo),
}

/// Decode a packet payload.
pub fn decode(data: &[u8]) -> Result<Packet, Error> {
    if data.len() < 4 {
        return Err(Error::UnexpectedEnd(data.len()));
    }

    match [data[0], data[1], data[2], data[3]] {
        POINTS_SYNC => decode_points(data),
        INFO_SYNC => decode_info(data).map(Packet::Info),
        sync => Err(Error::InvalidPacket(format!(
            "unknown sync bytes {:02x?}",
            sync
        ))),
    }
}

fn decode_points(data: &[u8]) -> Result<Packet, Error> {
    if data.len() < POINTS_HEADER_SIZE {
        return Err(Error::UnexpectedEnd(data.len()));
    }

    let flags = data[4];
    let n_points = u16::from_le_bytes([data[6], data[7]]) as usize;
    if n_points > MAX_POINTS_PER_PACKET {
        return Err(Error::InvalidPacket(format!(
            "too many points: {}",
            n_points
        )));
    }

    let end = POINTS_HEADER_SIZE + n_points * POINT_SIZE;
    if data.len() < end {
        return Err(Error::UnexpectedEnd(data.len()));
    }

    let points = data[POINTS_HEADER_SIZE..end]
        .chunks_exact(POINT_SIZE)
        .map(parse_point)
        .collect();

    Ok(Packet::Points {
        points,
        end_of_frame: flags & FLAG_END_OF_FRAME != 0,
    })
}

fn parse_point(block: &[u8]) -> RawPoint {
    RawPoint {
        timestamp: u64::from_le_bytes(array(&block[0..8])),
        image_x: f32::from_le_bytes(array(&block[8..12])),
        distance: f32::from_le_bytes(array(&block[12..16])),
        image_z: f32::from_le_bytes(array(&block[16..20])),
        intensity: f32::from_le_bytes(array(&block[20..24])),
        return_number: block[24],
        valid: block[25] != 0,
    }
}

fn decode_info(data: &[u8]) -> Result<SensorInfo, Error> {
    if data.len() < INFO_PACKET_SIZE {
        return Err(Error::InvalidPacket(format!(
            "information packet too small: {} bytes",
            data.len()
        )));
    }

    Ok(SensorInfo {
        handle: 0,
        serial_number: u64::from_le_bytes(array(&data[4..12])),
        model: SensorModel::from(u32::from_le_bytes(array(&data[12..16]))),
        model_name: parse_string(&data[16..16 + MODEL_NAME_FIELD]),
        firmware_version: parse_string(&data[44..44 + FIRMWARE_VERSION_FIELD]),
        temperature: f32::from_le_bytes(array(&data[76..80])),
        humidity: f32::from_le_bytes(array(&data[80..84])),
        age: f32::from_le_bytes(array(&data[84..88])),
        gps_timestamp: GpsTimestamp {
            year: data[88],
            month: data[89],
            day: data[90],
            hour: data[91],
            min: data[92],
            sec: data[93],
        },
        return_count: data[94],
        flags: SensorFlags::from_bits(data[95]),
    })
}

/// Nul-terminated string field; the last byte of the field is always a
/// terminator so the content is at most `field.len() - 1` bytes.
fn parse_string(field: &[u8]) -> String {
    let field = &field[..field.len() - 1];
    let len = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..len]).into_owned()
}

fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

/// Encode image points into a packet.
pub fn encode_points(points: &[RawPoint], end_of_frame: bool) -> Result<Vec<u8>, Error> {
    if points.len() > MAX_POINTS_PER_PACKET {
        return Err(Error::InvalidPacket(format!(
            "too many points: {}",
            points.len()
        )));
    }

    let mut packet = Vec::with_capacity(POINTS_HEADER_SIZE + points.len() * POINT_SIZE);
    packet.extend_from_slice(&POINTS_SYNC);
    packet.push(if end_of_frame { FLAG_END_OF_FRAME } else { 0 });
    packet.push(0);
    packet.extend_from_slice(&(points.len() as u16).to_le_bytes());

    for point in points {
        packet.extend_from_slice(&point.timestamp.to_le_bytes());
        packet.extend_from_slice(&point.image_x.to_le_bytes());
        packet.extend_from_slice(&point.distance.to_le_bytes());
        packet.extend_from_slice(&point.image_z.to_le_bytes());
        packet.extend_from_slice(&point.intensity.to_le_bytes());
        packet.push(point.return_number);
        packet.push(point.valid as u8);
    }

    Ok(packet)
}

/// Encode sensor information into a packet. The handle is not encoded and
/// over-long strings are truncated.
pub fn encode_info(info: &SensorInfo) -> Vec<u8> {
    let mut packet = Vec::with_capacity(INFO_PACKET_SIZE);
    packet.extend_from_slice(&INFO_SYNC);
    packet.extend_from_slice(&info.serial_number.to_le_bytes());
    packet.extend_from_slice(&u32::from(info.model).to_le_bytes());
    put_string(&mut packet, &info.model_name, MODEL_NAME_FIELD);
    put_string(&mut packet, &info.firmware_version, FIRMWARE_VERSION_FIELD);
    packet.extend_from_slice(&info.temperature.to_le_bytes());
    packet.extend_from_slice(&info.humidity.to_le_bytes());
    packet.extend_from_slice(&info.age.to_le_bytes());

    let gps = &info.gps_timestamp;
    packet.extend_from_slice(&[gps.year, gps.month, gps.day, gps.hour, gps.min, gps.sec]);
    packet.push(info.return_count);
    packet.push(info.flags.bits());

    debug_assert_eq!(packet.len(), INFO_PACKET_SIZE);
    packet
}

fn put_string(packet: &mut Vec<u8>, value: &str, field: usize) {
    let mut len = value.len().min(field - 1);
    while !value.is_char_boundary(len) {
        len -= 1;
    }

    packet.extend_from_slice(&value.as_bytes()[..len]);
    packet.resize(packet.len() + field - len, 0);
}
