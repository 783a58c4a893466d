// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Shared helpers: in-memory pcap captures and recording sinks.

#![allow(dead_code)]

use edgefirst_ceptonpub::{
    Error, Frame, InfoSink, PointSink, SensorInfo, SinkFactory,
    codec::{encode_info, encode_points},
    lidar::RawPoint,
};
use std::{
    io::Write as _,
    path::PathBuf,
    sync::{Arc, Mutex},
};
use tempfile::NamedTempFile;

/// Minimal valid legacy PCAP header (little-endian, Ethernet)
pub const PCAP_HEADER: [u8; 24] = [
    0xd4, 0xc3, 0xb2, 0xa1, // Magic number (little-endian)
    0x02, 0x00, // Major version
    0x04, 0x00, // Minor version
    0x00, 0x00, 0x00, 0x00, // Timezone
    0x00, 0x00, 0x00, 0x00, // Timestamp accuracy
    0xff, 0xff, 0x00, 0x00, // Snap length
    0x01, 0x00, 0x00, 0x00, // Network type (Ethernet)
];

pub const SENSOR_PORT: u16 = 8808;

/// Ethernet + IPv4 + UDP frame from `src_ip` to the sensor port.
pub fn make_udp_packet(src_ip: [u8; 4], payload: &[u8]) -> Vec<u8> {
    let udp_len = 8 + payload.len();
    let ip_len = 20 + udp_len;

    let mut packet = Vec::with_capacity(14 + ip_len);

    // Ethernet header (14 bytes)
    packet.extend_from_slice(&[0x00; 6]); // Dst MAC
    packet.extend_from_slice(&[0x00; 6]); // Src MAC
    packet.extend_from_slice(&[0x08, 0x00]); // EtherType: IPv4

    // IPv4 header (20 bytes, no options)
    packet.push(0x45);
    packet.push(0x00);
    packet.extend_from_slice(&(ip_len as u16).to_be_bytes());
    packet.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
    packet.push(0x40); // TTL
    packet.push(0x11); // Protocol: UDP
    packet.extend_from_slice(&[0x00, 0x00]);
    packet.extend_from_slice(&src_ip);
    packet.extend_from_slice(&[192, 168, 1, 2]);

    // UDP header (8 bytes)
    packet.extend_from_slice(&SENSOR_PORT.to_be_bytes());
    packet.extend_from_slice(&SENSOR_PORT.to_be_bytes());
    packet.extend_from_slice(&(udp_len as u16).to_be_bytes());
    packet.extend_from_slice(&[0x00, 0x00]);

    packet.extend_from_slice(payload);
    packet
}

/// Builds a legacy pcap file in memory.
pub struct PcapBuilder {
    data: Vec<u8>,
}

impl PcapBuilder {
    pub fn new() -> Self {
        Self {
            data: PCAP_HEADER.to_vec(),
        }
    }

    pub fn packet(mut self, timestamp_us: u64, src_ip: [u8; 4], payload: &[u8]) -> Self {
        let frame = make_udp_packet(src_ip, payload);
        let len = frame.len() as u32;
        self.data
            .extend_from_slice(&((timestamp_us / 1_000_000) as u32).to_le_bytes());
        self.data
            .extend_from_slice(&((timestamp_us % 1_000_000) as u32).to_le_bytes());
        self.data.extend_from_slice(&len.to_le_bytes());
        self.data.extend_from_slice(&len.to_le_bytes());
        self.data.extend_from_slice(&frame);
        self
    }

    pub fn info(self, timestamp_us: u64, src_ip: [u8; 4], serial_number: u64) -> Self {
        let payload = encode_info(&SensorInfo {
            serial_number,
            model_name: "Vista 860".to_string(),
            ..Default::default()
        });
        self.packet(timestamp_us, src_ip, &payload)
    }

    pub fn points(self, timestamp_us: u64, src_ip: [u8; 4], points: &[RawPoint]) -> Self {
        let payload = encode_points(points, false).unwrap();
        self.packet(timestamp_us, src_ip, &payload)
    }

    pub fn build(self) -> Vec<u8> {
        self.data
    }
}

pub fn point(timestamp: u64) -> RawPoint {
    RawPoint {
        timestamp,
        image_x: 0.1,
        image_z: -0.05,
        distance: 12.0,
        intensity: 0.5,
        return_number: 0,
        valid: true,
    }
}

/// Capture written to a temporary file, removed on drop.
pub struct TempCapture {
    pub path: PathBuf,
    _file: NamedTempFile,
}

impl TempCapture {
    pub fn new(data: &[u8]) -> Self {
        let mut file = tempfile::Builder::new()
            .prefix("ceptonpub-test-")
            .suffix(".pcap")
            .tempfile()
            .unwrap();
        file.write_all(data).unwrap();
        file.flush().unwrap();
        Self {
            path: file.path().to_path_buf(),
            _file: file,
        }
    }
}

pub type Published = Arc<Mutex<Vec<(String, Frame)>>>;

struct RecordingSink {
    channel_id: String,
    published: Published,
}

impl PointSink for RecordingSink {
    fn publish(&self, frame: Frame) -> Result<(), Error> {
        self.published
            .lock()
            .unwrap()
            .push((self.channel_id.clone(), frame));
        Ok(())
    }
}

/// Sink factory recording every channel created and frame published.
#[derive(Default)]
pub struct RecordingFactory {
    pub published: Published,
    pub channels: Arc<Mutex<Vec<String>>>,
}

impl SinkFactory for RecordingFactory {
    fn create_point_sink(&self, channel_id: &str) -> Result<Arc<dyn PointSink>, Error> {
        self.channels.lock().unwrap().push(channel_id.to_string());
        Ok(Arc::new(RecordingSink {
            channel_id: channel_id.to_string(),
            published: self.published.clone(),
        }))
    }
}

#[derive(Default)]
pub struct RecordingInfoSink {
    pub serial_numbers: Mutex<Vec<u64>>,
}

impl InfoSink for RecordingInfoSink {
    fn publish(&self, info: &SensorInfo) -> Result<(), Error> {
        self.serial_numbers.lock().unwrap().push(info.serial_number);
        Ok(())
    }
}
