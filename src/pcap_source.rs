// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Capture file loader for offline replay.
//!
//! This module provides [`Capture`], the fully decoded content of a PCAP or
//! PCAPNG recording of sensor traffic. Every UDP datagram becomes a
//! [`CapturedPacket`] carrying its capture timestamp and the mock
//! [`SensorHandle`] of its sender.
//!
//! # Example
//!
//! ```ignore
//! use edgefirst_ceptonpub::pcap_source::Capture;
//!
//! // Load a recording, keeping only traffic on the sensor port
//! let capture = Capture::from_file("sensors.pcap", Some(8808))?;
//! println!("{} packets over {:.1}s", capture.len(), capture.length_sec());
//! ```

use crate::{
    lidar::{Error, HANDLE_FLAG_MOCK, SensorHandle},
    packet_source::handle_from_ip,
};
use pcap_parser::traits::PcapReaderIterator;
use std::{net::IpAddr, path::Path};

/// Section header block magic of PCAPNG files.
const PCAPNG_MAGIC: [u8; 4] = [0x0a, 0x0d, 0x0d, 0x0a];

/// UDP datagram extracted from a capture.
#[derive(Clone, Debug, PartialEq)]
pub struct CapturedPacket {
    /// Capture time in microseconds since the unix epoch.
    pub timestamp_us: u64,
    /// Mock handle of the sender.
    pub handle: SensorHandle,
    /// UDP payload.
    pub payload: Vec<u8>,
}

/// Capture file loaded into memory.
///
/// Packets are kept in file order and their timestamps are non-decreasing.
#[derive(Clone, Debug, Default)]
pub struct Capture {
    packets: Vec<CapturedPacket>,
}

impl Capture {
    /// Load a capture file from disk, optionally filtering by port.
    ///
    /// # Errors
    ///
    /// * [`Error::Io`] if the file cannot be read
    /// * [`Error::InvalidFormat`] if it is neither PCAP nor PCAPNG
    /// * [`Error::CorruptFile`] if the records are malformed or truncated
    pub fn from_file<P: AsRef<Path>>(path: P, port: Option<u16>) -> Result<Self, Error> {
        let data = std::fs::read(path.as_ref()).map_err(Error::Io)?;
        Self::from_bytes(&data, port)
    }

    /// Load a capture from bytes, optionally filtering by port.
    ///
    /// * `port` - matches source OR destination port
    pub fn from_bytes(data: &[u8], port: Option<u16>) -> Result<Self, Error> {
        let packets = if data.len() >= 4 && data[0..4] == PCAPNG_MAGIC {
            Self::extract_pcapng(data, port)?
        } else {
            Self::extract_legacy_pcap(data, port)?
        };

        Self::from_packets(packets)
    }

    /// Build a capture from already extracted packets.
    pub fn from_packets(packets: Vec<CapturedPacket>) -> Result<Self, Error> {
        if let Some(pair) = packets
            .windows(2)
            .find(|pair| pair[1].timestamp_us < pair[0].timestamp_us)
        {
            return Err(Error::CorruptFile(format!(
                "timestamp goes backwards from {} to {}",
                pair[0].timestamp_us, pair[1].timestamp_us
            )));
        }
        Ok(Self { packets })
    }

    fn extract_legacy_pcap(data: &[u8], port: Option<u16>) -> Result<Vec<CapturedPacket>, Error> {
        use pcap_parser::*;

        // Buffer size must be at least as large as the data to avoid Incomplete errors
        let mut reader = LegacyPcapReader::new(data.len().max(64), data)
            .map_err(|e| Error::InvalidFormat(format!("not a pcap file: {:?}", e)))?;

        let mut packets = Vec::new();
        let mut nanoseconds = false;
        let mut consumed = 0;

        while consumed < data.len() {
            match reader.next() {
                Ok((offset, block)) => {
                    match block {
                        PcapBlockOwned::LegacyHeader(header) => {
                            nanoseconds = header.is_nanosecond_precision();
                        }
                        PcapBlockOwned::Legacy(packet) => {
                            let fraction = if nanoseconds {
                                packet.ts_usec as u64 / 1000
                            } else {
                                packet.ts_usec as u64
                            };
                            let timestamp_us = packet.ts_sec as u64 * 1_000_000 + fraction;
                            if let Some(extracted) =
                                Self::extract_udp_payload(packet.data, port, timestamp_us)
                            {
                                packets.push(extracted);
                            }
                        }
                        _ => {}
                    }
                    consumed += offset;
                    reader.consume(offset);
                }
                Err(PcapError::Eof) => break,
                Err(PcapError::Incomplete(_)) => {
                    return Err(Error::CorruptFile(format!(
                        "truncated record at byte {}",
                        consumed
                    )));
                }
                Err(e) => {
                    return Err(Error::CorruptFile(format!("pcap parse error: {:?}", e)));
                }
            }
        }

        Ok(packets)
    }

    fn extract_pcapng(data: &[u8], port: Option<u16>) -> Result<Vec<CapturedPacket>, Error> {
        use pcap_parser::*;

        let mut reader = PcapNGReader::new(data.len().max(64), data)
            .map_err(|e| Error::InvalidFormat(format!("not a pcapng file: {:?}", e)))?;

        let mut packets = Vec::new();
        // (units per second, offset in seconds) of each interface in the section
        let mut interfaces: Vec<(u64, i64)> = Vec::new();
        let mut consumed = 0;

        while consumed < data.len() {
            match reader.next() {
                Ok((offset, block)) => {
                    match block {
                        PcapBlockOwned::NG(Block::SectionHeader(_)) => interfaces.clear(),
                        PcapBlockOwned::NG(Block::InterfaceDescription(idb)) => {
                            let resolution = idb.ts_resolution().ok_or_else(|| {
                                Error::CorruptFile(format!(
                                    "invalid timestamp resolution {:#x}",
                                    idb.if_tsresol
                                ))
                            })?;
                            interfaces.push((resolution, idb.ts_offset()));
                        }
                        // Simple packet blocks carry no timestamp and are skipped.
                        PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
                            let &(resolution, ts_offset) =
                                interfaces.get(epb.if_id as usize).ok_or_else(|| {
                                    Error::CorruptFile(format!(
                                        "packet on undeclared interface {}",
                                        epb.if_id
                                    ))
                                })?;
                            let (sec, fraction) = epb.decode_ts(0, resolution);
                            let sec = (sec as i64).saturating_add(ts_offset).max(0) as u64;
                            let timestamp_us =
                                sec * 1_000_000 + fraction as u64 * 1_000_000 / resolution;
                            if let Some(extracted) =
                                Self::extract_udp_payload(epb.data, port, timestamp_us)
                            {
                                packets.push(extracted);
                            }
                        }
                        _ => {}
                    }
                    consumed += offset;
                    reader.consume(offset);
                }
                Err(PcapError::Eof) => break,
                Err(PcapError::Incomplete(_)) => {
                    return Err(Error::CorruptFile(format!(
                        "truncated block at byte {}",
                        consumed
                    )));
                }
                Err(e) => {
                    return Err(Error::CorruptFile(format!("pcapng parse error: {:?}", e)));
                }
            }
        }

        Ok(packets)
    }

    /// Extract UDP payload and sender from raw packet data.
    ///
    /// Uses etherparse to handle Ethernet/IP/UDP headers.
    fn extract_udp_payload(
        data: &[u8],
        port: Option<u16>,
        timestamp_us: u64,
    ) -> Option<CapturedPacket> {
        use etherparse::{NetSlice, SlicedPacket, TransportSlice};

        let packet = SlicedPacket::from_ethernet(data).ok()?;

        let source: IpAddr = match &packet.net {
            Some(NetSlice::Ipv4(ipv4)) => ipv4.header().source_addr().into(),
            Some(NetSlice::Ipv6(ipv6)) => ipv6.header().source_addr().into(),
            _ => return None,
        };

        let udp = match packet.transport {
            Some(TransportSlice::Udp(udp)) => udp,
            _ => return None,
        };

        if let Some(filter_port) = port {
            if udp.source_port() != filter_port && udp.destination_port() != filter_port {
                return None;
            }
        }

        let payload = udp.payload().to_vec();
        if payload.is_empty() {
            return None;
        }

        Some(CapturedPacket {
            timestamp_us,
            handle: handle_from_ip(source) | HANDLE_FLAG_MOCK,
            payload,
        })
    }

    pub fn packets(&self) -> &[CapturedPacket] {
        &self.packets
    }

    pub fn get(&self, index: usize) -> Option<&CapturedPacket> {
        self.packets.get(index)
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Timestamp of the first packet in microseconds, 0 when empty.
    pub fn start_time(&self) -> u64 {
        self.packets.first().map(|p| p.timestamp_us).unwrap_or(0)
    }

    /// Seconds between the first and the last packet.
    pub fn length_sec(&self) -> f32 {
        match (self.packets.first(), self.packets.last()) {
            (Some(first), Some(last)) => {
                (last.timestamp_us - first.timestamp_us) as f64 as f32 / 1e6
            }
            _ => 0.0,
        }
    }

    /// Seconds from the start of the capture to packet `index`.
    pub fn offset_sec(&self, index: usize) -> f32 {
        match self.packets.get(index) {
            Some(packet) => ((packet.timestamp_us - self.start_time()) as f64 / 1e6) as f32,
            None => self.length_sec(),
        }
    }

    /// Index of the first packet at or after `sec` seconds into the capture.
    pub fn index_at(&self, sec: f32) -> usize {
        self.packets
            .partition_point(|packet| self.seconds(packet) < sec)
    }

    fn seconds(&self, packet: &CapturedPacket) -> f32 {
        ((packet.timestamp_us - self.start_time()) as f64 / 1e6) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Minimal valid legacy PCAP header (little-endian)
    const PCAP_HEADER: [u8; 24] = [
        0xd4, 0xc3, 0xb2, 0xa1, // Magic number (little-endian)
        0x02, 0x00, // Major version
        0x04, 0x00, // Minor version
        0x00, 0x00, 0x00, 0x00, // Timezone
        0x00, 0x00, 0x00, 0x00, // Timestamp accuracy
        0xff, 0xff, 0x00, 0x00, // Snap length
        0x01, 0x00, 0x00, 0x00, // Network type (Ethernet)
    ];

    // Create a minimal UDP packet with Ethernet + IP + UDP headers
    fn make_udp_packet(src_ip: [u8; 4], src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
        let udp_len = 8 + payload.len();
        let ip_len = 20 + udp_len;

        let mut packet = Vec::with_capacity(14 + ip_len);

        // Ethernet header (14 bytes)
        packet.extend_from_slice(&[0x00; 6]); // Dst MAC
        packet.extend_from_slice(&[0x00; 6]); // Src MAC
        packet.extend_from_slice(&[0x08, 0x00]); // EtherType: IPv4

        // IPv4 header (20 bytes, no options)
        packet.push(0x45); // Version + IHL
        packet.push(0x00); // DSCP + ECN
        packet.extend_from_slice(&(ip_len as u16).to_be_bytes()); // Total length
        packet.extend_from_slice(&[0x00, 0x00]); // Identification
        packet.extend_from_slice(&[0x00, 0x00]); // Flags + Fragment offset
        packet.push(0x40); // TTL
        packet.push(0x11); // Protocol: UDP
        packet.extend_from_slice(&[0x00, 0x00]); // Checksum (0 for test)
        packet.extend_from_slice(&src_ip); // Src IP
        packet.extend_from_slice(&[192, 168, 1, 2]); // Dst IP

        // UDP header (8 bytes)
        packet.extend_from_slice(&src_port.to_be_bytes());
        packet.extend_from_slice(&dst_port.to_be_bytes());
        packet.extend_from_slice(&(udp_len as u16).to_be_bytes());
        packet.extend_from_slice(&[0x00, 0x00]); // Checksum (0 for test)

        packet.extend_from_slice(payload);
        packet
    }

    // Create a PCAP packet record
    fn make_pcap_record(timestamp_us: u64, data: &[u8]) -> Vec<u8> {
        let len = data.len() as u32;
        let mut record = Vec::with_capacity(16 + data.len());

        record.extend_from_slice(&((timestamp_us / 1_000_000) as u32).to_le_bytes());
        record.extend_from_slice(&((timestamp_us % 1_000_000) as u32).to_le_bytes());
        record.extend_from_slice(&len.to_le_bytes()); // Captured length
        record.extend_from_slice(&len.to_le_bytes()); // Original length
        record.extend_from_slice(data);

        record
    }

    fn make_pcap(records: &[(u64, Vec<u8>)]) -> Vec<u8> {
        let mut data = PCAP_HEADER.to_vec();
        for (timestamp_us, packet) in records {
            data.extend_from_slice(&make_pcap_record(*timestamp_us, packet));
        }
        data
    }

    fn make_pcapng_block(block_type: u32, body: &[u8]) -> Vec<u8> {
        let padded = body.len().div_ceil(4) * 4;
        let len = (12 + padded) as u32;
        let mut block = Vec::with_capacity(len as usize);
        block.extend_from_slice(&block_type.to_le_bytes());
        block.extend_from_slice(&len.to_le_bytes());
        block.extend_from_slice(body);
        block.resize(8 + padded, 0);
        block.extend_from_slice(&len.to_le_bytes());
        block
    }

    // Section header, one Ethernet interface and one enhanced packet per
    // record. `tsresol` is the if_tsresol option, absent when `None`.
    fn make_pcapng(tsresol: Option<u8>, records: &[(u64, Vec<u8>)]) -> Vec<u8> {
        let mut shb = Vec::new();
        shb.extend_from_slice(&0x1a2b_3c4du32.to_le_bytes()); // Byte-order magic
        shb.extend_from_slice(&1u16.to_le_bytes()); // Major version
        shb.extend_from_slice(&0u16.to_le_bytes()); // Minor version
        shb.extend_from_slice(&(-1i64).to_le_bytes()); // Section length
        let mut data = make_pcapng_block(0x0a0d_0d0a, &shb);

        let mut idb = Vec::new();
        idb.extend_from_slice(&1u16.to_le_bytes()); // Link type (Ethernet)
        idb.extend_from_slice(&0u16.to_le_bytes()); // Reserved
        idb.extend_from_slice(&0xffffu32.to_le_bytes()); // Snap length
        if let Some(tsresol) = tsresol {
            idb.extend_from_slice(&9u16.to_le_bytes()); // if_tsresol
            idb.extend_from_slice(&1u16.to_le_bytes());
            idb.extend_from_slice(&[tsresol, 0, 0, 0]);
            idb.extend_from_slice(&[0; 4]); // opt_endofopt
        }
        data.extend_from_slice(&make_pcapng_block(1, &idb));

        for (timestamp, packet) in records {
            let mut epb = Vec::new();
            epb.extend_from_slice(&0u32.to_le_bytes()); // Interface id
            epb.extend_from_slice(&((timestamp >> 32) as u32).to_le_bytes());
            epb.extend_from_slice(&(*timestamp as u32).to_le_bytes());
            epb.extend_from_slice(&(packet.len() as u32).to_le_bytes());
            epb.extend_from_slice(&(packet.len() as u32).to_le_bytes());
            epb.extend_from_slice(packet);
            data.extend_from_slice(&make_pcapng_block(6, &epb));
        }
        data
    }

    #[test]
    fn test_pcapng_microseconds() {
        let data = make_pcapng(
            None,
            &[
                (1_000_000, make_udp_packet([10, 0, 0, 1], 8808, 8808, b"first")),
                (3_500_000, make_udp_packet([10, 0, 0, 1], 8808, 8808, b"second")),
            ],
        );

        let capture = Capture::from_bytes(&data, None).unwrap();
        assert_eq!(capture.len(), 2);
        assert_eq!(capture.start_time(), 1_000_000);
        assert_eq!(capture.length_sec(), 2.5);
        assert_eq!(capture.get(1).unwrap().payload, b"second");
        assert_eq!(capture.get(0).unwrap().handle, 0x0a00_0001 | HANDLE_FLAG_MOCK);
    }

    #[test]
    fn test_pcapng_nanoseconds() {
        let data = make_pcapng(
            Some(9),
            &[
                (2_000_000_500, make_udp_packet([10, 0, 0, 1], 8808, 8808, b"a")),
                (3_250_000_000, make_udp_packet([10, 0, 0, 1], 8808, 8808, b"b")),
            ],
        );

        let capture = Capture::from_bytes(&data, None).unwrap();
        assert_eq!(capture.get(0).unwrap().timestamp_us, 2_000_000);
        assert_eq!(capture.get(1).unwrap().timestamp_us, 3_250_000);
        assert_eq!(capture.length_sec(), 1.25);
    }

    #[test]
    fn test_pcapng_packet_without_interface() {
        let data = make_pcapng(
            None,
            &[(0, make_udp_packet([10, 0, 0, 1], 8808, 8808, b"a"))],
        );
        // Drop the interface description block that follows the 28-byte
        // section header.
        let mut stripped = data[..28].to_vec();
        stripped.extend_from_slice(&data[28 + 20..]);

        assert!(matches!(
            Capture::from_bytes(&stripped, None),
            Err(Error::CorruptFile(_))
        ));
    }

    #[test]
    fn test_legacy_pcap_nanoseconds() {
        let mut data = PCAP_HEADER.to_vec();
        data[0..4].copy_from_slice(&[0x4d, 0x3c, 0xb2, 0xa1]);
        for (sec, nsec, payload) in [(4u32, 500_000_999u32, b"a"), (6, 0, b"b")] {
            let packet = make_udp_packet([10, 0, 0, 1], 8808, 8808, payload);
            data.extend_from_slice(&sec.to_le_bytes());
            data.extend_from_slice(&nsec.to_le_bytes());
            data.extend_from_slice(&(packet.len() as u32).to_le_bytes());
            data.extend_from_slice(&(packet.len() as u32).to_le_bytes());
            data.extend_from_slice(&packet);
        }

        let capture = Capture::from_bytes(&data, None).unwrap();
        assert_eq!(capture.start_time(), 4_500_000);
        assert_eq!(capture.get(1).unwrap().timestamp_us, 6_000_000);
        assert_eq!(capture.length_sec(), 1.5);
    }

    #[test]
    fn test_extract_udp_payload() {
        let packet = make_udp_packet([192, 168, 1, 1], 8808, 12345, b"test payload");

        let extracted = Capture::extract_udp_payload(&packet, None, 7).unwrap();
        assert_eq!(extracted.payload, b"test payload");
        assert_eq!(extracted.timestamp_us, 7);
        assert_eq!(extracted.handle, 0xc0a8_0101 | HANDLE_FLAG_MOCK);
    }

    #[test]
    fn test_extract_udp_payload_port_filter() {
        let packet = make_udp_packet([192, 168, 1, 1], 8808, 12345, b"test payload");

        assert!(Capture::extract_udp_payload(&packet, Some(8808), 0).is_some());
        assert!(Capture::extract_udp_payload(&packet, Some(12345), 0).is_some());
        assert!(Capture::extract_udp_payload(&packet, Some(9999), 0).is_none());
    }

    #[test]
    fn test_capture_from_bytes() {
        let data = make_pcap(&[
            (1_000_000, make_udp_packet([10, 0, 0, 1], 8808, 8808, b"first")),
            (1_500_000, make_udp_packet([10, 0, 0, 2], 8808, 8808, b"second")),
            (3_000_000, make_udp_packet([10, 0, 0, 1], 7777, 7777, b"other")),
        ]);

        let capture = Capture::from_bytes(&data, None).unwrap();
        assert_eq!(capture.len(), 3);
        assert_eq!(capture.start_time(), 1_000_000);
        assert_eq!(capture.length_sec(), 2.0);
        assert_eq!(capture.offset_sec(1), 0.5);
        assert_eq!(capture.get(1).unwrap().handle, 0x0a00_0002 | HANDLE_FLAG_MOCK);

        let filtered = Capture::from_bytes(&data, Some(8808)).unwrap();
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered.length_sec(), 0.5);
    }

    #[test]
    fn test_index_at() {
        let data = make_pcap(&[
            (0, make_udp_packet([10, 0, 0, 1], 8808, 8808, b"a")),
            (1_000_000, make_udp_packet([10, 0, 0, 1], 8808, 8808, b"b")),
            (2_000_000, make_udp_packet([10, 0, 0, 1], 8808, 8808, b"c")),
        ]);
        let capture = Capture::from_bytes(&data, None).unwrap();

        assert_eq!(capture.index_at(0.0), 0);
        assert_eq!(capture.index_at(0.5), 1);
        assert_eq!(capture.index_at(1.0), 1);
        assert_eq!(capture.index_at(2.5), 3);
    }

    #[test]
    fn test_capture_empty() {
        let capture = Capture::from_bytes(&PCAP_HEADER, None).unwrap();
        assert!(capture.is_empty());
        assert_eq!(capture.start_time(), 0);
        assert_eq!(capture.length_sec(), 0.0);
    }

    #[test]
    fn test_invalid_header() {
        assert!(matches!(
            Capture::from_bytes(b"this is not a capture file at all", None),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_truncated_record() {
        let mut data = make_pcap(&[(0, make_udp_packet([10, 0, 0, 1], 8808, 8808, b"abc"))]);
        data.truncate(data.len() - 10);

        assert!(matches!(
            Capture::from_bytes(&data, None),
            Err(Error::CorruptFile(_))
        ));
    }

    #[test]
    fn test_timestamps_backwards() {
        let data = make_pcap(&[
            (2_000_000, make_udp_packet([10, 0, 0, 1], 8808, 8808, b"a")),
            (1_000_000, make_udp_packet([10, 0, 0, 1], 8808, 8808, b"b")),
        ]);

        assert!(matches!(
            Capture::from_bytes(&data, None),
            Err(Error::CorruptFile(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Capture::from_file("/nonexistent/capture.pcap", None),
            Err(Error::Io(_))
        ));
    }
}
