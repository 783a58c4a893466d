// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Packet source abstraction for the live sensor feed.
//!
//! This module provides a [`PacketSource`] trait that abstracts where sensor
//! packets come from, enabling:
//!
//! - **Live operation**: Reading from UDP sockets
//! - **Testing**: Replaying pre-recorded packets
//!
//! Every packet is tagged with the [`SensorHandle`] of its sender, derived
//! from the source address.
//!
//! # Example
//!
//! ```ignore
//! use edgefirst_ceptonpub::packet_source::{PacketSource, UdpSource};
//!
//! let mut source = UdpSource::bind("0.0.0.0:8808").await?;
//!
//! let mut buf = [0u8; 65536];
//! while source.has_more() {
//!     let (len, handle) = source.recv(&mut buf).await?;
//!     feed.receive(handle, &buf[..len]);
//! }
//! ```

use crate::lidar::{Error, SensorHandle};
use std::{future::Future, net::IpAddr, pin::Pin};

/// Trait for packet sources.
///
/// Implementations provide packets from various sources (UDP, test data).
pub trait PacketSource: Send {
    /// Receive the next packet into the provided buffer.
    ///
    /// # Returns
    /// - `Ok((len, handle))` - Number of bytes received and the sender
    /// - `Err` - I/O or source error
    fn recv<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(usize, SensorHandle), Error>> + Send + 'a>>;

    /// Check if more packets are available.
    ///
    /// For infinite sources (like UDP), always returns `true`.
    /// For finite sources, returns `false` when exhausted.
    fn has_more(&self) -> bool;
}

/// Sensor handle for a sender address.
///
/// IPv4 senders map to their 32-bit address, IPv6 senders to the low 64
/// bits of theirs.
pub fn handle_from_ip(ip: IpAddr) -> SensorHandle {
    match ip {
        IpAddr::V4(ip) => u32::from(ip) as SensorHandle,
        IpAddr::V6(ip) => match ip.to_ipv4_mapped() {
            Some(ip) => u32::from(ip) as SensorHandle,
            None => u128::from(ip) as SensorHandle,
        },
    }
}

/// UDP socket packet source for live sensor operation.
pub struct UdpSource {
    socket: tokio::net::UdpSocket,
}

impl UdpSource {
    /// Create a new UDP source from an existing socket.
    pub fn new(socket: tokio::net::UdpSocket) -> Self {
        Self { socket }
    }

    /// Bind to an address and create a UDP source.
    pub async fn bind(addr: &str) -> Result<Self, Error> {
        let socket = tokio::net::UdpSocket::bind(addr).await?;
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr, Error> {
        Ok(self.socket.local_addr()?)
    }
}

impl PacketSource for UdpSource {
    fn recv<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(usize, SensorHandle), Error>> + Send + 'a>> {
        Box::pin(async move {
            let (len, addr) = self.socket.recv_from(buf).await?;
            Ok((len, handle_from_ip(addr.ip())))
        })
    }

    fn has_more(&self) -> bool {
        true // UDP sources are infinite
    }
}

/// Test packet source for unit testing.
///
/// Provides a sequence of pre-defined packets, each tagged with a sender
/// handle, for testing feed logic without hardware.
pub struct TestSource {
    packets: Vec<(SensorHandle, Vec<u8>)>,
    index: usize,
}

impl TestSource {
    /// Create a new test source with the given packets.
    pub fn new(packets: Vec<(SensorHandle, Vec<u8>)>) -> Self {
        Self { packets, index: 0 }
    }

    /// Create an empty test source.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Reset the source to the beginning.
    pub fn reset(&mut self) {
        self.index = 0;
    }

    /// Get the number of packets.
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Get the current index.
    pub fn current_index(&self) -> usize {
        self.index
    }
}

impl PacketSource for TestSource {
    fn recv<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(usize, SensorHandle), Error>> + Send + 'a>> {
        Box::pin(async move {
            if self.index >= self.packets.len() {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "no more packets",
                )));
            }

            let (handle, packet) = &self.packets[self.index];
            let len = packet.len().min(buf.len());
            buf[..len].copy_from_slice(&packet[..len]);
            self.index += 1;
            Ok((len, *handle))
        })
    }

    fn has_more(&self) -> bool {
        self.index < self.packets.len()
    }
}
