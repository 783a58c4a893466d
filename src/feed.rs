// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Sensor feed: turns raw packets into point and lifecycle callbacks.
//!
//! The same feed serves live UDP capture and capture replay. Packets from a
//! single sender are delivered in order by one thread, so callbacks for a
//! given handle are never re-entrant.
//!
//! ```text
//! ┌──────────────┐        ┌────────────┐        ┌──────────────────┐
//! │ UdpSource /  │ bytes  │ SensorFeed │ events │ FeedListener     │
//! │ CaptureReplay│ ─────► │ (codec)    │ ─────► │ (Pipeline)       │
//! └──────────────┘        └────────────┘        └──────────────────┘
//!                               │ upsert
//!                               ▼
//!                         SensorRegistry
//! ```

use crate::{
    codec::{self, Packet},
    lidar::{Error, ErrorCode, RawPoint, SensorEvent, SensorHandle, SensorInfo},
    packet_source::PacketSource,
    registry::SensorRegistry,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};
use tracing::{debug, trace, warn};

/// Receives decoded deliveries from a [`SensorFeed`].
///
/// A non-success `code` means the delivery failed; the remaining arguments
/// are then only informational.
pub trait FeedListener: Send + Sync {
    fn on_points(&self, code: ErrorCode, handle: SensorHandle, points: &[RawPoint]);

    fn on_sensor_event(
        &self,
        code: ErrorCode,
        handle: SensorHandle,
        info: &SensorInfo,
        event: SensorEvent,
    );
}

/// Decodes sensor packets and dispatches them to a [`FeedListener`].
pub struct SensorFeed {
    registry: Arc<SensorRegistry>,
    listener: Arc<dyn FeedListener>,
    last_seen: Mutex<HashMap<SensorHandle, Instant>>,
}

impl SensorFeed {
    pub fn new(registry: Arc<SensorRegistry>, listener: Arc<dyn FeedListener>) -> Self {
        Self {
            registry,
            listener,
            last_seen: Mutex::new(HashMap::new()),
        }
    }

    fn last_seen(&self) -> MutexGuard<'_, HashMap<SensorHandle, Instant>> {
        self.last_seen.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Latest information reported by `handle`.
    pub fn sensor_info(&self, handle: SensorHandle) -> Result<SensorInfo, Error> {
        self.registry.lookup(handle)
    }

    /// Number of sensors currently considered attached.
    pub fn attached(&self) -> usize {
        self.last_seen().len()
    }

    /// Process one packet received from `handle`.
    ///
    /// The first information packet from a handle attaches the sensor.
    /// Decode failures are reported through `on_points` with an error code.
    pub fn receive(&self, handle: SensorHandle, data: &[u8]) {
        match codec::decode(data) {
            Ok(Packet::Info(mut info)) => {
                info.handle = handle;
                info.flags.is_mocked |= handle & crate::lidar::HANDLE_FLAG_MOCK != 0;
                self.registry.upsert(info.clone());

                let attached = self.last_seen().insert(handle, Instant::now()).is_none();
                if attached {
                    debug!(handle = format_args!("{:#x}", handle), "sensor attached");
                    self.listener
                        .on_sensor_event(ErrorCode::Success, handle, &info, SensorEvent::Attach);
                }
            }
            Ok(Packet::Points {
                points,
                end_of_frame,
            }) => {
                if let Some(seen) = self.last_seen().get_mut(&handle) {
                    *seen = Instant::now();
                }

                trace!(
                    handle = format_args!("{:#x}", handle),
                    n_points = points.len(),
                    "points packet"
                );
                self.listener.on_points(ErrorCode::Success, handle, &points);

                if end_of_frame {
                    if let Ok(info) = self.registry.lookup(handle) {
                        self.listener.on_sensor_event(
                            ErrorCode::Success,
                            handle,
                            &info,
                            SensorEvent::FrameBoundary,
                        );
                    }
                }
            }
            Err(err) => {
                warn!(
                    handle = format_args!("{:#x}", handle),
                    "dropping packet: {}", err
                );
                self.listener.on_points(ErrorCode::from(&err), handle, &[]);
            }
        }
    }

    /// Detach sensors that have been silent for longer than `timeout`.
    pub fn detach_stale(&self, timeout: Duration) -> usize {
        let now = Instant::now();
        let stale: Vec<_> = {
            let mut last_seen = self.last_seen();
            let stale: Vec<_> = last_seen
                .iter()
                .filter(|(_, seen)| now.duration_since(**seen) > timeout)
                .map(|(handle, _)| *handle)
                .collect();
            for handle in &stale {
                last_seen.remove(handle);
            }
            stale
        };

        for &handle in &stale {
            self.detach(handle);
        }
        stale.len()
    }

    /// Detach every attached sensor, used when a capture closes.
    pub fn detach_all(&self) -> usize {
        let mut handles: Vec<_> = self.last_seen().drain().map(|(handle, _)| handle).collect();
        handles.sort_unstable();

        for &handle in &handles {
            self.detach(handle);
        }
        handles.len()
    }

    fn detach(&self, handle: SensorHandle) {
        match self.registry.lookup(handle) {
            Ok(info) => {
                self.listener
                    .on_sensor_event(ErrorCode::Success, handle, &info, SensorEvent::Detach)
            }
            Err(err) => warn!("cannot detach: {}", err),
        }
    }
}

/// Feed every packet from `source` into `feed` until the source is
/// exhausted, detaching sensors silent for longer than `sensor_timeout`.
pub async fn run_source<S: PacketSource>(
    source: &mut S,
    feed: &SensorFeed,
    sensor_timeout: Duration,
) -> Result<(), Error> {
    let mut buf = vec![0u8; 64 * 1024];
    let mut check = tokio::time::interval(sensor_timeout.max(Duration::from_millis(10)));

    while source.has_more() {
        tokio::select! {
            received = source.recv(&mut buf) => {
                let (len, handle) = received?;
                feed.receive(handle, &buf[..len]);
            }
            _ = check.tick() => {
                let detached = feed.detach_stale(sensor_timeout);
                if detached > 0 {
                    debug!(detached, "detached silent sensors");
                }
            }
        }
    }

    Ok(())
}
