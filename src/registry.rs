// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Sensor registry shared by the feed and the pipeline.
//!
//! Sensors are remembered for the lifetime of the registry. A detach only
//! clears the connected flag; the metadata stays available so late point
//! deliveries and status queries still resolve.

use crate::lidar::{Error, SensorHandle, SensorInfo};
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

#[derive(Debug)]
struct Entry {
    info: SensorInfo,
    connected: bool,
}

/// Handle → sensor metadata map guarded by a single lock.
#[derive(Debug, Default)]
pub struct SensorRegistry {
    sensors: Mutex<HashMap<SensorHandle, Entry>>,
}

impl SensorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn sensors(&self) -> MutexGuard<'_, HashMap<SensorHandle, Entry>> {
        // Entries are plain data, a panic elsewhere cannot leave them torn.
        self.sensors.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert or overwrite the metadata for `info.handle`.
    ///
    /// The connected flag of an existing entry is preserved; new entries
    /// start disconnected until an attach is observed.
    pub fn upsert(&self, info: SensorInfo) {
        let mut sensors = self.sensors();
        match sensors.get_mut(&info.handle) {
            Some(entry) => entry.info = info,
            None => {
                sensors.insert(
                    info.handle,
                    Entry {
                        info,
                        connected: false,
                    },
                );
            }
        }
    }

    /// Snapshot of the metadata for `handle`.
    pub fn lookup(&self, handle: SensorHandle) -> Result<SensorInfo, Error> {
        self.sensors()
            .get(&handle)
            .map(|entry| entry.info.clone())
            .ok_or(Error::SensorNotFound(handle))
    }

    /// Update connectivity for a known sensor.
    pub fn set_connected(&self, handle: SensorHandle, connected: bool) -> Result<(), Error> {
        match self.sensors().get_mut(&handle) {
            Some(entry) => {
                entry.connected = connected;
                Ok(())
            }
            None => Err(Error::SensorNotFound(handle)),
        }
    }

    pub fn is_connected(&self, handle: SensorHandle) -> bool {
        self.sensors()
            .get(&handle)
            .map(|entry| entry.connected)
            .unwrap_or(false)
    }

    /// Stable channel name of a sensor.
    pub fn name_of(info: &SensorInfo) -> String {
        info.name()
    }

    /// Handles of every sensor seen so far, sorted.
    pub fn handles(&self) -> Vec<SensorHandle> {
        let mut handles: Vec<_> = self.sensors().keys().copied().collect();
        handles.sort_unstable();
        handles
    }

    pub fn len(&self) -> usize {
        self.sensors().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors().is_empty()
    }
}
