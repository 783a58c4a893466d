// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Output channel naming and per-sensor sink management.
//!
//! In combine mode every sensor publishes to one shared channel and frame
//! label. Otherwise each sensor gets its own channel, created the first time
//! a frame from that sensor is routed:
//!
//! ```text
//!                      combine_sensors = true     combine_sensors = false
//! points channel id    <ns>_points                <ns>_points_<sensor>
//! frame label          <ns>                       <ns>_<sensor>
//! ```

use crate::{
    frame::Frame,
    lidar::{Error, SensorInfo},
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tracing::info;

/// Destination for completed frames.
pub trait PointSink: Send + Sync {
    /// Publish a frame. The frame's label carries its coordinate frame.
    fn publish(&self, frame: Frame) -> Result<(), Error>;
}

/// Destination for sensor information snapshots.
pub trait InfoSink: Send + Sync {
    fn publish(&self, info: &SensorInfo) -> Result<(), Error>;
}

/// Creates point sinks for channels discovered at runtime.
pub trait SinkFactory: Send + Sync {
    fn create_point_sink(&self, channel_id: &str) -> Result<Arc<dyn PointSink>, Error>;
}

/// Naming configuration, fixed for the lifetime of the process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouterConfig {
    pub combine_sensors: bool,
    pub output_namespace: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            combine_sensors: false,
            output_namespace: "cepton".to_string(),
        }
    }
}

impl RouterConfig {
    /// Channel id that frames from `sensor_name` are published on.
    pub fn points_channel_id(&self, sensor_name: &str) -> String {
        if self.combine_sensors {
            format!("{}_points", self.output_namespace)
        } else {
            format!("{}_points_{}", self.output_namespace, sensor_name)
        }
    }

    /// Coordinate frame label carried by frames from `sensor_name`.
    pub fn frame_label(&self, sensor_name: &str) -> String {
        if self.combine_sensors {
            self.output_namespace.clone()
        } else {
            format!("{}_{}", self.output_namespace, sensor_name)
        }
    }

    /// Channel id for sensor information snapshots.
    pub fn info_channel_id(&self) -> String {
        format!("{}_sensor_information", self.output_namespace)
    }
}

/// Resolves exactly one sink per frame.
pub struct OutputRouter {
    config: RouterConfig,
    factory: Box<dyn SinkFactory>,
    combined: Option<Arc<dyn PointSink>>,
    sinks: Mutex<HashMap<String, Arc<dyn PointSink>>>,
}

impl OutputRouter {
    /// Create the router. In combine mode the shared sink is created here, so
    /// a factory failure surfaces at startup.
    pub fn new(config: RouterConfig, factory: Box<dyn SinkFactory>) -> Result<Self, Error> {
        if config.output_namespace.is_empty() {
            return Err(Error::Config("output namespace is empty".to_string()));
        }

        let combined = if config.combine_sensors {
            let channel_id = config.points_channel_id("");
            info!(channel = %channel_id, "created combined points channel");
            Some(factory.create_point_sink(&channel_id)?)
        } else {
            None
        };

        Ok(Self {
            config,
            factory,
            combined,
            sinks: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn points_channel_id(&self, sensor_name: &str) -> String {
        self.config.points_channel_id(sensor_name)
    }

    pub fn frame_label(&self, sensor_name: &str) -> String {
        self.config.frame_label(sensor_name)
    }

    /// Sink for frames from `sensor_name`, creating it on first use.
    ///
    /// Lookup and creation happen under one lock so concurrent first
    /// deliveries from the same sensor share a single sink.
    pub fn resolve_sink(&self, sensor_name: &str) -> Result<Arc<dyn PointSink>, Error> {
        if let Some(combined) = &self.combined {
            return Ok(combined.clone());
        }

        let mut sinks = self.sinks.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(sink) = sinks.get(sensor_name) {
            return Ok(sink.clone());
        }

        let channel_id = self.config.points_channel_id(sensor_name);
        let sink = self.factory.create_point_sink(&channel_id)?;
        info!(sensor = sensor_name, channel = %channel_id, "created points channel");
        sinks.insert(sensor_name.to_string(), sink.clone());
        Ok(sink)
    }

    /// Number of point sinks created so far.
    pub fn channel_count(&self) -> usize {
        match self.combined {
            Some(_) => 1,
            None => self.sinks.lock().unwrap_or_else(|e| e.into_inner()).len(),
        }
    }
}
