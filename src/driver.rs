// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Pipeline driver: wires feed callbacks to frames, the registry and sinks.
//!
//! Every points delivery becomes exactly one published [`Frame`]. Frame
//! boundaries reported by the sensor are not used to split frames.

use crate::{
    feed::FeedListener,
    frame::begin_frame,
    lidar::{Error, ErrorCode, RawPoint, SensorEvent, SensorHandle, SensorInfo},
    registry::SensorRegistry,
    router::{InfoSink, OutputRouter, RouterConfig, SinkFactory},
    transform::RigidTransform,
};
use std::sync::Arc;
use tracing::{error, info, trace, warn};

/// Pipeline configuration, read once at startup.
#[derive(Clone, Debug, Default)]
pub struct PipelineConfig {
    pub router: RouterConfig,
    /// Mounting correction applied to every point.
    pub mount: Option<RigidTransform>,
}

/// Frame building and publishing for every sensor in the feed.
pub struct Pipeline {
    registry: Arc<SensorRegistry>,
    router: OutputRouter,
    info_sink: Arc<dyn InfoSink>,
    mount: Option<RigidTransform>,
}

impl Pipeline {
    /// Create the pipeline. Fails when the output channels cannot be set up,
    /// in which case nothing has been published.
    pub fn new(
        config: PipelineConfig,
        registry: Arc<SensorRegistry>,
        info_sink: Arc<dyn InfoSink>,
        factory: Box<dyn SinkFactory>,
    ) -> Result<Self, Error> {
        let router = OutputRouter::new(config.router, factory)?;
        Ok(Self {
            registry,
            router,
            info_sink,
            mount: config.mount.filter(|mount| !mount.is_identity()),
        })
    }

    pub fn registry(&self) -> &Arc<SensorRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &OutputRouter {
        &self.router
    }

    fn set_connected(&self, handle: SensorHandle, connected: bool) {
        if let Err(err) = self.registry.set_connected(handle, connected) {
            error!("cannot update sensor connectivity: {}", err);
        }
    }
}

impl FeedListener for Pipeline {
    fn on_points(&self, code: ErrorCode, handle: SensorHandle, points: &[RawPoint]) {
        if code.is_error() {
            warn!(handle = format_args!("{:#x}", handle), "points delivery failed: {}", code);
            return;
        }

        let info = match self.registry.lookup(handle) {
            Ok(info) => info,
            Err(err) => {
                error!("points from unregistered sensor dropped: {}", err);
                return;
            }
        };

        if let Err(err) = self.info_sink.publish(&info) {
            warn!(sensor = info.serial_number, "failed to publish sensor information: {}", err);
        }

        let name = info.name();
        let mut frame = begin_frame(name.as_str(), self.router.frame_label(&name), points.len())
            .with_transform(self.mount);
        frame.extend(points);
        let frame = frame.finish();

        trace!(
            sensor = %name,
            width = frame.width(),
            timestamp = frame.timestamp(),
            "frame"
        );

        let sink = match self.router.resolve_sink(&name) {
            Ok(sink) => sink,
            Err(err) => {
                error!(sensor = %name, "no output channel: {}", err);
                return;
            }
        };

        if let Err(err) = sink.publish(frame) {
            warn!(sensor = %name, "failed to publish frame: {}", err);
        }
    }

    fn on_sensor_event(
        &self,
        code: ErrorCode,
        handle: SensorHandle,
        info: &SensorInfo,
        event: SensorEvent,
    ) {
        if code.is_error() {
            warn!(handle = format_args!("{:#x}", handle), %event, "sensor event failed: {}", code);
            return;
        }

        match event {
            SensorEvent::Attach => {
                info!(
                    serial_number = info.serial_number,
                    model = %info.model_name,
                    firmware = %info.firmware_version,
                    mocked = info.flags.is_mocked,
                    "sensor attached"
                );
                self.registry.upsert(SensorInfo {
                    handle,
                    ..info.clone()
                });
                self.set_connected(handle, true);
            }
            SensorEvent::Detach => {
                info!(serial_number = info.serial_number, "sensor detached");
                self.registry.upsert(SensorInfo {
                    handle,
                    ..info.clone()
                });
                self.set_connected(handle, false);
            }
            SensorEvent::FrameBoundary => {
                trace!(serial_number = info.serial_number, "frame boundary");
            }
        }
    }
}
