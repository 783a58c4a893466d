// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Zenoh backed output sinks.

use edgefirst_ceptonpub::{
    formats::{POINT_CLOUD_SCHEMA, encode_point_cloud},
    frame::Frame,
    lidar::{Error, SensorInfo},
    router::{InfoSink, PointSink, SinkFactory},
};
use std::sync::Arc;
use tracing::{debug, error};
use zenoh::{
    Session, Wait,
    bytes::{Encoding, ZBytes},
    pubsub::Publisher,
    qos::{CongestionControl, Priority},
};

/// Topic of a channel id.
fn topic(channel_id: &str) -> String {
    format!("rt/{}", channel_id)
}

fn declare(
    session: &Session,
    channel_id: &str,
    priority: Priority,
) -> Result<Publisher<'static>, Error> {
    let topic = topic(channel_id);
    match session
        .declare_publisher(topic.clone())
        .priority(priority)
        .congestion_control(CongestionControl::Drop)
        .wait()
    {
        Ok(publisher) => {
            debug!("declared publisher {}", topic);
            Ok(publisher)
        }
        Err(e) => {
            error!("Failed to create publisher {}: {:?}", topic, e);
            Err(Error::Sink(format!("{}: {}", topic, e)))
        }
    }
}

/// Publishes frames as CDR encoded `sensor_msgs/PointCloud2`.
pub struct ZenohPointSink {
    publisher: Publisher<'static>,
    encoding: Encoding,
}

impl PointSink for ZenohPointSink {
    fn publish(&self, frame: Frame) -> Result<(), Error> {
        let msg = encode_point_cloud(&frame).map_err(|e| Error::Sink(e.to_string()))?;
        self.publisher
            .put(ZBytes::from(msg))
            .encoding(self.encoding.clone())
            .wait()
            .map_err(|e| Error::Sink(e.to_string()))
    }
}

/// Publishes sensor information as JSON.
pub struct ZenohInfoSink {
    publisher: Publisher<'static>,
}

impl ZenohInfoSink {
    pub fn new(session: &Session, channel_id: &str) -> Result<Self, Error> {
        Ok(Self {
            publisher: declare(session, channel_id, Priority::Background)?,
        })
    }
}

impl InfoSink for ZenohInfoSink {
    fn publish(&self, info: &SensorInfo) -> Result<(), Error> {
        let msg = serde_json::to_vec(info).map_err(|e| Error::Sink(e.to_string()))?;
        self.publisher
            .put(ZBytes::from(msg))
            .encoding(Encoding::APPLICATION_JSON)
            .wait()
            .map_err(|e| Error::Sink(e.to_string()))
    }
}

/// Declares a point cloud publisher per channel.
pub struct ZenohSinkFactory {
    session: Session,
}

impl ZenohSinkFactory {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

impl SinkFactory for ZenohSinkFactory {
    fn create_point_sink(&self, channel_id: &str) -> Result<Arc<dyn PointSink>, Error> {
        Ok(Arc::new(ZenohPointSink {
            publisher: declare(&self.session, channel_id, Priority::DataHigh)?,
            encoding: Encoding::APPLICATION_CDR.with_schema(POINT_CLOUD_SCHEMA),
        }))
    }
}
