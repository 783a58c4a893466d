// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! EdgeFirst Cepton Publisher Library
//!
//! This library turns the point stream of one or more Cepton LiDAR sensors
//! into timestamped Cartesian frames and routes each frame to a per-sensor
//! or combined output channel.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────┐     ┌──────────────────┐
//! │  UdpSource      │ ──► │  SensorFeed  │ ──► │  Pipeline        │
//! │  CaptureReplay  │     │  (codec)     │     │  (FeedListener)  │
//! └─────────────────┘     └──────────────┘     └──────────────────┘
//!                                │                     │
//!                                ▼                     ▼
//!                         SensorRegistry    FrameBuilder ─► OutputRouter
//!                                                               │
//!                                                               ▼
//!                                                     PointSink / InfoSink
//! ```
//!
//! Each points delivery becomes one [`frame::Frame`]: points are converted
//! from image coordinates, optionally corrected by the mounting transform,
//! and stamped with the latest point timestamp. The router resolves one sink
//! per frame, creating per-sensor sinks on first use.
//!
//! # Modules
//!
//! - [`lidar`]: Common types, sensor information and error handling
//! - [`transform`]: Image to Cartesian conversion and mounting transforms
//! - [`frame`]: Frame accumulation
//! - [`registry`]: Sensor registry
//! - [`router`]: Output channel naming and sink management
//! - [`codec`]: Sensor packet encoding and decoding
//! - [`feed`]: Packet to callback dispatch
//! - [`packet_source`]: Live UDP and test packet sources
//! - [`pcap_source`]: Capture file loading
//! - [`replay`]: Capture replay controller
//! - [`driver`]: Pipeline driver
//! - [`formats`]: PointCloud2 formatting
//!
//! # Example
//!
//! ```ignore
//! use edgefirst_ceptonpub::{
//!     driver::{Pipeline, PipelineConfig},
//!     feed::SensorFeed,
//!     registry::SensorRegistry,
//!     replay::CaptureReplay,
//! };
//!
//! let registry = Arc::new(SensorRegistry::new());
//! let pipeline = Pipeline::new(PipelineConfig::default(), registry.clone(), info_sink, factory)?;
//! let feed = Arc::new(SensorFeed::new(registry, Arc::new(pipeline)));
//!
//! let replay = CaptureReplay::new(feed);
//! replay.open("capture.pcap")?;
//! replay.resume_blocking(2.0)?;
//! ```

pub mod codec;
pub mod driver;
pub mod feed;
pub mod formats;
pub mod frame;
pub mod lidar;
pub mod packet_source;
pub mod pcap_source;
pub mod registry;
pub mod replay;
pub mod router;
pub mod transform;

// Re-exports for convenience
pub use driver::{Pipeline, PipelineConfig};
pub use feed::{FeedListener, SensorFeed};
pub use formats::PointFieldType;
pub use frame::{Frame, FrameBuilder, begin_frame};
pub use lidar::{Error, ErrorCode, RawPoint, SensorEvent, SensorHandle, SensorInfo};
pub use packet_source::PacketSource;
pub use pcap_source::Capture;
pub use registry::SensorRegistry;
pub use replay::{CaptureReplay, ReplayState};
pub use router::{InfoSink, OutputRouter, PointSink, RouterConfig, SinkFactory};
pub use transform::RigidTransform;
