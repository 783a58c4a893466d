// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! End-to-end tests: capture file → feed → pipeline → sinks.

mod common;

use common::{PcapBuilder, RecordingFactory, RecordingInfoSink, TempCapture, point};
use edgefirst_ceptonpub::{
    CaptureReplay, Pipeline, PipelineConfig, RouterConfig, SensorFeed, SensorRegistry,
    lidar::HANDLE_FLAG_MOCK,
};
use std::sync::Arc;

struct Harness {
    factory_published: common::Published,
    channels: Arc<std::sync::Mutex<Vec<String>>>,
    infos: Arc<RecordingInfoSink>,
    registry: Arc<SensorRegistry>,
    replay: CaptureReplay,
}

fn harness(combine_sensors: bool) -> Harness {
    let factory = RecordingFactory::default();
    let factory_published = factory.published.clone();
    let channels = factory.channels.clone();
    let infos = Arc::new(RecordingInfoSink::default());
    let registry = Arc::new(SensorRegistry::new());

    let pipeline = Pipeline::new(
        PipelineConfig {
            router: RouterConfig {
                combine_sensors,
                output_namespace: "lidar".to_string(),
            },
            mount: None,
        },
        registry.clone(),
        infos.clone(),
        Box::new(factory),
    )
    .expect("pipeline");

    let feed = Arc::new(SensorFeed::new(registry.clone(), Arc::new(pipeline)));
    Harness {
        factory_published,
        channels,
        infos,
        registry,
        replay: CaptureReplay::new(feed),
    }
}

#[test]
fn test_single_sensor_frame() {
    let capture = TempCapture::new(
        &PcapBuilder::new()
            .info(1_000_000, [10, 0, 0, 1], 12345)
            .points(1_100_000, [10, 0, 0, 1], &[point(100), point(300), point(200)])
            .build(),
    );

    let h = harness(false);
    h.replay.open(&capture.path).unwrap();
    h.replay.resume_blocking(1.0).unwrap();

    let handle = 0x0a00_0001 | HANDLE_FLAG_MOCK;
    assert!(h.registry.is_connected(handle));
    assert!(h.registry.lookup(handle).unwrap().flags.is_mocked);

    {
        let published = h.factory_published.lock().unwrap();
        assert_eq!(published.len(), 1);

        let (channel_id, frame) = &published[0];
        assert_eq!(channel_id, "lidar_points_12345");
        assert_eq!(frame.frame_label(), "lidar_12345");
        assert_eq!(frame.timestamp(), 300);
        assert_eq!(frame.width(), 3);
        assert_eq!(frame.height(), 1);

        for p in frame.points() {
            let distance = (p.x * p.x + p.y * p.y + p.z * p.z).sqrt();
            assert!((distance - 12.0).abs() < 1e-4);
        }
    }

    assert_eq!(*h.infos.serial_numbers.lock().unwrap(), vec![12345]);

    h.replay.close().unwrap();
    assert!(!h.registry.is_connected(handle));
    // Detached sensors stay known.
    assert_eq!(h.registry.lookup(handle).unwrap().serial_number, 12345);
}

#[test]
fn test_combined_sensors_share_channel() {
    let capture = TempCapture::new(
        &PcapBuilder::new()
            .info(1_000_000, [10, 0, 0, 1], 12345)
            .info(1_000_100, [10, 0, 0, 2], 67890)
            .points(1_100_000, [10, 0, 0, 1], &[point(100), point(300), point(200)])
            .points(1_100_100, [10, 0, 0, 2], &[point(150)])
            .build(),
    );

    let h = harness(true);
    // Shared channel exists before any data.
    assert_eq!(*h.channels.lock().unwrap(), vec!["lidar_points".to_string()]);

    h.replay.open(&capture.path).unwrap();
    h.replay.resume_blocking(1.0).unwrap();

    let published = h.factory_published.lock().unwrap();
    assert_eq!(published.len(), 2);
    for (channel_id, frame) in published.iter() {
        assert_eq!(channel_id, "lidar_points");
        assert_eq!(frame.frame_label(), "lidar");
    }
    assert_eq!(published[0].1.sensor_name(), "12345");
    assert_eq!(published[1].1.sensor_name(), "67890");
    assert_eq!(published[1].1.timestamp(), 150);
    assert_eq!(h.channels.lock().unwrap().len(), 1);
}

#[test]
fn test_per_sensor_channels() {
    let capture = TempCapture::new(
        &PcapBuilder::new()
            .info(1_000_000, [10, 0, 0, 1], 12345)
            .info(1_000_100, [10, 0, 0, 2], 67890)
            .points(1_100_000, [10, 0, 0, 1], &[point(1)])
            .points(1_100_100, [10, 0, 0, 2], &[point(2)])
            .points(1_200_000, [10, 0, 0, 1], &[point(3)])
            .build(),
    );

    let h = harness(false);
    h.replay.open(&capture.path).unwrap();
    h.replay.resume_blocking(1.0).unwrap();

    assert_eq!(
        *h.channels.lock().unwrap(),
        vec![
            "lidar_points_12345".to_string(),
            "lidar_points_67890".to_string()
        ]
    );
    assert_eq!(h.factory_published.lock().unwrap().len(), 3);
    // Information republished with every delivery.
    assert_eq!(
        *h.infos.serial_numbers.lock().unwrap(),
        vec![12345, 67890, 12345]
    );
}

#[test]
fn test_points_before_info_dropped() {
    let capture = TempCapture::new(
        &PcapBuilder::new()
            .points(1_000_000, [10, 0, 0, 1], &[point(1)])
            .info(1_100_000, [10, 0, 0, 1], 12345)
            .points(1_200_000, [10, 0, 0, 1], &[point(2)])
            .build(),
    );

    let h = harness(false);
    h.replay.open(&capture.path).unwrap();
    h.replay.resume_blocking(1.0).unwrap();

    let published = h.factory_published.lock().unwrap();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].1.timestamp(), 2);
}
