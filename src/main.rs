// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod args;
mod sinks;

use args::Args;
use clap::Parser as _;
use edgefirst_ceptonpub::{
    driver::{Pipeline, PipelineConfig},
    feed::{SensorFeed, run_source},
    lidar::Error,
    packet_source::UdpSource,
    registry::SensorRegistry,
    replay::CaptureReplay,
};
use sinks::{ZenohInfoSink, ZenohSinkFactory};
use std::{sync::Arc, time::Duration};
use tokio::task::block_in_place;
use tracing::info;
use tracing_subscriber::{Layer as _, layer::SubscriberExt as _, util::SubscriberInitExt as _};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let stdout_log = tracing_subscriber::fmt::layer().with_filter(args.rust_log);
    let tracy = args.tracy.then(tracing_tracy::TracyLayer::default);
    tracing_subscriber::registry()
        .with(stdout_log)
        .with(tracy)
        .init();

    let session = zenoh::open(zenoh::Config::from(args.clone())).await?;
    info!("opened zenoh session");

    let router = args.router_config();
    let registry = Arc::new(SensorRegistry::new());
    let info_sink = Arc::new(ZenohInfoSink::new(&session, &router.info_channel_id())?);
    let pipeline = Pipeline::new(
        PipelineConfig {
            router,
            mount: args.mount(),
        },
        registry.clone(),
        info_sink,
        Box::new(ZenohSinkFactory::new(session.clone())),
    )?;
    let feed = Arc::new(SensorFeed::new(registry, Arc::new(pipeline)));

    if args.capture.is_empty() {
        live(&args, &feed).await?;
    } else {
        replay(&args, feed).await?;
    }

    session.close().await?;
    Ok(())
}

async fn live(args: &Args, feed: &SensorFeed) -> Result<(), Error> {
    let sensor_timeout = Duration::try_from_secs_f32(args.sensor_timeout).map_err(|_| {
        Error::Config(format!("invalid sensor timeout {}", args.sensor_timeout))
    })?;

    let mut source = UdpSource::bind(&format!("0.0.0.0:{}", args.port)).await?;
    info!("listening for sensors on {}", source.local_addr()?);

    tokio::select! {
        result = run_source(&mut source, feed, sensor_timeout) => result?,
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }

    feed.detach_all();
    Ok(())
}

async fn replay(args: &Args, feed: Arc<SensorFeed>) -> Result<(), Error> {
    let replay = CaptureReplay::new(feed);
    // Control calls wait on the playback thread.
    block_in_place(|| {
        replay.open(&args.capture)?;
        replay.set_enable_loop(args.replay_loop)?;
        replay.set_speed(args.replay_speed)?;
        replay.resume()
    })?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut check = tokio::time::interval(Duration::from_millis(100));

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("shutting down");
                break;
            }
            _ = check.tick() => {
                if !block_in_place(|| replay.is_running()) {
                    info!("capture finished");
                    break;
                }
            }
        }
    }

    block_in_place(|| replay.close())
}
