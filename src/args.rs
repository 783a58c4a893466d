// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use edgefirst_ceptonpub::{router::RouterConfig, transform::RigidTransform};
use serde_json::json;
use tracing::level_filters::LevelFilter;
use zenoh::config::{Config, WhatAmI};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Replay a pcap or pcapng capture instead of listening for live
    /// sensors.  Leave empty for live operation.
    #[arg(long, env, default_value = "")]
    pub capture: String,

    /// Publish every sensor on one shared points channel and frame.
    #[arg(long, env)]
    pub combine_sensors: bool,

    /// Prefix of the published channel names and frame labels.
    #[arg(long, env, default_value = "cepton")]
    pub output_namespace: String,

    /// UDP port the sensors stream to.
    #[arg(long, env, default_value = "8808")]
    pub port: u16,

    /// Seconds without packets before a live sensor is detached.
    #[arg(long, env, default_value = "2.0")]
    pub sensor_timeout: f32,

    /// Restart the capture when it reaches the end.
    #[arg(long, env)]
    pub replay_loop: bool,

    /// Capture replay speed multiplier.
    #[arg(long, env, default_value = "1.0")]
    pub replay_speed: f32,

    /// Mounting translation applied to every point
    #[arg(
        long,
        env,
        default_value = "0 0 0",
        value_delimiter = ' ',
        num_args = 3
    )]
    pub tf_vec: Vec<f32>,

    /// Mounting rotation quaternion (x y z w) applied to every point
    #[arg(
        long,
        env,
        default_value = "0 0 0 1",
        value_delimiter = ' ',
        num_args = 4
    )]
    pub tf_quat: Vec<f32>,

    /// Application log level
    #[arg(long, env, default_value = "info")]
    pub rust_log: LevelFilter,

    /// Enable Tracy profiler broadcast
    #[arg(long, env)]
    pub tracy: bool,

    /// zenoh connection mode
    #[arg(long, env, default_value = "peer")]
    mode: WhatAmI,

    /// connect to zenoh endpoints
    #[arg(long, env)]
    connect: Vec<String>,

    /// listen to zenoh endpoints
    #[arg(long, env)]
    listen: Vec<String>,

    /// disable zenoh multicast scouting
    #[arg(long, env)]
    no_multicast_scouting: bool,
}

impl Args {
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            combine_sensors: self.combine_sensors,
            output_namespace: self.output_namespace.clone(),
        }
    }

    /// Mounting transform, `None` when the arguments are the identity.
    pub fn mount(&self) -> Option<RigidTransform> {
        let translation = [self.tf_vec[0], self.tf_vec[1], self.tf_vec[2]];
        let rotation = [
            self.tf_quat[0],
            self.tf_quat[1],
            self.tf_quat[2],
            self.tf_quat[3],
        ];
        Some(RigidTransform::compile(translation, rotation)).filter(|tf| !tf.is_identity())
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        let mut config = Config::default();

        config
            .insert_json5("mode", &json!(args.mode).to_string())
            .unwrap();

        if !args.connect.is_empty() {
            config
                .insert_json5("connect/endpoints", &json!(args.connect).to_string())
                .unwrap();
        }

        if !args.listen.is_empty() {
            config
                .insert_json5("listen/endpoints", &json!(args.listen).to_string())
                .unwrap();
        }

        if args.no_multicast_scouting {
            config
                .insert_json5("scouting/multicast/enabled", &json!(false).to_string())
                .unwrap();
        }

        config
            .insert_json5("scouting/multicast/interface", &json!("lo").to_string())
            .unwrap();

        config
    }
}
