// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use std::{fmt, net::IpAddr, path::PathBuf, time::Duration};

use clap::{Parser, ValueEnum};
use locpub::{
    broadcast::BroadcastConfig,
    common::hostname,
    geometry::{Point, SpatialReference},
    gpsd::DEFAULT_GPSD_ADDRESS,
};
use tracing::level_filters::LevelFilter;

/// Where live locations come from when no `--location` is given.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LocationSource {
    /// No live source, only the explicit `--location`.
    None,
    /// Device position from the gpsd daemon.
    Gpsd,
    /// Replay of a recorded GPX track log.
    Gpx,
}

impl fmt::Display for LocationSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LocationSource::None => write!(f, "none"),
            LocationSource::Gpsd => write!(f, "gpsd"),
            LocationSource::Gpx => write!(f, "gpx"),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// GeoMessage type of the location reports. An empty type disables
    /// broadcasting.
    #[arg(long, env, default_value = "position_report")]
    pub message_type: String,

    /// Destination UDP port of the location reports.
    #[arg(long, env, default_value = "45678")]
    pub udp_port: u16,

    /// Destination address, broadcast, multicast or unicast.
    #[arg(long, env, default_value = "255.255.255.255")]
    pub address: IpAddr,

    /// Interval between two location reports in milliseconds.
    #[arg(long, env, default_value = "3000", value_parser = clap::value_parser!(u64).range(1..))]
    pub frequency: u64,

    /// Start with broadcasting disabled.
    #[arg(long, env)]
    pub disabled: bool,

    /// Explicit location "X Y [Z]" in the --wkid spatial reference. Setting a
    /// location turns off following the live source.
    #[arg(long, env, value_delimiter = ' ', num_args = 2..=3, allow_negative_numbers = true)]
    pub location: Option<Vec<f64>>,

    /// Well-known ID of the spatial reference of --location.
    #[arg(long, env, default_value = "4326")]
    pub wkid: u32,

    /// Live location source.
    #[arg(long, env, default_value = "none")]
    pub source: LocationSource,

    /// GPX track log replayed by the gpx source.
    #[arg(long, env, required_if_eq("source", "gpx"))]
    pub gpx_file: Option<PathBuf>,

    /// gpsd address used by the gpsd source.
    #[arg(long, env, default_value = DEFAULT_GPSD_ADDRESS)]
    pub gpsd: String,

    /// Track replay update interval in milliseconds.
    #[arg(long, env, default_value = "500", value_parser = clap::value_parser!(u64).range(1..))]
    pub update_interval: u64,

    /// Track replay speed up.
    #[arg(long, env, default_value = "1", value_parser = clap::value_parser!(u32).range(1..))]
    pub playback_multiplier: u32,

    /// Unique designation of this unit, defaults to the host name.
    #[arg(long, env)]
    pub designation: Option<String>,

    /// Report this unit as in distress.
    #[arg(long, env)]
    pub in_distress: bool,

    /// Read control commands from stdin.
    #[arg(long, env)]
    pub console: bool,

    /// Application log level
    #[arg(long, env, default_value = "info")]
    pub rust_log: LevelFilter,

    /// Enable Tracy profiler broadcast
    #[arg(long, env)]
    pub tracy: bool,
}

impl Args {
    pub fn spatial_reference(&self) -> SpatialReference {
        SpatialReference::new(self.wkid)
    }

    pub fn location(&self) -> Option<Point> {
        let sr = self.spatial_reference();
        match self.location.as_deref()? {
            [x, y] => Some(Point::new(*x, *y, sr)),
            [x, y, z] => Some(Point::with_z(*x, *y, *z, sr)),
            _ => None,
        }
    }
}

impl From<&Args> for BroadcastConfig {
    fn from(args: &Args) -> Self {
        let location = args.location();

        BroadcastConfig {
            enabled: !args.disabled,
            message_type: args.message_type.clone(),
            udp_port: Some(args.udp_port),
            frequency: Duration::from_millis(args.frequency),
            use_current_location: location.is_none() && args.source != LocationSource::None,
            location,
            in_distress: args.in_distress,
            designation: args.designation.clone().unwrap_or_else(hostname),
        }
    }
}
