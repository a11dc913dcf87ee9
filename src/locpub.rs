// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod args;

use args::{Args, LocationSource};
use clap::Parser;
use kanal::AsyncReceiver;
use locpub::{
    broadcast::{self, BroadcastConfig, BroadcastEvent, LocationBroadcast},
    control::run_console,
    gpsd,
    live::LocationFeed,
    net::UdpMessageSender,
    track::TrackReplay,
};
use std::time::Duration;
use tracing::{debug, error, info, info_span, Instrument};
use tracing_subscriber::{layer::SubscriberExt as _, Layer as _, Registry};
use tracy_client::frame_mark;

#[cfg(feature = "profiling")]
#[global_allocator]
static GLOBAL: tracy_client::ProfiledAllocator<std::alloc::System> =
    tracy_client::ProfiledAllocator::new(std::alloc::System, 100);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    args.tracy.then(tracy_client::Client::start);

    let stdout_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_filter(args.rust_log);

    let journald = match tracing_journald::layer() {
        Ok(journald) => Some(journald.with_filter(args.rust_log)),
        Err(_) => None,
    };

    let tracy = match args.tracy {
        true => Some(tracing_tracy::TracyLayer::default().with_filter(args.rust_log)),
        false => None,
    };

    let subscriber = Registry::default()
        .with(stdout_log)
        .with(journald)
        .with(tracy);
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
    tracing_log::LogTracer::init()?;

    let feed = LocationFeed::new();
    spawn_source(&args, feed.clone())?;

    let config = BroadcastConfig::from(&args);
    info!(
        "location broadcast: enabled={} type={:?} destination={}:{} frequency={:?} source={} designation={}",
        config.enabled,
        config.message_type,
        args.address,
        args.udp_port,
        config.frequency,
        args.source,
        config.designation,
    );

    let sender = UdpMessageSender::bind(args.address).await?;
    let mut broadcast = LocationBroadcast::new(config, sender, feed)?;
    tokio::spawn(log_events(broadcast.subscribe(), args.tracy));

    let (handle, requests) = broadcast::channel();
    let task = tokio::spawn(broadcast.run(requests));

    let console = args.console.then(|| {
        let handle = handle.clone();
        let spatial_reference = args.spatial_reference();
        tokio::spawn(async move {
            if let Err(err) = run_console(tokio::io::stdin(), handle, spatial_reference).await {
                error!("control console error: {}", err);
            }
        })
    });

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    if let Some(console) = console {
        console.abort();
    }
    drop(handle);

    let broadcast = task.await?;
    let stats = broadcast.sender().stats();
    info!(
        "sent {} location reports, {} failed",
        stats.sent, stats.failed
    );

    Ok(())
}

fn spawn_source(args: &Args, feed: LocationFeed) -> Result<(), Box<dyn std::error::Error>> {
    match args.source {
        LocationSource::None => {}
        LocationSource::Gpx => {
            let path = args
                .gpx_file
                .as_ref()
                .ok_or("the gpx source requires --gpx-file")?;
            let replay = TrackReplay::from_path(path)?
                .with_update_interval(Duration::from_millis(args.update_interval))
                .with_playback_multiplier(args.playback_multiplier);
            tokio::spawn(replay.run(feed).instrument(info_span!("track_replay")));
        }
        LocationSource::Gpsd => {
            let address = args.gpsd.clone();
            tokio::spawn(
                async move {
                    if let Err(err) = gpsd::run(&address, feed).await {
                        error!("gpsd error: {}", err);
                    }
                }
                .instrument(info_span!("gpsd")),
            );
        }
    }

    Ok(())
}

async fn log_events(events: AsyncReceiver<BroadcastEvent>, tracy: bool) {
    while let Ok(event) = events.recv().await {
        match event {
            BroadcastEvent::MessageChanged(message) => {
                debug!(
                    "location report {} {} at {}",
                    message.id,
                    message.geometry,
                    message.timestamp_string()
                );
                tracy.then(frame_mark);
            }
            BroadcastEvent::ConfigChanged(field) => debug!("broadcast {:?} changed", field),
        }
    }
}
