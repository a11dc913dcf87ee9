// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use futures::prelude::*;
use std::{fmt, str::FromStr, time::Duration};
use tokio::io::AsyncRead;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{error, info, warn};

use crate::{
    broadcast::{self, BroadcastHandle},
    geometry::{Point, SpatialReference},
};

#[derive(Debug, PartialEq)]
pub enum Error {
    InvalidCommand(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::InvalidCommand(line) => write!(f, "invalid command: {}", line),
        }
    }
}

/// One line of the control console.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    Enable,
    Disable,
    Location { x: f64, y: f64, z: Option<f64> },
    Live(bool),
    MessageType(String),
    Port(Option<u16>),
    Frequency(Duration),
    Distress(bool),
    Status,
}

impl FromStr for ControlCommand {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidCommand(line.trim().to_string());
        let mut words = line.split_whitespace();
        let command = words.next().ok_or_else(invalid)?;
        let args: Vec<&str> = words.collect();

        let parsed = match (command, args.as_slice()) {
            ("enable", []) => ControlCommand::Enable,
            ("disable", []) => ControlCommand::Disable,
            ("status", []) => ControlCommand::Status,
            ("location", [x, y]) => ControlCommand::Location {
                x: coordinate(x).ok_or_else(invalid)?,
                y: coordinate(y).ok_or_else(invalid)?,
                z: None,
            },
            ("location", [x, y, z]) => ControlCommand::Location {
                x: coordinate(x).ok_or_else(invalid)?,
                y: coordinate(y).ok_or_else(invalid)?,
                z: Some(coordinate(z).ok_or_else(invalid)?),
            },
            ("live", [value]) => ControlCommand::Live(on_off(value).ok_or_else(invalid)?),
            ("distress", [value]) => {
                ControlCommand::Distress(on_off(value).ok_or_else(invalid)?)
            }
            ("type", [name]) => ControlCommand::MessageType(name.to_string()),
            ("port", ["none"]) => ControlCommand::Port(None),
            ("port", [port]) => ControlCommand::Port(Some(port.parse().map_err(|_| invalid())?)),
            ("frequency", [ms]) => {
                let ms: u64 = ms.parse().map_err(|_| invalid())?;
                if ms == 0 {
                    return Err(invalid());
                }
                ControlCommand::Frequency(Duration::from_millis(ms))
            }
            _ => return Err(invalid()),
        };

        Ok(parsed)
    }
}

/// Parses a finite coordinate; `nan` and `inf` are rejected.
fn coordinate(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn on_off(value: &str) -> Option<bool> {
    match value {
        "on" | "true" | "1" => Some(true),
        "off" | "false" | "0" => Some(false),
        _ => None,
    }
}

impl ControlCommand {
    /// Forwards the command to the broadcast. `status` prints the current
    /// configuration and message.
    pub async fn execute(
        self,
        handle: &BroadcastHandle,
        spatial_reference: SpatialReference,
    ) -> Result<(), broadcast::Error> {
        match self {
            ControlCommand::Enable => handle.set_enabled(true).await,
            ControlCommand::Disable => handle.set_enabled(false).await,
            ControlCommand::Location { x, y, z } => {
                let point = match z {
                    Some(z) => Point::with_z(x, y, z, spatial_reference),
                    None => Point::new(x, y, spatial_reference),
                };
                handle.set_location(point).await
            }
            ControlCommand::Live(value) => handle.set_use_current_location(value).await,
            ControlCommand::MessageType(name) => handle.set_message_type(&name).await,
            ControlCommand::Port(port) => handle.set_udp_port(port).await,
            ControlCommand::Frequency(frequency) => handle.set_frequency(frequency).await,
            ControlCommand::Distress(value) => handle.set_in_distress(value).await,
            ControlCommand::Status => {
                let config = handle.config().await?;
                println!(
                    "enabled={} type={:?} port={:?} frequency={:?} live={} distress={} location={}",
                    config.enabled,
                    config.message_type,
                    config.udp_port,
                    config.frequency,
                    config.use_current_location,
                    config.in_distress,
                    config
                        .location
                        .map_or_else(|| String::from("unknown"), |pt| pt.to_string()),
                );
                if let Some(message) = handle.message().await? {
                    println!("{}", String::from_utf8_lossy(&message.to_geomessage()));
                }
                Ok(())
            }
        }
    }
}

/// Reads control commands line by line from `input` until it ends or the
/// broadcast stops.
pub async fn run_console<R: AsyncRead + Unpin>(
    input: R,
    handle: BroadcastHandle,
    spatial_reference: SpatialReference,
) -> Result<(), broadcast::Error> {
    let mut lines = FramedRead::new(input, LinesCodec::new());

    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                error!("console read error: {}", err);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<ControlCommand>() {
            Ok(command) => command.execute(&handle, spatial_reference).await?,
            Err(err) => warn!("{}", err),
        }
    }

    info!("control console closed");
    Ok(())
}
