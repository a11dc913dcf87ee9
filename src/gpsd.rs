// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use futures::prelude::*;
use gpsd_proto::{Mode, UnifiedResponse};
use std::{fmt, io};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, info, warn};

use crate::{
    geometry::Point,
    live::{LiveLocation, LocationFeed},
};

/// Where gpsd listens by default.
pub const DEFAULT_GPSD_ADDRESS: &str = "127.0.0.1:2947";

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Codec(LinesCodecError),
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<LinesCodecError> for Error {
    fn from(err: LinesCodecError) -> Error {
        Error::Codec(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {}", err),
            Error::Codec(err) => write!(f, "gpsd stream error: {}", err),
        }
    }
}

/// Decodes one gpsd JSON report. Only TPV reports with a 2D or 3D fix yield
/// a position; the altitude is kept for 3D fixes and the course over ground
/// becomes the heading.
pub fn parse_report(line: &str) -> Option<LiveLocation> {
    match serde_json::from_str(line) {
        Ok(UnifiedResponse::Tpv(tpv)) => {
            let (lat, lon) = (tpv.lat?, tpv.lon?);
            let point = match tpv.mode {
                Mode::NoFix => return None,
                Mode::Fix2d => Point::wgs84(lat, lon, None),
                Mode::Fix3d => Point::wgs84(lat, lon, tpv.alt.map(f64::from)),
            };
            Some(LiveLocation {
                point,
                heading: tpv.track.map(f64::from),
            })
        }
        Ok(_) => None,
        Err(err) => {
            debug!("undecodable gpsd report: {}", err);
            None
        }
    }
}

/// Streams device positions from gpsd into `feed` until gpsd hangs up.
pub async fn run(address: &str, feed: LocationFeed) -> Result<(), Error> {
    let stream = TcpStream::connect(address).await?;
    info!("connected to gpsd at {}", address);

    let mut framed = Framed::new(stream, LinesCodec::new());
    framed.send(gpsd_proto::ENABLE_WATCH_CMD).await?;

    while let Some(line) = framed.try_next().await? {
        if let Some(location) = parse_report(&line) {
            feed.publish(location);
        }
    }

    warn!("gpsd at {} closed the connection", address);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::SpatialReference;

    #[test]
    fn test_fix_3d() {
        let line = r#"{"class":"TPV","device":"/dev/ttyUSB0","mode":3,"time":"2025-01-01T00:00:00.000Z","lat":36.6,"lon":-121.9,"alt":12.5,"track":90.0,"speed":1.5}"#;
        assert_eq!(
            parse_report(line),
            Some(LiveLocation::with_heading(
                Point::with_z(-121.9, 36.6, 12.5, SpatialReference::WGS84),
                90.0
            ))
        );
    }

    #[test]
    fn test_fix_2d_drops_altitude() {
        let line = r#"{"class":"TPV","device":"/dev/ttyUSB0","mode":2,"lat":36.6,"lon":-121.9,"alt":12.5}"#;
        assert_eq!(
            parse_report(line),
            Some(LiveLocation::new(Point::wgs84(36.6, -121.9, None)))
        );
    }

    #[test]
    fn test_no_fix() {
        let line = r#"{"class":"TPV","device":"/dev/ttyUSB0","mode":1}"#;
        assert_eq!(parse_report(line), None);
    }

    #[test]
    fn test_other_reports() {
        assert_eq!(parse_report("not json"), None);
        assert_eq!(
            parse_report(r#"{"class":"VERSION","release":"3.25","rev":"3.25","proto_major":3,"proto_minor":15}"#),
            None
        );
    }

    #[tokio::test]
    async fn test_stream_from_gpsd() {
        use tokio::{
            io::{AsyncReadExt, AsyncWriteExt},
            net::TcpListener,
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket
                .write_all(b"{\"class\":\"TPV\",\"device\":\"/dev/ttyACM0\",\"mode\":2,\"lat\":1.0,\"lon\":2.0}\n")
                .await
                .unwrap();
            socket.shutdown().await.unwrap();
            // drain the WATCH command until the client hangs up
            let mut received = Vec::new();
            socket.read_to_end(&mut received).await.unwrap();
            received
        });

        let feed = LocationFeed::new();
        let mut rx = feed.subscribe();
        run(&address, feed).await.unwrap();
        let received = server.await.unwrap();

        assert!(String::from_utf8_lossy(&received).contains("?WATCH="));
        assert_eq!(
            rx.try_recv().unwrap(),
            LiveLocation::new(Point::wgs84(1.0, 2.0, None))
        );
    }
}
