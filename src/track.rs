// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use log::{debug, info, trace};
use std::{fmt, fs::File, io, io::BufReader, path::Path, time::Duration};
use time::OffsetDateTime;

use crate::{
    geometry::{Point, SpatialReference},
    live::{LiveLocation, LocationFeed},
};

/// Default interval between two simulated position updates.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_millis(500);

/// Spacing given to track points recorded without a timestamp.
const UNTIMED_SPACING_MS: i64 = 1000;

#[derive(Debug)]
pub enum Error {
    /// The track log could not be opened
    Io(io::Error),
    /// The track log is not valid GPX
    Gpx(gpx::errors::GpxError),
    /// Fewer than two distinct track points
    NotEnoughPoints(usize),
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<gpx::errors::GpxError> for Error {
    fn from(err: gpx::errors::GpxError) -> Error {
        Error::Gpx(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {}", err),
            Error::Gpx(err) => write!(f, "gpx error: {}", err),
            Error::NotEnoughPoints(n) => {
                write!(f, "track needs at least 2 distinct points, found {}", n)
            }
        }
    }
}

/// A recorded track point, time in milliseconds since the UNIX epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub point: Point,
    pub time_ms: i64,
}

/// Simulated position produced by [`TrackReplay::advance`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPosition {
    pub point: Point,
    /// Compass heading in degrees, 0 is north and 90 is east
    pub heading: f64,
    pub time_ms: i64,
}

/// Replays a GPX track log as a live location source.
///
/// A simulated clock advances by `update_interval * playback_multiplier` per
/// update. The reported position snaps to the start of the current segment
/// for its first half and to the end for its second half. The replay starts
/// over after the last point.
#[derive(Debug, Clone)]
pub struct TrackReplay {
    points: Vec<TrackPoint>,
    segment: usize,
    clock_ms: i64,
    update_interval: Duration,
    playback_multiplier: u32,
}

impl TrackReplay {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        debug!("loading track log {}", path.display());
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self, Error> {
        let doc = gpx::read(reader)?;

        let mut points: Vec<TrackPoint> = Vec::new();
        let mut last_time = None;
        for waypoint in doc
            .tracks
            .iter()
            .flat_map(|track| track.segments.iter())
            .flat_map(|segment| segment.points.iter())
        {
            let xy = waypoint.point();
            let point = match waypoint.elevation {
                Some(z) => Point::with_z(xy.x(), xy.y(), z, SpatialReference::WGS84),
                None => Point::new(xy.x(), xy.y(), SpatialReference::WGS84),
            };

            if points
                .last()
                .is_some_and(|last| last.point.same_position(&point))
            {
                trace!("skipping duplicate track point {}", point);
                continue;
            }

            let time_ms = match &waypoint.time {
                Some(time) => unix_millis(OffsetDateTime::from(time.clone())),
                None => last_time.map_or(0, |t| t + UNTIMED_SPACING_MS),
            };
            last_time = Some(time_ms);
            points.push(TrackPoint { point, time_ms });
        }

        Self::new(points)
    }

    pub fn new(points: Vec<TrackPoint>) -> Result<Self, Error> {
        if points.len() < 2 {
            return Err(Error::NotEnoughPoints(points.len()));
        }

        let clock_ms = points[0].time_ms;
        Ok(TrackReplay {
            points,
            segment: 0,
            clock_ms,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            playback_multiplier: 1,
        })
    }

    pub fn with_update_interval(mut self, update_interval: Duration) -> Self {
        self.update_interval = update_interval;
        self
    }

    /// Speeds up playback for tracks whose timestamps are far apart.
    pub fn with_playback_multiplier(mut self, playback_multiplier: u32) -> Self {
        self.playback_multiplier = playback_multiplier.max(1);
        self
    }

    pub fn points(&self) -> &[TrackPoint] {
        &self.points
    }

    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }

    /// Moves the simulated clock forward by one update and returns the
    /// position at the new time.
    pub fn advance(&mut self) -> TrackPosition {
        self.clock_ms += self.update_interval.as_millis() as i64 * self.playback_multiplier as i64;

        while self.clock_ms > self.points[self.segment + 1].time_ms {
            if self.segment + 2 >= self.points.len() {
                debug!("end of track reached, restarting replay");
                self.segment = 0;
                self.clock_ms = self.points[0].time_ms;
                break;
            }
            self.segment += 1;
        }

        let start = &self.points[self.segment];
        let end = &self.points[self.segment + 1];
        let span = (end.time_ms - start.time_ms) as f64;
        let normalized = if span > 0.0 {
            (self.clock_ms - start.time_ms) as f64 / span
        } else {
            1.0
        };

        let point = if normalized <= 0.5 {
            start.point
        } else {
            end.point
        };

        TrackPosition {
            point,
            heading: heading(&start.point, &end.point),
            time_ms: self.clock_ms,
        }
    }

    /// Publishes a position on `feed` every update interval, forever.
    pub async fn run(mut self, feed: LocationFeed) {
        info!(
            "replaying {} track points every {:?} (x{})",
            self.points.len(),
            self.update_interval,
            self.playback_multiplier
        );
        let mut interval = tokio::time::interval(self.update_interval);

        loop {
            interval.tick().await;
            let position = self.advance();
            trace!("track position {} heading {:.1}", position.point, position.heading);
            feed.publish(LiveLocation::with_heading(position.point, position.heading));
        }
    }
}

/// Planar compass bearing from `from` to `to` in degrees.
pub fn heading(from: &Point, to: &Point) -> f64 {
    let dx = to.x() - from.x();
    let dy = to.y() - from.y();
    dx.atan2(dy).to_degrees().rem_euclid(360.0)
}

fn unix_millis(time: OffsetDateTime) -> i64 {
    (time.unix_timestamp_nanos() / 1_000_000) as i64
}
