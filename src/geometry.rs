// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use std::fmt;

/// Spatial reference identified by its well-known ID (EPSG code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpatialReference {
    wkid: u32,
}

impl SpatialReference {
    /// WGS84 geographic coordinates, longitude/latitude in degrees.
    pub const WGS84: SpatialReference = SpatialReference { wkid: 4326 };

    pub const fn new(wkid: u32) -> Self {
        SpatialReference { wkid }
    }

    pub fn wkid(&self) -> u32 {
        self.wkid
    }
}

impl Default for SpatialReference {
    fn default() -> Self {
        SpatialReference::WGS84
    }
}

/// Immutable 2D or 3D coordinate tagged with a spatial reference.
///
/// For geographic references `x` is the longitude and `y` the latitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    x: f64,
    y: f64,
    z: Option<f64>,
    spatial_reference: SpatialReference,
}

impl Point {
    pub fn new(x: f64, y: f64, spatial_reference: SpatialReference) -> Self {
        Point {
            x,
            y,
            z: None,
            spatial_reference,
        }
    }

    pub fn with_z(x: f64, y: f64, z: f64, spatial_reference: SpatialReference) -> Self {
        Point {
            x,
            y,
            z: Some(z),
            spatial_reference,
        }
    }

    /// Builds a WGS84 point from latitude/longitude degrees and an optional
    /// altitude in meters.
    pub fn wgs84(lat: f64, lon: f64, alt: Option<f64>) -> Self {
        Point {
            x: lon,
            y: lat,
            z: alt,
            spatial_reference: SpatialReference::WGS84,
        }
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn z(&self) -> Option<f64> {
        self.z
    }

    pub fn spatial_reference(&self) -> SpatialReference {
        self.spatial_reference
    }

    /// Same x/y position, ignoring z and the spatial reference.
    pub fn same_position(&self, other: &Point) -> bool {
        self.x == other.x && self.y == other.y
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.z {
            Some(z) => write!(f, "{},{},{}", self.x, self.y, z),
            None => write!(f, "{},{}", self.x, self.y),
        }
    }
}
