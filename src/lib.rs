// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! LocPub Library
//!
//! This library periodically reports the location of a device to peers on
//! the local network as GeoMessage datagrams over UDP.
//!
//! # Features
//!
//! - **Location Broadcast** - Timer driven position reports with runtime
//!   control through a cloneable handle
//! - **UDP Sender** - Best-effort broadcast, multicast or unicast datagrams
//! - **Live Location** - Fan-out feed fed by gpsd or a replayed GPX track
//! - **Control Console** - Line oriented commands for a running broadcast
//!
//! # Binaries
//!
//! - `locpub` - The broadcast node
//! - `locmon` - Prints the datagrams received on a UDP port

/// Location broadcast state machine, task loop and handle
pub mod broadcast;

/// Common utilities
pub mod common;

/// Text commands for a running broadcast
pub mod control;

/// Points and spatial references
pub mod geometry;

/// gpsd client feeding live device positions
pub mod gpsd;

/// Live location fan-out
pub mod live;

/// GeoMessage records and their XML encoding
pub mod message;

/// Network utilities for UDP communication
pub mod net;

/// GPX track replay as a simulated location source
pub mod track;
