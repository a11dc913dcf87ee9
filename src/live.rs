// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::trace;

use crate::geometry::Point;

/// A "position changed" notification from a live location source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveLocation {
    pub point: Point,
    /// Compass heading in degrees, when the source knows it
    pub heading: Option<f64>,
}

impl LiveLocation {
    pub fn new(point: Point) -> Self {
        LiveLocation {
            point,
            heading: None,
        }
    }

    pub fn with_heading(point: Point, heading: f64) -> Self {
        LiveLocation {
            point,
            heading: Some(heading),
        }
    }
}

/// Fan-out of [`LiveLocation`]s from a live location source (gpsd, track
/// replay) to any number of subscribers.
///
/// Cloning the feed shares the subscriber list, so producers and consumers
/// may each hold their own copy. Subscriptions are tokio mpsc channels, so a
/// pending `recv` can be dropped in `select!` without losing an update.
#[derive(Debug, Clone, Default)]
pub struct LocationFeed {
    subscribers: Arc<Mutex<Vec<UnboundedSender<LiveLocation>>>>,
}

impl LocationFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to position updates. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> UnboundedReceiver<LiveLocation> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        rx
    }

    /// Delivers `location` to every subscriber and prunes closed ones.
    pub fn publish(&self, location: LiveLocation) {
        let mut subscribers = self.lock();
        subscribers.retain(|tx| tx.send(location).is_ok());
        trace!(
            "published {} heading {:?} to {} subscribers",
            location.point,
            location.heading,
            subscribers.len()
        );
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<UnboundedSender<LiveLocation>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
