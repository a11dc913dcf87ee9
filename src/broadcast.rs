// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Periodic location broadcast.
//!
//! A [`LocationBroadcast`] owns its configuration, its timer deadline and its
//! [`MessageSender`]. It is driven either directly through its setters and
//! [`LocationBroadcast::tick`], or from a single task by
//! [`LocationBroadcast::run`], which multiplexes the timer, live location
//! updates and [`Command`]s sent through a [`BroadcastHandle`]. A handle call
//! returns once the task has applied the command.

use chrono::Utc;
use kanal::{AsyncReceiver, AsyncSender};
use std::{fmt, time::Duration};
use tokio::{
    sync::{mpsc, oneshot},
    time::Instant,
};
use tracing::{debug, info, info_span, trace, warn};

use crate::{
    common::hostname,
    geometry::Point,
    live::{LiveLocation, LocationFeed},
    message::{
        Message, MessageAction, GEOMESSAGE_DATETIME_VALID_NAME, GEOMESSAGE_SIC_NAME,
        GEOMESSAGE_STATUS_911_NAME, GEOMESSAGE_UNIQUE_DESIGNATION_NAME, LOCATION_BROADCAST_SIC,
    },
    net::MessageSender,
};

/// Default interval between two location reports.
pub const DEFAULT_FREQUENCY: Duration = Duration::from_millis(3000);

#[derive(Debug)]
pub enum Error {
    /// The broadcast frequency must be greater than zero
    InvalidFrequency(Duration),
    /// The broadcast task is no longer running
    Closed,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::InvalidFrequency(value) => write!(f, "invalid frequency: {:?}", value),
            Error::Closed => write!(f, "location broadcast closed"),
        }
    }
}

/// Configuration of a [`LocationBroadcast`].
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastConfig {
    /// Whether location reports are sent
    pub enabled: bool,
    /// GeoMessage `_type` of the reports; empty means unconfigured
    pub message_type: String,
    /// Destination UDP port; `None` means unconfigured
    pub udp_port: Option<u16>,
    /// Interval between two reports, never zero
    pub frequency: Duration,
    /// Follow the live location feed instead of an explicit location
    pub use_current_location: bool,
    /// Last known location
    pub location: Option<Point>,
    /// Report the unit as in distress (`status911`)
    pub in_distress: bool,
    /// Unique designation of the reporting unit
    pub designation: String,
}

impl BroadcastConfig {
    pub fn new(message_type: &str, udp_port: Option<u16>) -> Self {
        BroadcastConfig {
            message_type: message_type.to_string(),
            udp_port,
            ..Default::default()
        }
    }

    /// A message type and a UDP port are both required to broadcast.
    pub fn is_configured(&self) -> bool {
        !self.message_type.is_empty() && self.udp_port.is_some()
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        BroadcastConfig {
            enabled: true,
            message_type: String::new(),
            udp_port: None,
            frequency: DEFAULT_FREQUENCY,
            use_current_location: true,
            location: None,
            in_distress: false,
            designation: hostname(),
        }
    }
}

/// Configuration fields reported by [`BroadcastEvent::ConfigChanged`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigField {
    Enabled,
    Location,
    UseCurrentLocation,
    MessageType,
    UdpPort,
    Frequency,
    InDistress,
}

/// Notifications raised after a change has been committed.
#[derive(Debug, Clone, PartialEq)]
pub enum BroadcastEvent {
    ConfigChanged(ConfigField),
    MessageChanged(Message),
}

/// Operations a [`BroadcastHandle`] forwards to [`LocationBroadcast::run`].
#[derive(Debug)]
pub enum Command {
    SetEnabled(bool),
    SetLocation(Point),
    SetUseCurrentLocation(bool),
    SetMessageType(String),
    SetUdpPort(Option<u16>),
    SetFrequency(Duration),
    SetInDistress(bool),
    Message(oneshot::Sender<Option<Message>>),
    Config(oneshot::Sender<BroadcastConfig>),
}

/// A queued [`Command`]. The task answers `ack` after applying it.
#[derive(Debug)]
pub struct Request {
    pub command: Command,
    pub ack: oneshot::Sender<()>,
}

/// Periodically reports a location as a GeoMessage datagram.
pub struct LocationBroadcast<S> {
    config: BroadcastConfig,
    sender: S,
    feed: LocationFeed,
    live: Option<mpsc::UnboundedReceiver<LiveLocation>>,
    heading: Option<f64>,
    message: Option<Message>,
    deadline: Option<Instant>,
    observers: Vec<AsyncSender<BroadcastEvent>>,
}

impl<S: MessageSender> LocationBroadcast<S> {
    /// Creates the broadcast and arms its timer if it is enabled and fully
    /// configured. When `use_current_location` is set the broadcast follows
    /// `feed`.
    pub fn new(config: BroadcastConfig, sender: S, feed: LocationFeed) -> Result<Self, Error> {
        if config.frequency.is_zero() {
            return Err(Error::InvalidFrequency(config.frequency));
        }

        let live = config.use_current_location.then(|| feed.subscribe());
        let mut broadcast = LocationBroadcast {
            config,
            sender,
            feed,
            live,
            heading: None,
            message: None,
            deadline: None,
            observers: Vec::new(),
        };
        broadcast.sync_timer();
        Ok(broadcast)
    }

    pub fn config(&self) -> &BroadcastConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn location(&self) -> Option<Point> {
        self.config.location
    }

    /// Heading of the last live location that carried one.
    pub fn heading(&self) -> Option<f64> {
        self.heading
    }

    pub fn use_current_location(&self) -> bool {
        self.config.use_current_location
    }

    pub fn message_type(&self) -> &str {
        &self.config.message_type
    }

    pub fn udp_port(&self) -> Option<u16> {
        self.config.udp_port
    }

    pub fn frequency(&self) -> Duration {
        self.config.frequency
    }

    pub fn is_in_distress(&self) -> bool {
        self.config.in_distress
    }

    /// The most recently broadcast message, if any.
    pub fn message(&self) -> Option<&Message> {
        self.message.as_ref()
    }

    /// When the next tick is due, `None` while the timer is stopped.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn sender(&self) -> &S {
        &self.sender
    }

    /// Registers an observer. Dropping the receiver unregisters it.
    pub fn subscribe(&mut self) -> AsyncReceiver<BroadcastEvent> {
        let (tx, rx) = kanal::unbounded_async();
        self.observers.push(tx);
        rx
    }

    /// Starts or stops the broadcast. Starting arms the timer one period from
    /// now, stopping cancels any pending tick.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.config.enabled == enabled {
            return;
        }

        self.config.enabled = enabled;
        self.sync_timer();
        info!(
            "location broadcast {}",
            if enabled { "enabled" } else { "disabled" }
        );
        self.notify(BroadcastEvent::ConfigChanged(ConfigField::Enabled));
    }

    /// Sets an explicit location and broadcasts it at once. Ignored while
    /// the broadcast follows the live location feed.
    pub fn set_location(&mut self, location: Point) {
        if self.config.use_current_location {
            debug!("ignoring location {} while using current location", location);
            return;
        }

        self.config.location = Some(location);
        self.notify(BroadcastEvent::ConfigChanged(ConfigField::Location));
        self.broadcast_location();
    }

    /// Follows the live location feed when set. Clearing it unsubscribes and
    /// keeps the last known location.
    pub fn set_use_current_location(&mut self, use_current_location: bool) {
        if self.config.use_current_location == use_current_location {
            return;
        }

        self.config.use_current_location = use_current_location;
        self.live = use_current_location.then(|| self.feed.subscribe());
        self.notify(BroadcastEvent::ConfigChanged(ConfigField::UseCurrentLocation));
    }

    /// Sets the GeoMessage type. An empty type disables the broadcast.
    pub fn set_message_type(&mut self, message_type: &str) {
        if self.config.message_type == message_type {
            return;
        }

        self.config.message_type = message_type.to_string();
        self.notify(BroadcastEvent::ConfigChanged(ConfigField::MessageType));

        if message_type.is_empty() {
            self.set_enabled(false);
        } else {
            self.sync_timer();
        }
    }

    /// Sets the destination port. `None` disables the broadcast.
    pub fn set_udp_port(&mut self, udp_port: Option<u16>) {
        if self.config.udp_port == udp_port {
            return;
        }

        self.config.udp_port = udp_port;
        self.notify(BroadcastEvent::ConfigChanged(ConfigField::UdpPort));

        if udp_port.is_none() {
            self.set_enabled(false);
        } else {
            self.sync_timer();
        }
    }

    /// Sets the interval between reports. A running timer is re-armed with
    /// the new period.
    pub fn set_frequency(&mut self, frequency: Duration) -> Result<(), Error> {
        if frequency.is_zero() {
            return Err(Error::InvalidFrequency(frequency));
        }
        if self.config.frequency == frequency {
            return Ok(());
        }

        self.config.frequency = frequency;
        if self.deadline.is_some() {
            self.arm();
        }
        self.notify(BroadcastEvent::ConfigChanged(ConfigField::Frequency));
        Ok(())
    }

    /// Flags the unit as in distress. Entering distress enables a disabled
    /// broadcast.
    pub fn set_in_distress(&mut self, in_distress: bool) {
        if self.config.in_distress == in_distress {
            return;
        }

        self.config.in_distress = in_distress;
        self.notify(BroadcastEvent::ConfigChanged(ConfigField::InDistress));

        if in_distress && !self.config.enabled {
            self.set_enabled(true);
        }
    }

    /// Applies every live location update received so far. [`Self::run`]
    /// does this on its own.
    pub fn drain_live_updates(&mut self) {
        let mut latest = None;
        if let Some(live) = &mut self.live {
            while let Ok(location) = live.try_recv() {
                latest = Some(location);
            }
        }
        if let Some(location) = latest {
            self.update_live_location(location);
        }
    }

    /// One broadcast tick: re-arms a running timer and sends the current
    /// location.
    pub fn tick(&mut self) {
        let _span = info_span!("broadcast_tick").entered();
        if self.deadline.is_some() {
            self.arm();
        }
        self.broadcast_location();
    }

    /// Applies a single [`Command`].
    pub fn apply(&mut self, command: Command) {
        match command {
            Command::SetEnabled(enabled) => self.set_enabled(enabled),
            Command::SetLocation(location) => self.set_location(location),
            Command::SetUseCurrentLocation(value) => self.set_use_current_location(value),
            Command::SetMessageType(message_type) => self.set_message_type(&message_type),
            Command::SetUdpPort(port) => self.set_udp_port(port),
            Command::SetFrequency(frequency) => {
                if let Err(err) = self.set_frequency(frequency) {
                    warn!("{}", err);
                }
            }
            Command::SetInDistress(value) => self.set_in_distress(value),
            Command::Message(reply) => {
                let _ = reply.send(self.message.clone());
            }
            Command::Config(reply) => {
                let _ = reply.send(self.config.clone());
            }
        }
    }

    /// Drives the broadcast until every [`BroadcastHandle`] is dropped, then
    /// hands the broadcast back.
    pub async fn run(mut self, mut requests: mpsc::Receiver<Request>) -> Self {
        loop {
            let deadline = self.deadline;

            // mpsc recv is cancel safe: a losing branch keeps its value queued.
            let wakeup = tokio::select! {
                _ = wait_until(deadline) => Wakeup::Tick,
                request = requests.recv() => Wakeup::Request(request),
                location = next_location(self.live.as_mut()) => Wakeup::Live(location),
            };

            match wakeup {
                Wakeup::Tick => self.tick(),
                Wakeup::Request(Some(Request { command, ack })) => {
                    self.apply(command);
                    let _ = ack.send(());
                }
                Wakeup::Request(None) => break,
                Wakeup::Live(Some(location)) => self.update_live_location(location),
                Wakeup::Live(None) => {
                    warn!("live location feed closed");
                    self.live = None;
                }
            }
        }

        debug!("all broadcast handles dropped");
        self
    }

    fn update_live_location(&mut self, location: LiveLocation) {
        if !self.config.use_current_location {
            return;
        }
        if !self.config.enabled {
            trace!("ignoring live location {} while disabled", location.point);
            return;
        }

        self.config.location = Some(location.point);
        if location.heading.is_some() {
            self.heading = location.heading;
        }
        self.notify(BroadcastEvent::ConfigChanged(ConfigField::Location));
    }

    fn broadcast_location(&mut self) {
        if !self.config.enabled {
            return;
        }
        let Some(port) = self.config.udp_port else {
            return;
        };
        if self.config.message_type.is_empty() {
            return;
        }
        let Some(location) = self.config.location else {
            trace!("no location to broadcast yet");
            return;
        };

        let message = self.refresh_message(location);
        self.notify(BroadcastEvent::MessageChanged(message.clone()));
        self.sender.send(&message.to_geomessage(), port);
        trace!("broadcast {} on port {}", location, port);
    }

    fn refresh_message(&mut self, location: Point) -> Message {
        let config = &self.config;
        let message = self.message.get_or_insert_with(|| {
            let mut message = Message::new(MessageAction::Update, location);
            message.symbol_id = LOCATION_BROADCAST_SIC.to_string();
            message.set_attribute(GEOMESSAGE_SIC_NAME, LOCATION_BROADCAST_SIC);
            message
        });

        message.geometry = location;
        message.message_type = config.message_type.clone();
        message.timestamp = Utc::now();
        message.set_attribute(GEOMESSAGE_UNIQUE_DESIGNATION_NAME, &config.designation);
        message.set_attribute(
            GEOMESSAGE_STATUS_911_NAME,
            if config.in_distress { 1 } else { 0 },
        );
        let valid = message.timestamp_string();
        message.set_attribute(GEOMESSAGE_DATETIME_VALID_NAME, valid);
        message.clone()
    }

    fn notify(&mut self, event: BroadcastEvent) {
        self.observers
            .retain(|tx| matches!(tx.try_send(event.clone()), Ok(true)));
    }

    fn should_run(&self) -> bool {
        self.config.enabled && self.config.is_configured()
    }

    fn arm(&mut self) {
        self.deadline = Some(Instant::now() + self.config.frequency);
    }

    /// Starts a stopped timer or stops a running one to match the config,
    /// leaving a running timer's phase alone.
    fn sync_timer(&mut self) {
        if !self.should_run() {
            self.deadline = None;
        } else if self.deadline.is_none() {
            self.arm();
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn next_location(
    live: Option<&mut mpsc::UnboundedReceiver<LiveLocation>>,
) -> Option<LiveLocation> {
    match live {
        Some(live) => live.recv().await,
        None => std::future::pending().await,
    }
}

enum Wakeup {
    Tick,
    Request(Option<Request>),
    Live(Option<LiveLocation>),
}

/// Creates a handle and the request receiver to pass to
/// [`LocationBroadcast::run`].
pub fn channel() -> (BroadcastHandle, mpsc::Receiver<Request>) {
    let (tx, rx) = mpsc::channel(16);
    (BroadcastHandle { tx }, rx)
}

/// Cloneable remote control of a running [`LocationBroadcast`].
#[derive(Debug, Clone)]
pub struct BroadcastHandle {
    tx: mpsc::Sender<Request>,
}

impl BroadcastHandle {
    /// Queues `command` and waits until the broadcast task has applied it.
    pub async fn send(&self, command: Command) -> Result<(), Error> {
        let (ack, applied) = oneshot::channel();
        self.tx
            .send(Request { command, ack })
            .await
            .map_err(|_| Error::Closed)?;
        applied.await.map_err(|_| Error::Closed)
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<(), Error> {
        self.send(Command::SetEnabled(enabled)).await
    }

    pub async fn set_location(&self, location: Point) -> Result<(), Error> {
        self.send(Command::SetLocation(location)).await
    }

    pub async fn set_use_current_location(&self, value: bool) -> Result<(), Error> {
        self.send(Command::SetUseCurrentLocation(value)).await
    }

    pub async fn set_message_type(&self, message_type: &str) -> Result<(), Error> {
        self.send(Command::SetMessageType(message_type.to_string()))
            .await
    }

    pub async fn set_udp_port(&self, udp_port: Option<u16>) -> Result<(), Error> {
        self.send(Command::SetUdpPort(udp_port)).await
    }

    pub async fn set_frequency(&self, frequency: Duration) -> Result<(), Error> {
        if frequency.is_zero() {
            return Err(Error::InvalidFrequency(frequency));
        }
        self.send(Command::SetFrequency(frequency)).await
    }

    pub async fn set_in_distress(&self, value: bool) -> Result<(), Error> {
        self.send(Command::SetInDistress(value)).await
    }

    pub async fn message(&self) -> Result<Option<Message>, Error> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Message(tx)).await?;
        rx.await.map_err(|_| Error::Closed)
    }

    pub async fn config(&self) -> Result<BroadcastConfig, Error> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Config(tx)).await?;
        rx.await.map_err(|_| Error::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::SpatialReference;
    use std::sync::{Arc, Mutex};

    const PORT: u16 = 45678;

    #[derive(Debug, Clone, Default)]
    struct RecordingSender {
        sent: Arc<Mutex<Vec<(String, u16)>>>,
    }

    impl RecordingSender {
        fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }

        fn last(&self) -> Option<(String, u16)> {
            self.sent.lock().unwrap().last().cloned()
        }
    }

    impl MessageSender for RecordingSender {
        fn send(&mut self, bytes: &[u8], port: u16) {
            self.sent
                .lock()
                .unwrap()
                .push((String::from_utf8_lossy(bytes).into_owned(), port));
        }
    }

    fn point(x: f64, y: f64) -> Point {
        Point::new(x, y, SpatialReference::WGS84)
    }

    fn live(x: f64, y: f64) -> LiveLocation {
        LiveLocation::new(point(x, y))
    }

    fn fixed_config(frequency_ms: u64) -> BroadcastConfig {
        BroadcastConfig {
            frequency: Duration::from_millis(frequency_ms),
            use_current_location: false,
            location: Some(point(-121.9, 36.6)),
            designation: String::from("alpha"),
            ..BroadcastConfig::new("position_report", Some(PORT))
        }
    }

    fn events(rx: &AsyncReceiver<BroadcastEvent>) -> Vec<BroadcastEvent> {
        let mut events = Vec::new();
        while let Ok(Some(event)) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_defaults() {
        let config = BroadcastConfig::new("position_report", Some(PORT));
        assert!(config.enabled);
        assert!(config.use_current_location);
        assert_eq!(config.frequency, DEFAULT_FREQUENCY);

        let broadcast =
            LocationBroadcast::new(config, RecordingSender::default(), LocationFeed::new())
                .unwrap();
        assert!(broadcast.deadline().is_some());

        let unconfigured = LocationBroadcast::new(
            BroadcastConfig::default(),
            RecordingSender::default(),
            LocationFeed::new(),
        )
        .unwrap();
        assert!(unconfigured.deadline().is_none());
    }

    #[test]
    fn test_zero_frequency_rejected() {
        let config = BroadcastConfig {
            frequency: Duration::ZERO,
            ..fixed_config(1000)
        };
        assert!(matches!(
            LocationBroadcast::new(config, RecordingSender::default(), LocationFeed::new()),
            Err(Error::InvalidFrequency(_))
        ));

        let mut broadcast = LocationBroadcast::new(
            fixed_config(1000),
            RecordingSender::default(),
            LocationFeed::new(),
        )
        .unwrap();
        assert!(broadcast.set_frequency(Duration::ZERO).is_err());
        assert_eq!(broadcast.frequency(), Duration::from_millis(1000));
    }

    #[test]
    fn test_set_location_broadcasts() {
        let sender = RecordingSender::default();
        let mut broadcast =
            LocationBroadcast::new(fixed_config(1000), sender.clone(), LocationFeed::new())
                .unwrap();
        let rx = broadcast.subscribe();

        broadcast.set_location(point(10.0, 20.0));

        let (xml, port) = sender.last().unwrap();
        assert_eq!(port, PORT);
        assert!(xml.contains("<_control_points>10,20</_control_points>"));
        assert!(xml.contains("<uniquedesignation>alpha</uniquedesignation>"));

        let events = events(&rx);
        assert_eq!(
            events[0],
            BroadcastEvent::ConfigChanged(ConfigField::Location)
        );
        assert!(matches!(events[1], BroadcastEvent::MessageChanged(_)));

        let message = broadcast.message().unwrap();
        assert_eq!(message.geometry, point(10.0, 20.0));
        assert_eq!(message.message_type, "position_report");
    }

    #[test]
    fn test_set_location_ignored_with_current_location() {
        let sender = RecordingSender::default();
        let config = BroadcastConfig::new("position_report", Some(PORT));
        let mut broadcast =
            LocationBroadcast::new(config, sender.clone(), LocationFeed::new()).unwrap();

        broadcast.set_location(point(1.0, 2.0));
        assert_eq!(broadcast.location(), None);
        assert_eq!(sender.count(), 0);
    }

    #[test]
    fn test_message_reflects_config() {
        let sender = RecordingSender::default();
        let mut broadcast =
            LocationBroadcast::new(fixed_config(1000), sender.clone(), LocationFeed::new())
                .unwrap();

        broadcast.tick();
        let first_id = broadcast.message().unwrap().id;

        broadcast.set_message_type("spot_report");
        broadcast.set_udp_port(Some(PORT + 1));
        broadcast.tick();

        let message = broadcast.message().unwrap();
        assert_eq!(message.message_type, "spot_report");
        assert_eq!(message.geometry, point(-121.9, 36.6));
        assert_eq!(message.id, first_id);
        assert_eq!(message.attribute(GEOMESSAGE_SIC_NAME), Some(LOCATION_BROADCAST_SIC));
        assert_eq!(message.attribute(GEOMESSAGE_STATUS_911_NAME), Some("0"));
        assert_eq!(sender.last().unwrap().1, PORT + 1);
        assert_eq!(sender.count(), 2);
    }

    #[test]
    fn test_enable_idempotent() {
        let sender = RecordingSender::default();
        let mut broadcast =
            LocationBroadcast::new(fixed_config(1000), sender.clone(), LocationFeed::new())
                .unwrap();
        let rx = broadcast.subscribe();
        let deadline = broadcast.deadline();

        broadcast.set_enabled(true);
        broadcast.set_enabled(true);
        assert_eq!(broadcast.deadline(), deadline);
        assert!(events(&rx).is_empty());

        broadcast.set_enabled(false);
        assert_eq!(broadcast.deadline(), None);
        broadcast.tick();
        assert_eq!(sender.count(), 0);
        assert_eq!(
            events(&rx),
            vec![BroadcastEvent::ConfigChanged(ConfigField::Enabled)]
        );
    }

    #[test]
    fn test_unconfigured_disables() {
        let mut broadcast = LocationBroadcast::new(
            fixed_config(1000),
            RecordingSender::default(),
            LocationFeed::new(),
        )
        .unwrap();

        broadcast.set_message_type("");
        assert!(!broadcast.is_enabled());
        assert!(broadcast.deadline().is_none());

        broadcast.set_message_type("position_report");
        broadcast.set_enabled(true);
        assert!(broadcast.deadline().is_some());

        broadcast.set_udp_port(None);
        assert!(!broadcast.is_enabled());
        assert!(broadcast.deadline().is_none());
    }

    #[test]
    fn test_distress_enables() {
        let sender = RecordingSender::default();
        let config = BroadcastConfig {
            enabled: false,
            ..fixed_config(1000)
        };
        let mut broadcast =
            LocationBroadcast::new(config, sender.clone(), LocationFeed::new()).unwrap();
        assert!(broadcast.deadline().is_none());

        broadcast.set_in_distress(true);
        assert!(broadcast.is_enabled());
        assert!(broadcast.deadline().is_some());

        broadcast.tick();
        assert!(sender
            .last()
            .unwrap()
            .0
            .contains("<status911>1</status911>"));
    }

    #[test]
    fn test_live_location() {
        let feed = LocationFeed::new();
        let sender = RecordingSender::default();
        let config = BroadcastConfig::new("position_report", Some(PORT));
        let mut broadcast = LocationBroadcast::new(config, sender.clone(), feed.clone()).unwrap();

        // nothing known yet
        broadcast.tick();
        assert_eq!(sender.count(), 0);

        feed.publish(LiveLocation::with_heading(point(1.0, 1.0), 135.0));
        feed.publish(live(2.0, 2.0));
        broadcast.drain_live_updates();
        broadcast.tick();
        assert_eq!(broadcast.message().unwrap().geometry, point(2.0, 2.0));
        assert_eq!(broadcast.heading(), None);

        feed.publish(LiveLocation::with_heading(point(2.5, 2.5), 135.0));
        broadcast.drain_live_updates();
        assert_eq!(broadcast.location(), Some(point(2.5, 2.5)));
        assert_eq!(broadcast.heading(), Some(135.0));

        feed.publish(live(2.0, 2.0));
        broadcast.drain_live_updates();
        assert_eq!(broadcast.heading(), Some(135.0));

        broadcast.set_use_current_location(false);
        feed.publish(live(3.0, 3.0));
        broadcast.drain_live_updates();
        broadcast.tick();
        assert_eq!(broadcast.message().unwrap().geometry, point(2.0, 2.0));
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn test_live_location_ignored_while_disabled() {
        let feed = LocationFeed::new();
        let config = BroadcastConfig {
            enabled: false,
            ..BroadcastConfig::new("position_report", Some(PORT))
        };
        let mut broadcast =
            LocationBroadcast::new(config, RecordingSender::default(), feed.clone()).unwrap();

        feed.publish(live(1.0, 1.0));
        broadcast.drain_live_updates();
        assert_eq!(broadcast.location(), None);
    }

    #[test]
    fn test_frequency_rearms() {
        let mut broadcast = LocationBroadcast::new(
            fixed_config(3000),
            RecordingSender::default(),
            LocationFeed::new(),
        )
        .unwrap();

        broadcast.set_frequency(Duration::from_millis(500)).unwrap();
        let deadline = broadcast.deadline().unwrap();
        assert!(deadline <= Instant::now() + Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_ticks() {
        let sender = RecordingSender::default();
        let mut broadcast =
            LocationBroadcast::new(fixed_config(1000), sender.clone(), LocationFeed::new())
                .unwrap();
        let rx = broadcast.subscribe();
        let (handle, requests) = channel();
        let task = tokio::spawn(broadcast.run(requests));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(sender.count(), 3);
        let changed = events(&rx)
            .into_iter()
            .filter(|event| matches!(event, BroadcastEvent::MessageChanged(_)))
            .count();
        assert_eq!(changed, 3);

        handle.set_enabled(false).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(sender.count(), 3);

        drop(handle);
        let broadcast = task.await.unwrap();
        assert!(!broadcast.is_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_frequency_change_while_enabled() {
        let sender = RecordingSender::default();
        let broadcast =
            LocationBroadcast::new(fixed_config(3000), sender.clone(), LocationFeed::new())
                .unwrap();
        let (handle, requests) = channel();
        tokio::spawn(broadcast.run(requests));

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(sender.count(), 0);

        handle
            .set_frequency(Duration::from_millis(500))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(sender.count(), 1);

        assert!(handle.set_frequency(Duration::ZERO).await.is_err());
        assert_eq!(
            handle.config().await.unwrap().frequency,
            Duration::from_millis(500)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_updates_through_handle() {
        let feed = LocationFeed::new();
        let config = BroadcastConfig {
            frequency: Duration::from_millis(1000),
            ..BroadcastConfig::new("position_report", Some(PORT))
        };
        let broadcast =
            LocationBroadcast::new(config, RecordingSender::default(), feed.clone()).unwrap();
        let (handle, requests) = channel();
        tokio::spawn(broadcast.run(requests));

        feed.publish(live(5.0, 6.0));
        tokio::time::sleep(Duration::from_millis(1100)).await;
        let message = handle.message().await.unwrap().unwrap();
        assert_eq!(message.geometry, point(5.0, 6.0));

        handle.set_use_current_location(false).await.unwrap();
        handle.set_location(point(7.0, 8.0)).await.unwrap();
        feed.publish(live(9.0, 9.0));
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let message = handle.message().await.unwrap().unwrap();
        assert_eq!(message.geometry, point(7.0, 8.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_through_handle_stops_ticks() {
        let sender = RecordingSender::default();
        let mut broadcast =
            LocationBroadcast::new(fixed_config(1000), sender.clone(), LocationFeed::new())
                .unwrap();
        let rx = broadcast.subscribe();
        let (handle, requests) = channel();
        tokio::spawn(broadcast.run(requests));

        // the first tick is due when the disable is sent
        tokio::time::sleep(Duration::from_millis(1000)).await;
        handle.set_enabled(false).await.unwrap();
        let sent = sender.count();
        let _ = events(&rx);

        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(sender.count(), sent);
        assert!(events(&rx)
            .iter()
            .all(|event| !matches!(event, BroadcastEvent::MessageChanged(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_requests_applied_under_fast_timer() {
        let sender = RecordingSender::default();
        let broadcast =
            LocationBroadcast::new(fixed_config(1), sender.clone(), LocationFeed::new()).unwrap();
        let (handle, requests) = channel();
        tokio::spawn(broadcast.run(requests));

        for _ in 0..20_000 {
            handle.message().await.unwrap();
        }

        for i in 0..200 {
            handle.set_enabled(true).await.unwrap();
            handle.set_location(point(i as f64, 0.0)).await.unwrap();
            handle.set_enabled(false).await.unwrap();
            let sent = sender.count();
            tokio::time::sleep(Duration::from_millis(3)).await;
            assert_eq!(sender.count(), sent);
        }

        let config = handle.config().await.unwrap();
        assert!(!config.enabled);
        assert_eq!(config.location, Some(point(199.0, 0.0)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_live_updates_under_fast_timer() {
        let feed = LocationFeed::new();
        let config = BroadcastConfig {
            frequency: Duration::from_millis(1),
            ..BroadcastConfig::new("position_report", Some(PORT))
        };
        let mut broadcast =
            LocationBroadcast::new(config, RecordingSender::default(), feed.clone()).unwrap();
        let rx = broadcast.subscribe();
        let (handle, requests) = channel();
        tokio::spawn(broadcast.run(requests));

        for i in 0..1000 {
            feed.publish(live(i as f64, 1.0));
            if i % 10 == 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }

        let last = Some(point(999.0, 1.0));
        tokio::time::timeout(Duration::from_secs(5), async {
            while handle.config().await.unwrap().location != last {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();

        let updates = events(&rx)
            .into_iter()
            .filter(|event| *event == BroadcastEvent::ConfigChanged(ConfigField::Location))
            .count();
        assert_eq!(updates, 1000);
    }

    #[tokio::test]
    async fn test_closed_handle() {
        let (handle, requests) = channel();
        drop(requests);
        assert!(matches!(
            handle.set_enabled(true).await,
            Err(Error::Closed)
        ));
    }
}
