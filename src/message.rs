// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! GeoMessage records exchanged with situational-awareness peers.

use chrono::{DateTime, SecondsFormat, Utc};
use std::{collections::BTreeMap, fmt, fmt::Write as _};
use uuid::Uuid;

use crate::geometry::Point;

/// Attribute carrying the symbol identification code.
pub const GEOMESSAGE_SIC_NAME: &str = "sic";
/// Attribute carrying the human readable name of the reporting unit.
pub const GEOMESSAGE_UNIQUE_DESIGNATION_NAME: &str = "uniquedesignation";
/// Attribute flagging a unit in distress (1) or not (0).
pub const GEOMESSAGE_STATUS_911_NAME: &str = "status911";
/// Attribute carrying the time the report was generated.
pub const GEOMESSAGE_DATETIME_VALID_NAME: &str = "datetimevalid";

/// Symbol ID used for our own location reports (friendly ground unit).
pub const LOCATION_BROADCAST_SIC: &str = "SFGPEVAL-------";

/// GeoMessage action verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageAction {
    Update,
    Remove,
    Select,
    UnSelect,
}

impl fmt::Display for MessageAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MessageAction::Update => write!(f, "update"),
            MessageAction::Remove => write!(f, "remove"),
            MessageAction::Select => write!(f, "select"),
            MessageAction::UnSelect => write!(f, "un-select"),
        }
    }
}

/// A typed, flat key-value record describing one reported entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub action: MessageAction,
    pub id: Uuid,
    pub message_type: String,
    pub symbol_id: String,
    pub geometry: Point,
    pub timestamp: DateTime<Utc>,
    pub attributes: BTreeMap<String, String>,
}

impl Message {
    pub fn new(action: MessageAction, geometry: Point) -> Self {
        Message {
            action,
            id: Uuid::new_v4(),
            message_type: String::new(),
            symbol_id: String::new(),
            geometry,
            timestamp: Utc::now(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn set_attribute(&mut self, name: &str, value: impl ToString) {
        self.attributes.insert(name.to_string(), value.to_string());
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Serializes the message as a single GeoMessage XML document.
    pub fn to_geomessage(&self) -> Vec<u8> {
        let mut xml = String::with_capacity(512);
        xml.push_str("<geomessages><geomessage v=\"1.0\">");
        element(&mut xml, "_type", &self.message_type);
        element(&mut xml, "_action", &self.action.to_string());
        element(&mut xml, "_id", &format!("{{{}}}", self.id));
        element(
            &mut xml,
            "_wkid",
            &self.geometry.spatial_reference().wkid().to_string(),
        );
        if !self.symbol_id.is_empty() && !self.attributes.contains_key(GEOMESSAGE_SIC_NAME) {
            element(&mut xml, GEOMESSAGE_SIC_NAME, &self.symbol_id);
        }
        element(&mut xml, "_control_points", &self.geometry.to_string());
        for (name, value) in &self.attributes {
            element(&mut xml, name, value);
        }
        xml.push_str("</geomessage></geomessages>");
        xml.into_bytes()
    }

    /// The timestamp in the form used for the `datetimevalid` attribute.
    pub fn timestamp_string(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

fn element(xml: &mut String, name: &str, text: &str) {
    let _ = write!(xml, "<{}>", name);
    escape_into(xml, text);
    let _ = write!(xml, "</{}>", name);
}

fn escape_into(xml: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => xml.push_str("&amp;"),
            '<' => xml.push_str("&lt;"),
            '>' => xml.push_str("&gt;"),
            '"' => xml.push_str("&quot;"),
            '\'' => xml.push_str("&apos;"),
            c => xml.push(c),
        }
    }
}
