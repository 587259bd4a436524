// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! JSON-lines wire format.
//!
//! Every message is one JSON object on its own line, discriminated by a
//! `"type"` field. Peers send `getProperties`, `newProperty`,
//! `enableMessages` and `enableBlob`; the server answers with
//! `defineProperty`, `updateProperty`, `deleteProperty` and `message`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::Notification;
use crate::error::ProtocolError;
use crate::property::{Property, PropertyPattern};

/// One message on the wire.
///
/// # Examples
///
/// ```
/// use astrobus::server::WireMessage;
///
/// let message = WireMessage::decode(r#"{"type":"getProperties","device":"Focuser"}"#).unwrap();
/// let WireMessage::GetProperties { device, name } = message else { panic!() };
/// assert_eq!(device, "Focuser");
/// assert!(name.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WireMessage {
    /// Peer asks for property definitions. Empty fields match anything.
    GetProperties {
        /// Device name.
        #[serde(default)]
        device: String,
        /// Property name.
        #[serde(default)]
        name: String,
    },
    /// Peer requests a property change.
    NewProperty {
        /// Requested snapshot.
        property: Property,
    },
    /// Peer turns free-form device messages on or off.
    EnableMessages {
        /// Whether messages are forwarded.
        #[serde(default = "enabled_by_default")]
        enabled: bool,
    },
    /// Peer chooses how blob payloads reach it. Empty fields match anything.
    EnableBlob {
        /// Device name.
        #[serde(default)]
        device: String,
        /// Property name.
        #[serde(default)]
        name: String,
        /// Delivery mode for matching blob properties.
        #[serde(default = "blobs_enabled_by_default")]
        mode: BlobMode,
    },
    /// A property became visible.
    DefineProperty {
        /// Full property.
        property: Property,
        /// Optional human-readable message.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        /// When the server sent it.
        timestamp: DateTime<Utc>,
    },
    /// A property changed.
    UpdateProperty {
        /// Property after the change.
        property: Property,
        /// Optional human-readable message.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        /// When the server sent it.
        timestamp: DateTime<Utc>,
    },
    /// One property, or all of a device's properties, went away.
    DeleteProperty {
        /// Device name.
        device: String,
        /// Property name; absent for the whole device.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        /// Optional human-readable message.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        /// When the server sent it.
        timestamp: DateTime<Utc>,
    },
    /// Free-form device message.
    Message {
        /// Device name.
        device: String,
        /// Message text.
        message: String,
        /// When the server sent it.
        timestamp: DateTime<Utc>,
    },
}

fn enabled_by_default() -> bool {
    true
}

fn blobs_enabled_by_default() -> BlobMode {
    BlobMode::Also
}

/// How a peer receives blob property updates.
///
/// Peers start in [`BlobMode::Never`] for every property.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlobMode {
    /// Blob updates are not sent.
    #[default]
    Never,
    /// Blob updates carry the payload inline.
    Also,
    /// Items with a URL are sent with the URL and no payload; the rest
    /// inline.
    Url,
}

impl WireMessage {
    /// Builds the outbound message for a bus notification, stamped now.
    #[must_use]
    pub fn from_notification(notification: Notification) -> Self {
        let timestamp = Utc::now();
        match notification {
            Notification::Define { property, message } => Self::DefineProperty {
                property,
                message,
                timestamp,
            },
            Notification::Update { property, message } => Self::UpdateProperty {
                property,
                message,
                timestamp,
            },
            Notification::Delete {
                device,
                name,
                message,
            } => Self::DeleteProperty {
                device,
                name,
                message,
                timestamp,
            },
            Notification::Message { device, message } => Self::Message {
                device,
                message,
                timestamp,
            },
        }
    }

    /// Whether peers may send this message to the server.
    #[must_use]
    pub fn is_inbound(&self) -> bool {
        matches!(
            self,
            Self::GetProperties { .. }
                | Self::NewProperty { .. }
                | Self::EnableMessages { .. }
                | Self::EnableBlob { .. }
        )
    }

    /// Pattern selected by a `getProperties` message.
    #[must_use]
    pub fn pattern(&self) -> Option<PropertyPattern> {
        match self {
            Self::GetProperties { device, name } => Some(PropertyPattern {
                device: device.clone(),
                name: name.clone(),
                property_type: None,
            }),
            _ => None,
        }
    }

    /// Serializes the message as one newline-terminated line.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Decode`] if serialization fails.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Parses one line. Surrounding whitespace is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Decode`] for malformed input.
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(line.trim())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_get_properties_defaults() {
        let message = WireMessage::decode("{\"type\":\"getProperties\"}\r\n").unwrap();
        assert!(message.is_inbound());
        assert_eq!(message.pattern(), Some(PropertyPattern::all()));
    }

    #[test]
    fn decode_enable_messages_defaults_to_enabled() {
        let message = WireMessage::decode(r#"{"type":"enableMessages"}"#).unwrap();
        assert_eq!(message, WireMessage::EnableMessages { enabled: true });
    }

    #[test]
    fn decode_enable_blob() {
        let message = WireMessage::decode(r#"{"type":"enableBlob","device":"Camera","mode":"url"}"#).unwrap();
        assert!(message.is_inbound());
        assert_eq!(
            message,
            WireMessage::EnableBlob {
                device: "Camera".into(),
                name: String::new(),
                mode: BlobMode::Url,
            }
        );
        let bare = WireMessage::decode(r#"{"type":"enableBlob"}"#).unwrap();
        assert!(matches!(bare, WireMessage::EnableBlob { mode: BlobMode::Also, .. }));
    }

    #[test]
    fn decode_rejects_unknown_type() {
        let err = WireMessage::decode(r#"{"type":"bogus"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn encode_is_one_line_with_type_tag() {
        let property = Property::switch_request("Focuser", "CONNECTION", &[("CONNECTED", true)]);
        let message = WireMessage::from_notification(Notification::Update {
            property,
            message: None,
        });
        let line = message.encode().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);

        let json: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(json["type"], "updateProperty");
        assert!(json.get("message").is_none());
        assert!(!WireMessage::decode(&line).unwrap().is_inbound());
    }

    #[test]
    fn delete_all_omits_name() {
        let message = WireMessage::from_notification(Notification::Delete {
            device: "Focuser".into(),
            name: None,
            message: Some("gone".into()),
        });
        let json: serde_json::Value = serde_json::from_str(&message.encode().unwrap()).unwrap();
        assert_eq!(json["type"], "deleteProperty");
        assert_eq!(json["device"], "Focuser");
        assert!(json.get("name").is_none());
        assert_eq!(json["message"], "gone");
    }
}
