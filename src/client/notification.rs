// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Owned form of the notifications a client receives.

use crate::property::Property;

/// One device-to-client notification, owned.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A property became visible.
    Define {
        /// Full property, including static metadata.
        property: Property,
        /// Optional human-readable message.
        message: Option<String>,
    },
    /// A property's state or values changed.
    Update {
        /// Property after the change.
        property: Property,
        /// Optional human-readable message.
        message: Option<String>,
    },
    /// One property, or every property of a device, went away.
    Delete {
        /// Device name.
        device: String,
        /// Property name; `None` deletes all of the device's properties.
        name: Option<String>,
        /// Optional human-readable message.
        message: Option<String>,
    },
    /// A free-form message from a device.
    Message {
        /// Device name.
        device: String,
        /// Message text.
        message: String,
    },
}

impl Notification {
    /// Device the notification concerns.
    #[must_use]
    pub fn device(&self) -> &str {
        match self {
            Self::Define { property, .. } | Self::Update { property, .. } => &property.device,
            Self::Delete { device, .. } | Self::Message { device, .. } => device,
        }
    }

    /// Property name, if the notification concerns a single property.
    #[must_use]
    pub fn property_name(&self) -> Option<&str> {
        match self {
            Self::Define { property, .. } | Self::Update { property, .. } => Some(&property.name),
            Self::Delete { name, .. } => name.as_deref(),
            Self::Message { .. } => None,
        }
    }

    /// The carried property for defines and updates.
    #[must_use]
    pub fn property(&self) -> Option<&Property> {
        match self {
            Self::Define { property, .. } | Self::Update { property, .. } => Some(property),
            _ => None,
        }
    }

    /// Returns `true` for a define of `device.name`.
    #[must_use]
    pub fn is_define_of(&self, device: &str, name: &str) -> bool {
        matches!(self, Self::Define { property, .. } if property.device == device && property.name == name)
    }

    /// Returns `true` for an update of `device.name`.
    #[must_use]
    pub fn is_update_of(&self, device: &str, name: &str) -> bool {
        matches!(self, Self::Update { property, .. } if property.device == device && property.name == name)
    }

    /// Returns `true` for a delete covering `device.name`.
    ///
    /// A delete-all for the device covers every name.
    #[must_use]
    pub fn is_delete_of(&self, device: &str, name: &str) -> bool {
        matches!(self, Self::Delete { device: d, name: n, .. }
            if d == device && n.as_deref().is_none_or(|n| n == name))
    }
}
