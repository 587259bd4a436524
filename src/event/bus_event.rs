// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bus lifecycle event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::ClientId;

/// Lifecycle events published by the bus.
///
/// These are observability events for supervisors and tooling; property
/// traffic goes through [`Client`](crate::client::Client) callbacks
/// instead.
///
/// # Examples
///
/// ```
/// use astrobus::event::BusEvent;
///
/// let attached = BusEvent::device_attached("Focuser");
/// assert_eq!(attached.device(), Some("Focuser"));
/// assert!(attached.is_device_lifecycle());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum BusEvent {
    /// A device finished attaching.
    DeviceAttached {
        /// Device name.
        device: String,
        /// When the device was registered.
        at: DateTime<Utc>,
    },

    /// A device was detached and its properties deleted.
    DeviceDetached {
        /// Device name.
        device: String,
        /// When the device was removed.
        at: DateTime<Utc>,
        /// Teardown error, if the driver reported one.
        error: Option<String>,
    },

    /// A client was registered.
    ClientAttached {
        /// Assigned client id.
        client_id: ClientId,
        /// Client name.
        name: String,
    },

    /// A client was removed.
    ClientDetached {
        /// Client id.
        client_id: ClientId,
    },

    /// The bus shut down.
    ShutDown,
}

impl BusEvent {
    /// Creates a device attached event stamped now.
    #[must_use]
    pub fn device_attached(device: impl Into<String>) -> Self {
        Self::DeviceAttached {
            device: device.into(),
            at: Utc::now(),
        }
    }

    /// Creates a device detached event stamped now.
    #[must_use]
    pub fn device_detached(device: impl Into<String>, error: Option<String>) -> Self {
        Self::DeviceDetached {
            device: device.into(),
            at: Utc::now(),
            error,
        }
    }

    /// Device name, for device events.
    #[must_use]
    pub fn device(&self) -> Option<&str> {
        match self {
            Self::DeviceAttached { device, .. } | Self::DeviceDetached { device, .. } => {
                Some(device)
            }
            _ => None,
        }
    }

    /// Client id, for client events.
    #[must_use]
    pub fn client_id(&self) -> Option<ClientId> {
        match self {
            Self::ClientAttached { client_id, .. } | Self::ClientDetached { client_id } => {
                Some(*client_id)
            }
            _ => None,
        }
    }

    /// Returns `true` for device attach and detach events.
    #[must_use]
    pub fn is_device_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::DeviceAttached { .. } | Self::DeviceDetached { .. }
        )
    }
}
