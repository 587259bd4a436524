// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bus configuration.

use serde::{Deserialize, Serialize};

use crate::event::DEFAULT_EVENT_CAPACITY;

/// Default maximum number of attached devices.
pub const DEFAULT_MAX_DEVICES: usize = 256;

/// Default maximum number of attached clients.
pub const DEFAULT_MAX_CLIENTS: usize = 256;

/// Limits and buffer sizes for a [`Bus`](super::Bus).
///
/// # Examples
///
/// ```
/// use astrobus::bus::BusConfig;
///
/// let config = BusConfig::default()
///     .with_max_devices(8)
///     .with_max_clients(4);
/// assert_eq!(config.max_devices, 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Maximum number of attached devices.
    pub max_devices: usize,
    /// Maximum number of attached clients.
    pub max_clients: usize,
    /// Lifecycle event buffer per subscriber.
    pub event_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_devices: DEFAULT_MAX_DEVICES,
            max_clients: DEFAULT_MAX_CLIENTS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl BusConfig {
    /// Sets the device capacity.
    #[must_use]
    pub fn with_max_devices(mut self, max_devices: usize) -> Self {
        self.max_devices = max_devices;
        self
    }

    /// Sets the client capacity.
    #[must_use]
    pub fn with_max_clients(mut self, max_clients: usize) -> Self {
        self.max_clients = max_clients;
        self
    }

    /// Sets the lifecycle event buffer size.
    #[must_use]
    pub fn with_event_capacity(mut self, event_capacity: usize) -> Self {
        self.event_capacity = event_capacity;
        self
    }
}
