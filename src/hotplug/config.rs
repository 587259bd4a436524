// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hot-plug manager configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default number of table slots.
pub const DEFAULT_TABLE_CAPACITY: usize = 32;

/// Default delay between a hardware event and the scan it triggers.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Default period of network scans.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(10);

/// Settings for a [`HotplugManager`](super::HotplugManager).
///
/// Durations are (de)serialized as milliseconds.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use astrobus::hotplug::HotplugConfig;
///
/// let config: HotplugConfig = serde_json::from_str(r#"{"debounce": 50}"#).unwrap();
/// assert_eq!(config.debounce, Duration::from_millis(50));
/// assert_eq!(config.retries, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotplugConfig {
    /// Number of table slots.
    pub capacity: usize,
    /// Delay between a hardware event and the scan it triggers. Events
    /// arriving within this window coalesce into one scan.
    #[serde(with = "crate::config::millis")]
    pub debounce: Duration,
    /// Period of polling scans.
    #[serde(with = "crate::config::millis")]
    pub scan_interval: Duration,
    /// Extra attempts after a transient discovery failure.
    pub retries: u32,
}

impl Default for HotplugConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_TABLE_CAPACITY,
            debounce: DEFAULT_DEBOUNCE,
            scan_interval: DEFAULT_SCAN_INTERVAL,
            retries: 1,
        }
    }
}

impl HotplugConfig {
    /// Sets the table capacity.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the debounce delay.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Sets the polling period.
    #[must_use]
    pub fn with_scan_interval(mut self, scan_interval: Duration) -> Self {
        self.scan_interval = scan_interval;
        self
    }

    /// Sets the number of retries after a transient failure.
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}
