// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Discovery sources and the identities they report.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::DiscoveryError;

/// Stable identity of one hardware unit across scans.
///
/// # Examples
///
/// ```
/// use astrobus::hotplug::IdentityKey;
///
/// let key = IdentityKey::usb(0x0403, 0x6001, Some("A10K2"));
/// assert_eq!(key.to_string(), "usb:0403:6001:A10K2");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "bus", rename_all = "camelCase")]
pub enum IdentityKey {
    /// A USB unit.
    Usb {
        /// Vendor id.
        vendor_id: u16,
        /// Product id.
        product_id: u16,
        /// Serial number, when the unit reports one.
        serial: Option<String>,
    },
    /// A networked unit, keyed by its address.
    Network {
        /// Host and port, or any other stable address string.
        address: String,
    },
}

impl IdentityKey {
    /// A USB identity.
    #[must_use]
    pub fn usb(vendor_id: u16, product_id: u16, serial: Option<&str>) -> Self {
        Self::Usb {
            vendor_id,
            product_id,
            serial: serial.map(str::to_string),
        }
    }

    /// A network identity.
    #[must_use]
    pub fn network(address: impl Into<String>) -> Self {
        Self::Network {
            address: address.into(),
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usb {
                vendor_id,
                product_id,
                serial,
            } => {
                write!(f, "usb:{vendor_id:04x}:{product_id:04x}")?;
                if let Some(serial) = serial {
                    write!(f, ":{serial}")?;
                }
                Ok(())
            }
            Self::Network { address } => write!(f, "net:{address}"),
        }
    }
}

/// One unit reported by a discovery query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredUnit {
    /// Identity used to match the unit across scans.
    pub key: IdentityKey,
    /// Human-readable model name; drivers usually derive the device name
    /// from it.
    pub label: String,
}

impl DiscoveredUnit {
    /// Creates a unit.
    #[must_use]
    pub fn new(key: IdentityKey, label: impl Into<String>) -> Self {
        Self {
            key,
            label: label.into(),
        }
    }
}

/// Lists the hardware currently present on one source.
///
/// `enumerate` runs on a timer worker and may block.
pub trait Discovery: Send + Sync {
    /// Source name for logs.
    fn name(&self) -> &str;

    /// Lists present units.
    ///
    /// # Errors
    ///
    /// [`DiscoveryError::Transient`] if a retry may succeed,
    /// [`DiscoveryError::Fatal`] if the source is unusable.
    fn enumerate(&self) -> Result<Vec<DiscoveredUnit>, DiscoveryError>;
}

/// A discovery source whose contents are set by hand.
///
/// Tests plug and unplug units and inject failures; the demo server uses
/// it to present simulated hardware.
#[derive(Debug)]
pub struct MemoryDiscovery {
    name: String,
    units: Mutex<Vec<DiscoveredUnit>>,
    failures: Mutex<VecDeque<DiscoveryError>>,
    queries: AtomicUsize,
}

impl MemoryDiscovery {
    /// Creates an empty source.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            units: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            queries: AtomicUsize::new(0),
        }
    }

    /// Adds a unit, replacing one with the same key.
    pub fn plug(&self, unit: DiscoveredUnit) {
        let mut units = self.units.lock();
        units.retain(|present| present.key != unit.key);
        units.push(unit);
    }

    /// Removes the unit with `key`. Returns `false` if it was absent.
    pub fn unplug(&self, key: &IdentityKey) -> bool {
        let mut units = self.units.lock();
        let before = units.len();
        units.retain(|present| &present.key != key);
        units.len() != before
    }

    /// Makes the next query fail with `error`. Failures queue up.
    pub fn fail_next(&self, error: DiscoveryError) {
        self.failures.lock().push_back(error);
    }

    /// Number of `enumerate` calls so far, failed ones included.
    #[must_use]
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl Discovery for MemoryDiscovery {
    fn name(&self) -> &str {
        &self.name
    }

    fn enumerate(&self) -> Result<Vec<DiscoveredUnit>, DiscoveryError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }
        Ok(self.units.lock().clone())
    }
}
