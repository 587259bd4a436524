// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hot-plugged devices.
//!
//! A [`HotplugManager`] owns a fixed-capacity [`DeviceTable`] and keeps it
//! matched to what one [`Discovery`] source reports. Units are matched
//! across scans by [`IdentityKey`]: a new key attaches a device built by a
//! [`DeviceFactory`], a vanished key detaches it.
//!
//! USB-style sources push [`HotplugEvent`]s, which are debounced into a
//! single scan. Network sources are polled on a self-rearming timer.

mod config;
mod discovery;
mod manager;
mod table;

pub use config::{DEFAULT_DEBOUNCE, DEFAULT_SCAN_INTERVAL, DEFAULT_TABLE_CAPACITY, HotplugConfig};
pub use discovery::{DiscoveredUnit, Discovery, IdentityKey, MemoryDiscovery};
pub use manager::{DeviceFactory, HotplugEvent, HotplugManager, ScanReport};
pub use table::{DeviceTable, TableSlot};
