// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Astrobus - a property bus for astronomical instrument drivers.
//!
//! Drivers describe their hardware as named, typed [`property::Property`]
//! groups. Clients discover devices by asking for property definitions
//! and control them by requesting property changes. The [`bus::Bus`]
//! routes traffic in both directions and never holds state of its own.
//!
//! # Features
//!
//! - **Property model**: text, number, switch, light and blob items with
//!   states, permissions and switch rules
//! - **Device contract**: a [`device::Device`] trait plus a
//!   [`device::DeviceBase`] carrying the standard `CONNECTION`, `INFO`,
//!   `DEBUG`, `SIMULATION` and `CONFIG` properties
//! - **Timers**: a shared [`timer::TimerPool`] for hardware polling and
//!   deferred work, with cancel-and-wait semantics
//! - **Hot-plug**: a fixed-capacity device table kept in sync with a
//!   discovery source, debounced or polled
//! - **Network server** (`server` feature): JSON-lines over TCP
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use astrobus::bus::{Bus, BusConfig};
//! use astrobus::client::RecordingClient;
//! use astrobus::device::MockTransport;
//! use astrobus::drivers::focuser::Focuser;
//! use astrobus::property::{Property, PropertyPattern};
//! use astrobus::property::names::{CONNECTION_CONNECTED_ITEM, CONNECTION_PROPERTY};
//!
//! #[tokio::main]
//! async fn main() -> astrobus::Result<()> {
//!     let bus = Bus::new(BusConfig::default())?;
//!     bus.attach_device(Focuser::new("Focuser", MockTransport::focuser(0, 100)))?;
//!
//!     let recorder = Arc::new(RecordingClient::new("ui"));
//!     let id = bus.attach_client(recorder.clone())?;
//!     bus.enumerate_properties(Some(id), &PropertyPattern::all());
//!
//!     bus.change_property(
//!         Some(id),
//!         &Property::switch_request("Focuser", CONNECTION_PROPERTY, &[(CONNECTION_CONNECTED_ITEM, true)]),
//!     );
//!
//!     bus.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Concurrency
//!
//! Entry points are synchronous and may be called from any thread. Each
//! device has a re-entrant gate that serializes enumeration and change
//! requests, and a notification queue that clients are served from in
//! emission order. Client callbacks run outside every gate, so there is
//! no lock order between devices to get wrong. Hardware I/O runs on timer
//! workers and never holds a gate.

pub mod bus;
pub mod client;
pub mod config;
pub mod device;
pub mod drivers;
pub mod error;
pub mod event;
pub mod hotplug;
pub mod property;
#[cfg(feature = "server")]
pub mod server;
pub mod timer;

pub use bus::{Bus, BusConfig};
pub use client::{Client, ClientId};
pub use device::{Device, DeviceBase};
pub use error::{
    BusError, ConfigError, DeviceError, DiscoveryError, Error, HardwareError, PropertyError,
    ProtocolError, Result,
};
pub use property::{Property, PropertyPattern, PropertyState};
