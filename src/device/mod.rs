// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Devices: drivers that own properties and talk to hardware.
//!
//! - [`Device`] - The contract the bus drives
//! - [`DeviceBase`] - Standard properties and helpers shared by drivers
//! - [`Transport`] - Blocking byte channel to the hardware
//! - [`MockTransport`] - Scripted transport for tests and simulation
//!
//! # Threading
//!
//! The bus serializes `attach`, `enumerate_properties` and
//! `change_property` per device and runs them under that device's gate.
//! They must return quickly, must never wait for the device's own timers
//! (`cancel_sync`), and must not call into another device; hardware work
//! and cross-device requests belong in a timer callback scheduled on
//! [`Bus::timers`].
//!
//! `detach` runs without the gate, after in-flight entry calls have
//! returned, so it may `cancel_sync` its timers and publish its teardown.

mod base;
mod transport;

pub use base::{ConnectionChange, DeviceBase};
pub use transport::{MockTransport, Transport};

use crate::bus::Bus;
use crate::client::ClientId;
use crate::error::DeviceError;
use crate::property::{Property, PropertyPattern};

/// A driver attached to the bus.
///
/// Implementations use interior mutability; the bus holds them as
/// `Arc<dyn Device>` and calls these methods from arbitrary threads.
pub trait Device: Send + Sync {
    /// Unique device name.
    fn name(&self) -> &str;

    /// Allocates properties and defines the visible ones.
    ///
    /// # Errors
    ///
    /// An error leaves the device unregistered.
    fn attach(&self, bus: &Bus) -> Result<(), DeviceError>;

    /// Defines every visible property selected by `pattern`, addressed to
    /// `client` (or every client when `None`).
    fn enumerate_properties(
        &self,
        bus: &Bus,
        client: Option<ClientId>,
        pattern: Option<&PropertyPattern>,
    );

    /// Handles a client change request.
    ///
    /// Unknown, undefined and read-only targets are ignored.
    fn change_property(&self, bus: &Bus, client: Option<ClientId>, property: &Property);

    /// Quiesces timers, closes hardware and releases resources.
    ///
    /// The bus deletes all of the device's properties afterwards.
    ///
    /// # Errors
    ///
    /// Errors are logged; the device is removed regardless.
    fn detach(&self, bus: &Bus) -> Result<(), DeviceError>;
}
