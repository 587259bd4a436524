// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Clients: consumers of property notifications.
//!
//! A client is anything that wants to observe devices or request changes:
//! an embedded UI, a scripting host, the network server's per-peer proxy,
//! or an agent device's internal observer.
//!
//! Implementations must not block in the notification callbacks. They run
//! on the thread that emitted the notification, or on a thread already
//! delivering that device's notifications, and never while a device gate
//! is held, so a callback may send requests to any device.
//!
//! - [`Client`] - The callback contract
//! - [`CallbackClient`] - Closure-driven client with subscribe/unsubscribe
//! - [`RecordingClient`] - Client that records everything it receives
//! - [`InterestFilter`] - Patterns restricting what a client receives

mod callback;
mod id;
mod interest;
mod notification;
mod recording;

pub use callback::{CallbackClient, SubscriptionId};
pub use id::ClientId;
pub use interest::InterestFilter;
pub use notification::Notification;
pub use recording::RecordingClient;

use crate::Result;
use crate::bus::Bus;
use crate::property::Property;

/// Receives property notifications from the bus.
///
/// Only the property callbacks are required. Lifecycle hooks default to
/// no-ops.
pub trait Client: Send + Sync {
    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    /// Restricts which devices and properties reach this client.
    ///
    /// `None` receives everything.
    fn interest(&self) -> Option<&InterestFilter> {
        None
    }

    /// Called once the client is registered, with its assigned id.
    ///
    /// A client typically calls [`Bus::enumerate_properties`] from here.
    ///
    /// # Errors
    ///
    /// An error rolls back the registration.
    fn attach(&self, _bus: &Bus, _id: ClientId) -> Result<()> {
        Ok(())
    }

    /// A property became visible.
    fn define_property(&self, bus: &Bus, property: &Property, message: Option<&str>);

    /// A property changed.
    fn update_property(&self, bus: &Bus, property: &Property, message: Option<&str>);

    /// A property, or with `property == None` every property of `device`,
    /// went away.
    fn delete_property(
        &self,
        bus: &Bus,
        device: &str,
        property: Option<&Property>,
        message: Option<&str>,
    );

    /// A device sent a free-form message.
    fn send_message(&self, _bus: &Bus, _device: &str, _message: &str) {}

    /// Called after the client has been removed from the bus.
    ///
    /// # Errors
    ///
    /// Errors are logged; the client is removed regardless.
    fn detach(&self, _bus: &Bus) -> Result<()> {
        Ok(())
    }
}
