// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Lifecycle events for supervisors.
//!
//! The bus publishes a [`BusEvent`] whenever a device or client comes or
//! goes. [`EventBus`] fans them out over tokio's broadcast channel so any
//! number of async observers can follow along.
//!
//! # Examples
//!
//! ```
//! use astrobus::event::{BusEvent, EventBus};
//!
//! let events = EventBus::new();
//! let mut rx = events.subscribe();
//!
//! events.publish(BusEvent::device_attached("Focuser"));
//! ```

mod bus_event;
mod event_bus;

pub use bus_event::BusEvent;
pub use event_bus::{DEFAULT_EVENT_CAPACITY, EventBus};
