// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The property bus.
//!
//! The [`Bus`] knows every attached device and client. Devices push
//! definitions, updates, deletions and messages through it; clients push
//! enumeration and change requests the other way. The bus never holds
//! property state of its own.

mod broker;
mod config;
mod dispatch;
mod registry;

pub use broker::Bus;
pub use config::{BusConfig, DEFAULT_MAX_CLIENTS, DEFAULT_MAX_DEVICES};
