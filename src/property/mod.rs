// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The property model.
//!
//! A [`Property`] is a named, typed group of [`Item`]s owned by one device.
//! Everything that crosses the bus is a property: definitions, updates,
//! deletions and client change requests.
//!
//! # Examples
//!
//! ```
//! use astrobus::property::{Permission, Property, PropertyState};
//!
//! let mut position = Property::number(
//!     "Focuser", "FOCUSER_POSITION", "Main", "Position",
//!     PropertyState::Ok, Permission::ReadWrite,
//! )
//! .with_number("POSITION", "Position", 0.0, 60_000.0, 1.0, 0.0);
//!
//! let request = Property::number_request("Focuser", "FOCUSER_POSITION", &[("POSITION", 90_000.0)]);
//! position.copy_targets(&request, false);
//! assert_eq!(position.number_target("POSITION"), Some(60_000.0));
//! assert_eq!(position.number_value("POSITION"), Some(0.0));
//! ```

mod item;
mod kind;
mod model;
pub mod names;
mod pattern;
mod set;

pub use item::{BlobValue, Item, ItemValue, NumberValue, TEXT_MAX_LEN};
pub use kind::{Permission, PropertyState, PropertyType, SwitchRule};
pub use model::Property;
pub use pattern::{PropertyPattern, property_match};
pub use set::PropertySet;
