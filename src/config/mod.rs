// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Persisted device configuration.
//!
//! A driver's `CONFIG` property saves a snapshot of its persistent
//! properties into a [`ConfigStore`] and replays it later through the
//! driver's own change handling. The snapshot is a [`DeviceProfile`].
//!
//! - [`MemoryConfigStore`] - Process-local store, for tests and simulators
//! - [`JsonConfigStore`] - One JSON file per device under a directory

mod json;
mod memory;
pub(crate) mod millis;

pub use json::JsonConfigStore;
pub use memory::MemoryConfigStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::property::{Property, PropertyType};

/// Saved property values for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// Device name.
    pub device: String,
    /// When the profile was written.
    pub saved_at: DateTime<Utc>,
    /// Saved properties; blobs are never saved.
    pub properties: Vec<Property>,
}

impl DeviceProfile {
    /// Builds a profile stamped now, dropping blob properties.
    #[must_use]
    pub fn new(device: impl Into<String>, properties: impl IntoIterator<Item = Property>) -> Self {
        Self {
            device: device.into(),
            saved_at: Utc::now(),
            properties: properties
                .into_iter()
                .filter(|p| p.property_type != PropertyType::Blob)
                .collect(),
        }
    }
}

/// Storage for device profiles.
pub trait ConfigStore: Send + Sync {
    /// Writes `profile`, replacing any previous one for the device.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile cannot be written.
    fn save(&self, profile: &DeviceProfile) -> Result<(), ConfigError>;

    /// Reads the profile saved for `device`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if nothing was saved, or another
    /// error if the profile cannot be read.
    fn load(&self, device: &str) -> Result<DeviceProfile, ConfigError>;

    /// Forgets the profile for `device`. Missing profiles are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile exists but cannot be removed.
    fn remove(&self, device: &str) -> Result<(), ConfigError>;
}
