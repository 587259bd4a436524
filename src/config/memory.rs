// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory profile store.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::{ConfigStore, DeviceProfile};
use crate::error::ConfigError;

/// Keeps profiles in a map for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    profiles: Mutex<HashMap<String, DeviceProfile>>,
}

impl MemoryConfigStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of saved profiles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.profiles.lock().len()
    }

    /// Returns `true` if nothing has been saved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.profiles.lock().is_empty()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn save(&self, profile: &DeviceProfile) -> Result<(), ConfigError> {
        self.profiles
            .lock()
            .insert(profile.device.clone(), profile.clone());
        Ok(())
    }

    fn load(&self, device: &str) -> Result<DeviceProfile, ConfigError> {
        self.profiles
            .lock()
            .get(device)
            .cloned()
            .ok_or_else(|| ConfigError::NotFound(device.to_string()))
    }

    fn remove(&self, device: &str) -> Result<(), ConfigError> {
        self.profiles.lock().remove(device);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load() {
        let store = MemoryConfigStore::new();
        store.save(&DeviceProfile::new("Focuser", Vec::new())).unwrap();
        assert_eq!(store.load("Focuser").unwrap().device, "Focuser");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn load_missing_is_not_found() {
        let store = MemoryConfigStore::new();
        assert!(matches!(store.load("Nope"), Err(ConfigError::NotFound(_))));
        store.remove("Nope").unwrap();
        assert!(store.is_empty());
    }
}
