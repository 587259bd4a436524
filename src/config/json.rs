// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! File-backed profile store.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{ConfigStore, DeviceProfile};
use crate::error::ConfigError;

/// Directory name under the user's configuration directory.
const APP_DIR: &str = "astrobus";

/// Stores each device profile as `<dir>/<device name>.json`, with spaces
/// in the device name replaced by underscores.
///
/// # Examples
///
/// ```
/// use astrobus::config::{ConfigStore, DeviceProfile, JsonConfigStore};
///
/// let dir = tempfile::tempdir().unwrap();
/// let store = JsonConfigStore::new(dir.path());
/// store.save(&DeviceProfile::new("Main Focuser", Vec::new())).unwrap();
/// assert!(dir.path().join("Main_Focuser.json").exists());
/// ```
#[derive(Debug, Clone)]
pub struct JsonConfigStore {
    dir: PathBuf,
}

impl JsonConfigStore {
    /// Creates a store rooted at `dir`. The directory is created on the
    /// first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Creates a store in the per-user configuration directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoConfigDir`] if the platform has none.
    pub fn user_default() -> Result<Self, ConfigError> {
        dirs::config_dir()
            .map(|dir| Self::new(dir.join(APP_DIR)))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// The root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the profile file for `device`.
    #[must_use]
    pub fn path_for(&self, device: &str) -> PathBuf {
        let file = device.replace(' ', "_");
        self.dir.join(format!("{file}.json"))
    }
}

impl ConfigStore for JsonConfigStore {
    fn save(&self, profile: &DeviceProfile) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&profile.device);
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, serde_json::to_vec_pretty(profile)?)?;
        fs::rename(&staging, &path)?;
        tracing::debug!(device = %profile.device, path = %path.display(), "Saved device profile");
        Ok(())
    }

    fn load(&self, device: &str) -> Result<DeviceProfile, ConfigError> {
        let path = self.path_for(device);
        match fs::read(&path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(ConfigError::NotFound(device.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn remove(&self, device: &str) -> Result<(), ConfigError> {
        match fs::remove_file(self.path_for(device)) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{Permission, Property, PropertyState};

    fn profile() -> DeviceProfile {
        DeviceProfile::new(
            "Sim Focuser",
            vec![
                Property::number("Sim Focuser", "FOCUSER_POSITION", "Main", "Position", PropertyState::Ok, Permission::ReadWrite)
                    .with_number("POSITION", "Position", 0.0, 1000.0, 1.0, 420.0),
                Property::blob("Sim Focuser", "IMAGE", "Main", "Image", PropertyState::Idle, Permission::ReadOnly)
                    .with_blob("IMAGE", "Image", ".fits"),
            ],
        )
    }

    #[test]
    fn round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonConfigStore::new(dir.path().join("nested"));
        store.save(&profile()).unwrap();

        let loaded = store.load("Sim Focuser").unwrap();
        assert_eq!(loaded.properties.len(), 1, "blobs are not persisted");
        assert_eq!(loaded.properties[0].number_value("POSITION"), Some(420.0));
    }

    #[test]
    fn missing_profile_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonConfigStore::new(dir.path());
        assert!(matches!(store.load("Nope"), Err(ConfigError::NotFound(_))));
        store.remove("Nope").unwrap();
    }

    #[test]
    fn corrupt_profile_is_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonConfigStore::new(dir.path());
        fs::write(store.path_for("Bad"), b"{not json").unwrap();
        assert!(matches!(store.load("Bad"), Err(ConfigError::Json(_))));
    }

    #[test]
    fn spaces_become_underscores() {
        let store = JsonConfigStore::new("/tmp/x");
        assert_eq!(store.path_for("CCD Imager Simulator"), PathBuf::from("/tmp/x/CCD_Imager_Simulator.json"));
    }
}
