// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wildcard patterns over `(device, name, type)`.

use serde::{Deserialize, Serialize};

use super::{Property, PropertyType};

/// A property selector where empty strings and `None` are wildcards.
///
/// # Examples
///
/// ```
/// use astrobus::property::PropertyPattern;
///
/// let pattern = PropertyPattern::device("Focuser");
/// assert!(pattern.matches("Focuser", "CONNECTION", None));
/// assert!(!pattern.matches("Mount", "CONNECTION", None));
/// assert!(PropertyPattern::all().matches("Mount", "", None));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyPattern {
    /// Device name; empty matches any device.
    #[serde(default)]
    pub device: String,
    /// Property name; empty matches any property.
    #[serde(default)]
    pub name: String,
    /// Property type; `None` matches any type.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub property_type: Option<PropertyType>,
}

impl PropertyPattern {
    /// Matches everything.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches every property of one device.
    #[must_use]
    pub fn device(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Self::default()
        }
    }

    /// Matches one named property of one device.
    #[must_use]
    pub fn property(device: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            name: name.into(),
            property_type: None,
        }
    }

    /// Restricts the pattern to one property type.
    #[must_use]
    pub fn with_type(mut self, property_type: PropertyType) -> Self {
        self.property_type = Some(property_type);
        self
    }

    /// Returns `true` if the pattern selects every device.
    #[must_use]
    pub fn is_any_device(&self) -> bool {
        self.device.is_empty()
    }

    /// Returns `true` if the pattern selects `device`.
    #[must_use]
    pub fn matches_device(&self, device: &str) -> bool {
        self.device.is_empty() || self.device == device
    }

    /// Field-wise match; an empty candidate name only checks the device.
    #[must_use]
    pub fn matches(&self, device: &str, name: &str, property_type: Option<PropertyType>) -> bool {
        self.matches_device(device)
            && (self.name.is_empty() || name.is_empty() || self.name == name)
            && match (self.property_type, property_type) {
                (Some(expected), Some(actual)) => expected == actual,
                _ => true,
            }
    }

    /// Returns `true` if the pattern selects `property`.
    #[must_use]
    pub fn matches_property(&self, property: &Property) -> bool {
        property_match(self, property)
    }
}

impl From<&Property> for PropertyPattern {
    fn from(property: &Property) -> Self {
        Self {
            device: property.device.clone(),
            name: property.name.clone(),
            property_type: Some(property.property_type),
        }
    }
}

/// Matches `candidate` against `pattern`; empty fields are wildcards.
#[must_use]
pub fn property_match(pattern: &PropertyPattern, candidate: &Property) -> bool {
    pattern.matches(
        &candidate.device,
        &candidate.name,
        Some(candidate.property_type),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{Permission, PropertyState};

    fn temperature() -> Property {
        Property::number(
            "Focuser",
            "FOCUSER_TEMPERATURE",
            "Main",
            "Temperature",
            PropertyState::Ok,
            Permission::ReadOnly,
        )
    }

    #[test]
    fn wildcard_matches_everything() {
        assert!(property_match(&PropertyPattern::all(), &temperature()));
    }

    #[test]
    fn device_and_name_must_match() {
        let property = temperature();
        assert!(property_match(
            &PropertyPattern::property("Focuser", "FOCUSER_TEMPERATURE"),
            &property
        ));
        assert!(!property_match(
            &PropertyPattern::property("Focuser", "FOCUSER_POSITION"),
            &property
        ));
        assert!(!property_match(&PropertyPattern::device("Mount"), &property));
    }

    #[test]
    fn type_is_checked_when_given() {
        let property = temperature();
        assert!(property_match(
            &PropertyPattern::all().with_type(PropertyType::Number),
            &property
        ));
        assert!(!property_match(
            &PropertyPattern::all().with_type(PropertyType::Switch),
            &property
        ));
    }

    #[test]
    fn from_property_selects_itself() {
        let property = temperature();
        let pattern = PropertyPattern::from(&property);
        assert!(pattern.matches_property(&property));
    }
}
