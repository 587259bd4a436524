// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-client interest filters.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::property::PropertyPattern;

/// The set of patterns a client wants notifications for.
///
/// A new filter is empty and matches nothing. Clones share the same
/// pattern list, so the owner of a client can widen or narrow it while
/// the client stays attached.
///
/// # Examples
///
/// ```
/// use astrobus::client::InterestFilter;
/// use astrobus::property::PropertyPattern;
///
/// let filter = InterestFilter::new();
/// assert!(!filter.matches("Focuser", Some("CONNECTION")));
///
/// filter.add(PropertyPattern::device("Focuser"));
/// assert!(filter.matches("Focuser", Some("CONNECTION")));
/// assert!(!filter.matches("Mount", None));
/// ```
#[derive(Debug, Clone, Default)]
pub struct InterestFilter {
    patterns: Arc<RwLock<Vec<PropertyPattern>>>,
}

impl InterestFilter {
    /// Creates an empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a filter matching every device and property.
    #[must_use]
    pub fn everything() -> Self {
        let filter = Self::new();
        filter.add(PropertyPattern::all());
        filter
    }

    /// Adds a pattern unless an identical one is present.
    pub fn add(&self, pattern: PropertyPattern) {
        let mut patterns = self.patterns.write();
        if !patterns.contains(&pattern) {
            patterns.push(pattern);
        }
    }

    /// Removes every pattern naming `device`.
    pub fn remove_device(&self, device: &str) {
        self.patterns.write().retain(|p| p.device != device);
    }

    /// Removes every pattern.
    pub fn clear(&self) {
        self.patterns.write().clear();
    }

    /// Returns `true` if no pattern is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.read().is_empty()
    }

    /// Returns `true` if a notification about `device` (and `name`, if
    /// given) should reach the client.
    #[must_use]
    pub fn matches(&self, device: &str, name: Option<&str>) -> bool {
        self.patterns
            .read()
            .iter()
            .any(|p| p.matches(device, name.unwrap_or_default(), None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_patterns() {
        let filter = InterestFilter::new();
        let shared = filter.clone();
        shared.add(PropertyPattern::property("Focuser", "FOCUSER_POSITION"));
        assert!(filter.matches("Focuser", Some("FOCUSER_POSITION")));
        assert!(!filter.matches("Focuser", Some("CONNECTION")));
    }

    #[test]
    fn delete_all_matches_any_pattern_of_the_device() {
        let filter = InterestFilter::new();
        filter.add(PropertyPattern::property("Focuser", "FOCUSER_POSITION"));
        assert!(filter.matches("Focuser", None));
    }

    #[test]
    fn remove_device_narrows() {
        let filter = InterestFilter::everything();
        filter.add(PropertyPattern::device("Focuser"));
        filter.remove_device("Focuser");
        assert!(filter.matches("Focuser", None));
        filter.clear();
        assert!(filter.is_empty());
    }
}
