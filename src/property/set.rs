// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A device's ordered collection of properties.

use super::{Property, PropertyPattern, property_match};

#[derive(Debug, Clone)]
struct Entry {
    property: Property,
    defined: bool,
    persistent: bool,
}

/// Properties owned by one device, in definition order.
///
/// Each property carries a `defined` flag: only defined properties are
/// announced on enumeration and accept change requests. Drivers keep
/// connection-dependent properties here undefined while disconnected.
#[derive(Debug, Clone, Default)]
pub struct PropertySet {
    entries: Vec<Entry>,
}

impl PropertySet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a property, keeping its position when replaced.
    ///
    /// A replaced property keeps its `defined` and `persistent` flags.
    pub fn insert(&mut self, property: Property) {
        if let Some(entry) = self.entry_mut(&property.name) {
            entry.property = property;
        } else {
            self.entries.push(Entry {
                property,
                defined: false,
                persistent: false,
            });
        }
    }

    /// Removes a property.
    pub fn remove(&mut self, name: &str) -> Option<Property> {
        let index = self.entries.iter().position(|e| e.property.name == name)?;
        Some(self.entries.remove(index).property)
    }

    /// Removes every property.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Returns a property by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Property> {
        self.entry(name).map(|e| &e.property)
    }

    /// Returns a mutable property by name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.entry_mut(name).map(|e| &mut e.property)
    }

    /// Returns `true` if the property exists and is defined.
    #[must_use]
    pub fn is_defined(&self, name: &str) -> bool {
        self.entry(name).is_some_and(|e| e.defined)
    }

    /// Sets the defined flag. Returns `false` if the property is unknown.
    pub fn set_defined(&mut self, name: &str, defined: bool) -> bool {
        self.entry_mut(name).map(|e| e.defined = defined).is_some()
    }

    /// Marks a property as saved by the CONFIG property.
    pub fn set_persistent(&mut self, name: &str, persistent: bool) -> bool {
        self.entry_mut(name)
            .map(|e| e.persistent = persistent)
            .is_some()
    }

    /// Number of properties, defined or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the set holds no properties.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All properties in definition order.
    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.entries.iter().map(|e| &e.property)
    }

    /// Defined properties in definition order.
    pub fn defined(&self) -> impl Iterator<Item = &Property> {
        self.entries
            .iter()
            .filter(|e| e.defined)
            .map(|e| &e.property)
    }

    /// Defined, persistent properties in definition order.
    pub fn persistent(&self) -> impl Iterator<Item = &Property> {
        self.entries
            .iter()
            .filter(|e| e.defined && e.persistent)
            .map(|e| &e.property)
    }

    /// Defined, visible properties selected by `pattern`.
    pub fn matching<'a>(
        &'a self,
        pattern: Option<&'a PropertyPattern>,
    ) -> impl Iterator<Item = &'a Property> + 'a {
        self.defined().filter(move |property| {
            !property.hidden && pattern.is_none_or(|p| property_match(p, property))
        })
    }

    /// Looks up the property a change request addresses.
    ///
    /// Only defined properties match, by device, name and type.
    pub fn find_defined(&mut self, request: &Property) -> Option<&mut Property> {
        let pattern = PropertyPattern::from(request);
        self.entries
            .iter_mut()
            .find(|e| e.defined && property_match(&pattern, &e.property))
            .map(|e| &mut e.property)
    }

    /// Like [`find_defined`](Self::find_defined) but skips read-only
    /// properties.
    pub fn find_changeable(&mut self, request: &Property) -> Option<&mut Property> {
        self.find_defined(request)
            .filter(|property| !property.is_read_only())
    }

    fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.property.name == name)
    }

    fn entry_mut(&mut self, name: &str) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.property.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{Permission, PropertyState};

    fn number(name: &str, permission: Permission) -> Property {
        Property::number("Focuser", name, "Main", name, PropertyState::Idle, permission)
            .with_number("VALUE", "Value", 0.0, 10.0, 1.0, 0.0)
    }

    #[test]
    fn insert_keeps_definition_order() {
        let mut set = PropertySet::new();
        set.insert(number("B", Permission::ReadWrite));
        set.insert(number("A", Permission::ReadWrite));
        set.insert(number("B", Permission::ReadOnly));
        let names: Vec<_> = set.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);
        assert!(set.get("B").unwrap().is_read_only());
    }

    #[test]
    fn undefined_properties_are_not_enumerated() {
        let mut set = PropertySet::new();
        set.insert(number("A", Permission::ReadWrite));
        set.insert(number("B", Permission::ReadWrite));
        set.set_defined("B", true);
        let names: Vec<_> = set.matching(None).map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["B"]);
    }

    #[test]
    fn hidden_properties_are_not_enumerated() {
        let mut set = PropertySet::new();
        set.insert(number("A", Permission::ReadWrite).hidden());
        set.set_defined("A", true);
        assert_eq!(set.matching(None).count(), 0);
        assert!(set.is_defined("A"));
    }

    #[test]
    fn find_changeable_skips_read_only() {
        let mut set = PropertySet::new();
        set.insert(number("TEMP", Permission::ReadOnly));
        set.set_defined("TEMP", true);
        let request = Property::number_request("Focuser", "TEMP", &[("VALUE", 1.0)]);
        assert!(set.find_defined(&request).is_some());
        assert!(set.find_changeable(&request).is_none());
    }

    #[test]
    fn find_defined_checks_device() {
        let mut set = PropertySet::new();
        set.insert(number("A", Permission::ReadWrite));
        set.set_defined("A", true);
        let request = Property::number_request("Mount", "A", &[("VALUE", 1.0)]);
        assert!(set.find_defined(&request).is_none());
    }
}
