// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The property value object.

use serde::{Deserialize, Serialize};

use super::item::truncate;
use super::{Item, ItemValue, Permission, PropertyState, PropertyType, SwitchRule};
use crate::error::PropertyError;

/// A named, typed group of items belonging to one device.
///
/// Properties are the only thing that travels across the bus. A device
/// owns the authoritative copy; clients and the bus only ever see clones.
///
/// Change requests are properties too: a client builds one carrying only
/// the items it wants changed (see [`Property::switch_request`] and
/// friends) and the device merges it with [`Property::apply_change`].
///
/// # Examples
///
/// ```
/// use astrobus::property::{Permission, Property, PropertyState, SwitchRule};
///
/// let mut connection = Property::switch(
///     "Focuser", "CONNECTION", "Main", "Connection",
///     PropertyState::Idle, Permission::ReadWrite, SwitchRule::OneOfMany,
/// )
/// .with_switch("CONNECTED", "Connected", false)
/// .with_switch("DISCONNECTED", "Disconnected", true);
///
/// let request = Property::switch_request("Focuser", "CONNECTION", &[("CONNECTED", true)]);
/// connection.apply_change(&request).unwrap();
/// assert_eq!(connection.switch_value("CONNECTED"), Some(true));
/// assert_eq!(connection.switch_value("DISCONNECTED"), Some(false));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// Owning device name.
    pub device: String,
    /// Property name, unique within the device.
    pub name: String,
    /// UI grouping hint.
    #[serde(default)]
    pub group: String,
    /// Human-readable label.
    #[serde(default)]
    pub label: String,
    /// Item kind.
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    /// Current lifecycle state.
    #[serde(default)]
    pub state: PropertyState,
    /// Who may change it.
    #[serde(default)]
    pub permission: Permission,
    /// Switch rule; only meaningful for switch properties.
    #[serde(default)]
    pub rule: SwitchRule,
    /// Hidden properties are never broadcast.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hidden: bool,
    /// Ordered items.
    #[serde(default)]
    pub items: Vec<Item>,
}

impl Property {
    fn new(
        device: impl Into<String>,
        name: impl Into<String>,
        group: impl Into<String>,
        label: impl Into<String>,
        property_type: PropertyType,
        state: PropertyState,
        permission: Permission,
    ) -> Self {
        Self {
            device: device.into(),
            name: name.into(),
            group: group.into(),
            label: label.into(),
            property_type,
            state,
            permission,
            rule: SwitchRule::AnyOfMany,
            hidden: false,
            items: Vec::new(),
        }
    }

    // ========================================================================
    // Constructors
    // ========================================================================

    /// Creates an empty text property.
    #[must_use]
    pub fn text(
        device: impl Into<String>,
        name: impl Into<String>,
        group: impl Into<String>,
        label: impl Into<String>,
        state: PropertyState,
        permission: Permission,
    ) -> Self {
        Self::new(device, name, group, label, PropertyType::Text, state, permission)
    }

    /// Creates an empty number property.
    #[must_use]
    pub fn number(
        device: impl Into<String>,
        name: impl Into<String>,
        group: impl Into<String>,
        label: impl Into<String>,
        state: PropertyState,
        permission: Permission,
    ) -> Self {
        Self::new(device, name, group, label, PropertyType::Number, state, permission)
    }

    /// Creates an empty switch property governed by `rule`.
    #[must_use]
    pub fn switch(
        device: impl Into<String>,
        name: impl Into<String>,
        group: impl Into<String>,
        label: impl Into<String>,
        state: PropertyState,
        permission: Permission,
        rule: SwitchRule,
    ) -> Self {
        let mut property =
            Self::new(device, name, group, label, PropertyType::Switch, state, permission);
        property.rule = rule;
        property
    }

    /// Creates an empty light property. Lights are always read-only.
    #[must_use]
    pub fn light(
        device: impl Into<String>,
        name: impl Into<String>,
        group: impl Into<String>,
        label: impl Into<String>,
        state: PropertyState,
    ) -> Self {
        Self::new(
            device,
            name,
            group,
            label,
            PropertyType::Light,
            state,
            Permission::ReadOnly,
        )
    }

    /// Creates an empty blob property.
    #[must_use]
    pub fn blob(
        device: impl Into<String>,
        name: impl Into<String>,
        group: impl Into<String>,
        label: impl Into<String>,
        state: PropertyState,
        permission: Permission,
    ) -> Self {
        Self::new(device, name, group, label, PropertyType::Blob, state, permission)
    }

    /// Appends a text item.
    #[must_use]
    pub fn with_text(mut self, name: &str, label: &str, value: &str) -> Self {
        self.items.push(Item::text(name, label, value));
        self
    }

    /// Appends a number item.
    #[must_use]
    pub fn with_number(
        mut self,
        name: &str,
        label: &str,
        min: f64,
        max: f64,
        step: f64,
        value: f64,
    ) -> Self {
        self.items
            .push(Item::number(name, label, min, max, step, value));
        self
    }

    /// Appends a switch item.
    #[must_use]
    pub fn with_switch(mut self, name: &str, label: &str, on: bool) -> Self {
        self.items.push(Item::switch(name, label, on));
        self
    }

    /// Appends a light item.
    #[must_use]
    pub fn with_light(mut self, name: &str, label: &str, state: PropertyState) -> Self {
        self.items.push(Item::light(name, label, state));
        self
    }

    /// Appends a blob item.
    #[must_use]
    pub fn with_blob(mut self, name: &str, label: &str, format: &str) -> Self {
        self.items.push(Item::blob(name, label, format));
        self
    }

    /// Marks the property hidden.
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    // ========================================================================
    // Change requests
    // ========================================================================

    /// Builds a switch change request carrying only the given items.
    #[must_use]
    pub fn switch_request(device: &str, name: &str, items: &[(&str, bool)]) -> Self {
        let mut request = Self::new(
            device,
            name,
            "",
            "",
            PropertyType::Switch,
            PropertyState::Idle,
            Permission::ReadWrite,
        );
        request.items = items
            .iter()
            .map(|(item, on)| Item::switch(*item, "", *on))
            .collect();
        request
    }

    /// Builds a number change request carrying only the given items.
    ///
    /// Bounds are unconstrained; the receiving device clamps.
    #[must_use]
    pub fn number_request(device: &str, name: &str, items: &[(&str, f64)]) -> Self {
        let mut request = Self::new(
            device,
            name,
            "",
            "",
            PropertyType::Number,
            PropertyState::Idle,
            Permission::ReadWrite,
        );
        request.items = items
            .iter()
            .map(|(item, value)| Item::number(*item, "", f64::MIN, f64::MAX, 0.0, *value))
            .collect();
        request
    }

    /// Builds a text change request carrying only the given items.
    #[must_use]
    pub fn text_request(device: &str, name: &str, items: &[(&str, &str)]) -> Self {
        let mut request = Self::new(
            device,
            name,
            "",
            "",
            PropertyType::Text,
            PropertyState::Idle,
            Permission::ReadWrite,
        );
        request.items = items
            .iter()
            .map(|(item, value)| Item::text(*item, "", *value))
            .collect();
        request
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Returns the item with the given name.
    #[must_use]
    pub fn item(&self, name: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.name == name)
    }

    /// Returns the mutable item with the given name.
    pub fn item_mut(&mut self, name: &str) -> Option<&mut Item> {
        self.items.iter_mut().find(|item| item.name == name)
    }

    /// Returns a switch item's state.
    #[must_use]
    pub fn switch_value(&self, name: &str) -> Option<bool> {
        self.item(name).and_then(Item::as_switch)
    }

    /// Returns a number item's current value.
    #[must_use]
    pub fn number_value(&self, name: &str) -> Option<f64> {
        self.item(name)
            .and_then(Item::as_number)
            .map(|number| number.value)
    }

    /// Returns a number item's target.
    #[must_use]
    pub fn number_target(&self, name: &str) -> Option<f64> {
        self.item(name)
            .and_then(Item::as_number)
            .map(|number| number.target)
    }

    /// Returns a text item's value.
    #[must_use]
    pub fn text_value(&self, name: &str) -> Option<&str> {
        self.item(name).and_then(Item::as_text)
    }

    /// Names of the switch items currently on, in item order.
    pub fn switches_on(&self) -> impl Iterator<Item = &str> {
        self.items
            .iter()
            .filter(|item| item.as_switch() == Some(true))
            .map(|item| item.name.as_str())
    }

    /// Returns `true` if clients may not change this property.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.permission == Permission::ReadOnly
    }

    /// Returns `true` if the switch items satisfy the property's rule.
    ///
    /// Always `true` for non-switch properties.
    #[must_use]
    pub fn satisfies_rule(&self) -> bool {
        self.property_type != PropertyType::Switch || self.rule.allows(self.switches_on().count())
    }

    /// Returns a copy suitable for notifying clients.
    ///
    /// Write-only properties are sent without items.
    #[must_use]
    pub fn for_update(&self) -> Self {
        let mut copy = self.clone();
        if self.permission == Permission::WriteOnly {
            copy.items.clear();
        }
        copy
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Turns one switch item on or off.
    ///
    /// Turning an item on in a `OneOfMany` or `AtMostOne` property turns
    /// every other item off.
    ///
    /// # Errors
    ///
    /// Returns [`PropertyError::UnknownItem`] if no item has this name.
    pub fn set_switch(&mut self, name: &str, on: bool) -> Result<(), PropertyError> {
        if self.item(name).and_then(Item::as_switch).is_none() {
            return Err(PropertyError::UnknownItem {
                property: self.name.clone(),
                item: name.to_string(),
            });
        }
        if on && self.rule != SwitchRule::AnyOfMany {
            for item in &mut self.items {
                item.set_switch(false);
            }
        }
        if let Some(item) = self.item_mut(name) {
            item.set_switch(on);
        }
        Ok(())
    }

    /// Sets a number item's value and target, clamped to its range.
    ///
    /// # Errors
    ///
    /// Returns [`PropertyError::UnknownItem`] if no number item has this name.
    pub fn set_number(&mut self, name: &str, value: f64) -> Result<(), PropertyError> {
        let property = self.name.clone();
        self.item_mut(name)
            .and_then(Item::as_number_mut)
            .map(|number| number.set(value))
            .ok_or(PropertyError::UnknownItem {
                property,
                item: name.to_string(),
            })
    }

    /// Sets a text item's value.
    ///
    /// # Errors
    ///
    /// Returns [`PropertyError::UnknownItem`] if no text item has this name.
    pub fn set_text(&mut self, name: &str, value: &str) -> Result<(), PropertyError> {
        match self.item_mut(name).map(|item| item.set_text(value)) {
            Some(true) => Ok(()),
            _ => Err(PropertyError::UnknownItem {
                property: self.name.clone(),
                item: name.to_string(),
            }),
        }
    }

    /// Copies item values from `source`, matching items by name.
    ///
    /// Does nothing if this property is read-only or the types differ.
    /// For switch properties other than `AnyOfMany` every item is turned
    /// off before copying. Numbers are clamped and both value and target
    /// are set. With `with_state` the source's state is adopted too.
    pub fn copy_values(&mut self, source: &Self, with_state: bool) {
        if self.is_read_only() || self.property_type != source.property_type {
            return;
        }
        if self.property_type == PropertyType::Switch && self.rule != SwitchRule::AnyOfMany {
            for item in &mut self.items {
                item.set_switch(false);
            }
        }
        for incoming in &source.items {
            let Some(item) = self.item_mut(&incoming.name) else {
                continue;
            };
            match (&mut item.value, &incoming.value) {
                (ItemValue::Number(number), ItemValue::Number(new)) => number.set(new.value),
                (ItemValue::Text { value, max_len }, ItemValue::Text { value: new, .. }) => {
                    *value = truncate(new.clone(), *max_len);
                }
                (ItemValue::Switch { on }, ItemValue::Switch { on: new }) => *on = *new,
                (ItemValue::Light { state }, ItemValue::Light { state: new }) => *state = *new,
                (ItemValue::Blob(blob), ItemValue::Blob(new)) => blob.clone_from(new),
                _ => {}
            }
        }
        if with_state {
            self.state = source.state;
        }
    }

    /// Copies number targets from `source`, clamped; values stay as they
    /// are. Non-number properties are left unchanged.
    pub fn copy_targets(&mut self, source: &Self, with_state: bool) {
        if self.property_type != PropertyType::Number || source.property_type != PropertyType::Number
        {
            return;
        }
        for incoming in &source.items {
            let Some(new) = incoming.as_number() else {
                continue;
            };
            if let Some(number) = self
                .item_mut(&incoming.name)
                .and_then(Item::as_number_mut)
            {
                number.set_target(new.value);
            }
        }
        if with_state {
            self.state = source.state;
        }
    }

    /// Validates a client change request and merges it into this property.
    ///
    /// On error the property is left untouched.
    ///
    /// # Errors
    ///
    /// * [`PropertyError::ReadOnly`] for read-only properties.
    /// * [`PropertyError::TypeMismatch`] if the request has another type.
    /// * [`PropertyError::UnknownItem`] if the request names an item this
    ///   property lacks.
    /// * [`PropertyError::NotFinite`] if a requested number is NaN or infinite.
    /// * [`PropertyError::RuleViolation`] if the result breaks the switch rule.
    pub fn apply_change(&mut self, request: &Self) -> Result<(), PropertyError> {
        if self.is_read_only() {
            return Err(PropertyError::ReadOnly(self.name.clone()));
        }
        if self.property_type != request.property_type {
            return Err(PropertyError::TypeMismatch {
                expected: self.property_type,
                actual: request.property_type,
            });
        }
        if let Some(missing) = request.items.iter().find(|item| self.item(&item.name).is_none()) {
            return Err(PropertyError::UnknownItem {
                property: self.name.clone(),
                item: missing.name.clone(),
            });
        }
        if let Some(bad) = request
            .items
            .iter()
            .find(|item| item.as_number().is_some_and(|n| !n.value.is_finite()))
        {
            return Err(PropertyError::NotFinite {
                property: self.name.clone(),
                item: bad.name.clone(),
            });
        }
        let mut merged = self.clone();
        merged.copy_values(request, false);
        if !merged.satisfies_rule() {
            return Err(PropertyError::RuleViolation {
                property: self.name.clone(),
                rule: self.rule,
            });
        }
        *self = merged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> Property {
        Property::switch(
            "CCD",
            "CONNECTION",
            "Main",
            "Connection",
            PropertyState::Idle,
            Permission::ReadWrite,
            SwitchRule::OneOfMany,
        )
        .with_switch("CONNECTED", "Connected", false)
        .with_switch("DISCONNECTED", "Disconnected", true)
    }

    fn position() -> Property {
        Property::number(
            "Focuser",
            "FOCUSER_POSITION",
            "Main",
            "Position",
            PropertyState::Ok,
            Permission::ReadWrite,
        )
        .with_number("POSITION", "Position", 0.0, 1000.0, 1.0, 10.0)
    }

    #[test]
    fn set_switch_one_of_many_resets_others() {
        let mut property = connection();
        property.set_switch("CONNECTED", true).unwrap();
        assert_eq!(property.switches_on().collect::<Vec<_>>(), vec!["CONNECTED"]);
    }

    #[test]
    fn set_switch_any_of_many_keeps_others() {
        let mut property = Property::switch(
            "D",
            "OPTIONS",
            "",
            "",
            PropertyState::Idle,
            Permission::ReadWrite,
            SwitchRule::AnyOfMany,
        )
        .with_switch("A", "A", true)
        .with_switch("B", "B", false);
        property.set_switch("B", true).unwrap();
        assert_eq!(property.switches_on().count(), 2);
    }

    #[test]
    fn set_switch_unknown_item() {
        let mut property = connection();
        assert!(matches!(
            property.set_switch("BOGUS", true),
            Err(PropertyError::UnknownItem { .. })
        ));
    }

    #[test]
    fn copy_values_clamps_numbers() {
        let mut property = position();
        let request = Property::number_request("Focuser", "FOCUSER_POSITION", &[("POSITION", 5000.0)]);
        property.copy_values(&request, false);
        assert_eq!(property.number_value("POSITION"), Some(1000.0));
        assert_eq!(property.number_target("POSITION"), Some(1000.0));
    }

    #[test]
    fn copy_values_ignored_for_read_only() {
        let mut property = position();
        property.permission = Permission::ReadOnly;
        let request = Property::number_request("Focuser", "FOCUSER_POSITION", &[("POSITION", 5.0)]);
        property.copy_values(&request, true);
        assert_eq!(property.number_value("POSITION"), Some(10.0));
    }

    #[test]
    fn copy_values_type_mismatch_is_noop() {
        let mut property = connection();
        let request = Property::number_request("CCD", "CONNECTION", &[("CONNECTED", 1.0)]);
        property.copy_values(&request, false);
        assert_eq!(property.switch_value("DISCONNECTED"), Some(true));
    }

    #[test]
    fn copy_targets_leaves_values() {
        let mut property = position();
        let request = Property::number_request("Focuser", "FOCUSER_POSITION", &[("POSITION", -3.0)]);
        property.copy_targets(&request, false);
        assert_eq!(property.number_value("POSITION"), Some(10.0));
        assert_eq!(property.number_target("POSITION"), Some(0.0));
    }

    #[test]
    fn apply_change_rejects_rule_violation() {
        let mut property = connection();
        let request = Property::switch_request("CCD", "CONNECTION", &[("CONNECTED", false)]);
        let err = property.apply_change(&request).unwrap_err();
        assert!(matches!(err, PropertyError::RuleViolation { .. }));
        assert_eq!(property.switch_value("DISCONNECTED"), Some(true));
    }

    #[test]
    fn apply_change_rejects_unknown_item() {
        let mut property = connection();
        let request = Property::switch_request("CCD", "CONNECTION", &[("MAYBE", true)]);
        assert!(matches!(
            property.apply_change(&request),
            Err(PropertyError::UnknownItem { .. })
        ));
    }

    #[test]
    fn apply_change_rejects_non_finite_numbers() {
        let mut property = position();
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let request = Property::number_request("Focuser", "FOCUSER_POSITION", &[("POSITION", bad)]);
            assert!(matches!(
                property.apply_change(&request),
                Err(PropertyError::NotFinite { .. })
            ));
        }
        assert_eq!(property.number_value("POSITION"), Some(10.0));
    }

    #[test]
    fn set_text_updates_known_item_only() {
        let mut info = Property::text("CCD", "INFO", "Main", "Info", PropertyState::Ok, Permission::ReadOnly)
            .with_text("NAME", "Name", "CCD");
        info.set_text("NAME", "Guider").unwrap();
        assert_eq!(info.text_value("NAME"), Some("Guider"));
        assert!(matches!(
            info.set_text("MISSING", "x"),
            Err(PropertyError::UnknownItem { .. })
        ));
        assert!(matches!(
            position().set_text("POSITION", "x"),
            Err(PropertyError::UnknownItem { .. })
        ));
    }

    #[test]
    fn apply_change_is_idempotent() {
        let mut property = connection();
        let request = Property::switch_request("CCD", "CONNECTION", &[("CONNECTED", true)]);
        property.apply_change(&request).unwrap();
        let once = property.clone();
        property.apply_change(&request).unwrap();
        assert_eq!(property, once);
    }

    #[test]
    fn for_update_strips_write_only_items() {
        let mut property = position();
        property.permission = Permission::WriteOnly;
        assert!(property.for_update().items.is_empty());
        assert_eq!(position().for_update().items.len(), 1);
    }

    #[test]
    fn json_round_trip_keeps_items() {
        let property = connection();
        let json = serde_json::to_string(&property).unwrap();
        let back: Property = serde_json::from_str(&json).unwrap();
        assert_eq!(back, property);
    }
}
