// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Enumerations shared by every property: type, state, permission and
//! switch rule.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The kind of values a property's items carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropertyType {
    /// Bounded-length strings.
    Text,
    /// Numeric values with range, step and target.
    Number,
    /// Boolean toggles governed by a [`SwitchRule`].
    Switch,
    /// Read-only state indicators.
    Light,
    /// Opaque binary payloads with a format tag.
    Blob,
}

impl PropertyType {
    /// Returns the lowercase wire name of this type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Switch => "switch",
            Self::Light => "light",
            Self::Blob => "blob",
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a property.
///
/// `Busy` means an operation is in flight and its completion will be
/// reported by a later update to `Ok` or `Alert`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropertyState {
    /// Not yet used or reset.
    #[default]
    Idle,
    /// The last operation succeeded.
    Ok,
    /// An operation is in flight.
    Busy,
    /// The last operation failed.
    Alert,
}

impl PropertyState {
    /// Returns the wire name of this state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Ok => "Ok",
            Self::Busy => "Busy",
            Self::Alert => "Alert",
        }
    }
}

impl fmt::Display for PropertyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who may change a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Permission {
    /// Clients may observe but never change values.
    ReadOnly,
    /// Clients may observe and change values.
    #[default]
    ReadWrite,
    /// Clients may change values; updates carry no items.
    WriteOnly,
}

impl Permission {
    /// Returns `true` if clients may request changes.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }
}

/// Constraint on how many switch items may be on at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SwitchRule {
    /// Exactly one item is on.
    #[default]
    OneOfMany,
    /// Zero or one item is on.
    AtMostOne,
    /// Any number of items may be on.
    AnyOfMany,
}

impl SwitchRule {
    /// Returns `true` if `on_count` items being on satisfies this rule.
    #[must_use]
    pub const fn allows(self, on_count: usize) -> bool {
        match self {
            Self::OneOfMany => on_count == 1,
            Self::AtMostOne => on_count <= 1,
            Self::AnyOfMany => true,
        }
    }
}

impl fmt::Display for SwitchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OneOfMany => "OneOfMany",
            Self::AtMostOne => "AtMostOne",
            Self::AnyOfMany => "AnyOfMany",
        })
    }
}

impl FromStr for PropertyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "number" => Ok(Self::Number),
            "switch" => Ok(Self::Switch),
            "light" => Ok(Self::Light),
            "blob" => Ok(Self::Blob),
            other => Err(format!("unknown property type '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_rule_counts() {
        assert!(SwitchRule::OneOfMany.allows(1));
        assert!(!SwitchRule::OneOfMany.allows(0));
        assert!(!SwitchRule::OneOfMany.allows(2));
        assert!(SwitchRule::AtMostOne.allows(0));
        assert!(!SwitchRule::AtMostOne.allows(2));
        assert!(SwitchRule::AnyOfMany.allows(5));
    }

    #[test]
    fn property_type_parse() {
        assert_eq!("Number".parse::<PropertyType>(), Ok(PropertyType::Number));
        assert!("vector".parse::<PropertyType>().is_err());
    }

    #[test]
    fn state_serializes_camel_case() {
        let json = serde_json::to_string(&PropertyState::Busy).unwrap();
        assert_eq!(json, "\"busy\"");
    }

    #[test]
    fn permission_writability() {
        assert!(!Permission::ReadOnly.is_writable());
        assert!(Permission::WriteOnly.is_writable());
    }
}
