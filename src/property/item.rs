// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Property items: the named values a property groups together.

use serde::{Deserialize, Serialize};

use super::{PropertyState, PropertyType};

/// Default upper bound for text item values, in bytes.
pub const TEXT_MAX_LEN: usize = 512;

/// A numeric item value.
///
/// `value` is what the hardware currently reports; `target` is what was
/// last requested. Both stay within `[min, max]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberValue {
    /// Inclusive lower bound.
    pub min: f64,
    /// Inclusive upper bound.
    pub max: f64,
    /// Suggested increment for user interfaces.
    pub step: f64,
    /// Current value.
    pub value: f64,
    /// Requested value.
    pub target: f64,
    /// printf-style display hint.
    #[serde(default = "default_number_format")]
    pub format: String,
}

fn default_number_format() -> String {
    "%g".to_string()
}

impl NumberValue {
    /// Creates a number whose value and target both equal `value`
    /// clamped to the range.
    #[must_use]
    pub fn new(min: f64, max: f64, step: f64, value: f64) -> Self {
        let mut number = Self {
            min,
            max,
            step,
            value,
            target: value,
            format: default_number_format(),
        };
        number.value = number.clamp(value);
        number.target = number.value;
        number
    }

    /// Clamps `value` into `[min, max]`.
    #[must_use]
    pub fn clamp(&self, value: f64) -> f64 {
        if value < self.min {
            self.min
        } else if value > self.max {
            self.max
        } else {
            value
        }
    }

    /// Sets value and target together, clamped.
    pub fn set(&mut self, value: f64) {
        self.value = self.clamp(value);
        self.target = self.value;
    }

    /// Sets only the target, clamped.
    pub fn set_target(&mut self, target: f64) {
        self.target = self.clamp(target);
    }
}

/// A binary item value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlobValue {
    /// Format tag, e.g. `.fits`.
    pub format: String,
    /// Payload bytes.
    #[serde(default)]
    pub data: Vec<u8>,
    /// Optional location the payload can be fetched from instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// The typed value carried by an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ItemValue {
    /// Bounded-length text.
    Text {
        /// Current text.
        value: String,
        /// Maximum length in bytes.
        #[serde(default = "default_text_max")]
        max_len: usize,
    },
    /// Number with range and target.
    Number(NumberValue),
    /// Boolean switch.
    Switch {
        /// Whether the switch is on.
        on: bool,
    },
    /// Read-only indicator.
    Light {
        /// Indicator state.
        state: PropertyState,
    },
    /// Binary payload.
    Blob(BlobValue),
}

fn default_text_max() -> usize {
    TEXT_MAX_LEN
}

impl ItemValue {
    /// Returns the property type this value belongs to.
    #[must_use]
    pub const fn property_type(&self) -> PropertyType {
        match self {
            Self::Text { .. } => PropertyType::Text,
            Self::Number(_) => PropertyType::Number,
            Self::Switch { .. } => PropertyType::Switch,
            Self::Light { .. } => PropertyType::Light,
            Self::Blob(_) => PropertyType::Blob,
        }
    }
}

/// A named, labelled value inside a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Item name, unique within its property.
    pub name: String,
    /// Human-readable label.
    #[serde(default)]
    pub label: String,
    /// Typed value.
    #[serde(flatten)]
    pub value: ItemValue,
}

impl Item {
    /// Creates a text item; `value` is truncated to [`TEXT_MAX_LEN`].
    #[must_use]
    pub fn text(name: impl Into<String>, label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            value: ItemValue::Text {
                value: truncate(value.into(), TEXT_MAX_LEN),
                max_len: TEXT_MAX_LEN,
            },
        }
    }

    /// Creates a number item.
    #[must_use]
    pub fn number(
        name: impl Into<String>,
        label: impl Into<String>,
        min: f64,
        max: f64,
        step: f64,
        value: f64,
    ) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            value: ItemValue::Number(NumberValue::new(min, max, step, value)),
        }
    }

    /// Creates a switch item.
    #[must_use]
    pub fn switch(name: impl Into<String>, label: impl Into<String>, on: bool) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            value: ItemValue::Switch { on },
        }
    }

    /// Creates a light item.
    #[must_use]
    pub fn light(name: impl Into<String>, label: impl Into<String>, state: PropertyState) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            value: ItemValue::Light { state },
        }
    }

    /// Creates an empty blob item with the given format tag.
    #[must_use]
    pub fn blob(name: impl Into<String>, label: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            value: ItemValue::Blob(BlobValue {
                format: format.into(),
                ..BlobValue::default()
            }),
        }
    }

    // ========================================================================
    // Typed accessors
    // ========================================================================

    /// Returns the text, if this is a text item.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match &self.value {
            ItemValue::Text { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Returns the number, if this is a number item.
    #[must_use]
    pub fn as_number(&self) -> Option<&NumberValue> {
        match &self.value {
            ItemValue::Number(number) => Some(number),
            _ => None,
        }
    }

    /// Returns the mutable number, if this is a number item.
    pub fn as_number_mut(&mut self) -> Option<&mut NumberValue> {
        match &mut self.value {
            ItemValue::Number(number) => Some(number),
            _ => None,
        }
    }

    /// Returns the switch state, if this is a switch item.
    #[must_use]
    pub fn as_switch(&self) -> Option<bool> {
        match self.value {
            ItemValue::Switch { on } => Some(on),
            _ => None,
        }
    }

    /// Returns the light state, if this is a light item.
    #[must_use]
    pub fn as_light(&self) -> Option<PropertyState> {
        match self.value {
            ItemValue::Light { state } => Some(state),
            _ => None,
        }
    }

    /// Returns the blob, if this is a blob item.
    #[must_use]
    pub fn as_blob(&self) -> Option<&BlobValue> {
        match &self.value {
            ItemValue::Blob(blob) => Some(blob),
            _ => None,
        }
    }

    /// Replaces the text, truncating to the item's bound.
    ///
    /// Returns `false` if this is not a text item.
    pub fn set_text(&mut self, text: impl Into<String>) -> bool {
        match &mut self.value {
            ItemValue::Text { value, max_len } => {
                *value = truncate(text.into(), *max_len);
                true
            }
            _ => false,
        }
    }

    /// Sets the switch state. Returns `false` if this is not a switch item.
    pub fn set_switch(&mut self, on: bool) -> bool {
        match &mut self.value {
            ItemValue::Switch { on: current } => {
                *current = on;
                true
            }
            _ => false,
        }
    }
}

/// Truncates `text` to at most `max_len` bytes on a character boundary.
pub(super) fn truncate(mut text: String, max_len: usize) -> String {
    if text.len() > max_len {
        let mut cut = max_len;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}
