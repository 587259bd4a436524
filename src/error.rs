// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `astrobus` broker.
//!
//! The hierarchy mirrors the broker's subsystems: bus registration, device
//! lifecycle, hardware transport, property validation, persisted
//! configuration, hot-plug discovery and the network wire protocol.
//!
//! Hardware failures never travel across the bus as errors. A driver turns
//! them into an `Alert` state on the affected property; the types here are
//! what the driver sees before that conversion.

use std::time::Duration;

use thiserror::Error;

use crate::client::ClientId;
use crate::property::{PropertyType, SwitchRule};

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error raised by the bus registry.
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    /// Error raised by a device lifecycle callback.
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// Error raised while validating or mutating a property.
    #[error("property error: {0}")]
    Property(#[from] PropertyError),

    /// Error raised by a hardware transport.
    #[error("hardware error: {0}")]
    Hardware(#[from] HardwareError),

    /// Error raised by persisted device configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error raised by a discovery source.
    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Error raised by the network wire protocol.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Errors raised by the bus registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// No tokio runtime was available to drive the timer pool.
    #[error("no tokio runtime available for the timer pool")]
    NoRuntime,

    /// The bus has been shut down.
    #[error("bus is shut down")]
    ShutDown,

    /// A device with the same name is already attached.
    #[error("device '{0}' is already attached")]
    DuplicateDevice(String),

    /// The device table is full.
    #[error("too many devices (capacity {capacity})")]
    TooManyDevices {
        /// Configured device capacity.
        capacity: usize,
    },

    /// The client table is full.
    #[error("too many clients (capacity {capacity})")]
    TooManyClients {
        /// Configured client capacity.
        capacity: usize,
    },

    /// No device with this name is attached.
    #[error("device '{0}' not found")]
    DeviceNotFound(String),

    /// No client with this id is attached.
    #[error("client {0} not found")]
    ClientNotFound(ClientId),
}

/// Errors raised by device lifecycle callbacks.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Property allocation or static metadata registration failed.
    ///
    /// The device is unusable and the bus does not register it.
    #[error("attach failed: {0}")]
    AttachFailed(String),

    /// Teardown failed; the device has still been removed from the bus.
    #[error("detach failed: {0}")]
    DetachFailed(String),

    /// A prior operation on the same property is still in flight.
    #[error("property '{property}' is busy")]
    Busy {
        /// Name of the busy property.
        property: String,
    },

    /// The device has no open hardware channel.
    #[error("device is not connected")]
    NotConnected,

    /// The underlying transport failed.
    #[error("hardware error: {0}")]
    Hardware(#[from] HardwareError),
}

/// Errors raised by a hardware transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HardwareError {
    /// The hardware did not answer in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The hardware went away.
    #[error("hardware disconnected")]
    Disconnected,

    /// The channel is not open.
    #[error("hardware channel is not open")]
    NotOpen,

    /// Low-level I/O failure.
    #[error("I/O failure: {0}")]
    Io(String),

    /// The hardware answered with an error or an unparseable reply.
    #[error("command rejected: {0}")]
    Rejected(String),
}

/// Errors raised while validating or mutating a property.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PropertyError {
    /// The device does not define this property.
    #[error("unknown property '{device}.{name}'")]
    UnknownProperty {
        /// Device name.
        device: String,
        /// Property name.
        name: String,
    },

    /// The property has no item with this name.
    #[error("property '{property}' has no item '{item}'")]
    UnknownItem {
        /// Property name.
        property: String,
        /// Item name.
        item: String,
    },

    /// The request carries a different property type.
    #[error("expected {expected} property, got {actual}")]
    TypeMismatch {
        /// Type of the stored property.
        expected: PropertyType,
        /// Type of the incoming request.
        actual: PropertyType,
    },

    /// The property is read-only.
    #[error("property '{0}' is read-only")]
    ReadOnly(String),

    /// A number request carries NaN or an infinity.
    #[error("property '{property}' item '{item}' is not a finite number")]
    NotFinite {
        /// Property name.
        property: String,
        /// Item name.
        item: String,
    },

    /// The change would leave a switch property violating its rule.
    #[error("property '{property}' would violate the {rule} rule")]
    RuleViolation {
        /// Property name.
        property: String,
        /// The violated rule.
        rule: SwitchRule,
    },
}

/// Errors raised by persisted device configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or writing the configuration record failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration record could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No per-user configuration directory exists on this platform.
    #[error("no configuration directory available")]
    NoConfigDir,

    /// No record has been saved for this device.
    #[error("no saved configuration for device '{0}'")]
    NotFound(String),
}

/// Errors raised by a hot-plug discovery source.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// The query failed but may succeed if retried.
    #[error("transient discovery failure: {0}")]
    Transient(String),

    /// The source is unusable; no further attempts will be made.
    #[error("fatal discovery failure: {0}")]
    Fatal(String),
}

impl DiscoveryError {
    /// Returns `true` if retrying the query may help.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Errors raised by the network wire protocol.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A line could not be decoded.
    #[error("malformed message: {0}")]
    Decode(#[from] serde_json::Error),

    /// Socket I/O failed.
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_error_display() {
        let err = BusError::TooManyDevices { capacity: 4 };
        assert_eq!(err.to_string(), "too many devices (capacity 4)");
    }

    #[test]
    fn error_from_hardware_error() {
        let err: Error = HardwareError::Disconnected.into();
        assert!(matches!(err, Error::Hardware(HardwareError::Disconnected)));
    }

    #[test]
    fn device_error_wraps_hardware() {
        let err: DeviceError = HardwareError::Timeout(Duration::from_millis(250)).into();
        assert_eq!(err.to_string(), "hardware error: timed out after 250ms");
    }

    #[test]
    fn property_error_display() {
        let err = PropertyError::RuleViolation {
            property: "CONNECTION".to_string(),
            rule: SwitchRule::OneOfMany,
        };
        assert_eq!(
            err.to_string(),
            "property 'CONNECTION' would violate the OneOfMany rule"
        );
    }

    #[test]
    fn discovery_error_transience() {
        assert!(DiscoveryError::Transient("busy".into()).is_transient());
        assert!(!DiscoveryError::Fatal("gone".into()).is_transient());
    }
}
