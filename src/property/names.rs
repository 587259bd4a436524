// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Well-known property and item names.

/// Group used for the standard driver properties.
pub const MAIN_GROUP: &str = "Main";

/// Connection switch, `OneOfMany`.
pub const CONNECTION_PROPERTY: &str = "CONNECTION";
/// Item on while connected.
pub const CONNECTION_CONNECTED_ITEM: &str = "CONNECTED";
/// Item on while disconnected.
pub const CONNECTION_DISCONNECTED_ITEM: &str = "DISCONNECTED";

/// Read-only driver identity.
pub const INFO_PROPERTY: &str = "INFO";
/// Device name item.
pub const INFO_DEVICE_NAME_ITEM: &str = "DEVICE_NAME";
/// Driver version item.
pub const INFO_DEVICE_VERSION_ITEM: &str = "DEVICE_VERSION";
/// Interface bitmask item, rendered as a decimal string.
pub const INFO_DEVICE_INTERFACE_ITEM: &str = "DEVICE_INTERFACE";

/// Driver debug logging toggle.
pub const DEBUG_PROPERTY: &str = "DEBUG";
/// Debug on.
pub const DEBUG_ENABLED_ITEM: &str = "ENABLED";
/// Debug off.
pub const DEBUG_DISABLED_ITEM: &str = "DISABLED";

/// Hidden simulation toggle.
pub const SIMULATION_PROPERTY: &str = "SIMULATION";
/// Simulation on.
pub const SIMULATION_ENABLED_ITEM: &str = "ENABLED";
/// Simulation off.
pub const SIMULATION_DISABLED_ITEM: &str = "DISABLED";

/// Persisted configuration actions, `AtMostOne`.
pub const CONFIG_PROPERTY: &str = "CONFIG";
/// Replay the saved configuration.
pub const CONFIG_LOAD_ITEM: &str = "LOAD";
/// Save the current configuration.
pub const CONFIG_SAVE_ITEM: &str = "SAVE";
/// Replay the values captured at attach.
pub const CONFIG_DEFAULT_ITEM: &str = "DEFAULT";

/// Focuser absolute position.
pub const FOCUSER_POSITION_PROPERTY: &str = "FOCUSER_POSITION";
/// Position item.
pub const FOCUSER_POSITION_ITEM: &str = "POSITION";
/// Focuser abort switch.
pub const FOCUSER_ABORT_MOTION_PROPERTY: &str = "FOCUSER_ABORT_MOTION";
/// Abort item.
pub const FOCUSER_ABORT_MOTION_ITEM: &str = "ABORT_MOTION";
/// Focuser temperature probe.
pub const FOCUSER_TEMPERATURE_PROPERTY: &str = "FOCUSER_TEMPERATURE";
/// Temperature item.
pub const FOCUSER_TEMPERATURE_ITEM: &str = "TEMPERATURE";
/// Focuser backlash compensation, persisted.
pub const FOCUSER_BACKLASH_PROPERTY: &str = "FOCUSER_BACKLASH";
/// Backlash item.
pub const FOCUSER_BACKLASH_ITEM: &str = "BACKLASH";

/// Agent device selector, `OneOfMany`.
pub const AGENT_DEVICE_LIST_PROPERTY: &str = "AGENT_DEVICE_LIST";
/// First selector item, meaning no device.
pub const AGENT_DEVICE_LIST_NONE_ITEM: &str = "NONE";
/// Read-only mirror of the selected device's watched value.
pub const AGENT_MIRROR_PROPERTY: &str = "AGENT_MIRROR";
/// Writable value forwarded to the selected device.
pub const AGENT_FORWARD_PROPERTY: &str = "AGENT_FORWARD";
/// Item used by both agent number properties.
pub const AGENT_VALUE_ITEM: &str = "VALUE";

/// Interface bits reported in `INFO.DEVICE_INTERFACE`.
pub mod interface {
    /// Generic device.
    pub const GENERAL: u32 = 0;
    /// Telescope mount.
    pub const MOUNT: u32 = 1 << 0;
    /// Camera.
    pub const CCD: u32 = 1 << 1;
    /// Guider port.
    pub const GUIDER: u32 = 1 << 2;
    /// Focuser.
    pub const FOCUSER: u32 = 1 << 3;
    /// Filter wheel.
    pub const WHEEL: u32 = 1 << 4;
    /// Dome.
    pub const DOME: u32 = 1 << 5;
    /// Agent built on other devices.
    pub const AGENT: u32 = 1 << 15;
}
