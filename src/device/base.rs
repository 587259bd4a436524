// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared driver scaffolding: the standard properties and the helpers
//! drivers use to mutate and publish their own.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::bus::Bus;
use crate::client::ClientId;
use crate::config::{ConfigStore, DeviceProfile};
use crate::error::{ConfigError, DeviceError, PropertyError};
use crate::property::names::{
    CONFIG_DEFAULT_ITEM, CONFIG_LOAD_ITEM, CONFIG_PROPERTY, CONFIG_SAVE_ITEM,
    CONNECTION_CONNECTED_ITEM, CONNECTION_DISCONNECTED_ITEM, CONNECTION_PROPERTY,
    DEBUG_DISABLED_ITEM, DEBUG_ENABLED_ITEM, DEBUG_PROPERTY, INFO_DEVICE_INTERFACE_ITEM,
    INFO_DEVICE_NAME_ITEM, INFO_DEVICE_VERSION_ITEM, INFO_PROPERTY, MAIN_GROUP,
    SIMULATION_DISABLED_ITEM, SIMULATION_ENABLED_ITEM, SIMULATION_PROPERTY,
};
use crate::property::{
    Permission, Property, PropertyPattern, PropertySet, PropertyState, SwitchRule,
};
use crate::timer::TimerHandle;

/// Outcome of a client request on `CONNECTION`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionChange {
    /// The property went Busy; the driver must now open the hardware.
    Connect,
    /// The property went Busy; the driver must now close the hardware.
    Disconnect,
    /// Already in the requested state, or the request was invalid.
    Unchanged,
    /// A previous connection change is still in flight.
    Rejected,
}

/// Standard properties and publication helpers embedded by drivers.
///
/// Every mutation follows the same pattern: take the device's
/// notification lock, mutate under the property lock, snapshot, release
/// the property lock, emit. The property lock is never held across a bus
/// call.
pub struct DeviceBase {
    name: String,
    version: String,
    interface: u32,
    properties: Arc<Mutex<PropertySet>>,
    defaults: Mutex<Vec<Property>>,
    config_store: Option<Arc<dyn ConfigStore>>,
    config_task: Mutex<Option<ConfigTask>>,
    bus: Mutex<Option<Bus>>,
    debug: AtomicBool,
    simulation: AtomicBool,
}

impl DeviceBase {
    /// Creates the base for a device named `name` exposing the
    /// `interface` bitmask.
    #[must_use]
    pub fn new(name: impl Into<String>, interface: u32) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            interface,
            properties: Arc::new(Mutex::new(PropertySet::new())),
            defaults: Mutex::new(Vec::new()),
            config_store: None,
            config_task: Mutex::new(None),
            bus: Mutex::new(None),
            debug: AtomicBool::new(false),
            simulation: AtomicBool::new(false),
        }
    }

    /// Sets the driver version reported in `INFO`.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Enables `CONFIG` load and save against `store`.
    #[must_use]
    pub fn with_config_store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.config_store = Some(store);
        self
    }

    /// Starts in simulation mode.
    #[must_use]
    pub fn simulated(self) -> Self {
        self.simulation.store(true, Ordering::Relaxed);
        self
    }

    /// Device name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Interface bitmask.
    #[must_use]
    pub fn interface(&self) -> u32 {
        self.interface
    }

    /// The bus this device is attached to, if any.
    #[must_use]
    pub fn bus(&self) -> Option<Bus> {
        self.bus.lock().clone()
    }

    /// Whether `DEBUG` is enabled.
    #[must_use]
    pub fn is_debug(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    /// Whether `SIMULATION` is enabled.
    #[must_use]
    pub fn is_simulation(&self) -> bool {
        self.simulation.load(Ordering::Relaxed)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Allocates the standard properties and remembers the bus.
    ///
    /// Drivers add their own properties afterwards and then call
    /// [`finish_attach`](Self::finish_attach).
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::AttachFailed`] if the device is already
    /// attached.
    pub fn attach(&self, bus: &Bus) -> Result<(), DeviceError> {
        {
            let mut slot = self.bus.lock();
            if slot.is_some() {
                return Err(DeviceError::AttachFailed(format!(
                    "device '{}' is already attached",
                    self.name
                )));
            }
            *slot = Some(bus.clone());
        }

        let simulation = self.is_simulation();
        let mut properties = self.properties.lock();
        properties.clear();
        for property in self.standard_properties(simulation) {
            let name = property.name.clone();
            properties.insert(property);
            properties.set_defined(&name, true);
        }
        properties.set_persistent(DEBUG_PROPERTY, true);
        properties.set_persistent(SIMULATION_PROPERTY, true);
        Ok(())
    }

    /// Captures defaults for `CONFIG.DEFAULT` and defines every defined
    /// property.
    pub fn finish_attach(&self, bus: &Bus) {
        let defined: Vec<Property> = {
            let properties = self.properties.lock();
            *self.defaults.lock() = properties.persistent().cloned().collect();
            properties.defined().cloned().collect()
        };
        bus.with_device_lock(&self.name, || {
            for property in &defined {
                bus.define_property(property, None);
            }
        });
        tracing::debug!(device = %self.name, count = defined.len(), "Device properties defined");
    }

    /// Waits for a pending `CONFIG` load or save, then forgets every
    /// property and the bus.
    ///
    /// The bus sends the delete-all notification itself.
    pub fn detach(&self) {
        let task = self.config_task.lock().take();
        if let Some(task) = task {
            task.handle.cancel_sync();
        }
        self.properties.lock().clear();
        self.defaults.lock().clear();
        self.bus.lock().take();
    }

    /// Defines visible properties matching `pattern` to `client`.
    pub fn enumerate(&self, bus: &Bus, client: Option<ClientId>, pattern: Option<&PropertyPattern>) {
        let matching: Vec<Property> = self.properties.lock().matching(pattern).cloned().collect();
        for property in &matching {
            bus.define_property_to(client, property, None);
        }
    }

    // ========================================================================
    // Property management
    // ========================================================================

    /// Adds an undefined property. Persistent ones are saved by `CONFIG`.
    pub fn add_property(&self, property: Property, persistent: bool) {
        let mut properties = self.properties.lock();
        let name = property.name.clone();
        properties.insert(property);
        properties.set_persistent(&name, persistent);
    }

    /// Adds a property and marks it defined without emitting.
    ///
    /// Use during attach, before [`finish_attach`](Self::finish_attach).
    pub fn add_defined_property(&self, property: Property, persistent: bool) {
        let name = property.name.clone();
        self.add_property(property, persistent);
        self.properties.lock().set_defined(&name, true);
    }

    /// Marks a property defined and announces it.
    ///
    /// Returns `false` if the property is unknown.
    pub fn define(&self, bus: &Bus, name: &str, message: Option<&str>) -> bool {
        bus.with_device_lock(&self.name, || {
            let snapshot = {
                let mut properties = self.properties.lock();
                if !properties.set_defined(name, true) {
                    return false;
                }
                properties.get(name).cloned()
            };
            if let Some(property) = snapshot {
                bus.define_property(&property, message);
            }
            true
        })
    }

    /// Marks a property undefined and announces its deletion.
    ///
    /// Returns `false` if the property is unknown or already undefined.
    pub fn delete(&self, bus: &Bus, name: &str, message: Option<&str>) -> bool {
        bus.with_device_lock(&self.name, || {
            let snapshot = {
                let mut properties = self.properties.lock();
                if !properties.is_defined(name) {
                    return false;
                }
                properties.set_defined(name, false);
                properties.get(name).cloned()
            };
            if let Some(property) = snapshot {
                bus.delete_property(&self.name, Some(&property), message);
            }
            true
        })
    }

    /// A copy of the named property.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<Property> {
        self.properties.lock().get(name).cloned()
    }

    /// Mutates a property and, if it is defined, broadcasts the update.
    ///
    /// Returns the updated copy, or `None` if the property is unknown.
    pub fn update(
        &self,
        bus: &Bus,
        name: &str,
        message: Option<&str>,
        mutate: impl FnOnce(&mut Property),
    ) -> Option<Property> {
        publish_update(bus, &self.name, &self.properties, name, message, mutate)
    }

    /// Sets only the state of a property and broadcasts it.
    pub fn set_state(&self, bus: &Bus, name: &str, state: PropertyState, message: Option<&str>) {
        self.update(bus, name, message, |property| property.state = state);
    }

    /// Merges a client request into the matching defined, writable
    /// property and broadcasts the result with `state`.
    ///
    /// A Busy property rejects the request with a device message and no
    /// update. A request that fails validation re-publishes the unchanged
    /// property as `Alert`.
    ///
    /// Returns `Ok(None)` when the request was rejected as busy.
    ///
    /// # Errors
    ///
    /// * [`PropertyError::UnknownProperty`] if no defined writable property
    ///   matches.
    /// * The validation error from [`Property::apply_change`].
    pub fn apply_request(
        &self,
        bus: &Bus,
        request: &Property,
        state: PropertyState,
    ) -> Result<Option<Property>, PropertyError> {
        self.apply(bus, request, state, false)
    }

    /// Like [`apply_request`](Self::apply_request), but number requests only
    /// set item targets; current values stay until the driver reports
    /// progress.
    ///
    /// # Errors
    ///
    /// As for [`apply_request`](Self::apply_request).
    pub fn apply_target_request(
        &self,
        bus: &Bus,
        request: &Property,
        state: PropertyState,
    ) -> Result<Option<Property>, PropertyError> {
        self.apply(bus, request, state, true)
    }

    fn apply(
        &self,
        bus: &Bus,
        request: &Property,
        state: PropertyState,
        targets_only: bool,
    ) -> Result<Option<Property>, PropertyError> {
        bus.with_device_lock(&self.name, || {
            enum Outcome {
                Applied(Property),
                Busy,
                Invalid(Property, PropertyError),
            }

            let outcome = {
                let mut properties = self.properties.lock();
                let property = properties.find_changeable(request).ok_or_else(|| {
                    PropertyError::UnknownProperty {
                        device: request.device.clone(),
                        name: request.name.clone(),
                    }
                })?;
                if property.state == PropertyState::Busy {
                    Outcome::Busy
                } else {
                    let mut merged = property.clone();
                    match merged.apply_change(request) {
                        Ok(()) => {
                            if targets_only {
                                property.copy_targets(request, false);
                            } else {
                                *property = merged;
                            }
                            property.state = state;
                            Outcome::Applied(property.clone())
                        }
                        Err(error) => {
                            property.state = PropertyState::Alert;
                            Outcome::Invalid(property.clone(), error)
                        }
                    }
                }
            };

            match outcome {
                Outcome::Applied(property) => {
                    bus.update_property(&property, None);
                    Ok(Some(property))
                }
                Outcome::Busy => {
                    self.reject_busy(bus, &request.name);
                    Ok(None)
                }
                Outcome::Invalid(property, error) => {
                    let message = error.to_string();
                    bus.update_property(&property, Some(&message));
                    Err(error)
                }
            }
        })
    }

    /// Tells clients that `property` is busy and the request was ignored.
    pub fn reject_busy(&self, bus: &Bus, property: &str) {
        tracing::debug!(device = %self.name, property, "Request rejected, property busy");
        bus.send_message(&self.name, &format!("{property} is busy, request ignored"));
    }

    /// Whether a defined property is in `state`.
    #[must_use]
    pub fn is_in_state(&self, name: &str, state: PropertyState) -> bool {
        let properties = self.properties.lock();
        properties.is_defined(name) && properties.get(name).is_some_and(|p| p.state == state)
    }

    /// Whether a property is currently defined.
    #[must_use]
    pub fn is_defined(&self, name: &str) -> bool {
        self.properties.lock().is_defined(name)
    }

    // ========================================================================
    // Connection
    // ========================================================================

    /// Whether `CONNECTION` reports connected and settled.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.properties.lock().get(CONNECTION_PROPERTY).is_some_and(|p| {
            p.state == PropertyState::Ok && p.switch_value(CONNECTION_CONNECTED_ITEM) == Some(true)
        })
    }

    /// Whether a connection change is in flight.
    #[must_use]
    pub fn is_connection_busy(&self) -> bool {
        self.is_in_state(CONNECTION_PROPERTY, PropertyState::Busy)
    }

    /// Handles a client request on `CONNECTION`.
    ///
    /// On [`ConnectionChange::Connect`] or [`ConnectionChange::Disconnect`]
    /// the property has been published as Busy and the driver must finish
    /// the change from a timer, then call
    /// [`finish_connection`](Self::finish_connection).
    pub fn begin_connection_change(&self, bus: &Bus, request: &Property) -> ConnectionChange {
        bus.with_device_lock(&self.name, || {
            let (change, snapshot, message) = {
                let mut properties = self.properties.lock();
                let Some(connection) = properties.find_changeable(request) else {
                    return ConnectionChange::Unchanged;
                };
                if connection.state == PropertyState::Busy {
                    drop(properties);
                    self.reject_busy(bus, CONNECTION_PROPERTY);
                    return ConnectionChange::Rejected;
                }
                let connected = connection.state == PropertyState::Ok
                    && connection.switch_value(CONNECTION_CONNECTED_ITEM) == Some(true);
                let mut candidate = connection.clone();
                match candidate.apply_change(request) {
                    Err(error) => {
                        connection.state = PropertyState::Alert;
                        (ConnectionChange::Unchanged, connection.clone(), Some(error.to_string()))
                    }
                    Ok(()) => {
                        let wanted = candidate.switch_value(CONNECTION_CONNECTED_ITEM) == Some(true);
                        if wanted == connected {
                            connection.state = PropertyState::Ok;
                            (ConnectionChange::Unchanged, connection.clone(), None)
                        } else {
                            candidate.state = PropertyState::Busy;
                            *connection = candidate;
                            let change = if wanted {
                                ConnectionChange::Connect
                            } else {
                                ConnectionChange::Disconnect
                            };
                            (change, connection.clone(), None)
                        }
                    }
                }
            };
            bus.update_property(&snapshot, message.as_deref());
            tracing::debug!(device = %self.name, ?change, "Connection change requested");
            change
        })
    }

    /// Settles `CONNECTION` after the driver opened or closed hardware.
    ///
    /// `Ok(true)` means connected, `Ok(false)` disconnected. An error
    /// reverts to disconnected in `Alert` carrying the message.
    pub fn finish_connection(&self, bus: &Bus, outcome: Result<bool, String>) {
        let (connected, state, message) = match outcome {
            Ok(connected) => (connected, PropertyState::Ok, None),
            Err(message) => (false, PropertyState::Alert, Some(message)),
        };
        let item = if connected {
            CONNECTION_CONNECTED_ITEM
        } else {
            CONNECTION_DISCONNECTED_ITEM
        };
        self.update(bus, CONNECTION_PROPERTY, message.as_deref(), |property| {
            let _ = property.set_switch(item, true);
            property.state = state;
        });
        if let Some(message) = &message {
            tracing::warn!(device = %self.name, %message, "Connection failed");
        } else {
            tracing::info!(device = %self.name, connected, "Connection settled");
        }
    }

    // ========================================================================
    // Standard property handling
    // ========================================================================

    /// Handles `DEBUG`, `SIMULATION`, `CONFIG` and `INFO` requests.
    ///
    /// Returns `true` if `request` named a standard property other than
    /// `CONNECTION`.
    pub fn handle_standard_change(&self, bus: &Bus, request: &Property) -> bool {
        if request.device != self.name {
            return false;
        }
        match request.name.as_str() {
            DEBUG_PROPERTY => {
                if let Ok(Some(property)) = self.apply_request(bus, request, PropertyState::Ok) {
                    let enabled = property.switch_value(DEBUG_ENABLED_ITEM) == Some(true);
                    self.debug.store(enabled, Ordering::Relaxed);
                    tracing::info!(device = %self.name, enabled, "Debug logging toggled");
                }
                true
            }
            SIMULATION_PROPERTY => {
                if let Ok(Some(property)) = self.apply_request(bus, request, PropertyState::Ok) {
                    let enabled = property.switch_value(SIMULATION_ENABLED_ITEM) == Some(true);
                    self.simulation.store(enabled, Ordering::Relaxed);
                }
                true
            }
            CONFIG_PROPERTY => {
                self.handle_config(bus, request);
                true
            }
            INFO_PROPERTY => true,
            _ => false,
        }
    }

    /// `SAVE` and `LOAD` touch the store, so they run on a timer; `CONFIG`
    /// stays Busy until the job settles it.
    fn handle_config(&self, bus: &Bus, request: &Property) {
        let Ok(Some(property)) = self.apply_request(bus, request, PropertyState::Busy) else {
            return;
        };
        let action = match property.switches_on().next() {
            Some(CONFIG_SAVE_ITEM) => {
                ConfigAction::Save(self.properties.lock().persistent().cloned().collect())
            }
            Some(CONFIG_LOAD_ITEM) => ConfigAction::Load,
            Some(CONFIG_DEFAULT_ITEM) => {
                let defaults = self.defaults.lock().clone();
                replay(bus, &self.name, &defaults);
                finish_config(bus, &self.name, &self.properties, "default", Ok(()));
                return;
            }
            _ => {
                finish_config(bus, &self.name, &self.properties, "none", Ok(()));
                return;
            }
        };
        let Some(store) = self.config_store.clone() else {
            let error = ConfigError::NotFound(self.name.clone());
            finish_config(bus, &self.name, &self.properties, action.label(), Err(error));
            return;
        };
        let job = Arc::new(ConfigJob {
            device: self.name.clone(),
            action,
            store,
            properties: Arc::clone(&self.properties),
            bus: bus.clone(),
        });
        let handle = bus.timers().schedule(&job, Duration::ZERO, ConfigJob::run);
        *self.config_task.lock() = Some(ConfigTask { _job: job, handle });
    }

    /// Saves every defined persistent property. Blocks on the store.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] when no store is configured, or
    /// the store's error.
    pub fn save_config(&self) -> Result<(), ConfigError> {
        let store = self
            .config_store
            .as_ref()
            .ok_or_else(|| ConfigError::NotFound(self.name.clone()))?;
        let saved: Vec<Property> = self.properties.lock().persistent().cloned().collect();
        store.save(&DeviceProfile::new(&self.name, saved))
    }

    /// Replays the saved profile through the bus, so the driver sees each
    /// saved property as an ordinary change request. Blocks on the store;
    /// call it from a timer, not an entry point.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] when nothing was saved or no
    /// store is configured, or the store's error.
    pub fn load_config(&self, bus: &Bus) -> Result<(), ConfigError> {
        let store = self
            .config_store
            .as_ref()
            .ok_or_else(|| ConfigError::NotFound(self.name.clone()))?;
        let profile = store.load(&self.name)?;
        replay(bus, &self.name, &profile.properties);
        Ok(())
    }

    fn standard_properties(&self, simulation: bool) -> Vec<Property> {
        let name = self.name.as_str();
        vec![
            Property::switch(
                name,
                CONNECTION_PROPERTY,
                MAIN_GROUP,
                "Connection status",
                PropertyState::Idle,
                Permission::ReadWrite,
                SwitchRule::OneOfMany,
            )
            .with_switch(CONNECTION_CONNECTED_ITEM, "Connected", false)
            .with_switch(CONNECTION_DISCONNECTED_ITEM, "Disconnected", true),
            Property::text(
                name,
                INFO_PROPERTY,
                MAIN_GROUP,
                "Info",
                PropertyState::Ok,
                Permission::ReadOnly,
            )
            .with_text(INFO_DEVICE_NAME_ITEM, "Device name", name)
            .with_text(INFO_DEVICE_VERSION_ITEM, "Driver version", &self.version)
            .with_text(
                INFO_DEVICE_INTERFACE_ITEM,
                "Interface",
                &self.interface.to_string(),
            ),
            Property::switch(
                name,
                DEBUG_PROPERTY,
                MAIN_GROUP,
                "Debug status",
                PropertyState::Ok,
                Permission::ReadWrite,
                SwitchRule::OneOfMany,
            )
            .with_switch(DEBUG_ENABLED_ITEM, "Enabled", self.is_debug())
            .with_switch(DEBUG_DISABLED_ITEM, "Disabled", !self.is_debug()),
            Property::switch(
                name,
                SIMULATION_PROPERTY,
                MAIN_GROUP,
                "Simulation status",
                PropertyState::Ok,
                Permission::ReadWrite,
                SwitchRule::OneOfMany,
            )
            .with_switch(SIMULATION_ENABLED_ITEM, "Enabled", simulation)
            .with_switch(SIMULATION_DISABLED_ITEM, "Disabled", !simulation)
            .hidden(),
            Property::switch(
                name,
                CONFIG_PROPERTY,
                MAIN_GROUP,
                "Configuration control",
                PropertyState::Ok,
                Permission::ReadWrite,
                SwitchRule::AtMostOne,
            )
            .with_switch(CONFIG_LOAD_ITEM, "Load", false)
            .with_switch(CONFIG_SAVE_ITEM, "Save", false)
            .with_switch(CONFIG_DEFAULT_ITEM, "Default", false),
        ]
    }
}

/// Mutates a property under the device gate and broadcasts it if defined.
fn publish_update(
    bus: &Bus,
    device: &str,
    properties: &Mutex<PropertySet>,
    name: &str,
    message: Option<&str>,
    mutate: impl FnOnce(&mut Property),
) -> Option<Property> {
    bus.with_device_lock(device, || {
        let (snapshot, defined) = {
            let mut properties = properties.lock();
            let property = properties.get_mut(name)?;
            mutate(property);
            let snapshot = property.clone();
            (snapshot, properties.is_defined(name))
        };
        if defined {
            bus.update_property(&snapshot, message);
        }
        Some(snapshot)
    })
}

fn replay(bus: &Bus, device: &str, properties: &[Property]) {
    for saved in properties {
        let mut request = saved.clone();
        request.device = device.to_string();
        bus.change_property(None, &request);
    }
}

/// Resets the `CONFIG` switches and settles its state.
fn finish_config(
    bus: &Bus,
    device: &str,
    properties: &Mutex<PropertySet>,
    action: &str,
    result: Result<(), ConfigError>,
) {
    let (state, message) = match &result {
        Ok(()) => (PropertyState::Ok, None),
        Err(error) => {
            tracing::warn!(device, action, %error, "Configuration action failed");
            (PropertyState::Alert, Some(error.to_string()))
        }
    };
    publish_update(bus, device, properties, CONFIG_PROPERTY, message.as_deref(), |config| {
        for item in &mut config.items {
            item.set_switch(false);
        }
        config.state = state;
    });
}

enum ConfigAction {
    Save(Vec<Property>),
    Load,
}

impl ConfigAction {
    fn label(&self) -> &'static str {
        match self {
            Self::Save(_) => "save",
            Self::Load => "load",
        }
    }
}

/// A `CONFIG` save or load running on a timer worker.
struct ConfigJob {
    device: String,
    action: ConfigAction,
    store: Arc<dyn ConfigStore>,
    properties: Arc<Mutex<PropertySet>>,
    bus: Bus,
}

impl ConfigJob {
    fn run(job: &Arc<Self>) {
        let result = match &job.action {
            ConfigAction::Save(saved) => job
                .store
                .save(&DeviceProfile::new(&job.device, saved.clone())),
            ConfigAction::Load => job
                .store
                .load(&job.device)
                .map(|profile| replay(&job.bus, &job.device, &profile.properties)),
        };
        if result.is_ok() {
            tracing::debug!(device = %job.device, action = job.action.label(), "Configuration action done");
        }
        finish_config(&job.bus, &job.device, &job.properties, job.action.label(), result);
    }
}

/// Keeps a pending job alive; the timer only holds it weakly.
struct ConfigTask {
    _job: Arc<ConfigJob>,
    handle: TimerHandle,
}

impl std::fmt::Debug for DeviceBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBase")
            .field("name", &self.name)
            .field("interface", &self.interface)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}
