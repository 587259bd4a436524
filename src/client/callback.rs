// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Closure-driven client.
//!
//! - [`SubscriptionId`] - Unique identifier for unsubscribing
//! - [`CallbackClient`] - Client that dispatches notifications to closures

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::{Client, ClientId, InterestFilter};
use crate::Result;
use crate::bus::Bus;
use crate::property::{Property, PropertyPattern};

/// Unique identifier for a registered callback.
///
/// IDs are unique within one [`CallbackClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Returns the raw ID value.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", self.0)
    }
}

/// Callback for defines and updates: property and optional message.
type PropertyCallback = Arc<dyn Fn(&Property, Option<&str>) + Send + Sync>;

/// Callback for deletions: device, property name (`None` for all) and
/// optional message.
type DeleteCallback = Arc<dyn Fn(&str, Option<&str>, Option<&str>) + Send + Sync>;

/// Callback for free-form messages: device and text.
type MessageCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// A client whose behavior is a set of registered closures.
///
/// Callbacks are snapshotted before dispatch, so a callback may register
/// or unregister callbacks (including itself) without deadlocking.
///
/// # Examples
///
/// ```
/// use astrobus::client::CallbackClient;
///
/// let client = CallbackClient::new("logger");
/// let sub = client.on_update(|property, _message| {
///     println!("{}.{} is {}", property.device, property.name, property.state);
/// });
/// assert_eq!(client.callback_count(), 1);
/// assert!(client.unsubscribe(sub));
/// ```
pub struct CallbackClient {
    name: String,
    interest: Option<InterestFilter>,
    enumerate_on_attach: bool,
    id: RwLock<Option<ClientId>>,
    next_id: AtomicU64,
    define_callbacks: RwLock<HashMap<SubscriptionId, PropertyCallback>>,
    update_callbacks: RwLock<HashMap<SubscriptionId, PropertyCallback>>,
    delete_callbacks: RwLock<HashMap<SubscriptionId, DeleteCallback>>,
    message_callbacks: RwLock<HashMap<SubscriptionId, MessageCallback>>,
}

impl CallbackClient {
    /// Creates a client that receives everything and enumerates all
    /// devices when attached.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interest: None,
            enumerate_on_attach: true,
            id: RwLock::new(None),
            next_id: AtomicU64::new(1),
            define_callbacks: RwLock::new(HashMap::new()),
            update_callbacks: RwLock::new(HashMap::new()),
            delete_callbacks: RwLock::new(HashMap::new()),
            message_callbacks: RwLock::new(HashMap::new()),
        }
    }

    /// Restricts notifications to `filter`.
    #[must_use]
    pub fn with_interest(mut self, filter: InterestFilter) -> Self {
        self.interest = Some(filter);
        self
    }

    /// Controls whether attaching triggers a full enumeration.
    #[must_use]
    pub fn enumerate_on_attach(mut self, enabled: bool) -> Self {
        self.enumerate_on_attach = enabled;
        self
    }

    /// The id assigned by the bus, once attached.
    #[must_use]
    pub fn id(&self) -> Option<ClientId> {
        *self.id.read()
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    // =========================================================================
    // Registration methods
    // =========================================================================

    /// Registers a callback for property definitions.
    pub fn on_define<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Property, Option<&str>) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.define_callbacks.write().insert(id, Arc::new(callback));
        id
    }

    /// Registers a callback for property updates.
    pub fn on_update<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Property, Option<&str>) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.update_callbacks.write().insert(id, Arc::new(callback));
        id
    }

    /// Registers a callback for property deletions.
    ///
    /// The callback receives the device, the property name (`None` when
    /// all of the device's properties are deleted) and the message.
    pub fn on_delete<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&str, Option<&str>, Option<&str>) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.delete_callbacks.write().insert(id, Arc::new(callback));
        id
    }

    /// Registers a callback for free-form device messages.
    pub fn on_message<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.message_callbacks
            .write()
            .insert(id, Arc::new(callback));
        id
    }

    // =========================================================================
    // Unsubscription
    // =========================================================================

    /// Unregisters a callback. Returns `true` if it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.define_callbacks.write().remove(&id).is_some()
            || self.update_callbacks.write().remove(&id).is_some()
            || self.delete_callbacks.write().remove(&id).is_some()
            || self.message_callbacks.write().remove(&id).is_some()
    }

    /// Unregisters every callback.
    pub fn clear(&self) {
        self.define_callbacks.write().clear();
        self.update_callbacks.write().clear();
        self.delete_callbacks.write().clear();
        self.message_callbacks.write().clear();
    }

    /// Total number of registered callbacks.
    #[must_use]
    pub fn callback_count(&self) -> usize {
        self.define_callbacks.read().len()
            + self.update_callbacks.read().len()
            + self.delete_callbacks.read().len()
            + self.message_callbacks.read().len()
    }
}

fn snapshot<T: Clone>(map: &RwLock<HashMap<SubscriptionId, T>>) -> Vec<T> {
    map.read().values().cloned().collect()
}

impl Client for CallbackClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn interest(&self) -> Option<&InterestFilter> {
        self.interest.as_ref()
    }

    fn attach(&self, bus: &Bus, id: ClientId) -> Result<()> {
        *self.id.write() = Some(id);
        if self.enumerate_on_attach {
            bus.enumerate_properties(Some(id), &PropertyPattern::all());
        }
        Ok(())
    }

    fn define_property(&self, _bus: &Bus, property: &Property, message: Option<&str>) {
        for callback in snapshot(&self.define_callbacks) {
            callback(property, message);
        }
    }

    fn update_property(&self, _bus: &Bus, property: &Property, message: Option<&str>) {
        for callback in snapshot(&self.update_callbacks) {
            callback(property, message);
        }
    }

    fn delete_property(
        &self,
        _bus: &Bus,
        device: &str,
        property: Option<&Property>,
        message: Option<&str>,
    ) {
        let name = property.map(|p| p.name.as_str());
        for callback in snapshot(&self.delete_callbacks) {
            callback(device, name, message);
        }
    }

    fn send_message(&self, _bus: &Bus, device: &str, message: &str) {
        for callback in snapshot(&self.message_callbacks) {
            callback(device, message);
        }
    }

    fn detach(&self, _bus: &Bus) -> Result<()> {
        *self.id.write() = None;
        Ok(())
    }
}

impl std::fmt::Debug for CallbackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackClient")
            .field("name", &self.name)
            .field("callback_count", &self.callback_count())
            .finish_non_exhaustive()
    }
}
