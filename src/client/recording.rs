// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A client that records every notification it receives.

use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;

use super::{Client, ClientId, InterestFilter, Notification};
use crate::Result;
use crate::bus::Bus;
use crate::property::{Property, PropertyPattern};

/// Records notifications in arrival order and lets async code wait for
/// one to show up.
///
/// Useful for tests and for headless tooling that inspects the bus.
#[derive(Debug)]
pub struct RecordingClient {
    name: String,
    interest: Option<InterestFilter>,
    id: RwLock<Option<ClientId>>,
    log: Mutex<Vec<Notification>>,
    changed: Notify,
}

impl RecordingClient {
    /// Creates a recorder that receives everything.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interest: None,
            id: RwLock::new(None),
            log: Mutex::new(Vec::new()),
            changed: Notify::new(),
        }
    }

    /// Restricts notifications to `filter`.
    #[must_use]
    pub fn with_interest(mut self, filter: InterestFilter) -> Self {
        self.interest = Some(filter);
        self
    }

    /// The id assigned by the bus, once attached.
    #[must_use]
    pub fn id(&self) -> Option<ClientId> {
        *self.id.read()
    }

    /// Copy of everything recorded so far.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.log.lock().clone()
    }

    /// Number of notifications recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.log.lock().len()
    }

    /// Returns `true` if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log.lock().is_empty()
    }

    /// Forgets everything recorded so far.
    pub fn clear(&self) {
        self.log.lock().clear();
    }

    /// Number of recorded notifications satisfying `predicate`.
    pub fn count(&self, predicate: impl Fn(&Notification) -> bool) -> usize {
        self.log.lock().iter().filter(|n| predicate(n)).count()
    }

    /// The most recent define or update of `device.name`.
    #[must_use]
    pub fn latest(&self, device: &str, name: &str) -> Option<Property> {
        self.log
            .lock()
            .iter()
            .rev()
            .filter(|n| n.is_define_of(device, name) || n.is_update_of(device, name))
            .find_map(|n| n.property().cloned())
    }

    /// Waits until a recorded notification satisfies `predicate`.
    ///
    /// Returns the first matching notification, or `None` on timeout.
    pub async fn wait_for(
        &self,
        timeout: Duration,
        predicate: impl Fn(&Notification) -> bool,
    ) -> Option<Notification> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(found) = self.log.lock().iter().find(|n| predicate(n)).cloned() {
                return Some(found);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    fn record(&self, notification: Notification) {
        self.log.lock().push(notification);
        self.changed.notify_waiters();
    }
}

impl Client for RecordingClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn interest(&self) -> Option<&InterestFilter> {
        self.interest.as_ref()
    }

    fn attach(&self, bus: &Bus, id: ClientId) -> Result<()> {
        *self.id.write() = Some(id);
        bus.enumerate_properties(Some(id), &PropertyPattern::all());
        Ok(())
    }

    fn define_property(&self, _bus: &Bus, property: &Property, message: Option<&str>) {
        self.record(Notification::Define {
            property: property.clone(),
            message: message.map(str::to_string),
        });
    }

    fn update_property(&self, _bus: &Bus, property: &Property, message: Option<&str>) {
        self.record(Notification::Update {
            property: property.clone(),
            message: message.map(str::to_string),
        });
    }

    fn delete_property(
        &self,
        _bus: &Bus,
        device: &str,
        property: Option<&Property>,
        message: Option<&str>,
    ) {
        self.record(Notification::Delete {
            device: device.to_string(),
            name: property.map(|p| p.name.clone()),
            message: message.map(str::to_string),
        });
    }

    fn send_message(&self, _bus: &Bus, device: &str, message: &str) {
        self.record(Notification::Message {
            device: device.to_string(),
            message: message.to_string(),
        });
    }

    fn detach(&self, _bus: &Bus) -> Result<()> {
        *self.id.write() = None;
        Ok(())
    }
}
