// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device and client tables held by the bus.

use std::collections::HashSet;
use std::sync::Arc;

use crate::client::{Client, ClientId};
use crate::device::Device;
use crate::error::BusError;

pub(super) struct DeviceEntry {
    pub(super) name: String,
    pub(super) device: Arc<dyn Device>,
}

/// Attached devices in attach order, plus names reserved by attaches
/// still in progress.
#[derive(Default)]
pub(super) struct DeviceRegistry {
    entries: Vec<DeviceEntry>,
    reserved: HashSet<String>,
}

impl DeviceRegistry {
    /// Claims `name` for an attach in progress.
    pub(super) fn reserve(&mut self, name: &str, capacity: usize) -> Result<(), BusError> {
        if self.reserved.contains(name) || self.entries.iter().any(|e| e.name == name) {
            return Err(BusError::DuplicateDevice(name.to_string()));
        }
        if self.entries.len() + self.reserved.len() >= capacity {
            return Err(BusError::TooManyDevices { capacity });
        }
        self.reserved.insert(name.to_string());
        Ok(())
    }

    /// Drops a reservation without registering.
    pub(super) fn release(&mut self, name: &str) {
        self.reserved.remove(name);
    }

    /// Turns a reservation into a registered device.
    pub(super) fn commit(&mut self, entry: DeviceEntry) {
        self.reserved.remove(&entry.name);
        self.entries.push(entry);
    }

    pub(super) fn remove(&mut self, name: &str) -> Option<DeviceEntry> {
        let index = self.entries.iter().position(|e| e.name == name)?;
        Some(self.entries.remove(index))
    }

    pub(super) fn get(&self, name: &str) -> Option<Arc<dyn Device>> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| Arc::clone(&e.device))
    }

    /// Names of devices matching `device`, in attach order. Empty
    /// matches all.
    pub(super) fn matching(&self, device: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| device.is_empty() || e.name == device)
            .map(|e| e.name.clone())
            .collect()
    }

    pub(super) fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }
}

pub(super) struct ClientEntry {
    pub(super) id: ClientId,
    pub(super) client: Arc<dyn Client>,
}

/// Attached clients in attach order.
#[derive(Default)]
pub(super) struct ClientRegistry {
    entries: Vec<ClientEntry>,
}

impl ClientRegistry {
    pub(super) fn insert(&mut self, entry: ClientEntry, capacity: usize) -> Result<(), BusError> {
        if self.entries.len() >= capacity {
            return Err(BusError::TooManyClients { capacity });
        }
        self.entries.push(entry);
        Ok(())
    }

    pub(super) fn remove(&mut self, id: ClientId) -> Option<ClientEntry> {
        let index = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(index))
    }

    /// Clients that want a notification about `device`/`name`.
    ///
    /// With `target` only that client is considered.
    pub(super) fn recipients(
        &self,
        device: &str,
        name: Option<&str>,
        target: Option<ClientId>,
    ) -> Vec<Arc<dyn Client>> {
        self.entries
            .iter()
            .filter(|e| target.is_none_or(|t| t == e.id))
            .filter(|e| {
                e.client
                    .interest()
                    .is_none_or(|filter| filter.matches(device, name))
            })
            .map(|e| Arc::clone(&e.client))
            .collect()
    }

    /// Every client in attach order.
    pub(super) fn ids(&self) -> Vec<ClientId> {
        self.entries.iter().map(|e| e.id).collect()
    }

    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }
}
