// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fixed-capacity slot table of hot-plugged devices.

use std::sync::Arc;

use super::IdentityKey;
use crate::device::Device;

/// One occupied slot.
#[derive(Clone)]
pub struct TableSlot {
    /// Identity of the unit behind the device.
    pub key: IdentityKey,
    /// Name the device is attached under.
    pub name: String,
    /// The live device.
    pub device: Arc<dyn Device>,
}

impl std::fmt::Debug for TableSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableSlot")
            .field("key", &self.key)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Maps slot indices to live devices.
///
/// The table never grows: a unit that finds no free slot is skipped until
/// one frees up. Slots keep their index while occupied.
#[derive(Debug)]
pub struct DeviceTable {
    slots: Vec<Option<TableSlot>>,
}

impl DeviceTable {
    /// Creates a table with `capacity` empty slots.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    /// Total number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Returns `true` if no slot is occupied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Returns `true` if every slot is occupied.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Index of the slot holding `key`.
    #[must_use]
    pub fn find(&self, key: &IdentityKey) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|s| &s.key == key))
    }

    /// The slot at `index`, if occupied.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&TableSlot> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Puts `slot` into the first free index.
    ///
    /// Returns the slot back if the table is full.
    pub fn insert(&mut self, slot: TableSlot) -> Result<usize, TableSlot> {
        match self.slots.iter().position(Option::is_none) {
            Some(index) => {
                self.slots[index] = Some(slot);
                Ok(index)
            }
            None => Err(slot),
        }
    }

    /// Empties the slot at `index`.
    pub fn remove(&mut self, index: usize) -> Option<TableSlot> {
        self.slots.get_mut(index).and_then(Option::take)
    }

    /// Empties every slot whose key fails `keep`, returning them in index
    /// order.
    pub fn drain_unless(&mut self, mut keep: impl FnMut(&IdentityKey) -> bool) -> Vec<TableSlot> {
        let mut removed = Vec::new();
        for slot in &mut self.slots {
            if slot.as_ref().is_some_and(|s| !keep(&s.key)) {
                removed.extend(slot.take());
            }
        }
        removed
    }

    /// Occupied slots with their indices.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &TableSlot)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|s| (index, s)))
    }

    /// Keys of occupied slots in index order.
    #[must_use]
    pub fn keys(&self) -> Vec<IdentityKey> {
        self.iter().map(|(_, slot)| slot.key.clone()).collect()
    }
}
