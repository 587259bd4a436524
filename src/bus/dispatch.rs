// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-device lanes: an entry gate plus an outbound notification queue.
//!
//! Entry calls and a driver's read-modify-emit sections hold the device's
//! gate. Notifications are pushed onto the device's queue and handed to
//! clients only by a thread that holds no gate, so a client callback may
//! call into any device without creating a lock cycle. At most one thread
//! drains a queue at a time, which keeps each device's notifications in
//! emission order.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::thread;

use parking_lot::{Mutex, ReentrantMutex};

use super::Bus;
use crate::client::{Client, ClientId};
use crate::property::Property;

/// A notification waiting on a lane.
pub(super) enum Outgoing {
    Define {
        property: Property,
        message: Option<String>,
        target: Option<ClientId>,
    },
    Update {
        property: Property,
        message: Option<String>,
    },
    Delete {
        device: String,
        property: Option<Property>,
        message: Option<String>,
    },
    Message {
        device: String,
        message: String,
    },
}

impl Outgoing {
    pub(super) fn device(&self) -> &str {
        match self {
            Self::Define { property, .. } | Self::Update { property, .. } => &property.device,
            Self::Delete { device, .. } | Self::Message { device, .. } => device,
        }
    }

    /// Property name for interest matching; `None` is device-wide.
    pub(super) fn name(&self) -> Option<&str> {
        match self {
            Self::Define { property, .. } | Self::Update { property, .. } => Some(&property.name),
            Self::Delete { property, .. } => property.as_ref().map(|p| p.name.as_str()),
            Self::Message { .. } => None,
        }
    }

    pub(super) fn target(&self) -> Option<ClientId> {
        match self {
            Self::Define { target, .. } => *target,
            _ => None,
        }
    }

    pub(super) fn notify(&self, bus: &Bus, client: &dyn Client) {
        match self {
            Self::Define {
                property, message, ..
            } => client.define_property(bus, property, message.as_deref()),
            Self::Update { property, message } => {
                client.update_property(bus, property, message.as_deref());
            }
            Self::Delete {
                device,
                property,
                message,
            } => client.delete_property(bus, device, property.as_ref(), message.as_deref()),
            Self::Message { device, message } => client.send_message(bus, device, message),
        }
    }
}

#[derive(Default)]
struct Outbox {
    queue: VecDeque<Outgoing>,
    draining: bool,
}

/// Gate and queue for one device name.
#[derive(Default)]
pub(super) struct Lane {
    gate: ReentrantMutex<()>,
    outbox: Mutex<Outbox>,
}

impl Lane {
    /// Runs `f` holding the gate, then runs any drains deferred while this
    /// thread held gates.
    pub(super) fn enter<R>(&self, f: impl FnOnce() -> R) -> R {
        let result = {
            let _gate = self.gate.lock();
            let _depth = GateDepth::enter();
            f()
        };
        run_deferred();
        result
    }

    pub(super) fn push(&self, outgoing: Outgoing) {
        self.outbox.lock().queue.push_back(outgoing);
    }

    /// Hands queued notifications to `deliver` until the queue is empty.
    ///
    /// Returns at once if the queue is already being drained, by another
    /// thread or by an outer frame of this one; that drainer picks up
    /// whatever was pushed.
    pub(super) fn drain(&self, mut deliver: impl FnMut(Outgoing)) {
        {
            let mut outbox = self.outbox.lock();
            if outbox.draining {
                return;
            }
            outbox.draining = true;
        }
        let _unwind = Draining(&self.outbox);
        loop {
            let next = {
                let mut outbox = self.outbox.lock();
                let next = outbox.queue.pop_front();
                if next.is_none() {
                    outbox.draining = false;
                }
                next
            };
            let Some(outgoing) = next else {
                return;
            };
            deliver(outgoing);
        }
    }
}

/// Releases the drainer role if a client callback panics.
struct Draining<'a>(&'a Mutex<Outbox>);

impl Drop for Draining<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.lock().draining = false;
        }
    }
}

/// Lanes keyed by device name, created on first use.
///
/// Lanes outlive their device, so a request racing a detach serializes on
/// the same gate as any later device of that name.
#[derive(Default)]
pub(super) struct LaneTable {
    lanes: Mutex<HashMap<String, Arc<Lane>>>,
}

impl LaneTable {
    pub(super) fn get(&self, device: &str) -> Arc<Lane> {
        let mut lanes = self.lanes.lock();
        Arc::clone(lanes.entry(device.to_string()).or_default())
    }
}

type Deferred = Box<dyn FnOnce()>;

struct HeldGates {
    depth: usize,
    deferred: Vec<Deferred>,
}

thread_local! {
    static HELD: RefCell<HeldGates> = const {
        RefCell::new(HeldGates {
            depth: 0,
            deferred: Vec::new(),
        })
    };
}

struct GateDepth;

impl GateDepth {
    fn enter() -> Self {
        HELD.with_borrow_mut(|held| held.depth += 1);
        Self
    }
}

impl Drop for GateDepth {
    fn drop(&mut self) {
        HELD.with_borrow_mut(|held| held.depth -= 1);
    }
}

/// Runs `f` now if this thread holds no gate, otherwise once its
/// outermost gate is released.
pub(super) fn when_ungated(f: impl FnOnce() + 'static) {
    let mut pending: Option<Deferred> = Some(Box::new(f));
    HELD.with_borrow_mut(|held| {
        if held.depth > 0 {
            held.deferred.extend(pending.take());
        }
    });
    if let Some(f) = pending {
        f();
    }
}

fn run_deferred() {
    let ready = HELD.with_borrow_mut(|held| {
        if held.depth == 0 {
            std::mem::take(&mut held.deferred)
        } else {
            Vec::new()
        }
    });
    for f in ready {
        f();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn message(device: &str, text: &str) -> Outgoing {
        Outgoing::Message {
            device: device.to_string(),
            message: text.to_string(),
        }
    }

    fn text(outgoing: &Outgoing) -> String {
        match outgoing {
            Outgoing::Message { message, .. } => message.clone(),
            _ => String::new(),
        }
    }

    #[test]
    fn drain_empties_queue_in_order() {
        let lane = Lane::default();
        lane.push(message("A", "one"));
        lane.push(message("A", "two"));
        let mut seen = Vec::new();
        lane.drain(|o| seen.push(text(&o)));
        assert_eq!(seen, vec!["one", "two"]);
        assert!(lane.outbox.lock().queue.is_empty());
        assert!(!lane.outbox.lock().draining);
    }

    #[test]
    fn nested_drain_leaves_work_to_outer_frame() {
        let lane = Lane::default();
        lane.push(message("A", "first"));
        let mut seen = Vec::new();
        lane.drain(|o| {
            let label = text(&o);
            if label == "first" {
                lane.push(message("A", "second"));
                lane.drain(|_| panic!("inner frame must not deliver"));
            }
            seen.push(label);
        });
        assert_eq!(seen, vec!["first", "second"]);
    }

    #[test]
    fn work_is_deferred_until_outermost_gate_releases() {
        let outer = Lane::default();
        let inner = Lane::default();
        let ran = Rc::new(Cell::new(false));
        outer.enter(|| {
            inner.enter(|| {
                let ran = Rc::clone(&ran);
                when_ungated(move || ran.set(true));
            });
            assert!(!ran.get());
        });
        assert!(ran.get());
    }

    #[test]
    fn ungated_work_runs_immediately() {
        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        when_ungated(move || flag.set(true));
        assert!(ran.get());
    }

    #[test]
    fn lanes_are_shared_by_name() {
        let table = LaneTable::default();
        assert!(Arc::ptr_eq(&table.get("A"), &table.get("A")));
        assert!(!Arc::ptr_eq(&table.get("A"), &table.get("B")));
    }
}
