// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! An agent device that follows another device through the bus.
//!
//! [`FilterAgent`] is both a device and, through an embedded client, a
//! consumer of other devices' notifications. It lists every device that
//! defines a property with a configured prefix, mirrors one watched
//! number property of the selected device, and forwards writes to it.
//!
//! Notifications reach the embedded client outside every device gate, so
//! the agent may update itself from there. Anything the agent sends to
//! another device (enumeration, change requests) is deferred to a timer,
//! so it never waits on another device from inside its own entry points.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::bus::Bus;
use crate::client::{Client, ClientId};
use crate::device::{ConnectionChange, Device, DeviceBase};
use crate::error::DeviceError;
use crate::property::names::{
    AGENT_DEVICE_LIST_NONE_ITEM, AGENT_DEVICE_LIST_PROPERTY, AGENT_FORWARD_PROPERTY,
    AGENT_MIRROR_PROPERTY, AGENT_VALUE_ITEM, CONNECTION_PROPERTY, FOCUSER_POSITION_ITEM,
    FOCUSER_POSITION_PROPERTY, interface,
};
use crate::property::{Item, Permission, Property, PropertyPattern, PropertyState, SwitchRule};
use crate::timer::TimerHandle;

const AGENT_GROUP: &str = "Agent";

/// What a [`FilterAgent`] looks for.
///
/// The default follows focuser positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Devices defining a property whose name starts with this are listed.
    pub prefix: String,
    /// Number property mirrored from the selected device.
    pub watched_property: String,
    /// Item of `watched_property` mirrored and forwarded.
    pub watched_item: String,
    /// How long a forwarded request may go unanswered before
    /// `AGENT_FORWARD` turns Alert.
    #[serde(with = "crate::config::millis")]
    pub forward_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            prefix: "FOCUSER_".to_string(),
            watched_property: FOCUSER_POSITION_PROPERTY.to_string(),
            watched_item: FOCUSER_POSITION_ITEM.to_string(),
            forward_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Forward {
    Idle,
    /// Request sent, no reaction seen yet.
    Sent,
    /// The target went Busy.
    Waiting,
}

#[derive(Default)]
struct Timers {
    client: Option<TimerHandle>,
    sync: Option<TimerHandle>,
    forward: Option<TimerHandle>,
    verify: Option<TimerHandle>,
}

type Slot = fn(&mut Timers) -> &mut Option<TimerHandle>;

/// Selects one device from those matching a prefix and tracks it.
///
/// # Properties
///
/// - `AGENT_DEVICE_LIST`: switch, `OneOfMany`, `NONE` plus each matching
///   device. Redefined whenever the set of devices changes.
/// - `AGENT_MIRROR`: read-only copy of the watched item and state.
/// - `AGENT_FORWARD`: writes are sent to the watched property; Busy until
///   the target settles, Alert if it rejects the request.
pub struct FilterAgent {
    this: Weak<Self>,
    base: DeviceBase,
    config: AgentConfig,
    client: Arc<AgentClient>,
    client_id: Mutex<Option<ClientId>>,
    candidates: Mutex<Vec<String>>,
    selected: Mutex<Option<String>>,
    forward: Mutex<Forward>,
    timers: Mutex<Timers>,
}

impl FilterAgent {
    /// Creates an agent named `name`.
    pub fn new(name: impl Into<String>, config: AgentConfig) -> Arc<Self> {
        let name = name.into();
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            client: Arc::new(AgentClient {
                name: format!("{name} client"),
                agent: this.clone(),
            }),
            base: DeviceBase::new(name, interface::AGENT),
            config,
            client_id: Mutex::new(None),
            candidates: Mutex::new(Vec::new()),
            selected: Mutex::new(None),
            forward: Mutex::new(Forward::Idle),
            timers: Mutex::new(Timers::default()),
        })
    }

    /// The standard property block.
    #[must_use]
    pub fn base(&self) -> &DeviceBase {
        &self.base
    }

    /// Devices currently listed, in discovery order.
    #[must_use]
    pub fn candidates(&self) -> Vec<String> {
        self.candidates.lock().clone()
    }

    /// The selected device.
    #[must_use]
    pub fn selected(&self) -> Option<String> {
        self.selected.lock().clone()
    }

    fn device_list(&self, candidates: &[String], selected: Option<&str>) -> Property {
        let mut list = Property::switch(
            self.base.name(),
            AGENT_DEVICE_LIST_PROPERTY,
            AGENT_GROUP,
            "Devices",
            PropertyState::Ok,
            Permission::ReadWrite,
            SwitchRule::OneOfMany,
        )
        .with_switch(AGENT_DEVICE_LIST_NONE_ITEM, "None", selected.is_none());
        for device in candidates {
            list = list.with_switch(device, device, selected == Some(device.as_str()));
        }
        list
    }

    // ========================================================================
    // Timers
    // ========================================================================

    fn arm(&self, slot: Slot, delay: Duration, job: fn(&Arc<Self>)) {
        let Some(bus) = self.base.bus() else {
            return;
        };
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let mut timers = self.timers.lock();
        let slot = slot(&mut *timers);
        if !bus.timers().reschedule(slot, delay) {
            *slot = Some(bus.timers().schedule(&this, delay, job));
        }
    }

    fn stop(&self, slot: Slot) {
        let handle = slot(&mut *self.timers.lock()).take();
        if let Some(handle) = handle {
            handle.cancel_sync();
        }
    }

    fn attach_client_job(this: &Arc<Self>) {
        let Some(bus) = this.base.bus() else {
            return;
        };
        if let Err(error) = bus.attach_client(this.client.clone()) {
            tracing::warn!(device = %this.base.name(), %error, "Agent client could not attach");
        }
    }

    fn sync_job(this: &Arc<Self>) {
        let Some(bus) = this.base.bus() else {
            return;
        };
        let client = *this.client_id.lock();
        let selected = this.selected();
        if let (Some(client), Some(device)) = (client, selected) {
            let pattern = PropertyPattern::property(device, this.config.watched_property.clone());
            bus.enumerate_properties(Some(client), &pattern);
        }
    }

    fn forward_job(this: &Arc<Self>) {
        let Some(bus) = this.base.bus() else {
            return;
        };
        let client = *this.client_id.lock();
        let Some(device) = this.selected() else {
            this.fail_forward(&bus, "no device selected");
            return;
        };
        let Some(value) = this
            .base
            .property(AGENT_FORWARD_PROPERTY)
            .and_then(|p| p.number_value(AGENT_VALUE_ITEM))
        else {
            return;
        };

        *this.forward.lock() = Forward::Sent;
        let request = Property::number_request(
            &device,
            &this.config.watched_property,
            &[(this.config.watched_item.as_str(), value)],
        );
        tracing::debug!(device = %this.base.name(), target = %device, value, "Forwarding value");
        bus.change_property(client, &request);

        if *this.forward.lock() == Forward::Sent {
            this.arm(|t| &mut t.verify, this.config.forward_timeout, Self::verify_job);
        }
    }

    /// Alerts if the forwarded request never drew a reaction.
    fn verify_job(this: &Arc<Self>) {
        let Some(bus) = this.base.bus() else {
            return;
        };
        let unanswered = {
            let mut forward = this.forward.lock();
            let unanswered = *forward == Forward::Sent;
            if unanswered {
                *forward = Forward::Idle;
            }
            unanswered
        };
        if unanswered {
            let device = this.selected().unwrap_or_default();
            this.fail_forward(&bus, &format!("{device} did not accept the request"));
        }
    }

    fn fail_forward(&self, bus: &Bus, message: &str) {
        *self.forward.lock() = Forward::Idle;
        self.base
            .set_state(bus, AGENT_FORWARD_PROPERTY, PropertyState::Alert, Some(message));
    }

    // ========================================================================
    // Observing other devices
    // ========================================================================

    fn observe(&self, bus: &Bus, property: &Property) {
        if property.device == self.base.name() || self.base.bus().is_none() {
            return;
        }
        if property.name.starts_with(&self.config.prefix) {
            self.add_candidate(bus, &property.device);
        }
        let watched = property.name == self.config.watched_property
            && self.selected.lock().as_deref() == Some(property.device.as_str());
        if watched {
            self.mirror(bus, property);
        }
    }

    fn observe_delete(&self, bus: &Bus, device: &str, property: Option<&Property>) {
        if device == self.base.name() || self.base.bus().is_none() {
            return;
        }
        let is_selected = self.selected.lock().as_deref() == Some(device);
        match property {
            None => {
                let removed = {
                    let mut candidates = self.candidates.lock();
                    let before = candidates.len();
                    candidates.retain(|c| c != device);
                    candidates.len() != before
                };
                if is_selected {
                    *self.selected.lock() = None;
                    if *self.forward.lock() != Forward::Idle {
                        self.fail_forward(bus, &format!("{device} went away"));
                    }
                    self.base.set_state(bus, AGENT_MIRROR_PROPERTY, PropertyState::Idle, None);
                    tracing::info!(device = %self.base.name(), target = %device, "Selected device went away");
                }
                if removed || is_selected {
                    self.redefine_list(bus);
                }
            }
            Some(property) if is_selected && property.name == self.config.watched_property => {
                self.base.set_state(bus, AGENT_MIRROR_PROPERTY, PropertyState::Idle, None);
            }
            Some(_) => {}
        }
    }

    fn add_candidate(&self, bus: &Bus, device: &str) {
        let added = {
            let mut candidates = self.candidates.lock();
            if candidates.iter().any(|c| c == device) {
                false
            } else {
                candidates.push(device.to_string());
                true
            }
        };
        if added {
            tracing::debug!(device = %self.base.name(), candidate = %device, "Device listed");
            self.redefine_list(bus);
        }
    }

    fn redefine_list(&self, bus: &Bus) {
        bus.with_device_lock(self.base.name(), || {
            let list = {
                let candidates = self.candidates.lock();
                let selected = self.selected.lock();
                self.device_list(&candidates, selected.as_deref())
            };
            self.base.delete(bus, AGENT_DEVICE_LIST_PROPERTY, None);
            self.base.add_property(list, false);
            self.base.define(bus, AGENT_DEVICE_LIST_PROPERTY, None);
        });
    }

    fn mirror(&self, bus: &Bus, watched: &Property) {
        let Some(number) = watched
            .item(&self.config.watched_item)
            .and_then(Item::as_number)
            .cloned()
        else {
            return;
        };
        self.base.update(bus, AGENT_MIRROR_PROPERTY, None, |mirror| {
            if let Some(value) = mirror.item_mut(AGENT_VALUE_ITEM).and_then(Item::as_number_mut) {
                *value = number;
            }
            mirror.state = watched.state;
        });

        let settled = {
            let mut forward = self.forward.lock();
            match (*forward, watched.state) {
                (Forward::Idle, _) => None,
                (_, PropertyState::Busy) => {
                    *forward = Forward::Waiting;
                    None
                }
                (_, state) => {
                    *forward = Forward::Idle;
                    Some(state)
                }
            }
        };
        if let Some(state) = settled {
            self.base.set_state(bus, AGENT_FORWARD_PROPERTY, state, None);
        }
    }

    // ========================================================================
    // Requests
    // ========================================================================

    fn select(&self, bus: &Bus, list: &Property) {
        let selected = list
            .switches_on()
            .find(|item| *item != AGENT_DEVICE_LIST_NONE_ITEM)
            .map(str::to_string);
        *self.selected.lock() = selected.clone();
        *self.forward.lock() = Forward::Idle;
        self.base.set_state(bus, AGENT_MIRROR_PROPERTY, PropertyState::Idle, None);
        tracing::info!(device = %self.base.name(), selected = ?selected, "Agent selection changed");
        if selected.is_some() {
            self.arm(|t| &mut t.sync, Duration::ZERO, Self::sync_job);
        }
    }

    fn forward_request(&self, bus: &Bus, request: &Property) {
        if self.selected.lock().is_none() {
            if self.base.is_in_state(AGENT_FORWARD_PROPERTY, PropertyState::Busy) {
                self.base.reject_busy(bus, AGENT_FORWARD_PROPERTY);
            } else {
                self.base
                    .set_state(bus, AGENT_FORWARD_PROPERTY, PropertyState::Alert, Some("no device selected"));
            }
            return;
        }
        if let Ok(Some(_)) = self.base.apply_request(bus, request, PropertyState::Busy) {
            self.arm(|t| &mut t.forward, Duration::ZERO, Self::forward_job);
        }
    }
}

impl Device for FilterAgent {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn attach(&self, bus: &Bus) -> std::result::Result<(), DeviceError> {
        self.base.attach(bus)?;
        let name = self.base.name();
        self.base.add_defined_property(self.device_list(&[], None), false);
        self.base.add_defined_property(
            Property::number(name, AGENT_MIRROR_PROPERTY, AGENT_GROUP, "Mirror", PropertyState::Idle, Permission::ReadOnly)
                .with_number(AGENT_VALUE_ITEM, "Value", f64::MIN, f64::MAX, 0.0, 0.0),
            false,
        );
        self.base.add_defined_property(
            Property::number(name, AGENT_FORWARD_PROPERTY, AGENT_GROUP, "Forward", PropertyState::Idle, Permission::ReadWrite)
                .with_number(AGENT_VALUE_ITEM, "Value", -1e9, 1e9, 0.0, 0.0),
            false,
        );
        self.base.finish_attach(bus);
        self.arm(|t| &mut t.client, Duration::ZERO, Self::attach_client_job);
        tracing::info!(device = %name, prefix = %self.config.prefix, "Agent attached");
        Ok(())
    }

    fn enumerate_properties(&self, bus: &Bus, client: Option<ClientId>, pattern: Option<&PropertyPattern>) {
        self.base.enumerate(bus, client, pattern);
    }

    fn change_property(&self, bus: &Bus, _client: Option<ClientId>, request: &Property) {
        if request.device != self.base.name() {
            return;
        }
        match request.name.as_str() {
            CONNECTION_PROPERTY => match self.base.begin_connection_change(bus, request) {
                ConnectionChange::Connect => self.base.finish_connection(bus, Ok(true)),
                ConnectionChange::Disconnect => self.base.finish_connection(bus, Ok(false)),
                ConnectionChange::Unchanged | ConnectionChange::Rejected => {}
            },
            AGENT_DEVICE_LIST_PROPERTY => {
                if let Ok(Some(list)) = self.base.apply_request(bus, request, PropertyState::Ok) {
                    self.select(bus, &list);
                }
            }
            AGENT_FORWARD_PROPERTY => self.forward_request(bus, request),
            _ => {
                self.base.handle_standard_change(bus, request);
            }
        }
    }

    fn detach(&self, bus: &Bus) -> std::result::Result<(), DeviceError> {
        self.stop(|t| &mut t.client);
        self.stop(|t| &mut t.sync);
        self.stop(|t| &mut t.forward);
        self.stop(|t| &mut t.verify);
        let client = self.client_id.lock().take();
        if let Some(id) = client {
            if let Err(error) = bus.detach_client(id) {
                tracing::debug!(device = %self.base.name(), %error, "Agent client already gone");
            }
        }
        self.base.detach();
        self.candidates.lock().clear();
        *self.selected.lock() = None;
        *self.forward.lock() = Forward::Idle;
        Ok(())
    }
}

impl std::fmt::Debug for FilterAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterAgent")
            .field("base", &self.base)
            .field("config", &self.config)
            .field("selected", &self.selected())
            .finish_non_exhaustive()
    }
}

/// The agent's view of the bus.
struct AgentClient {
    name: String,
    agent: Weak<FilterAgent>,
}

impl Client for AgentClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn attach(&self, bus: &Bus, id: ClientId) -> Result<()> {
        if let Some(agent) = self.agent.upgrade() {
            *agent.client_id.lock() = Some(id);
        }
        bus.enumerate_properties(Some(id), &PropertyPattern::all());
        Ok(())
    }

    fn define_property(&self, bus: &Bus, property: &Property, _message: Option<&str>) {
        if let Some(agent) = self.agent.upgrade() {
            agent.observe(bus, property);
        }
    }

    fn update_property(&self, bus: &Bus, property: &Property, _message: Option<&str>) {
        if let Some(agent) = self.agent.upgrade() {
            agent.observe(bus, property);
        }
    }

    fn delete_property(&self, bus: &Bus, device: &str, property: Option<&Property>, _message: Option<&str>) {
        if let Some(agent) = self.agent.upgrade() {
            agent.observe_delete(bus, device, property);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusConfig;
    use crate::client::{Notification, RecordingClient};
    use crate::device::MockTransport;
    use crate::drivers::focuser::{Focuser, FocuserConfig};
    use crate::property::names::CONNECTION_CONNECTED_ITEM;

    const WAIT: Duration = Duration::from_secs(5);

    struct Rig {
        bus: Bus,
        agent: Arc<FilterAgent>,
        recorder: Arc<RecordingClient>,
    }

    async fn rig() -> Rig {
        rig_with(AgentConfig::default()).await
    }

    async fn rig_with(config: AgentConfig) -> Rig {
        let bus = Bus::new(BusConfig::default()).unwrap();
        let focuser = Focuser::with_base(
            DeviceBase::new("Focuser A", interface::FOCUSER),
            MockTransport::focuser(100, 50),
            FocuserConfig::default().with_motion_poll(Duration::from_millis(5)),
        );
        bus.attach_device(focuser).unwrap();
        let agent = FilterAgent::new("Agent", config);
        bus.attach_device(agent.clone()).unwrap();
        let recorder = Arc::new(RecordingClient::new("ui"));
        bus.attach_client(recorder.clone()).unwrap();
        recorder
            .wait_for(WAIT, |n| {
                n.is_define_of("Agent", AGENT_DEVICE_LIST_PROPERTY)
                    && n.property().is_some_and(|p| p.item("Focuser A").is_some())
            })
            .await
            .expect("focuser listed");
        Rig { bus, agent, recorder }
    }

    async fn connect_and_select(rig: &Rig) {
        rig.bus.change_property(
            None,
            &Property::switch_request("Focuser A", CONNECTION_PROPERTY, &[(CONNECTION_CONNECTED_ITEM, true)]),
        );
        rig.recorder
            .wait_for(WAIT, |n| n.is_define_of("Focuser A", FOCUSER_POSITION_PROPERTY))
            .await
            .unwrap();
        rig.bus.change_property(
            None,
            &Property::switch_request("Agent", AGENT_DEVICE_LIST_PROPERTY, &[("Focuser A", true)]),
        );
        rig.recorder
            .wait_for(WAIT, |n| {
                n.is_update_of("Agent", AGENT_MIRROR_PROPERTY)
                    && n.property().is_some_and(|p| p.number_value(AGENT_VALUE_ITEM) == Some(100.0))
            })
            .await
            .expect("mirror follows selection");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lists_devices_with_prefix() {
        let rig = rig().await;
        assert_eq!(rig.agent.candidates(), vec!["Focuser A"]);
        let list = rig.recorder.latest("Agent", AGENT_DEVICE_LIST_PROPERTY).unwrap();
        assert_eq!(list.switch_value(AGENT_DEVICE_LIST_NONE_ITEM), Some(true));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn forward_moves_selected_device() {
        let rig = rig().await;
        connect_and_select(&rig).await;

        rig.bus.change_property(
            None,
            &Property::number_request("Agent", AGENT_FORWARD_PROPERTY, &[(AGENT_VALUE_ITEM, 400.0)]),
        );
        rig.recorder
            .wait_for(WAIT, |n| {
                n.is_update_of("Agent", AGENT_FORWARD_PROPERTY)
                    && n.property().is_some_and(|p| p.state == PropertyState::Ok)
            })
            .await
            .expect("forward settles");
        let mirror = rig.recorder.latest("Agent", AGENT_MIRROR_PROPERTY).unwrap();
        assert_eq!(mirror.number_value(AGENT_VALUE_ITEM), Some(400.0));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn forward_without_selection_alerts() {
        let rig = rig().await;
        rig.bus.change_property(
            None,
            &Property::number_request("Agent", AGENT_FORWARD_PROPERTY, &[(AGENT_VALUE_ITEM, 1.0)]),
        );
        let forward = rig.agent.base().property(AGENT_FORWARD_PROPERTY).unwrap();
        assert_eq!(forward.state, PropertyState::Alert);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unanswered_forward_alerts_after_timeout() {
        let rig = rig_with(AgentConfig {
            forward_timeout: Duration::from_millis(50),
            ..AgentConfig::default()
        })
        .await;
        // Not connected: the focuser has no position property to accept the value.
        rig.bus.change_property(
            None,
            &Property::switch_request("Agent", AGENT_DEVICE_LIST_PROPERTY, &[("Focuser A", true)]),
        );
        assert_eq!(rig.agent.selected().as_deref(), Some("Focuser A"));

        rig.bus.change_property(
            None,
            &Property::number_request("Agent", AGENT_FORWARD_PROPERTY, &[(AGENT_VALUE_ITEM, 400.0)]),
        );
        let alert = rig
            .recorder
            .wait_for(WAIT, |n| {
                n.is_update_of("Agent", AGENT_FORWARD_PROPERTY)
                    && n.property().is_some_and(|p| p.state == PropertyState::Alert)
            })
            .await
            .expect("forward alerts");
        assert!(matches!(
            alert,
            Notification::Update { message: Some(message), .. } if message.contains("did not accept")
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn detached_device_resets_selection() {
        let rig = rig().await;
        connect_and_select(&rig).await;
        rig.bus.detach_device("Focuser A").unwrap();

        assert_eq!(rig.agent.selected(), None);
        assert!(rig.agent.candidates().is_empty());
        let list = rig.agent.base().property(AGENT_DEVICE_LIST_PROPERTY).unwrap();
        assert_eq!(list.items.len(), 1);
        assert_eq!(list.switch_value(AGENT_DEVICE_LIST_NONE_ITEM), Some(true));
        assert!(rig.recorder.notifications().iter().any(|n| matches!(
            n,
            Notification::Define { property, .. } if property.name == AGENT_DEVICE_LIST_PROPERTY && property.items.len() == 1
        )));
    }
}
