// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A focuser driven over a line-oriented [`Transport`].
//!
//! The hardware speaks a small text protocol:
//!
//! | Command    | Reply                      |
//! |------------|----------------------------|
//! | `POS?`     | current position           |
//! | `MOVING?`  | `1` while moving, else `0` |
//! | `MOVE <n>` | `OK`                       |
//! | `STOP`     | `OK`                       |
//! | `TEMP?`    | probe temperature in °C    |
//!
//! [`MockTransport::focuser`](crate::device::MockTransport::focuser)
//! simulates it.
//!
//! Every exchange runs on a timer worker under the driver's hardware
//! lock; the lock is released before anything is published.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::bus::Bus;
use crate::client::ClientId;
use crate::device::{ConnectionChange, Device, DeviceBase, Transport};
use crate::error::{DeviceError, HardwareError};
use crate::property::names::{
    CONNECTION_CONNECTED_ITEM, CONNECTION_PROPERTY, FOCUSER_ABORT_MOTION_ITEM,
    FOCUSER_ABORT_MOTION_PROPERTY, FOCUSER_BACKLASH_ITEM, FOCUSER_BACKLASH_PROPERTY,
    FOCUSER_POSITION_ITEM, FOCUSER_POSITION_PROPERTY, FOCUSER_TEMPERATURE_ITEM,
    FOCUSER_TEMPERATURE_PROPERTY, interface,
};
use crate::property::{Permission, Property, PropertyPattern, PropertyState, SwitchRule};
use crate::timer::TimerHandle;

const FOCUSER_GROUP: &str = "Focuser";

/// Properties defined only while connected.
const CONNECTED_PROPERTIES: [&str; 3] = [
    FOCUSER_POSITION_PROPERTY,
    FOCUSER_ABORT_MOTION_PROPERTY,
    FOCUSER_TEMPERATURE_PROPERTY,
];

/// Focuser timing and range.
///
/// Durations are (de)serialized as milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FocuserConfig {
    /// Reply timeout for one command.
    #[serde(with = "crate::config::millis")]
    pub io_timeout: Duration,
    /// Position polling period while moving.
    #[serde(with = "crate::config::millis")]
    pub motion_poll: Duration,
    /// Temperature polling period while connected.
    #[serde(with = "crate::config::millis")]
    pub temperature_poll: Duration,
    /// Highest reachable position, in steps.
    pub max_position: f64,
}

impl Default for FocuserConfig {
    fn default() -> Self {
        Self {
            io_timeout: Duration::from_secs(1),
            motion_poll: Duration::from_millis(100),
            temperature_poll: Duration::from_secs(5),
            max_position: 100_000.0,
        }
    }
}

impl FocuserConfig {
    /// Sets the position polling period.
    #[must_use]
    pub fn with_motion_poll(mut self, motion_poll: Duration) -> Self {
        self.motion_poll = motion_poll;
        self
    }

    /// Sets the temperature polling period.
    #[must_use]
    pub fn with_temperature_poll(mut self, temperature_poll: Duration) -> Self {
        self.temperature_poll = temperature_poll;
        self
    }

    /// Sets the highest reachable position.
    #[must_use]
    pub fn with_max_position(mut self, max_position: f64) -> Self {
        self.max_position = max_position;
        self
    }
}

#[derive(Default)]
struct Timers {
    connection: Option<TimerHandle>,
    motion: Option<TimerHandle>,
    abort: Option<TimerHandle>,
    temperature: Option<TimerHandle>,
}

type Slot = fn(&mut Timers) -> &mut Option<TimerHandle>;

enum Progress {
    Moving(f64),
    Arrived(f64),
}

/// An absolute focuser.
///
/// Moving inward with a non-zero `FOCUSER_BACKLASH` overshoots by the
/// backlash and then approaches the target from below.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use astrobus::bus::{Bus, BusConfig};
/// use astrobus::device::MockTransport;
/// use astrobus::drivers::focuser::Focuser;
///
/// # #[tokio::main(flavor = "multi_thread")]
/// # async fn main() -> astrobus::Result<()> {
/// let bus = Bus::new(BusConfig::default())?;
/// let focuser = Focuser::new("Focuser Simulator", MockTransport::focuser(1000, 250));
/// bus.attach_device(focuser.clone())?;
/// assert!(!focuser.base().is_connected());
/// bus.shutdown();
/// # Ok(())
/// # }
/// ```
pub struct Focuser<T: Transport> {
    this: Weak<Self>,
    base: DeviceBase,
    config: FocuserConfig,
    hardware: Mutex<T>,
    timers: Mutex<Timers>,
    legs: Mutex<VecDeque<f64>>,
}

impl<T: Transport + 'static> Focuser<T> {
    /// Creates a focuser named `name` with default settings.
    pub fn new(name: impl Into<String>, transport: T) -> Arc<Self> {
        Self::with_base(
            DeviceBase::new(name, interface::FOCUSER),
            transport,
            FocuserConfig::default(),
        )
    }

    /// Creates a focuser from a prepared base, for example one with a
    /// configuration store.
    pub fn with_base(base: DeviceBase, transport: T, config: FocuserConfig) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            base,
            config,
            hardware: Mutex::new(transport),
            timers: Mutex::new(Timers::default()),
            legs: Mutex::new(VecDeque::new()),
        })
    }

    /// The standard property block.
    #[must_use]
    pub fn base(&self) -> &DeviceBase {
        &self.base
    }

    /// The settings in use.
    #[must_use]
    pub fn config(&self) -> &FocuserConfig {
        &self.config
    }

    fn properties(&self) -> Vec<(Property, bool)> {
        let name = self.base.name();
        vec![
            (
                Property::number(
                    name,
                    FOCUSER_POSITION_PROPERTY,
                    FOCUSER_GROUP,
                    "Absolute position",
                    PropertyState::Ok,
                    Permission::ReadWrite,
                )
                .with_number(FOCUSER_POSITION_ITEM, "Position", 0.0, self.config.max_position, 1.0, 0.0),
                false,
            ),
            (
                Property::switch(
                    name,
                    FOCUSER_ABORT_MOTION_PROPERTY,
                    FOCUSER_GROUP,
                    "Abort motion",
                    PropertyState::Ok,
                    Permission::ReadWrite,
                    SwitchRule::AtMostOne,
                )
                .with_switch(FOCUSER_ABORT_MOTION_ITEM, "Abort", false),
                false,
            ),
            (
                Property::number(
                    name,
                    FOCUSER_TEMPERATURE_PROPERTY,
                    FOCUSER_GROUP,
                    "Temperature",
                    PropertyState::Idle,
                    Permission::ReadOnly,
                )
                .with_number(FOCUSER_TEMPERATURE_ITEM, "Temperature (°C)", -50.0, 70.0, 0.1, 0.0),
                false,
            ),
        ]
    }

    fn backlash_property(&self) -> Property {
        Property::number(
            self.base.name(),
            FOCUSER_BACKLASH_PROPERTY,
            FOCUSER_GROUP,
            "Backlash compensation",
            PropertyState::Ok,
            Permission::ReadWrite,
        )
        .with_number(FOCUSER_BACKLASH_ITEM, "Backlash", 0.0, 1000.0, 1.0, 0.0)
    }

    // ========================================================================
    // Timers
    // ========================================================================

    /// Arms the timer in `slot`, creating it if needed.
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

    /// Re-arms an existing timer only; a stopped slot stays stopped.
    fn rearm(&self, slot: Slot, delay: Duration) {
        if let Some(bus) = self.base.bus() {
            bus.timers().reschedule(slot(&mut *self.timers.lock()), delay);
        }
    }

    /// Cancels the timer in `slot` and waits for it to finish.
    fn stop(&self, slot: Slot) {
        let handle = slot(&mut *self.timers.lock()).take();
        if let Some(handle) = handle {
            handle.cancel_sync();
        }
    }

    fn stop_hardware_timers(&self) {
        self.stop(|t| &mut t.motion);
        self.stop(|t| &mut t.abort);
        self.stop(|t| &mut t.temperature);
        self.legs.lock().clear();
    }

    // ========================================================================
    // Jobs
    // ========================================================================

    fn read_number(&self, hardware: &mut T, command: &str) -> Result<f64, HardwareError> {
        let reply = hardware.query(command, self.config.io_timeout)?;
        reply
            .trim()
            .parse()
            .map_err(|_| HardwareError::Rejected(format!("unexpected reply '{reply}' to {command}")))
    }

    fn connection_job(this: &Arc<Self>) {
        let Some(bus) = this.base.bus() else {
            return;
        };
        let wanted = this
            .base
            .property(CONNECTION_PROPERTY)
            .and_then(|p| p.switch_value(CONNECTION_CONNECTED_ITEM))
            == Some(true);
        if wanted {
            this.connect(&bus);
        } else {
            this.disconnect(&bus);
        }
    }

    fn connect(&self, bus: &Bus) {
        let opened = {
            let mut hardware = self.hardware.lock();
            let result = hardware
                .open()
                .and_then(|()| self.read_number(&mut hardware, "POS?"));
            if result.is_err() {
                let _ = hardware.close();
            }
            result
        };
        let position = match opened {
            Ok(position) => position,
            Err(error) => {
                self.base.finish_connection(bus, Err(error.to_string()));
                return;
            }
        };

        self.base.update(bus, FOCUSER_POSITION_PROPERTY, None, |property| {
            let _ = property.set_number(FOCUSER_POSITION_ITEM, position);
            property.state = PropertyState::Ok;
        });
        self.base.update(bus, FOCUSER_ABORT_MOTION_PROPERTY, None, |property| {
            let _ = property.set_switch(FOCUSER_ABORT_MOTION_ITEM, false);
            property.state = PropertyState::Ok;
        });
        self.base.finish_connection(bus, Ok(true));
        for name in CONNECTED_PROPERTIES {
            self.base.define(bus, name, None);
        }
        self.arm(|t| &mut t.temperature, Duration::ZERO, Self::temperature_job);
    }

    fn disconnect(&self, bus: &Bus) {
        self.stop_hardware_timers();
        if let Err(error) = self.hardware.lock().close() {
            tracing::warn!(device = %self.base.name(), %error, "Error closing focuser");
        }
        for name in CONNECTED_PROPERTIES {
            self.base.delete(bus, name, None);
        }
        self.base.finish_connection(bus, Ok(false));
    }

    fn start_motion(&self, requested: &Property) {
        let Some(target) = requested.number_target(FOCUSER_POSITION_ITEM) else {
            return;
        };
        let current = requested.number_value(FOCUSER_POSITION_ITEM).unwrap_or(target);
        let backlash = self
            .base
            .property(FOCUSER_BACKLASH_PROPERTY)
            .and_then(|p| p.number_value(FOCUSER_BACKLASH_ITEM))
            .unwrap_or(0.0);
        {
            let mut legs = self.legs.lock();
            legs.clear();
            if backlash > 0.0 && target < current {
                legs.push_back((target - backlash).max(0.0));
            }
            legs.push_back(target);
        }
        tracing::debug!(device = %self.base.name(), current, target, backlash, "Focuser move requested");
        self.arm(|t| &mut t.motion, Duration::ZERO, Self::motion_job);
    }

    fn motion_job(this: &Arc<Self>) {
        let Some(bus) = this.base.bus() else {
            return;
        };
        let progress = {
            let mut hardware = this.hardware.lock();
            this.step_motion(&mut hardware)
        };
        match progress {
            Ok(Progress::Moving(position)) => {
                this.base.update(&bus, FOCUSER_POSITION_PROPERTY, None, |property| {
                    if let Some(number) = property.item_mut(FOCUSER_POSITION_ITEM).and_then(|i| i.as_number_mut()) {
                        number.value = position;
                    }
                });
                this.rearm(|t| &mut t.motion, this.config.motion_poll);
            }
            Ok(Progress::Arrived(position)) => {
                this.base.update(&bus, FOCUSER_POSITION_PROPERTY, None, |property| {
                    let _ = property.set_number(FOCUSER_POSITION_ITEM, position);
                    property.state = PropertyState::Ok;
                });
                tracing::debug!(device = %this.base.name(), position, "Focuser move complete");
            }
            Err(error) => {
                this.legs.lock().clear();
                let message = error.to_string();
                this.base
                    .set_state(&bus, FOCUSER_POSITION_PROPERTY, PropertyState::Alert, Some(&message));
                tracing::warn!(device = %this.base.name(), %error, "Focuser move failed");
            }
        }
    }

    fn step_motion(&self, hardware: &mut T) -> Result<Progress, HardwareError> {
        let position = self.read_number(hardware, "POS?")?;
        if self.read_number(hardware, "MOVING?")? != 0.0 {
            return Ok(Progress::Moving(position));
        }
        let next = self.legs.lock().pop_front();
        match next {
            Some(leg) => {
                hardware.query(&format!("MOVE {leg}"), self.config.io_timeout)?;
                Ok(Progress::Moving(position))
            }
            None => Ok(Progress::Arrived(position)),
        }
    }

    fn abort_job(this: &Arc<Self>) {
        let Some(bus) = this.base.bus() else {
            return;
        };
        this.stop(|t| &mut t.motion);
        this.legs.lock().clear();
        let stopped = {
            let mut hardware = this.hardware.lock();
            hardware
                .query("STOP", this.config.io_timeout)
                .and_then(|_| this.read_number(&mut hardware, "POS?"))
        };
        match stopped {
            Ok(position) => {
                this.base.update(&bus, FOCUSER_POSITION_PROPERTY, None, |property| {
                    let _ = property.set_number(FOCUSER_POSITION_ITEM, position);
                    property.state = PropertyState::Ok;
                });
                this.base.update(&bus, FOCUSER_ABORT_MOTION_PROPERTY, None, |property| {
                    let _ = property.set_switch(FOCUSER_ABORT_MOTION_ITEM, false);
                    property.state = PropertyState::Ok;
                });
                tracing::info!(device = %this.base.name(), position, "Focuser motion aborted");
            }
            Err(error) => {
                let message = error.to_string();
                this.base
                    .set_state(&bus, FOCUSER_POSITION_PROPERTY, PropertyState::Alert, None);
                this.base.update(&bus, FOCUSER_ABORT_MOTION_PROPERTY, Some(&message), |property| {
                    let _ = property.set_switch(FOCUSER_ABORT_MOTION_ITEM, false);
                    property.state = PropertyState::Alert;
                });
            }
        }
    }

    fn temperature_job(this: &Arc<Self>) {
        let Some(bus) = this.base.bus() else {
            return;
        };
        let reading = {
            let mut hardware = this.hardware.lock();
            if !hardware.is_open() {
                return;
            }
            this.read_number(&mut hardware, "TEMP?")
        };
        match reading {
            Ok(celsius) => {
                this.base.update(&bus, FOCUSER_TEMPERATURE_PROPERTY, None, |property| {
                    let _ = property.set_number(FOCUSER_TEMPERATURE_ITEM, celsius);
                    property.state = PropertyState::Ok;
                });
            }
            Err(error) => {
                let message = error.to_string();
                this.base
                    .set_state(&bus, FOCUSER_TEMPERATURE_PROPERTY, PropertyState::Alert, Some(&message));
            }
        }
        this.rearm(|t| &mut t.temperature, this.config.temperature_poll);
    }
}

impl<T: Transport + 'static> Device for Focuser<T> {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn attach(&self, bus: &Bus) -> Result<(), DeviceError> {
        self.base.attach(bus)?;
        for (property, persistent) in self.properties() {
            self.base.add_property(property, persistent);
        }
        self.base.add_defined_property(self.backlash_property(), true);
        self.base.finish_attach(bus);
        tracing::info!(device = %self.base.name(), "Focuser attached");
        Ok(())
    }

    fn enumerate_properties(&self, bus: &Bus, client: Option<ClientId>, pattern: Option<&PropertyPattern>) {
        self.base.enumerate(bus, client, pattern);
    }

    fn change_property(&self, bus: &Bus, _client: Option<ClientId>, request: &Property) {
        if request.device != self.base.name() {
            return;
        }
        if request.name == CONNECTION_PROPERTY {
            if matches!(
                self.base.begin_connection_change(bus, request),
                ConnectionChange::Connect | ConnectionChange::Disconnect
            ) {
                self.arm(|t| &mut t.connection, Duration::ZERO, Self::connection_job);
            }
            return;
        }
        if self.base.is_connection_busy() {
            self.base.reject_busy(bus, &request.name);
            return;
        }
        if self.base.handle_standard_change(bus, request) {
            return;
        }

        let result = match request.name.as_str() {
            FOCUSER_POSITION_PROPERTY => self
                .base
                .apply_target_request(bus, request, PropertyState::Busy)
                .map(|applied| {
                    if let Some(property) = applied {
                        self.start_motion(&property);
                    }
                }),
            FOCUSER_ABORT_MOTION_PROPERTY => self
                .base
                .apply_request(bus, request, PropertyState::Busy)
                .map(|applied| match applied {
                    Some(p) if p.switch_value(FOCUSER_ABORT_MOTION_ITEM) == Some(true) => {
                        self.arm(|t| &mut t.abort, Duration::ZERO, Self::abort_job);
                    }
                    Some(_) => {
                        self.base
                            .set_state(bus, FOCUSER_ABORT_MOTION_PROPERTY, PropertyState::Ok, None);
                    }
                    None => {}
                }),
            FOCUSER_BACKLASH_PROPERTY => self
                .base
                .apply_request(bus, request, PropertyState::Ok)
                .map(drop),
            _ => Ok(()),
        };
        if let Err(error) = result {
            tracing::debug!(device = %self.base.name(), property = %request.name, %error, "Change request ignored");
        }
    }

    fn detach(&self, bus: &Bus) -> Result<(), DeviceError> {
        self.stop(|t| &mut t.connection);
        let connected = self
            .base
            .property(CONNECTION_PROPERTY)
            .and_then(|p| p.switch_value(CONNECTION_CONNECTED_ITEM))
            == Some(true);
        if connected {
            self.disconnect(bus);
        } else {
            self.stop_hardware_timers();
        }
        let closed = self.hardware.lock().close();
        self.base.detach();
        tracing::info!(device = %self.base.name(), "Focuser detached");
        closed.map_err(DeviceError::from)
    }
}

impl<T: Transport> std::fmt::Debug for Focuser<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Focuser")
            .field("base", &self.base)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusConfig;
    use crate::client::{Notification, RecordingClient};
    use crate::device::MockTransport;
    use crate::property::names::CONNECTION_DISCONNECTED_ITEM;

    const WAIT: Duration = Duration::from_secs(5);

    fn config() -> FocuserConfig {
        FocuserConfig::default()
            .with_motion_poll(Duration::from_millis(5))
            .with_temperature_poll(Duration::from_millis(20))
    }

    fn setup(transport: MockTransport) -> (Bus, Arc<Focuser<MockTransport>>, Arc<RecordingClient>) {
        let bus = Bus::new(BusConfig::default()).unwrap();
        let focuser = Focuser::with_base(DeviceBase::new("Focuser", interface::FOCUSER), transport, config());
        bus.attach_device(focuser.clone()).unwrap();
        let recorder = Arc::new(RecordingClient::new("ui"));
        bus.attach_client(recorder.clone()).unwrap();
        (bus, focuser, recorder)
    }

    async fn connect(bus: &Bus, recorder: &RecordingClient) {
        bus.change_property(
            None,
            &Property::switch_request("Focuser", CONNECTION_PROPERTY, &[(CONNECTION_CONNECTED_ITEM, true)]),
        );
        recorder
            .wait_for(WAIT, |n| n.is_define_of("Focuser", FOCUSER_TEMPERATURE_PROPERTY))
            .await
            .expect("connected");
    }

    fn settled(n: &Notification, name: &str) -> bool {
        n.is_update_of("Focuser", name) && n.property().is_some_and(|p| p.state == PropertyState::Ok)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn move_reaches_target() {
        let (bus, _focuser, recorder) = setup(MockTransport::focuser(100, 40));
        connect(&bus, &recorder).await;
        recorder.clear();

        bus.change_property(
            None,
            &Property::number_request("Focuser", FOCUSER_POSITION_PROPERTY, &[(FOCUSER_POSITION_ITEM, 300.0)]),
        );
        let done = recorder
            .wait_for(WAIT, |n| settled(n, FOCUSER_POSITION_PROPERTY))
            .await
            .unwrap();
        assert_eq!(done.property().unwrap().number_value(FOCUSER_POSITION_ITEM), Some(300.0));

        let first = recorder
            .notifications()
            .into_iter()
            .find(|n| n.is_update_of("Focuser", FOCUSER_POSITION_PROPERTY))
            .unwrap();
        let first = first.property().unwrap();
        assert_eq!(first.state, PropertyState::Busy);
        assert_eq!(first.number_value(FOCUSER_POSITION_ITEM), Some(100.0));
        assert_eq!(first.number_target(FOCUSER_POSITION_ITEM), Some(300.0));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn inward_move_compensates_backlash() {
        let transport = MockTransport::focuser(500, 1000);
        let (bus, _focuser, recorder) = setup(transport.clone());
        bus.change_property(
            None,
            &Property::number_request("Focuser", FOCUSER_BACKLASH_PROPERTY, &[(FOCUSER_BACKLASH_ITEM, 50.0)]),
        );
        connect(&bus, &recorder).await;
        bus.change_property(
            None,
            &Property::number_request("Focuser", FOCUSER_POSITION_PROPERTY, &[(FOCUSER_POSITION_ITEM, 200.0)]),
        );
        recorder.wait_for(WAIT, |n| settled(n, FOCUSER_POSITION_PROPERTY)).await.unwrap();
        let moves: Vec<_> = transport.commands().into_iter().filter(|c| c.starts_with("MOVE")).collect();
        assert_eq!(moves, vec!["MOVE 150", "MOVE 200"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn abort_stops_motion() {
        let transport = MockTransport::focuser(0, 1);
        let (bus, focuser, recorder) = setup(transport.clone());
        connect(&bus, &recorder).await;
        bus.change_property(
            None,
            &Property::number_request("Focuser", FOCUSER_POSITION_PROPERTY, &[(FOCUSER_POSITION_ITEM, 10_000.0)]),
        );
        tokio::time::sleep(Duration::from_millis(30)).await;
        bus.change_property(
            None,
            &Property::switch_request("Focuser", FOCUSER_ABORT_MOTION_PROPERTY, &[(FOCUSER_ABORT_MOTION_ITEM, true)]),
        );
        recorder
            .wait_for(WAIT, |n| settled(n, FOCUSER_ABORT_MOTION_PROPERTY))
            .await
            .unwrap();

        let position = focuser.base().property(FOCUSER_POSITION_PROPERTY).unwrap();
        assert_eq!(position.state, PropertyState::Ok);
        assert!(position.number_value(FOCUSER_POSITION_ITEM).unwrap() < 10_000.0);
        assert!(transport.commands().iter().any(|c| c == "STOP"));
        assert_eq!(transport.max_concurrency(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn non_finite_target_never_moves() {
        let transport = MockTransport::focuser(100, 40);
        let (bus, focuser, recorder) = setup(transport.clone());
        connect(&bus, &recorder).await;

        bus.change_property(
            None,
            &Property::number_request("Focuser", FOCUSER_POSITION_PROPERTY, &[(FOCUSER_POSITION_ITEM, f64::NAN)]),
        );
        recorder
            .wait_for(WAIT, |n| {
                n.is_update_of("Focuser", FOCUSER_POSITION_PROPERTY)
                    && n.property().is_some_and(|p| p.state == PropertyState::Alert)
            })
            .await
            .expect("position alert");

        let position = focuser.base().property(FOCUSER_POSITION_PROPERTY).unwrap();
        assert_eq!(position.number_value(FOCUSER_POSITION_ITEM), Some(100.0));
        assert!(transport.commands().iter().all(|c| !c.starts_with("MOVE")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn temperature_is_polled_and_read_only() {
        let (bus, focuser, recorder) = setup(MockTransport::focuser(0, 10));
        connect(&bus, &recorder).await;
        recorder.wait_for(WAIT, |n| settled(n, FOCUSER_TEMPERATURE_PROPERTY)).await.unwrap();

        let before = recorder.len();
        bus.change_property(
            None,
            &Property::number_request("Focuser", FOCUSER_TEMPERATURE_PROPERTY, &[(FOCUSER_TEMPERATURE_ITEM, -5.0)]),
        );
        let temperature = focuser.base().property(FOCUSER_TEMPERATURE_PROPERTY).unwrap();
        assert_eq!(temperature.number_value(FOCUSER_TEMPERATURE_ITEM), Some(21.5));
        assert!(recorder.notifications()[before..]
            .iter()
            .all(|n| n.property().is_none_or(|p| p.number_value(FOCUSER_TEMPERATURE_ITEM) != Some(-5.0))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn disconnect_deletes_connected_properties() {
        let (bus, focuser, recorder) = setup(MockTransport::focuser(0, 10));
        connect(&bus, &recorder).await;
        bus.change_property(
            None,
            &Property::switch_request("Focuser", CONNECTION_PROPERTY, &[(CONNECTION_DISCONNECTED_ITEM, true)]),
        );
        recorder
            .wait_for(WAIT, |n| n.is_delete_of("Focuser", FOCUSER_POSITION_PROPERTY))
            .await
            .unwrap();
        recorder
            .wait_for(WAIT, |n| {
                settled(n, CONNECTION_PROPERTY)
                    && n.property().unwrap().switch_value(CONNECTION_DISCONNECTED_ITEM) == Some(true)
            })
            .await
            .unwrap();
        assert!(!focuser.base().is_defined(FOCUSER_POSITION_PROPERTY));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn detach_while_connected_runs_disconnect_teardown() {
        let transport = MockTransport::focuser(0, 10);
        let (bus, _focuser, recorder) = setup(transport.clone());
        connect(&bus, &recorder).await;
        assert!(transport.is_open());
        recorder.clear();

        bus.detach_device("Focuser").unwrap();
        assert!(!transport.is_open());

        let seen = recorder.notifications();
        let disconnected = seen
            .iter()
            .position(|n| {
                n.is_update_of("Focuser", CONNECTION_PROPERTY)
                    && n.property().unwrap().switch_value(CONNECTION_DISCONNECTED_ITEM) == Some(true)
            })
            .expect("CONNECTION reported disconnected");
        let position_deleted = seen
            .iter()
            .position(|n| n.is_delete_of("Focuser", FOCUSER_POSITION_PROPERTY))
            .expect("position deleted");
        let all_deleted = seen
            .iter()
            .position(|n| matches!(n, Notification::Delete { device, name: None, .. } if device == "Focuser"))
            .expect("delete-all");
        assert!(position_deleted < all_deleted);
        assert!(disconnected < all_deleted);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn detach_while_disconnected_sends_only_delete_all() {
        let (bus, _focuser, recorder) = setup(MockTransport::focuser(0, 10));
        recorder.clear();
        bus.detach_device("Focuser").unwrap();
        assert_eq!(
            recorder.notifications(),
            vec![Notification::Delete {
                device: "Focuser".into(),
                name: None,
                message: None
            }]
        );
    }
}
