// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Keeps the device table in step with one discovery source.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use super::{DeviceTable, DiscoveredUnit, Discovery, HotplugConfig, IdentityKey, TableSlot};
use crate::bus::Bus;
use crate::device::Device;
use crate::error::{DeviceError, DiscoveryError};
use crate::timer::TimerHandle;

/// Builds a device for a newly discovered unit.
///
/// Implemented for closures of the same shape.
pub trait DeviceFactory: Send + Sync {
    /// Creates the device; the bus attaches it afterwards.
    ///
    /// # Errors
    ///
    /// Any error skips the unit until the next scan.
    fn create(&self, unit: &DiscoveredUnit) -> Result<Arc<dyn Device>, DeviceError>;
}

impl<F> DeviceFactory for F
where
    F: Fn(&DiscoveredUnit) -> Result<Arc<dyn Device>, DeviceError> + Send + Sync,
{
    fn create(&self, unit: &DiscoveredUnit) -> Result<Arc<dyn Device>, DeviceError> {
        self(unit)
    }
}

/// A hardware arrival or removal notice from the platform.
///
/// The manager does not trust the payload; every event triggers a full
/// rescan after the debounce delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotplugEvent {
    /// Something was plugged in.
    Arrived(Option<IdentityKey>),
    /// Something was unplugged.
    Removed(Option<IdentityKey>),
}

/// What one scan changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Devices attached, in discovery order.
    pub attached: Vec<String>,
    /// Devices detached, in slot order.
    pub detached: Vec<String>,
}

impl ScanReport {
    /// Returns `true` if the scan changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attached.is_empty() && self.detached.is_empty()
    }
}

/// Attaches devices for units that appear and detaches them when the
/// units go away.
///
/// Local hardware sources call [`handle_event`](Self::handle_event) from
/// their event thread; network sources call
/// [`start_polling`](Self::start_polling). Both run [`scan`](Self::scan)
/// on a timer worker. Scans hold the table lock for their whole duration,
/// so two never interleave.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use astrobus::bus::{Bus, BusConfig};
/// use astrobus::device::{Device, MockTransport};
/// use astrobus::drivers::focuser::Focuser;
/// use astrobus::hotplug::{
///     DiscoveredUnit, HotplugConfig, HotplugManager, IdentityKey, MemoryDiscovery,
/// };
///
/// # #[tokio::main(flavor = "multi_thread")]
/// # async fn main() {
/// let bus = Bus::new(BusConfig::default()).unwrap();
/// let source = Arc::new(MemoryDiscovery::new("usb"));
/// source.plug(DiscoveredUnit::new(IdentityKey::usb(0x1234, 1, Some("F1")), "Focuser F1"));
///
/// let manager = HotplugManager::new(
///     bus.clone(),
///     source.clone(),
///     |unit: &DiscoveredUnit| {
///         let device: Arc<dyn Device> = Focuser::new(&unit.label, MockTransport::focuser(0, 100));
///         Ok(device)
///     },
///     HotplugConfig::default(),
/// );
/// let report = manager.scan();
/// assert_eq!(report.attached, vec!["Focuser F1"]);
/// manager.shutdown();
/// # }
/// ```
pub struct HotplugManager {
    this: Weak<Self>,
    bus: Bus,
    source: Arc<dyn Discovery>,
    factory: Box<dyn DeviceFactory>,
    config: HotplugConfig,
    table: Mutex<DeviceTable>,
    scan_timer: Mutex<Option<TimerHandle>>,
    poll_timer: Mutex<Option<TimerHandle>>,
    disabled: AtomicBool,
}

impl HotplugManager {
    /// Creates a manager for `source`. Nothing happens until an event
    /// arrives, polling starts, or [`scan`](Self::scan) is called.
    pub fn new(
        bus: Bus,
        source: Arc<dyn Discovery>,
        factory: impl DeviceFactory + 'static,
        config: HotplugConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            bus,
            source,
            factory: Box::new(factory),
            table: Mutex::new(DeviceTable::new(config.capacity)),
            config,
            scan_timer: Mutex::new(None),
            poll_timer: Mutex::new(None),
            disabled: AtomicBool::new(false),
        })
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &HotplugConfig {
        &self.config
    }

    /// Returns `true` after a fatal discovery error or shutdown.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    /// Number of live devices.
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.table.lock().len()
    }

    /// Names of live devices in slot order.
    #[must_use]
    pub fn device_names(&self) -> Vec<String> {
        self.table.lock().iter().map(|(_, slot)| slot.name.clone()).collect()
    }

    /// Identity keys of live devices in slot order.
    #[must_use]
    pub fn keys(&self) -> Vec<IdentityKey> {
        self.table.lock().keys()
    }

    // ========================================================================
    // Triggers
    // ========================================================================

    /// Schedules a scan after the debounce delay.
    ///
    /// Events arriving before the scan runs push it back rather than
    /// queueing another.
    pub fn handle_event(&self, event: HotplugEvent) {
        if self.is_disabled() {
            tracing::trace!(source = self.source.name(), ?event, "Hot-plug event ignored, source disabled");
            return;
        }
        tracing::debug!(source = self.source.name(), ?event, "Hot-plug event, scan scheduled");
        let mut slot = self.scan_timer.lock();
        if self.bus.timers().reschedule(&slot, self.config.debounce) {
            return;
        }
        let Some(this) = self.this.upgrade() else {
            return;
        };
        *slot = Some(self.bus.timers().schedule(&this, self.config.debounce, |manager| {
            manager.scan();
        }));
    }

    /// Scans now and then every `scan_interval` until shutdown.
    pub fn start_polling(&self) {
        tracing::debug!(
            source = self.source.name(),
            interval_ms = self.config.scan_interval.as_millis(),
            "Polling discovery source"
        );
        self.arm_poll(Duration::ZERO);
    }

    fn arm_poll(&self, delay: Duration) {
        if self.is_disabled() {
            return;
        }
        let mut slot = self.poll_timer.lock();
        if self.bus.timers().reschedule(&slot, delay) {
            return;
        }
        let Some(this) = self.this.upgrade() else {
            return;
        };
        *slot = Some(self.bus.timers().schedule(&this, delay, |manager| {
            manager.scan();
            manager.arm_poll(manager.config.scan_interval);
        }));
    }

    // ========================================================================
    // Scanning
    // ========================================================================

    /// Reconciles the table with the units the source reports.
    ///
    /// Units no longer reported are detached first, then new units are
    /// attached into free slots. A transient query failure is retried
    /// `retries` times; if it persists every unit is treated as absent. A
    /// fatal failure detaches everything and disables the manager.
    pub fn scan(&self) -> ScanReport {
        let mut report = ScanReport::default();
        if self.is_disabled() {
            return report;
        }
        let mut table = self.table.lock();

        let units = match self.query() {
            Ok(units) => units,
            Err(DiscoveryError::Fatal(message)) => {
                tracing::error!(
                    source = self.source.name(),
                    %message,
                    "Discovery source failed permanently, disabling"
                );
                self.disabled.store(true, Ordering::SeqCst);
                Vec::new()
            }
            Err(error) => {
                tracing::warn!(
                    source = self.source.name(),
                    %error,
                    "Discovery failed, treating all units as absent"
                );
                Vec::new()
            }
        };

        let present: HashSet<&IdentityKey> = units.iter().map(|unit| &unit.key).collect();
        for slot in table.drain_unless(|key| present.contains(key)) {
            self.detach(&slot);
            report.detached.push(slot.name);
        }

        for unit in &units {
            if table.find(&unit.key).is_some() {
                continue;
            }
            if table.is_full() {
                tracing::warn!(
                    source = self.source.name(),
                    key = %unit.key,
                    capacity = table.capacity(),
                    "Device table full, unit skipped"
                );
                continue;
            }
            let device = match self.factory.create(unit) {
                Ok(device) => device,
                Err(error) => {
                    tracing::warn!(key = %unit.key, %error, "Could not create device for unit");
                    continue;
                }
            };
            let name = device.name().to_string();
            if let Err(error) = self.bus.attach_device(Arc::clone(&device)) {
                tracing::warn!(key = %unit.key, device = %name, %error, "Hot-plugged device failed to attach");
                continue;
            }
            let slot = TableSlot {
                key: unit.key.clone(),
                name: name.clone(),
                device,
            };
            match table.insert(slot) {
                Ok(index) => {
                    tracing::info!(key = %unit.key, device = %name, index, "Hot-plugged device attached");
                    report.attached.push(name);
                }
                Err(slot) => self.detach(&slot),
            }
        }

        if !report.is_empty() {
            tracing::debug!(
                source = self.source.name(),
                attached = report.attached.len(),
                detached = report.detached.len(),
                "Scan complete"
            );
        }
        report
    }

    fn query(&self) -> Result<Vec<DiscoveredUnit>, DiscoveryError> {
        let mut attempt = 0;
        loop {
            match self.source.enumerate() {
                Err(error) if error.is_transient() && attempt < self.config.retries => {
                    attempt += 1;
                    tracing::debug!(source = self.source.name(), attempt, %error, "Retrying discovery");
                }
                result => return result,
            }
        }
    }

    fn detach(&self, slot: &TableSlot) {
        match self.bus.detach_device(&slot.name) {
            Ok(()) => tracing::info!(key = %slot.key, device = %slot.name, "Hot-plugged device detached"),
            Err(error) => {
                tracing::warn!(key = %slot.key, device = %slot.name, %error, "Error while detaching hot-plugged device");
            }
        }
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Stops scanning, waits for an in-flight scan, and detaches every
    /// device in the table.
    ///
    /// Must not be called from a scan.
    pub fn shutdown(&self) {
        self.disabled.store(true, Ordering::SeqCst);
        let timers = [self.scan_timer.lock().take(), self.poll_timer.lock().take()];
        for handle in timers.into_iter().flatten() {
            handle.cancel_sync();
        }
        let drained = self.table.lock().drain_unless(|_| false);
        for slot in &drained {
            self.detach(slot);
        }
        tracing::debug!(source = self.source.name(), detached = drained.len(), "Hot-plug manager stopped");
    }
}

impl std::fmt::Debug for HotplugManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HotplugManager")
            .field("source", &self.source.name())
            .field("devices", &self.device_count())
            .field("disabled", &self.is_disabled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusConfig;
    use crate::client::ClientId;
    use crate::hotplug::MemoryDiscovery;
    use crate::property::{Property, PropertyPattern};

    struct Unit {
        name: String,
    }

    impl Device for Unit {
        fn name(&self) -> &str {
            &self.name
        }
        fn attach(&self, _bus: &Bus) -> Result<(), DeviceError> {
            Ok(())
        }
        fn enumerate_properties(&self, _: &Bus, _: Option<ClientId>, _: Option<&PropertyPattern>) {}
        fn change_property(&self, _: &Bus, _: Option<ClientId>, _: &Property) {}
        fn detach(&self, _bus: &Bus) -> Result<(), DeviceError> {
            Ok(())
        }
    }

    fn factory(unit: &DiscoveredUnit) -> Result<Arc<dyn Device>, DeviceError> {
        Ok(Arc::new(Unit {
            name: unit.label.clone(),
        }))
    }

    fn unit(serial: &str) -> DiscoveredUnit {
        DiscoveredUnit::new(IdentityKey::usb(0x10, 0x20, Some(serial)), format!("Cam {serial}"))
    }

    fn setup(config: HotplugConfig) -> (Bus, Arc<MemoryDiscovery>, Arc<HotplugManager>) {
        let bus = Bus::new(BusConfig::default()).unwrap();
        let source = Arc::new(MemoryDiscovery::new("usb"));
        let manager = HotplugManager::new(bus.clone(), source.clone(), factory, config);
        (bus, source, manager)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rescan_without_changes_is_noop() {
        let (bus, source, manager) = setup(HotplugConfig::default());
        source.plug(unit("1"));
        assert_eq!(manager.scan().attached, vec!["Cam 1"]);
        assert!(manager.scan().is_empty());
        assert_eq!(bus.device_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn transient_failure_is_retried_once() {
        let (bus, source, manager) = setup(HotplugConfig::default());
        source.plug(unit("1"));
        manager.scan();
        source.fail_next(DiscoveryError::Transient("bus reset".into()));
        assert!(manager.scan().is_empty());
        assert_eq!(source.query_count(), 3);
        assert_eq!(bus.device_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fatal_failure_disables_source() {
        let (bus, source, manager) = setup(HotplugConfig::default());
        source.plug(unit("1"));
        manager.scan();
        source.fail_next(DiscoveryError::Fatal("driver unloaded".into()));
        assert_eq!(manager.scan().detached, vec!["Cam 1"]);
        assert!(manager.is_disabled());
        assert_eq!(bus.device_count(), 0);

        let queries = source.query_count();
        manager.scan();
        manager.handle_event(HotplugEvent::Arrived(None));
        assert_eq!(source.query_count(), queries);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn full_table_skips_extra_units() {
        let (_bus, source, manager) = setup(HotplugConfig::default().with_capacity(1));
        source.plug(unit("1"));
        source.plug(unit("2"));
        assert_eq!(manager.scan().attached.len(), 1);
        source.unplug(&IdentityKey::usb(0x10, 0x20, Some("1")));
        let report = manager.scan();
        assert_eq!(report.detached, vec!["Cam 1"]);
        assert_eq!(report.attached, vec!["Cam 2"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn polling_picks_up_new_units() {
        let config = HotplugConfig::default().with_scan_interval(Duration::from_millis(20));
        let (bus, source, manager) = setup(config);
        manager.start_polling();
        tokio::time::sleep(Duration::from_millis(60)).await;
        source.plug(unit("7"));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(bus.device_names(), vec!["Cam 7"]);
        manager.shutdown();
        assert_eq!(bus.device_count(), 0);
    }
}
