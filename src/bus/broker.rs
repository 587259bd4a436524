// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The bus: registration, routing and notification fan-out.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tokio::runtime::Handle;
use tokio::sync::broadcast;

use super::BusConfig;
use super::dispatch::{self, Lane, LaneTable, Outgoing};
use super::registry::{ClientEntry, ClientRegistry, DeviceEntry, DeviceRegistry};
use crate::client::{Client, ClientId};
use crate::device::Device;
use crate::error::{BusError, Result};
use crate::event::{BusEvent, EventBus};
use crate::property::{Permission, Property, PropertyPattern};
use crate::timer::TimerPool;

/// Routes notifications from devices to clients and change requests from
/// clients to devices.
///
/// `Bus` is a cheap handle; clones share the same registry. Devices keep
/// a clone while attached to emit from their timers.
///
/// # Ordering
///
/// Calls into one device (`enumerate_properties`, `change_property`,
/// `attach`) never overlap: they hold that device's reentrant gate.
/// Notifications about one device reach each client in emission order.
/// They are queued per device and handed to clients only once the
/// emitting thread holds no gate, so a device may emit from inside its
/// own entry points and a client may issue requests to any device from
/// inside its callbacks without the two devices waiting on each other.
///
/// A notification emitted from an entry point is delivered before the
/// outermost bus call returns, unless another thread is already
/// delivering that device's queue; that thread then delivers it.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use astrobus::bus::{Bus, BusConfig};
/// use astrobus::client::RecordingClient;
///
/// # #[tokio::main(flavor = "multi_thread")]
/// # async fn main() -> astrobus::Result<()> {
/// let bus = Bus::new(BusConfig::default())?;
/// let recorder = Arc::new(RecordingClient::new("ui"));
/// let id = bus.attach_client(recorder.clone())?;
/// assert_eq!(bus.client_count(), 1);
/// bus.detach_client(id)?;
/// bus.shutdown();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Bus {
    inner: Arc<BusInner>,
}

struct BusInner {
    config: BusConfig,
    devices: RwLock<DeviceRegistry>,
    clients: RwLock<ClientRegistry>,
    lanes: LaneTable,
    events: EventBus,
    timers: TimerPool,
    running: AtomicBool,
}

impl Bus {
    /// Creates a bus whose timers run on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NoRuntime`] outside a tokio runtime.
    pub fn new(config: BusConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| BusError::NoRuntime)?;
        Ok(Self::with_runtime(runtime, config))
    }

    /// Creates a bus whose timers run on `runtime`.
    #[must_use]
    pub fn with_runtime(runtime: Handle, config: BusConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                events: EventBus::with_capacity(config.event_capacity),
                config,
                devices: RwLock::new(DeviceRegistry::default()),
                clients: RwLock::new(ClientRegistry::default()),
                lanes: LaneTable::default(),
                timers: TimerPool::new(runtime),
                running: AtomicBool::new(true),
            }),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The configuration the bus was built with.
    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// The timer pool drivers schedule hardware work on.
    #[must_use]
    pub fn timers(&self) -> &TimerPool {
        &self.inner.timers
    }

    /// Subscribes to lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.inner.events.subscribe()
    }

    /// Returns `false` once [`shutdown`](Self::shutdown) has begun.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Names of attached devices in attach order.
    #[must_use]
    pub fn device_names(&self) -> Vec<String> {
        self.inner.devices.read().names()
    }

    /// Number of attached devices.
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.inner.devices.read().len()
    }

    /// Number of attached clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.inner.clients.read().len()
    }

    /// Runs `f` holding `device`'s gate.
    ///
    /// Drivers wrap a read-modify-emit sequence in this so concurrent
    /// emitters of the same device cannot reorder their notifications.
    /// Never call it while holding a hardware lock, and never wait on
    /// another device from inside it.
    pub fn with_device_lock<R>(&self, device: &str, f: impl FnOnce() -> R) -> R {
        self.inner.lanes.get(device).enter(f)
    }

    // =========================================================================
    // Device registration
    // =========================================================================

    /// Attaches a device: calls its `attach` and registers it on success.
    ///
    /// # Errors
    ///
    /// * [`BusError::DuplicateDevice`] if the name is taken.
    /// * [`BusError::TooManyDevices`] at capacity.
    /// * [`BusError::ShutDown`] after shutdown.
    /// * The device's own attach error; the device is not registered.
    pub fn attach_device(&self, device: Arc<dyn Device>) -> Result<()> {
        if !self.is_running() {
            return Err(BusError::ShutDown.into());
        }
        let name = device.name().to_string();
        self.inner
            .devices
            .write()
            .reserve(&name, self.inner.config.max_devices)?;

        let result = self.with_device_lock(&name, || {
            let result = device.attach(self);
            if result.is_ok() {
                self.inner.devices.write().commit(DeviceEntry {
                    name: name.clone(),
                    device: Arc::clone(&device),
                });
            }
            result
        });
        match result {
            Ok(()) => {
                tracing::info!(device = %name, "Device attached");
                self.inner.events.publish(BusEvent::device_attached(&name));
                Ok(())
            }
            Err(error) => {
                self.inner.devices.write().release(&name);
                tracing::warn!(device = %name, %error, "Device attach failed");
                self.delete_property(&name, None, None);
                Err(error.into())
            }
        }
    }

    /// Detaches a device and deletes all of its properties.
    ///
    /// The device is unregistered under its gate, so entry calls already
    /// in flight finish first and later ones find no device. The driver's
    /// `detach` then runs without the gate, free to wait for its timers
    /// and to publish its own teardown.
    ///
    /// # Errors
    ///
    /// * [`BusError::DeviceNotFound`] if no such device is attached.
    /// * The driver's detach error. The device is removed regardless.
    pub fn detach_device(&self, name: &str) -> Result<()> {
        let entry = self
            .with_device_lock(name, || self.inner.devices.write().remove(name))
            .ok_or_else(|| BusError::DeviceNotFound(name.to_string()))?;

        let result = entry.device.detach(self);
        self.delete_property(name, None, None);

        let error = result.as_ref().err().map(ToString::to_string);
        if let Some(error) = &error {
            tracing::warn!(device = %name, %error, "Device detach reported an error");
        } else {
            tracing::info!(device = %name, "Device detached");
        }
        self.inner
            .events
            .publish(BusEvent::device_detached(name, error));
        result.map_err(Into::into)
    }

    // =========================================================================
    // Client registration
    // =========================================================================

    /// Attaches a client and returns its id.
    ///
    /// The client is registered before its `attach` hook runs, so an
    /// enumeration issued from the hook reaches it.
    ///
    /// # Errors
    ///
    /// * [`BusError::TooManyClients`] at capacity.
    /// * [`BusError::ShutDown`] after shutdown.
    /// * The client's own attach error; the client is removed again.
    pub fn attach_client(&self, client: Arc<dyn Client>) -> Result<ClientId> {
        if !self.is_running() {
            return Err(BusError::ShutDown.into());
        }
        let id = ClientId::new();
        self.inner.clients.write().insert(
            ClientEntry {
                id,
                client: Arc::clone(&client),
            },
            self.inner.config.max_clients,
        )?;

        if let Err(error) = client.attach(self, id) {
            self.inner.clients.write().remove(id);
            tracing::warn!(client = client.name(), %error, "Client attach failed");
            return Err(error);
        }

        tracing::debug!(client = client.name(), %id, "Client attached");
        self.inner.events.publish(BusEvent::ClientAttached {
            client_id: id,
            name: client.name().to_string(),
        });
        Ok(id)
    }

    /// Detaches a client.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::ClientNotFound`] if no such client is attached.
    pub fn detach_client(&self, id: ClientId) -> Result<()> {
        let entry = self
            .inner
            .clients
            .write()
            .remove(id)
            .ok_or(BusError::ClientNotFound(id))?;

        if let Err(error) = entry.client.detach(self) {
            tracing::warn!(client = entry.client.name(), %error, "Client detach reported an error");
        }
        tracing::debug!(client = entry.client.name(), %id, "Client detached");
        self.inner
            .events
            .publish(BusEvent::ClientDetached { client_id: id });
        Ok(())
    }

    // =========================================================================
    // Device to client
    // =========================================================================

    /// Broadcasts a property definition.
    pub fn define_property(&self, property: &Property, message: Option<&str>) {
        self.define_property_to(None, property, message);
    }

    /// Sends a property definition to one client, or all when `None`.
    ///
    /// Hidden properties are never sent.
    pub fn define_property_to(
        &self,
        client: Option<ClientId>,
        property: &Property,
        message: Option<&str>,
    ) {
        if property.hidden {
            return;
        }
        self.deliver(Outgoing::Define {
            property: property.clone(),
            message: message.map(str::to_string),
            target: client,
        });
    }

    /// Broadcasts a property update.
    ///
    /// Hidden properties are never sent; write-only ones go out without
    /// items.
    pub fn update_property(&self, property: &Property, message: Option<&str>) {
        if property.hidden {
            return;
        }
        let property = if property.permission == Permission::WriteOnly {
            property.for_update()
        } else {
            property.clone()
        };
        self.deliver(Outgoing::Update {
            property,
            message: message.map(str::to_string),
        });
    }

    /// Broadcasts a deletion of one property, or of all of `device`'s
    /// properties when `property` is `None`.
    pub fn delete_property(&self, device: &str, property: Option<&Property>, message: Option<&str>) {
        if property.is_some_and(|p| p.hidden) {
            return;
        }
        self.deliver(Outgoing::Delete {
            device: device.to_string(),
            property: property.cloned(),
            message: message.map(str::to_string),
        });
    }

    /// Broadcasts a free-form message from `device`.
    pub fn send_message(&self, device: &str, message: &str) {
        self.deliver(Outgoing::Message {
            device: device.to_string(),
            message: message.to_string(),
        });
    }

    fn deliver(&self, outgoing: Outgoing) {
        let lane = self.inner.lanes.get(outgoing.device());
        lane.push(outgoing);
        let bus = self.clone();
        dispatch::when_ungated(move || bus.drain(&lane));
    }

    fn drain(&self, lane: &Lane) {
        lane.drain(|outgoing| {
            let recipients = self.inner.clients.read().recipients(
                outgoing.device(),
                outgoing.name(),
                outgoing.target(),
            );
            for client in recipients {
                outgoing.notify(self, client.as_ref());
            }
        });
    }

    // =========================================================================
    // Client to device
    // =========================================================================

    /// Asks matching devices to define their properties.
    ///
    /// Devices are visited in attach order. Definitions go to `client`
    /// only, or to every client when `None`.
    pub fn enumerate_properties(&self, client: Option<ClientId>, pattern: &PropertyPattern) {
        let names = self.inner.devices.read().matching(&pattern.device);
        for name in names {
            self.with_device_lock(&name, || {
                let device = self.inner.devices.read().get(&name);
                if let Some(device) = device {
                    device.enumerate_properties(self, client, Some(pattern));
                }
            });
        }
    }

    /// Routes a change request to the device named in `property`.
    ///
    /// Requests for unknown devices are dropped.
    pub fn change_property(&self, client: Option<ClientId>, property: &Property) {
        self.with_device_lock(&property.device, || {
            let device = self.inner.devices.read().get(&property.device);
            let Some(device) = device else {
                tracing::debug!(
                    device = %property.device,
                    property = %property.name,
                    "Change request for unknown device dropped"
                );
                return;
            };
            device.change_property(self, client, property);
        });
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Detaches every device in reverse attach order, then every client.
    ///
    /// Further attaches fail with [`BusError::ShutDown`].
    pub fn shutdown(&self) {
        if !self.inner.running.swap(false, Ordering::AcqRel) {
            return;
        }
        tracing::info!("Shutting down bus");
        let names = self.device_names();
        for name in names.iter().rev() {
            if let Err(error) = self.detach_device(name) {
                tracing::warn!(device = %name, %error, "Error while detaching device at shutdown");
            }
        }
        let ids = self.inner.clients.read().ids();
        for id in ids {
            let _ = self.detach_client(id);
        }
        self.inner.events.publish(BusEvent::ShutDown);
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("devices", &self.device_count())
            .field("clients", &self.client_count())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{InterestFilter, Notification, RecordingClient};
    use crate::error::{DeviceError, Error};
    use crate::property::{PropertySet, PropertyState};
    use parking_lot::Mutex;

    struct StaticDevice {
        name: String,
        properties: Mutex<PropertySet>,
        fail_attach: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl StaticDevice {
        fn new(name: &str) -> Self {
            Self::with_log(name, Arc::new(Mutex::new(Vec::new())))
        }

        fn with_log(name: &str, log: Arc<Mutex<Vec<String>>>) -> Self {
            let mut properties = PropertySet::new();
            properties.insert(
                Property::number(name, "VALUE", "Main", "Value", PropertyState::Ok, Permission::ReadWrite)
                    .with_number("VALUE", "Value", 0.0, 10.0, 1.0, 1.0),
            );
            properties.insert(
                Property::number(name, "SECRET", "Main", "Secret", PropertyState::Ok, Permission::ReadWrite)
                    .with_number("VALUE", "Value", 0.0, 10.0, 1.0, 1.0)
                    .hidden(),
            );
            Self {
                name: name.to_string(),
                properties: Mutex::new(properties),
                fail_attach: false,
                log,
            }
        }
    }

    impl Device for StaticDevice {
        fn name(&self) -> &str {
            &self.name
        }

        fn attach(&self, bus: &Bus) -> std::result::Result<(), DeviceError> {
            if self.fail_attach {
                return Err(DeviceError::AttachFailed("no memory".into()));
            }
            let defined: Vec<Property> = {
                let mut properties = self.properties.lock();
                properties.set_defined("VALUE", true);
                properties.set_defined("SECRET", true);
                properties.iter().cloned().collect()
            };
            for property in &defined {
                bus.define_property(property, None);
            }
            Ok(())
        }

        fn enumerate_properties(
            &self,
            bus: &Bus,
            client: Option<ClientId>,
            pattern: Option<&PropertyPattern>,
        ) {
            let matching: Vec<Property> = self.properties.lock().matching(pattern).cloned().collect();
            for property in &matching {
                bus.define_property_to(client, property, None);
            }
        }

        fn change_property(&self, bus: &Bus, _client: Option<ClientId>, request: &Property) {
            let updated = {
                let mut properties = self.properties.lock();
                let Some(property) = properties.find_changeable(request) else {
                    return;
                };
                property.copy_values(request, false);
                property.clone()
            };
            bus.update_property(&updated, None);
        }

        fn detach(&self, _bus: &Bus) -> std::result::Result<(), DeviceError> {
            self.log.lock().push(self.name.clone());
            Ok(())
        }
    }

    fn bus() -> Bus {
        Bus::new(BusConfig::default()).unwrap()
    }

    #[test]
    fn new_without_runtime_fails() {
        let err = Bus::new(BusConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Bus(BusError::NoRuntime)));
    }

    #[tokio::test]
    async fn duplicate_device_is_rejected() {
        let bus = bus();
        bus.attach_device(Arc::new(StaticDevice::new("A"))).unwrap();
        let err = bus.attach_device(Arc::new(StaticDevice::new("A"))).unwrap_err();
        assert!(matches!(err, Error::Bus(BusError::DuplicateDevice(_))));
        assert_eq!(bus.device_count(), 1);
    }

    #[tokio::test]
    async fn device_capacity_is_enforced() {
        let bus = Bus::new(BusConfig::default().with_max_devices(1)).unwrap();
        bus.attach_device(Arc::new(StaticDevice::new("A"))).unwrap();
        let err = bus.attach_device(Arc::new(StaticDevice::new("B"))).unwrap_err();
        assert!(matches!(err, Error::Bus(BusError::TooManyDevices { capacity: 1 })));
    }

    #[tokio::test]
    async fn failed_attach_leaves_device_unregistered() {
        let bus = bus();
        let mut device = StaticDevice::new("Broken");
        device.fail_attach = true;
        assert!(bus.attach_device(Arc::new(device)).is_err());
        assert_eq!(bus.device_count(), 0);
        bus.attach_device(Arc::new(StaticDevice::new("Broken"))).unwrap();
    }

    #[tokio::test]
    async fn hidden_properties_are_never_sent() {
        let bus = bus();
        let recorder = Arc::new(RecordingClient::new("ui"));
        bus.attach_client(recorder.clone()).unwrap();
        bus.attach_device(Arc::new(StaticDevice::new("A"))).unwrap();
        bus.change_property(None, &Property::number_request("A", "SECRET", &[("VALUE", 3.0)]));
        assert_eq!(recorder.count(|n| n.property_name() == Some("SECRET")), 0);
        assert_eq!(recorder.count(|n| n.is_define_of("A", "VALUE")), 1);
    }

    #[tokio::test]
    async fn write_only_updates_carry_no_items() {
        let bus = bus();
        let recorder = Arc::new(RecordingClient::new("ui"));
        bus.attach_client(recorder.clone()).unwrap();
        let property = Property::text("A", "PASSWORD", "Main", "Password", PropertyState::Ok, Permission::WriteOnly)
            .with_text("VALUE", "Value", "hunter2");
        bus.update_property(&property, None);
        let sent = recorder.latest("A", "PASSWORD").unwrap();
        assert!(sent.items.is_empty());
    }

    #[tokio::test]
    async fn change_for_unknown_device_is_dropped() {
        let bus = bus();
        let recorder = Arc::new(RecordingClient::new("ui"));
        bus.attach_client(recorder.clone()).unwrap();
        bus.change_property(None, &Property::number_request("Ghost", "VALUE", &[("VALUE", 3.0)]));
        assert!(recorder.is_empty());
    }

    #[tokio::test]
    async fn enumerate_targets_single_client() {
        let bus = bus();
        bus.attach_device(Arc::new(StaticDevice::new("A"))).unwrap();
        let first = Arc::new(RecordingClient::new("first"));
        let second = Arc::new(RecordingClient::new("second"));
        bus.attach_client(first.clone()).unwrap();
        bus.attach_client(second.clone()).unwrap();
        assert_eq!(first.count(|n| n.is_define_of("A", "VALUE")), 1);
        assert_eq!(second.count(|n| n.is_define_of("A", "VALUE")), 1);
    }

    #[tokio::test]
    async fn interest_filter_limits_delivery() {
        let bus = bus();
        let filter = InterestFilter::new();
        filter.add(PropertyPattern::device("B"));
        let recorder = Arc::new(RecordingClient::new("ui").with_interest(filter));
        bus.attach_client(recorder.clone()).unwrap();
        bus.attach_device(Arc::new(StaticDevice::new("A"))).unwrap();
        bus.attach_device(Arc::new(StaticDevice::new("B"))).unwrap();
        assert!(recorder.notifications().iter().all(|n| n.device() == "B"));
        assert!(!recorder.is_empty());
    }

    #[tokio::test]
    async fn detach_sends_delete_all() {
        let bus = bus();
        let recorder = Arc::new(RecordingClient::new("ui"));
        bus.attach_client(recorder.clone()).unwrap();
        bus.attach_device(Arc::new(StaticDevice::new("A"))).unwrap();
        bus.detach_device("A").unwrap();
        let last = recorder.notifications().pop().unwrap();
        assert_eq!(
            last,
            Notification::Delete {
                device: "A".into(),
                name: None,
                message: None
            }
        );
        assert!(matches!(
            bus.detach_device("A").unwrap_err(),
            Error::Bus(BusError::DeviceNotFound(_))
        ));
    }

    /// Blocks its first change request on `entered` before finishing it.
    struct SlowDevice {
        entered: std::sync::Barrier,
        calls: std::sync::atomic::AtomicUsize,
        log: Mutex<Vec<&'static str>>,
    }

    impl Device for SlowDevice {
        fn name(&self) -> &str {
            "Slow"
        }

        fn attach(&self, _bus: &Bus) -> std::result::Result<(), DeviceError> {
            Ok(())
        }

        fn enumerate_properties(&self, _bus: &Bus, _client: Option<ClientId>, _pattern: Option<&PropertyPattern>) {}

        fn change_property(&self, _bus: &Bus, _client: Option<ClientId>, _request: &Property) {
            if self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                self.entered.wait();
                std::thread::sleep(std::time::Duration::from_millis(50));
            }
            self.log.lock().push("change");
        }

        fn detach(&self, _bus: &Bus) -> std::result::Result<(), DeviceError> {
            self.log.lock().push("detach");
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn detach_waits_for_change_in_flight() {
        let bus = bus();
        let device = Arc::new(SlowDevice {
            entered: std::sync::Barrier::new(2),
            calls: std::sync::atomic::AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        });
        bus.attach_device(device.clone()).unwrap();

        let request = Property::number_request("Slow", "VALUE", &[("VALUE", 1.0)]);
        let changer = {
            let bus = bus.clone();
            let request = request.clone();
            std::thread::spawn(move || bus.change_property(None, &request))
        };
        device.entered.wait();
        bus.detach_device("Slow").unwrap();
        changer.join().unwrap();
        assert_eq!(*device.log.lock(), vec!["change", "detach"]);

        bus.change_property(None, &request);
        assert_eq!(*device.log.lock(), vec!["change", "detach"]);
        assert_eq!(device.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_detaches_in_reverse_order() {
        let bus = bus();
        let log = Arc::new(Mutex::new(Vec::new()));
        for name in ["A", "B", "C"] {
            bus.attach_device(Arc::new(StaticDevice::with_log(name, Arc::clone(&log))))
                .unwrap();
        }
        bus.attach_client(Arc::new(RecordingClient::new("ui"))).unwrap();
        let mut events = bus.subscribe();

        bus.shutdown();

        assert_eq!(*log.lock(), vec!["C", "B", "A"]);
        assert_eq!(bus.device_count(), 0);
        assert_eq!(bus.client_count(), 0);
        assert!(matches!(
            bus.attach_device(Arc::new(StaticDevice::new("D"))).unwrap_err(),
            Error::Bus(BusError::ShutDown)
        ));
        let mut last = None;
        while let Ok(event) = events.try_recv() {
            last = Some(event);
        }
        assert_eq!(last, Some(BusEvent::ShutDown));
    }

    #[tokio::test]
    async fn lifecycle_events_are_published() {
        let bus = bus();
        let mut events = bus.subscribe();
        bus.attach_device(Arc::new(StaticDevice::new("A"))).unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(event.device(), Some("A"));
    }
}
