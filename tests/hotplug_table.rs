// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hot-plug table behavior with simulated focusers.

use std::sync::Arc;
use std::time::Duration;

use astrobus::bus::{Bus, BusConfig};
use astrobus::device::{Device, MockTransport};
use astrobus::drivers::focuser::Focuser;
use astrobus::error::{DeviceError, DiscoveryError};
use astrobus::event::BusEvent;
use astrobus::hotplug::{
    DiscoveredUnit, HotplugConfig, HotplugEvent, HotplugManager, IdentityKey, MemoryDiscovery,
};
use tokio::sync::broadcast;

fn focuser(unit: &DiscoveredUnit) -> Result<Arc<dyn Device>, DeviceError> {
    let device: Arc<dyn Device> = Focuser::new(&unit.label, MockTransport::focuser(0, 100));
    Ok(device)
}

fn unit(serial: &str) -> DiscoveredUnit {
    DiscoveredUnit::new(
        IdentityKey::usb(0x0403, 0x6001, Some(serial)),
        format!("Focuser {serial}"),
    )
}

fn setup(config: HotplugConfig) -> (Bus, Arc<MemoryDiscovery>, Arc<HotplugManager>) {
    let bus = Bus::new(BusConfig::default()).unwrap();
    let source = Arc::new(MemoryDiscovery::new("usb"));
    let manager = HotplugManager::new(bus.clone(), source.clone(), focuser, config);
    (bus, source, manager)
}

/// Drains lifecycle events into (attached, detached) device name lists.
fn lifecycle(events: &mut broadcast::Receiver<BusEvent>) -> (Vec<String>, Vec<String>) {
    let mut attached = Vec::new();
    let mut detached = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            BusEvent::DeviceAttached { device, .. } => attached.push(device),
            BusEvent::DeviceDetached { device, .. } => detached.push(device),
            _ => {}
        }
    }
    (attached, detached)
}

#[tokio::test(flavor = "multi_thread")]
async fn plug_then_unplug_attaches_and_detaches_once() {
    let (bus, source, manager) = setup(HotplugConfig::default());
    let mut events = bus.subscribe();
    let key = unit("A1").key;

    assert!(manager.keys().is_empty());
    source.plug(unit("A1"));
    manager.scan();
    assert_eq!(manager.keys(), vec![key.clone()]);
    assert_eq!(bus.device_names(), vec!["Focuser A1"]);

    assert!(source.unplug(&key));
    manager.scan();
    assert!(manager.keys().is_empty());
    assert_eq!(manager.device_count(), 0);
    assert_eq!(bus.device_count(), 0);

    let (attached, detached) = lifecycle(&mut events);
    assert_eq!(attached, vec!["Focuser A1"]);
    assert_eq!(detached, vec!["Focuser A1"]);

    // The slot is free again.
    source.plug(unit("A1"));
    assert_eq!(manager.scan().attached, vec!["Focuser A1"]);
    assert_eq!(manager.device_count(), 1);
    manager.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn repeated_arrivals_are_debounced_into_one_device() {
    let config = HotplugConfig::default().with_debounce(Duration::from_millis(50));
    let (bus, source, manager) = setup(config);
    let mut events = bus.subscribe();
    let key = unit("A1").key;

    source.plug(unit("A1"));
    manager.handle_event(HotplugEvent::Arrived(Some(key.clone())));
    manager.handle_event(HotplugEvent::Arrived(Some(key)));
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(source.query_count(), 1);
    assert_eq!(manager.device_count(), 1);
    assert_eq!(bus.device_count(), 1);
    let (attached, _) = lifecycle(&mut events);
    assert_eq!(attached, vec!["Focuser A1"]);
    manager.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn removal_event_detaches_device() {
    let config = HotplugConfig::default().with_debounce(Duration::from_millis(20));
    let (bus, source, manager) = setup(config);
    source.plug(unit("A1"));
    source.plug(unit("B2"));
    manager.scan();
    assert_eq!(bus.device_count(), 2);

    let key = unit("A1").key;
    source.unplug(&key);
    manager.handle_event(HotplugEvent::Removed(Some(key)));
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(bus.device_names(), vec!["Focuser B2"]);
    manager.shutdown();
    assert_eq!(bus.device_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn persistent_transient_failure_treats_units_as_absent() {
    let (bus, source, manager) = setup(HotplugConfig::default().with_retries(1));
    source.plug(unit("A1"));
    manager.scan();

    source.fail_next(DiscoveryError::Transient("bus reset".into()));
    source.fail_next(DiscoveryError::Transient("bus reset".into()));
    let report = manager.scan();

    assert_eq!(report.detached, vec!["Focuser A1"]);
    assert!(!manager.is_disabled());
    assert_eq!(bus.device_count(), 0);

    assert_eq!(manager.scan().attached, vec!["Focuser A1"]);
    manager.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn capacity_bounds_the_table() {
    let (bus, source, manager) = setup(HotplugConfig::default().with_capacity(2));
    for serial in ["A1", "B2", "C3"] {
        source.plug(unit(serial));
    }

    let report = manager.scan();
    assert_eq!(report.attached.len(), 2);
    assert_eq!(bus.device_count(), 2);

    source.unplug(&unit("A1").key);
    let report = manager.scan();
    assert_eq!(report.detached, vec!["Focuser A1"]);
    assert_eq!(report.attached, vec!["Focuser C3"]);
    assert_eq!(manager.device_count(), 2);
    manager.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn network_source_is_polled() {
    let config = HotplugConfig::default().with_scan_interval(Duration::from_millis(20));
    let bus = Bus::new(BusConfig::default()).unwrap();
    let source = Arc::new(MemoryDiscovery::new("network"));
    let manager = HotplugManager::new(bus.clone(), source.clone(), focuser, config);
    manager.start_polling();

    source.plug(DiscoveredUnit::new(IdentityKey::network("10.0.0.7:9999"), "Focuser Net"));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(bus.device_names(), vec!["Focuser Net"]);

    source.unplug(&IdentityKey::network("10.0.0.7:9999"));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(bus.device_count(), 0);
    manager.shutdown();
}
