// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Demo server: two simulated focusers behind a hot-plug table, a filter
//! agent, and the JSON-lines network front end.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=astrobus=debug cargo run --bin astrobus-server -- [bind-addr]
//! ```
//!
//! The bind address defaults to `ASTROBUS_BIND`, then `127.0.0.1:7624`.
//! Device configuration is saved under the per-user config directory.

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use astrobus::bus::{Bus, BusConfig};
use astrobus::config::{ConfigStore, JsonConfigStore};
use astrobus::device::{Device, DeviceBase, MockTransport};
use astrobus::drivers::agent::{AgentConfig, FilterAgent};
use astrobus::drivers::focuser::{Focuser, FocuserConfig};
use astrobus::hotplug::{
    DiscoveredUnit, HotplugConfig, HotplugEvent, HotplugManager, IdentityKey, MemoryDiscovery,
};
use astrobus::property::names::interface;
use astrobus::server::{Server, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let bind_addr: Option<SocketAddr> = match env::args().nth(1).or_else(|| env::var("ASTROBUS_BIND").ok()) {
        Some(addr) => Some(addr.parse()?),
        None => None,
    };
    let mut server_config = ServerConfig::default();
    if let Some(addr) = bind_addr {
        server_config = server_config.with_bind_addr(addr);
    }

    let store: Option<Arc<dyn ConfigStore>> = match JsonConfigStore::user_default() {
        Ok(store) => {
            tracing::info!(dir = %store.dir().display(), "Saving device configuration");
            Some(Arc::new(store))
        }
        Err(error) => {
            tracing::warn!(%error, "Device configuration will not be persisted");
            None
        }
    };

    let bus = Bus::new(BusConfig::default())?;

    let usb = Arc::new(MemoryDiscovery::new("usb"));
    usb.plug(DiscoveredUnit::new(
        IdentityKey::usb(0x0403, 0x6001, Some("A1")),
        "Focuser A1",
    ));
    usb.plug(DiscoveredUnit::new(
        IdentityKey::usb(0x0403, 0x6001, Some("B2")),
        "Focuser B2",
    ));

    let hotplug = HotplugManager::new(
        bus.clone(),
        usb.clone(),
        move |unit: &DiscoveredUnit| {
            let mut base = DeviceBase::new(&unit.label, interface::FOCUSER).simulated();
            if let Some(store) = &store {
                base = base.with_config_store(Arc::clone(store));
            }
            let device: Arc<dyn Device> = Focuser::with_base(
                base,
                MockTransport::focuser(0, 250),
                FocuserConfig::default(),
            );
            Ok(device)
        },
        HotplugConfig::default(),
    );
    hotplug.handle_event(HotplugEvent::Arrived(None));

    bus.attach_device(FilterAgent::new("Focuser Agent", AgentConfig::default()))?;

    let server = Server::bind(bus.clone(), &server_config).await?;
    tracing::info!(addr = %server.local_addr()?, "Ready");

    server
        .serve(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                tracing::error!(%error, "Cannot listen for ctrl-c");
            }
        })
        .await?;

    hotplug.shutdown();
    bus.shutdown();
    Ok(())
}
