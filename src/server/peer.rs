// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bus-side proxy for one network peer.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tokio::sync::mpsc;

use super::{BlobMode, WireMessage};
use crate::Result;
use crate::bus::Bus;
use crate::client::{Client, ClientId, InterestFilter, Notification};
use crate::property::{ItemValue, Property, PropertyPattern, PropertyState, PropertyType};

/// A [`Client`] that forwards notifications to a socket writer.
///
/// Notifications are queued on an unbounded channel, so bus dispatch never
/// waits on the network. The interest filter starts empty: a peer receives
/// nothing until it asks with `getProperties`. Blob updates are held back
/// until it asks for them with `enableBlob`.
#[derive(Debug)]
pub struct PeerClient {
    name: String,
    interest: InterestFilter,
    outbound: mpsc::UnboundedSender<WireMessage>,
    messages_enabled: AtomicBool,
    /// Newest first; the first matching pattern decides.
    blob_modes: RwLock<Vec<(PropertyPattern, BlobMode)>>,
    id: RwLock<Option<ClientId>>,
}

impl PeerClient {
    /// Creates a proxy that queues outbound messages on `outbound`.
    #[must_use]
    pub fn new(name: impl Into<String>, outbound: mpsc::UnboundedSender<WireMessage>) -> Self {
        Self {
            name: name.into(),
            interest: InterestFilter::new(),
            outbound,
            messages_enabled: AtomicBool::new(true),
            blob_modes: RwLock::new(Vec::new()),
            id: RwLock::new(None),
        }
    }

    /// The id assigned by the bus, once attached.
    #[must_use]
    pub fn id(&self) -> Option<ClientId> {
        *self.id.read()
    }

    /// Whether free-form device messages are forwarded.
    #[must_use]
    pub fn messages_enabled(&self) -> bool {
        self.messages_enabled.load(Ordering::Acquire)
    }

    /// Blob delivery mode for `property`.
    #[must_use]
    pub fn blob_mode(&self, property: &Property) -> BlobMode {
        self.blob_modes
            .read()
            .iter()
            .find(|(pattern, _)| pattern.matches_property(property))
            .map_or(BlobMode::Never, |(_, mode)| *mode)
    }

    /// Acts on one message received from the peer.
    pub fn handle(&self, bus: &Bus, message: WireMessage) {
        match message {
            WireMessage::GetProperties { device, name } => {
                let pattern = PropertyPattern::property(device, name);
                self.interest.add(pattern.clone());
                bus.enumerate_properties(self.id(), &pattern);
            }
            WireMessage::NewProperty { property } => {
                bus.change_property(self.id(), &property);
            }
            WireMessage::EnableMessages { enabled } => {
                self.messages_enabled.store(enabled, Ordering::Release);
            }
            WireMessage::EnableBlob { device, name, mode } => {
                let pattern = PropertyPattern::property(device, name);
                let mut modes = self.blob_modes.write();
                modes.retain(|(existing, _)| *existing != pattern);
                modes.insert(0, (pattern, mode));
                tracing::debug!(peer = %self.name, ?mode, "Blob mode changed");
            }
            other => {
                tracing::debug!(peer = %self.name, message = ?other, "Ignoring server-only message from peer");
            }
        }
    }

    /// The copy of `property` this peer may see, or `None` to skip it.
    ///
    /// Definitions never carry blob payloads. Updates follow the peer's
    /// blob mode, and only Ok updates carry a payload at all.
    fn outbound(&self, property: &Property, definition: bool) -> Option<Property> {
        if property.property_type != PropertyType::Blob {
            return Some(property.clone());
        }
        let mode = self.blob_mode(property);
        if mode == BlobMode::Never && !definition {
            return None;
        }
        let mut property = property.clone();
        let settled = property.state == PropertyState::Ok;
        for item in &mut property.items {
            let ItemValue::Blob(blob) = &mut item.value else {
                continue;
            };
            let by_reference = mode == BlobMode::Url && blob.url.is_some();
            if definition || !settled || by_reference {
                blob.data.clear();
            }
        }
        Some(property)
    }

    fn send(&self, notification: Notification) {
        if self
            .outbound
            .send(WireMessage::from_notification(notification))
            .is_err()
        {
            tracing::trace!(peer = %self.name, "Peer writer gone, notification dropped");
        }
    }
}

impl Client for PeerClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn interest(&self) -> Option<&InterestFilter> {
        Some(&self.interest)
    }

    fn attach(&self, _bus: &Bus, id: ClientId) -> Result<()> {
        *self.id.write() = Some(id);
        tracing::info!(peer = %self.name, client = %id, "Peer attached");
        Ok(())
    }

    fn define_property(&self, _bus: &Bus, property: &Property, message: Option<&str>) {
        if let Some(property) = self.outbound(property, true) {
            self.send(Notification::Define {
                property,
                message: message.map(str::to_owned),
            });
        }
    }

    fn update_property(&self, _bus: &Bus, property: &Property, message: Option<&str>) {
        if let Some(property) = self.outbound(property, false) {
            self.send(Notification::Update {
                property,
                message: message.map(str::to_owned),
            });
        }
    }

    fn delete_property(
        &self,
        _bus: &Bus,
        device: &str,
        property: Option<&Property>,
        message: Option<&str>,
    ) {
        self.send(Notification::Delete {
            device: device.to_owned(),
            name: property.map(|property| property.name.clone()),
            message: message.map(str::to_owned),
        });
    }

    fn send_message(&self, _bus: &Bus, device: &str, message: &str) {
        if self.messages_enabled() {
            self.send(Notification::Message {
                device: device.to_owned(),
                message: message.to_owned(),
            });
        }
    }

    fn detach(&self, _bus: &Bus) -> Result<()> {
        self.interest.clear();
        tracing::info!(peer = %self.name, "Peer detached");
        Ok(())
    }
}
