// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Broadcast channel for lifecycle events.

use tokio::sync::broadcast;

use super::BusEvent;

/// Default channel capacity for the event bus.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Broadcasts [`BusEvent`]s to any number of subscribers.
///
/// A slow subscriber that falls more than the capacity behind loses the
/// oldest events and sees `RecvError::Lagged`. Publishing never blocks
/// and never fails, so device and client threads can publish freely.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BusEvent>,
}

impl EventBus {
    /// Creates an event bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Creates an event bus buffering up to `capacity` events.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribes to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publishes an event; dropped silently when nobody listens.
    pub fn publish(&self, event: BusEvent) {
        tracing::trace!(?event, "Publishing bus event");
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_bus_has_no_subscribers() {
        assert_eq!(EventBus::new().subscriber_count(), 0);
    }

    #[test]
    fn drop_subscriber_decrements_count() {
        let events = EventBus::new();
        let rx = events.subscribe();
        assert_eq!(events.subscriber_count(), 1);
        drop(rx);
        assert_eq!(events.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn publish_delivers_to_every_subscriber() {
        let events = EventBus::new();
        let mut rx1 = events.subscribe();
        let mut rx2 = events.subscribe();

        events.publish(BusEvent::device_attached("Focuser"));

        assert_eq!(rx1.recv().await.unwrap().device(), Some("Focuser"));
        assert_eq!(rx2.recv().await.unwrap().device(), Some("Focuser"));
    }

    #[test]
    fn publish_without_subscribers_is_harmless() {
        EventBus::with_capacity(0).publish(BusEvent::ShutDown);
    }

    #[tokio::test]
    async fn clone_shares_channel() {
        let events = EventBus::new();
        let publisher = events.clone();
        let mut rx = events.subscribe();
        publisher.publish(BusEvent::ShutDown);
        assert_eq!(rx.recv().await.unwrap(), BusEvent::ShutDown);
    }
}
