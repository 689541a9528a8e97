use flume::{Receiver, Sender};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};

use super::status::Status;
use crate::protocol::{PlcValue, ValueMap};

/// Full result set of one completed cycle, shared between subscribers.
pub type Snapshot = Arc<ValueMap>;

/// A variable whose value differs from the cached one.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueChange {
    pub key: String,
    pub value: PlcValue,
}

/// Notifications published by the PLC runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum PlcEvent {
    /// The connection status moved to a new value.
    StatusChanged(Status),
    /// A cycle completed; carries every value read, changed or not.
    CycleCompleted(Snapshot),
    /// A single variable changed.
    ValueChanged(ValueChange),
    /// At least one variable changed during the cycle; carries every value read.
    /// Published once per cycle, after all [`PlcEvent::ValueChanged`] events.
    SnapshotChanged(Snapshot),
}

#[derive(Default)]
struct Subscribers {
    events: Vec<Sender<PlcEvent>>,
    keyed: HashMap<String, Vec<Sender<PlcValue>>>,
}

/// Fan-out point between the runtime and its consumers.
///
/// Subscribers get their own unbounded channel. Channels whose receiver has
/// been dropped are pruned on the next publish.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Subscribers>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every [`PlcEvent`].
    pub fn subscribe(&self) -> Receiver<PlcEvent> {
        let (tx, rx) = flume::unbounded();
        self.subscribers.lock().events.push(tx);
        rx
    }

    /// Receive the new value of `key` each time it changes.
    pub fn subscribe_key(&self, key: impl Into<String>) -> Receiver<PlcValue> {
        let (tx, rx) = flume::unbounded();
        self.subscribers
            .lock()
            .keyed
            .entry(key.into())
            .or_default()
            .push(tx);
        rx
    }

    pub fn publish(&self, event: PlcEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers
            .events
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn publish_key(&self, key: &str, value: &PlcValue) {
        let mut subscribers = self.subscribers.lock();
        let Some(senders) = subscribers.keyed.get_mut(key) else {
            return;
        };
        senders.retain(|tx| tx.send(value.clone()).is_ok());
        if senders.is_empty() {
            subscribers.keyed.remove(key);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        let subscribers = self.subscribers.lock();
        subscribers.events.len() + subscribers.keyed.values().map(Vec::len).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_reaches_every_subscriber() {
        let bus = EventBus::new();
        let first = bus.subscribe();
        let second = bus.subscribe();

        bus.publish(PlcEvent::StatusChanged(Status::Online));

        assert_eq!(
            first.try_recv().ok(),
            Some(PlcEvent::StatusChanged(Status::Online))
        );
        assert_eq!(
            second.try_recv().ok(),
            Some(PlcEvent::StatusChanged(Status::Online))
        );
    }

    #[test]
    fn test_keyed_subscription_filters_by_key() {
        let bus = EventBus::new();
        let speed = bus.subscribe_key("speed");

        bus.publish_key("level", &PlcValue::from(3));
        bus.publish_key("speed", &PlcValue::from(7));

        assert_eq!(speed.drain().collect::<Vec<_>>(), vec![PlcValue::from(7)]);
    }

    #[test]
    fn test_dropped_receivers_are_pruned() {
        let bus = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());
        drop(bus.subscribe_key("speed"));
        assert_eq!(bus.subscriber_count(), 3);

        bus.publish(PlcEvent::StatusChanged(Status::Offline));
        bus.publish_key("speed", &PlcValue::from(1));

        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.len(), 1);
    }
}
