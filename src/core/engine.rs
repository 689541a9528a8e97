use std::sync::Arc;

use super::{
    bus::{EventBus, PlcEvent, ValueChange},
    cache::ValueCache,
    status::{Status, StatusSignal},
};
use crate::protocol::ValueMap;

/// Compares each cycle result with the cache and publishes the outcome.
pub struct ChangeDetector {
    cache: ValueCache,
    bus: Arc<EventBus>,
    status: Arc<StatusSignal>,
}

impl ChangeDetector {
    pub fn new(bus: Arc<EventBus>, status: Arc<StatusSignal>) -> Self {
        Self {
            cache: ValueCache::new(),
            bus,
            status,
        }
    }

    /// Publish one completed cycle and return how many variables changed.
    ///
    /// Event order per cycle: `CycleCompleted`, then per changed key its
    /// keyed value followed by `ValueChanged`, then a single
    /// `SnapshotChanged` if anything changed.
    pub fn publish_cycle(&mut self, values: ValueMap) -> usize {
        // a successful read proves the link is alive
        self.status.set(Status::Online);

        let snapshot = Arc::new(values);
        self.bus
            .publish(PlcEvent::CycleCompleted(Arc::clone(&snapshot)));

        let mut changed = 0;
        for (key, value) in snapshot.iter() {
            if !self.cache.update(key, value) {
                continue;
            }
            changed += 1;
            self.bus.publish_key(key, value);
            self.bus.publish(PlcEvent::ValueChanged(ValueChange {
                key: key.clone(),
                value: value.clone(),
            }));
        }

        if changed > 0 {
            log::debug!("Cycle completed with {changed} changed value(s)");
            self.bus.publish(PlcEvent::SnapshotChanged(snapshot));
        }
        changed
    }

    pub fn cache(&self) -> &ValueCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PlcValue;

    fn values(pairs: &[(&str, i32)]) -> ValueMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), PlcValue::from(*v)))
            .collect()
    }

    fn detector() -> (ChangeDetector, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new());
        let status = Arc::new(StatusSignal::new(Arc::clone(&bus)));
        (ChangeDetector::new(Arc::clone(&bus), status), bus)
    }

    #[test]
    fn test_first_cycle_reports_everything() {
        let (mut detector, bus) = detector();
        let rx = bus.subscribe();

        assert_eq!(detector.publish_cycle(values(&[("a", 1), ("b", 2)])), 2);

        let events: Vec<_> = rx.drain().collect();
        assert_eq!(events[0], PlcEvent::StatusChanged(Status::Online));
        assert!(matches!(events[1], PlcEvent::CycleCompleted(_)));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, PlcEvent::ValueChanged(_)))
                .count(),
            2
        );
        assert!(matches!(events.last(), Some(PlcEvent::SnapshotChanged(_))));
    }

    #[test]
    fn test_only_changed_keys_fire() {
        let (mut detector, bus) = detector();
        let a = bus.subscribe_key("a");
        let b = bus.subscribe_key("b");
        detector.publish_cycle(values(&[("a", 1), ("b", 2)]));
        a.drain().for_each(drop);
        b.drain().for_each(drop);

        let rx = bus.subscribe();
        assert_eq!(detector.publish_cycle(values(&[("a", 1), ("b", 3)])), 1);

        assert!(a.is_empty());
        assert_eq!(b.drain().collect::<Vec<_>>(), vec![PlcValue::from(3)]);

        let events: Vec<_> = rx.drain().collect();
        assert_eq!(
            events,
            vec![
                PlcEvent::CycleCompleted(Arc::new(values(&[("a", 1), ("b", 3)]))),
                PlcEvent::ValueChanged(ValueChange {
                    key: "b".into(),
                    value: PlcValue::from(3),
                }),
                PlcEvent::SnapshotChanged(Arc::new(values(&[("a", 1), ("b", 3)]))),
            ]
        );
    }

    #[test]
    fn test_unchanged_cycle_only_publishes_snapshot() {
        let (mut detector, bus) = detector();
        detector.publish_cycle(values(&[("a", 1)]));

        let rx = bus.subscribe();
        assert_eq!(detector.publish_cycle(values(&[("a", 1)])), 0);

        let events: Vec<_> = rx.drain().collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], PlcEvent::CycleCompleted(_)));
    }

    #[test]
    fn test_absent_keys_stay_cached() {
        let (mut detector, _bus) = detector();
        detector.publish_cycle(values(&[("a", 1), ("b", 2)]));
        detector.publish_cycle(values(&[("a", 5)]));
        assert_eq!(detector.cache().get("b"), Some(&PlcValue::from(2)));
        assert_eq!(detector.cache().len(), 2);
    }
}
