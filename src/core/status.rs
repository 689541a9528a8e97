use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::{Display, EnumString};

use super::bus::{EventBus, PlcEvent};

/// Coarse connection health as seen by consumers.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Unknown,
    Offline,
    Connecting,
    Online,
}

/// Single source of truth for the current [`Status`].
///
/// Readers query it synchronously; transitions are broadcast on the bus.
/// Setting the value it already holds is a no-op.
pub struct StatusSignal {
    current: RwLock<Status>,
    bus: Arc<EventBus>,
}

impl StatusSignal {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            current: RwLock::new(Status::default()),
            bus,
        }
    }

    pub fn get(&self) -> Status {
        *self.current.read()
    }

    /// Returns `true` when the status actually changed.
    pub fn set(&self, status: Status) -> bool {
        {
            let mut current = self.current.write();
            if *current == status {
                return false;
            }
            *current = status;
        }
        log::debug!("PLC status -> {status}");
        self.bus.publish(PlcEvent::StatusChanged(status));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_text() {
        assert_eq!(Status::Online.to_string(), "online");
        assert_eq!(Status::from_str("connecting").ok(), Some(Status::Connecting));
        assert_eq!(Status::default(), Status::Unknown);
    }

    #[test]
    fn test_broadcast_only_on_transition() {
        let bus = Arc::new(EventBus::new());
        let rx = bus.subscribe();
        let signal = StatusSignal::new(Arc::clone(&bus));

        assert!(signal.set(Status::Offline));
        assert!(!signal.set(Status::Offline));
        assert!(signal.set(Status::Connecting));
        assert_eq!(signal.get(), Status::Connecting);

        let seen: Vec<_> = rx.drain().collect();
        assert_eq!(
            seen,
            vec![
                PlcEvent::StatusChanged(Status::Offline),
                PlcEvent::StatusChanged(Status::Connecting),
            ]
        );
    }
}
