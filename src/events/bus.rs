//! # Event Bus
//!
//! Fan-out of committed events to any number of subscribers over unbounded
//! channels. Publishing never blocks; a dropped receiver is pruned on the next
//! publish.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use tokio::sync::mpsc;

use super::{EventPublisher, VersionEvent};

/// Subscriber end of the bus
pub type EventReceiver = mpsc::UnboundedReceiver<VersionEvent>;

type EventSender = mpsc::UnboundedSender<VersionEvent>;

/// Publish/subscribe fan-out
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<EventSender>>,
    sequence: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber.
    pub fn subscribe(&self) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut subscribers) = self.subscribers.write() {
            subscribers.push(tx);
        }
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Sequence number of the last published event
    pub fn last_sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, event: &VersionEvent) {
        let mut event = event.clone();
        event.sequence = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;

        if let Ok(mut subscribers) = self.subscribers.write() {
            subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }
}

/// Publisher that keeps every event in memory
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    events: Mutex<Vec<VersionEvent>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<VersionEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventPublisher for MemoryEventLog {
    fn publish(&self, event: &VersionEvent) {
        if let Ok(mut events) = self.events.lock() {
            let mut event = event.clone();
            event.sequence = events.len() as u64 + 1;
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChangeKind;
    use crate::model::{RecordKey, RootId};
    use chrono::Utc;

    fn event(kind: ChangeKind) -> VersionEvent {
        VersionEvent::new(kind, "projects", &RecordKey::on_branch(RootId::new(), "main"), Utc::now())
    }

    #[test]
    fn test_fan_out_to_all_subscribers() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(&event(ChangeKind::Created));
        bus.publish(&event(ChangeKind::Updated));

        assert_eq!(a.try_recv().unwrap().sequence, 1);
        assert_eq!(a.try_recv().unwrap().kind, ChangeKind::Updated);
        assert_eq!(b.try_recv().unwrap().kind, ChangeKind::Created);
        assert_eq!(bus.last_sequence(), 2);
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        let _keep = bus.subscribe();
        drop(rx);

        bus.publish(&event(ChangeKind::Deleted));
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_memory_log_records_in_order() {
        let log = MemoryEventLog::new();
        log.publish(&event(ChangeKind::Created));
        log.publish(&event(ChangeKind::Branched));

        let events = log.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].sequence, 2);
        assert_eq!(events[1].kind, ChangeKind::Branched);
    }
}
