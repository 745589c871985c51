//! In-process notifications between calendar surfaces.
//!
//! Any part of the application can ask for a task's detail view without
//! holding a reference to whoever shows it.

use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarEvent {
    OpenTask { task_id: Uuid },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CalendarEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publisher(&self) -> EventPublisher {
        EventPublisher {
            sender: self.sender.clone(),
        }
    }

    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            receiver: self.sender.subscribe(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<CalendarEvent>,
}

impl EventPublisher {
    /// Returns how many subscribers will see the event. Zero is not an
    /// error.
    pub fn publish(&self, event: CalendarEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                debug!(?event, "no subscribers for event");
                0
            }
        }
    }

    pub fn open_task(&self, task_id: Uuid) -> usize {
        self.publish(CalendarEvent::OpenTask { task_id })
    }
}

#[derive(Debug)]
pub struct EventSubscriber {
    receiver: broadcast::Receiver<CalendarEvent>,
}

impl EventSubscriber {
    /// Next event, or `None` once every publisher is gone. Events missed by
    /// a slow subscriber are skipped.
    pub async fn recv(&mut self) -> Option<CalendarEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<CalendarEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged");
                }
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_task_reaches_every_subscriber() {
        let bus = EventBus::default();
        let mut detail = bus.subscribe();
        let mut sidebar = bus.subscribe();
        let id = Uuid::new_v4();

        assert_eq!(bus.publisher().open_task(id), 2);
        assert_eq!(detail.recv().await, Some(CalendarEvent::OpenTask { task_id: id }));
        assert_eq!(sidebar.recv().await, Some(CalendarEvent::OpenTask { task_id: id }));
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let bus = EventBus::default();
        assert_eq!(bus.publisher().open_task(Uuid::new_v4()), 0);
    }

    #[test]
    fn lagging_subscriber_skips_to_newest() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();
        let publisher = bus.publisher();
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            publisher.open_task(*id);
        }

        assert_eq!(sub.try_recv(), Some(CalendarEvent::OpenTask { task_id: ids[2] }));
        assert_eq!(sub.try_recv(), Some(CalendarEvent::OpenTask { task_id: ids[3] }));
        assert_eq!(sub.try_recv(), None);
    }

    #[tokio::test]
    async fn recv_ends_when_bus_is_dropped() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe();
        drop(bus);
        assert_eq!(sub.recv().await, None);
    }
}
