use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 64;

/// Signals exchanged between the uploader and whoever displays its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// Data behind `event` changed; listeners should refresh, staying in `prefix`.
    DataChanged {
        event: String,
        prefix: Option<String>,
    },
    /// Show or hide the task center.
    TaskCenter { show: bool },
}

/// In-process publish/subscribe channel. Dropping a receiver unsubscribes it.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }

    /// Returns how many subscribers received the event.
    pub fn publish(&self, event: BusEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
