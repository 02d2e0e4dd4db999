use crate::chat::{ChatSession, Message};
use crate::entity::{Product, UserPreferences};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Change notification published by the store after every successful write.
/// Views subscribe to this instead of polling the store on a timer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StoreEvent {
    ProductAdded(Product),
    ProductUpdated(Product),
    ProductDeleted { id: String },
    SessionAdded(ChatSession),
    SessionUpdated(ChatSession),
    MessageAppended { session_id: String, message: Message },
    PreferencesUpdated(UserPreferences),
    DataImported,
    DataCleared,
}

pub struct EventBus {
    tx: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(100);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: StoreEvent) {
        // We ignore the error if there are no receivers
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
