use serde::{Deserialize, Serialize};

/// Notifications published while nodes execute.
///
/// Per-item failures are reported here as they happen so a front end can
/// surface one toast per failed item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    NodeStarted {
        node_id: String,
    },
    Progress {
        node_id: String,
        current: usize,
        total: usize,
    },
    ItemSucceeded {
        node_id: String,
        item: String,
    },
    ItemFailed {
        node_id: String,
        item: String,
        error: String,
    },
    NodeExecuted {
        node_id: String,
    },
    FlagsChanged {
        session_id: String,
        keys: Vec<String>,
    },
}

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: EngineEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
