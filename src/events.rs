//! Connection lifecycle events and their listeners

use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

/// Something the host may want to react to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Entered the connected state (initial connect or reconnect)
    Connected,
    /// Left the connected state
    Disconnected,
    /// A retry has been scheduled; `attempt` counts from 1 within a cycle
    Reconnecting { attempt: u32 },
    /// A failure the host did not await directly
    Error(String),
    /// Raw text pushed through the `ReceiveMessage` hub method
    MessageReceived(String),
}

/// Identifies a registered listener so it can be removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

/// Callback for client events
pub type EventListener = Arc<dyn Fn(&ClientEvent) + Send + Sync>;

/// Listeners in registration order
#[derive(Default)]
pub struct EventListeners {
    listeners: Mutex<Vec<(ListenerId, EventListener)>>,
}

impl EventListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: EventListener) -> ListenerId {
        let id = ListenerId(Uuid::new_v4());
        self.listeners.lock().push((id, listener));
        id
    }

    /// Returns false if no listener had this id
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every listener with `event`
    ///
    /// Listeners run outside the lock, so they may add or remove listeners.
    pub fn emit(&self, event: &ClientEvent) {
        let snapshot: Vec<EventListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in snapshot {
            listener(event);
        }
    }
}
