//! Handlers for hub-to-client invocations
//!
//! One handler per method name. Registering a name again replaces the old
//! handler.

use crate::error::Result;

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Handler for an inbound invocation; receives the raw argument list
pub type MessageHandler = Arc<dyn Fn(&[Value]) -> Result<()> + Send + Sync>;

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Mutex<HashMap<String, MessageHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `method`, returning the handler it replaced
    pub fn register(&self, method: &str, handler: MessageHandler) -> Option<MessageHandler> {
        self.handlers.lock().insert(method.to_string(), handler)
    }

    pub fn remove(&self, method: &str) -> Option<MessageHandler> {
        self.handlers.lock().remove(method)
    }

    pub fn get(&self, method: &str) -> Option<MessageHandler> {
        self.handlers.lock().get(method).cloned()
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers.lock().contains_key(method)
    }

    pub fn len(&self) -> usize {
        self.handlers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: &Arc<AtomicUsize>) -> MessageHandler {
        let counter = Arc::clone(counter);
        Arc::new(move |_args: &[Value]| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_register_replaces_previous() {
        let registry = HandlerRegistry::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        assert!(registry.register("ScoreChanged", counting(&first)).is_none());
        assert!(registry.register("ScoreChanged", counting(&second)).is_some());
        assert_eq!(registry.len(), 1);

        let handler = registry.get("ScoreChanged").unwrap();
        handler(&[json!(1)]).unwrap();

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_is_noop_when_absent() {
        let registry = HandlerRegistry::new();
        assert!(registry.remove("Missing").is_none());

        let counter = Arc::new(AtomicUsize::new(0));
        registry.register("Present", counting(&counter));
        assert!(registry.remove("Present").is_some());
        assert!(!registry.contains("Present"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_method_names_are_exact() {
        let registry = HandlerRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        registry.register("receiveMessage", counting(&counter));

        assert!(registry.get("ReceiveMessage").is_none());
        assert!(registry.get("receiveMessage").is_some());
    }
}
