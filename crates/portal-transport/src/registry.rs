//! Method name → handler table used for inbound dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use portal_core::HandlerError;
use serde_json::Value;

/// Receives the params of one inbound notification, positionally.
pub type NotificationHandler = Arc<dyn Fn(&[Value]) -> Result<(), HandlerError> + Send + Sync>;

/// One handler per method name; the last registration wins.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, NotificationHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `method`, replacing any earlier one.
    pub fn register(&self, method: impl Into<String>, handler: NotificationHandler) {
        let method = method.into();
        if self.handlers.write().insert(method.clone(), handler).is_some() {
            tracing::debug!(method = %method, "notification handler replaced");
        }
    }

    /// Handler for `method`. The returned `Arc` is independent of the table,
    /// so the handler may register further handlers while it runs.
    pub fn get(&self, method: &str) -> Option<NotificationHandler> {
        self.handlers.read().get(method).cloned()
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers.read().contains_key(method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn last_registration_wins() {
        let registry = HandlerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));

        registry.register("reload", Arc::new(|_: &[Value]| Ok(())));
        let counter = hits.clone();
        registry.register(
            "reload",
            Arc::new(move |_: &[Value]| {
                let _ = counter.fetch_add(10, Ordering::SeqCst);
                Ok(())
            }),
        );

        let handler = registry.get("reload").unwrap();
        handler(&[]).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn unknown_method_has_no_handler() {
        let registry = HandlerRegistry::new();
        assert!(registry.get("updatePortlet").is_none());
        assert!(!registry.contains("updatePortlet"));
    }

    #[test]
    fn handler_can_register_while_running() {
        let registry = Arc::new(HandlerRegistry::new());
        let inner = registry.clone();
        registry.register(
            "bootstrap",
            Arc::new(move |_: &[Value]| {
                inner.register("late", Arc::new(|_: &[Value]| Ok(())));
                Ok(())
            }),
        );

        registry.get("bootstrap").unwrap()(&[]).unwrap();
        assert!(registry.contains("late"));
    }
}
