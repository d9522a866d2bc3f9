//! External action routing.
//!
//! Task files whose `type` is not one of the host's own control types are
//! handed, payload untouched, to whichever handler registered that type.
//! Any tenant may request an action; the handler gets the resolved source
//! group and decides what that tenant is allowed to do.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ActionError;
use crate::ipc::identity::SourceGroup;
use crate::ipc::request::RESERVED_TYPES;

/// Executes one kind of action request.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// The `type` value this handler serves.
    fn action_type(&self) -> &str;

    async fn handle(&self, payload: Value, source: &SourceGroup) -> Result<(), ActionError>;
}

/// Registry mapping action types to handlers.
#[derive(Default)]
pub struct ActionRouter {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl ActionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Returns `false` if its type is reserved for the
    /// host's own control requests.
    pub fn register(&mut self, handler: Arc<dyn ActionHandler>) -> bool {
        let kind = handler.action_type().to_string();
        if kind.is_empty() || RESERVED_TYPES.contains(&kind.as_str()) {
            tracing::warn!(action = %kind, "Rejected action handler: reserved type");
            return false;
        }
        if self.handlers.insert(kind.clone(), handler).is_some() {
            tracing::debug!(action = %kind, "Replaced action handler");
        }
        true
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(kind).cloned()
    }

    pub fn count(&self) -> usize {
        self.handlers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl ActionHandler for Named {
        fn action_type(&self) -> &str {
            self.0
        }

        async fn handle(&self, _payload: Value, _source: &SourceGroup) -> Result<(), ActionError> {
            Ok(())
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut router = ActionRouter::new();
        assert!(router.register(Arc::new(Named("send_email"))));
        assert!(router.get("send_email").is_some());
        assert!(router.get("calendar_create").is_none());
        assert_eq!(router.count(), 1);
    }

    #[test]
    fn reserved_types_rejected() {
        let mut router = ActionRouter::new();
        assert!(!router.register(Arc::new(Named("schedule_task"))));
        assert!(!router.register(Arc::new(Named("register_group"))));
        assert!(!router.register(Arc::new(Named(""))));
        assert_eq!(router.count(), 0);
    }
}
