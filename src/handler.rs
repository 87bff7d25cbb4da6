//! Handler registry: a process-wide name -> handler mapping (spec §4.9)

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::TaskError;
use crate::task::Task;

/// A registered user function mapping a task to success (returns `Ok`) or retryable
/// failure (returns `Err`). The handler may mutate `task.result`.
#[async_trait::async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, task: &mut Task) -> Result<(), TaskError>;
}

/// Process-wide mapping from task-type string to handler. Registration is not
/// synchronized against dispatch: all handlers must be registered before
/// `Server::run` is called (spec §4.9).
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn Handler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a task type, replacing any prior registration.
    pub async fn register<H>(&self, task_type: impl Into<String>, handler: H)
    where
        H: Handler + 'static,
    {
        let mut handlers = self.handlers.write().await;
        handlers.insert(task_type.into(), Arc::new(handler));
    }

    /// Exact-match lookup by task type (spec §4.9: a plain name -> function table,
    /// not a pattern-matching dispatch like the teacher's `can_handle` fallback scan).
    pub async fn get(&self, task_type: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.read().await.get(task_type).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoHandler;

    #[async_trait::async_trait]
    impl Handler for EchoHandler {
        async fn call(&self, task: &mut Task) -> Result<(), TaskError> {
            task.result = Some(task.payload.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn lookup_is_exact_match_only() {
        let registry = HandlerRegistry::new();
        registry.register("echo", EchoHandler).await;

        assert!(registry.get("echo").await.is_some());
        assert!(registry.get("ech").await.is_none());
        assert!(registry.get("unregistered").await.is_none());
    }

    #[tokio::test]
    async fn later_registration_replaces_earlier_one() {
        let registry = HandlerRegistry::new();
        registry.register("echo", EchoHandler).await;
        registry.register("echo", EchoHandler).await;
        assert!(registry.get("echo").await.is_some());
    }
}
