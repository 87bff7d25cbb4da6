//! Server loop: priority-ordered, pause-aware dispatch (spec §4.6)

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::error::TaskResult;
use crate::handler::HandlerRegistry;
use crate::queue::{TaskQueue, SCHEDULED_SCRIPT_SRC};
use crate::recovery::{self, RecoveryConfig};
use crate::worker::{WorkerPool, WorkerPoolConfig};

/// A queue name paired with its dispatch priority. Higher values service first;
/// ties break by the order queues were listed in `ServerConfig::queues` (spec §3:
/// "Ties are broken by insertion order of the configuration mapping").
#[derive(Debug, Clone)]
pub struct QueuePriority {
    pub name: String,
    pub priority: i64,
}

/// Everything `Server::run` needs to start dispatching.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub queues: Vec<QueuePriority>,
    pub recovery: RecoveryConfig,
    pub pool: WorkerPoolConfig,
}

impl ServerConfig {
    pub fn new(queues: Vec<(impl Into<String>, i64)>) -> Self {
        Self {
            queues: queues
                .into_iter()
                .map(|(name, priority)| QueuePriority {
                    name: name.into(),
                    priority,
                })
                .collect(),
            recovery: RecoveryConfig::default(),
            pool: WorkerPoolConfig::default(),
        }
    }
}

/// Sort queues by descending priority, stable on insertion order for ties. A plain
/// `sort_by` on `Ord` descending priority is stable in Rust (`slice::sort_by` is a
/// stable sort), which already gives spec §3's required tie-break — stronger than
/// `original_source/cppq.hpp`'s `std::sort` (not guaranteed stable), noted in
/// DESIGN.md as a deliberate fidelity improvement rather than a silent behavior
/// change.
fn sorted_by_priority(mut queues: Vec<QueuePriority>) -> Vec<QueuePriority> {
    queues.sort_by(|a, b| b.priority.cmp(&a.priority));
    queues
}

/// Owns the background recovery sweeper, the worker pool, and the main dispatch
/// loop. `Server::run` never returns under normal operation (spec §6).
pub struct Server {
    queue: Arc<TaskQueue>,
    handlers: Arc<HandlerRegistry>,
    config: ServerConfig,
}

impl Server {
    pub fn new(queue: Arc<TaskQueue>, handlers: Arc<HandlerRegistry>, config: ServerConfig) -> Self {
        Self {
            queue,
            handlers,
            config,
        }
    }

    /// Run the server loop forever. Loads the scheduled-selection script, publishes
    /// every configured queue into `cppq:queues`, starts the recovery sweeper, and
    /// then ticks every 100ms dispatching at most one task per queue pass.
    pub async fn run(self) -> TaskResult<std::convert::Infallible> {
        let script = redis::Script::new(SCHEDULED_SCRIPT_SRC);
        let queues = sorted_by_priority(self.config.queues.clone());

        for q in &queues {
            self.queue.register_queue(&q.name, q.priority).await?;
        }
        info!(queues = ?queues.iter().map(|q| (&q.name, q.priority)).collect::<Vec<_>>(), "registered queues");

        let recovery_queue_names: Vec<String> = queues.iter().map(|q| q.name.clone()).collect();
        tokio::spawn(recovery::run(
            self.queue.clone(),
            recovery_queue_names,
            self.config.recovery.clone(),
        ));

        let pool = WorkerPool::new(self.queue.clone(), self.handlers.clone(), self.config.pool.clone());

        loop {
            tokio::time::sleep(Duration::from_millis(100)).await;

            for q in &queues {
                match self.queue.is_paused(&q.name).await {
                    Ok(true) => continue,
                    Ok(false) => {}
                    Err(e) => {
                        error!(queue = %q.name, error = %e, "failed to check pause state");
                        continue;
                    }
                }

                let scheduled = self.queue.dequeue_scheduled(&q.name, &script).await;
                let dispatched = match scheduled {
                    Ok(Some(task)) => {
                        pool.submit(task, q.name.clone());
                        true
                    }
                    Ok(None) => match self.queue.dequeue(&q.name).await {
                        Ok(Some(task)) => {
                            pool.submit(task, q.name.clone());
                            true
                        }
                        Ok(None) => false,
                        Err(e) => {
                            error!(queue = %q.name, error = %e, "pending dequeue failed");
                            false
                        }
                    },
                    Err(e) => {
                        error!(queue = %q.name, error = %e, "scheduled dequeue failed");
                        false
                    }
                };

                if dispatched {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(name: &str, priority: i64) -> QueuePriority {
        QueuePriority {
            name: name.to_string(),
            priority,
        }
    }

    #[test]
    fn priority_sort_is_descending() {
        let sorted = sorted_by_priority(vec![q("low", 5), q("high", 20), q("default", 10)]);
        let names: Vec<_> = sorted.iter().map(|q| q.name.as_str()).collect();
        assert_eq!(names, vec!["high", "default", "low"]);
    }

    #[test]
    fn ties_preserve_insertion_order() {
        let sorted = sorted_by_priority(vec![q("a", 10), q("b", 10), q("c", 10)]);
        let names: Vec<_> = sorted.iter().map(|q| q.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn server_config_preserves_queue_insertion_order_before_sorting() {
        let config = ServerConfig::new(vec![("low", 5), ("high", 20)]);
        assert_eq!(config.queues[0].name, "low");
        assert_eq!(config.queues[1].name, "high");
    }
}
