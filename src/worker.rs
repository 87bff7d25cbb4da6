//! Bounded worker pool and task dispatch (spec §4.5, §5)

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use crate::handler::HandlerRegistry;
use crate::queue::TaskQueue;
use crate::task::Task;

/// Configuration for the bounded worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Maximum number of task handlers running concurrently. Defaults to the
    /// machine's available parallelism, falling back to 1 — the Rust analogue of
    /// `std::thread::hardware_concurrency()` in `original_source/cppq.hpp`'s
    /// `thread_pool::determine_thread_count`.
    pub concurrency: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        let concurrency = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self { concurrency }
    }
}

/// Bounded pool of Tokio tasks gated by a semaphore. Each submitted task is handed
/// an owned `Task` and runs to completion independently; the pool does not need a
/// work queue of its own because the server loop only ever submits one task per
/// tick per free permit (spec §4.6).
#[derive(Clone)]
pub struct WorkerPool {
    queue: Arc<TaskQueue>,
    handlers: Arc<HandlerRegistry>,
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(queue: Arc<TaskQueue>, handlers: Arc<HandlerRegistry>, config: WorkerPoolConfig) -> Self {
        Self {
            queue,
            handlers,
            semaphore: Arc::new(Semaphore::new(config.concurrency.max(1))),
        }
    }

    /// Submit a task for dispatch. Spawns a detached Tokio task that owns the
    /// permit for its lifetime and commits the task's terminal or retry state on
    /// completion (spec §4.5).
    pub fn submit(&self, task: Task, queue_name: String) {
        let queue = self.queue.clone();
        let handlers = self.handlers.clone();
        let semaphore = self.semaphore.clone();

        tokio::spawn(async move {
            let permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            run_task(queue, handlers, task, queue_name).await;
            drop(permit);
        });
    }
}

/// Execute a single dispatched task end to end and commit its resulting state
/// transition (spec §4.5). A handler error never escapes this function; it is
/// converted into a retry or a terminal failure and logged.
async fn run_task(
    queue: Arc<TaskQueue>,
    handlers: Arc<HandlerRegistry>,
    mut task: Task,
    queue_name: String,
) {
    let handler = match handlers.get(&task.task_type).await {
        Some(handler) => handler,
        None => {
            error!(uuid = %task.uuid, task_type = %task.task_type, "no handler registered for task type");
            if let Err(e) = queue.fail(&queue_name, &task).await {
                error!(uuid = %task.uuid, error = %e, "failed to commit terminal failure for unhandled task type");
            }
            return;
        }
    };

    match handler.call(&mut task).await {
        Ok(()) => {
            if let Err(e) = queue.complete(&queue_name, &task).await {
                error!(uuid = %task.uuid, error = %e, "failed to commit completed task");
            } else {
                info!(uuid = %task.uuid, queue = %queue_name, "task completed");
            }
        }
        Err(e) => {
            task.retried += 1;
            debug!(uuid = %task.uuid, error = %e, retried = task.retried, "handler failed");

            let outcome = if task.retried >= task.max_retry {
                queue.fail(&queue_name, &task).await
            } else {
                queue.retry(&queue_name, &task).await
            };

            if let Err(commit_err) = outcome {
                error!(uuid = %task.uuid, error = %commit_err, "failed to commit retry/failure state");
            }
        }
    }
}

/// Expose `run_task` for tests that want to drive dispatch against a live queue
/// without going through the pool's semaphore machinery.
#[cfg(test)]
pub(crate) async fn run_task_for_test(
    queue: Arc<TaskQueue>,
    handlers: Arc<HandlerRegistry>,
    task: Task,
    queue_name: String,
) {
    run_task(queue, handlers, task, queue_name).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_concurrency_is_at_least_one() {
        let config = WorkerPoolConfig::default();
        assert!(config.concurrency >= 1);
    }
}
