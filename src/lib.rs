//! # cppq
//!
//! A durable, Redis-backed task queue and worker runtime.
//!
//! ## Features
//!
//! - Atomic enqueue/dequeue via Redis `MULTI`/`EXEC` transactions
//! - Delayed and cron-tagged scheduling, with due-task selection via a Lua script
//! - A bounded async worker pool with retry-with-cap accounting
//! - A recovery sweeper that reclaims tasks whose worker went silent
//! - Per-queue pausing
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cppq::{Handler, HandlerRegistry, Schedule, Server, ServerConfig, Task, TaskError, TaskQueue};
//!
//! struct EmailHandler;
//!
//! #[async_trait::async_trait]
//! impl Handler for EmailHandler {
//!     async fn call(&self, task: &mut Task) -> Result<(), TaskError> {
//!         task.result = Some(format!("sent: {}", task.payload));
//!         Ok(())
//!     }
//! }
//!
//! # async fn run() -> cppq::TaskResult<()> {
//! let queue = Arc::new(TaskQueue::new_default().await?);
//! let handlers = Arc::new(HandlerRegistry::new());
//! handlers.register("email:deliver", EmailHandler).await;
//!
//! queue
//!     .enqueue(Task::new("email:deliver", "{}", 3), "default", Schedule::Immediate)
//!     .await?;
//!
//! let server = Server::new(queue, handlers, ServerConfig::new(vec![("default", 0)]));
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod handler;
pub mod queue;
pub mod recovery;
pub mod server;
pub mod task;
mod time;
pub mod worker;

pub use error::{TaskError, TaskResult};
pub use handler::{Handler, HandlerRegistry};
pub use queue::{QueueConfig, TaskQueue};
pub use recovery::RecoveryConfig;
pub use server::{QueuePriority, Server, ServerConfig};
pub use task::{Schedule, Task, TaskId, TaskState};
pub use worker::{WorkerPool, WorkerPoolConfig};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
