//! Scheduled tasks example
//!
//! Demonstrates delayed scheduling: a task enqueued now but not eligible for
//! dispatch until a future timestamp has passed. Cron expressions can be
//! attached to a task for a host program's own evaluator to read back, but
//! this core never fires them itself — see `Schedule::Cron`.
//!
//! To run: make sure Redis is running on localhost:6379, then
//! `cargo run --example scheduled_tasks`.

use std::sync::Arc;

use cppq::{Handler, HandlerRegistry, Schedule, Server, ServerConfig, Task, TaskError, TaskQueue};
use tracing::{info, Level};

struct LogHandler;

#[async_trait::async_trait]
impl Handler for LogHandler {
    async fn call(&self, task: &mut Task) -> Result<(), TaskError> {
        info!(payload = %task.payload, "scheduled log task fired");
        task.result = Some("logged".to_string());
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let queue = Arc::new(TaskQueue::new_default().await?);

    // Fires five seconds from now.
    let due_at = chrono::Utc::now().timestamp_millis() as u64 + 5_000;
    let task = queue
        .enqueue(
            Task::new("log", "five seconds have passed", 1),
            "scheduled",
            Schedule::DelayedAt(due_at),
        )
        .await?;
    info!(uuid = %task.uuid, due_at, "scheduled a delayed task");

    // A cron expression is stored on the task but never evaluated here; a host
    // program that wants recurring firing has to read it back and re-enqueue.
    let cron_task = queue
        .enqueue(
            Task::new("log", "cron placeholder", 1),
            "scheduled",
            Schedule::Cron("0 * * * *".to_string()),
        )
        .await?;
    info!(uuid = %cron_task.uuid, "recorded a cron-tagged task (not self-firing)");

    let handlers = Arc::new(HandlerRegistry::new());
    handlers.register("log", LogHandler).await;

    let server = Server::new(queue, handlers, ServerConfig::new(vec![("scheduled", 0)]));
    info!("dispatch loop running, ctrl-c to stop");
    server.run().await?;
    Ok(())
}
