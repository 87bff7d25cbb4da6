//! Task client example
//!
//! Demonstrates submitting tasks from a producer process, independent of any
//! running worker, and pausing/unpausing a queue.
//!
//! To run: make sure Redis is running on localhost:6379 and a worker is
//! running (the `simple_worker` example), then
//! `cargo run --example task_client`.

use cppq::{Schedule, Task, TaskQueue};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let queue = TaskQueue::new_default().await?;

    let operations = [
        ("add", 10.0, 20.0),
        ("subtract", 50.0, 8.0),
        ("multiply", 6.0, 7.0),
        ("divide", 9.0, 0.0),
    ];

    for (op, x, y) in operations {
        let payload = format!("{op},{x},{y}");
        let task = queue
            .enqueue(Task::new("compute", payload, 2), "compute", Schedule::Immediate)
            .await?;
        info!(uuid = %task.uuid, op, x, y, "submitted compute task");
    }

    // Pause a queue while submitting a backlog, then release it.
    queue.pause("compute").await?;
    info!("compute queue paused, backlog will not drain until unpaused");

    queue
        .enqueue(
            Task::new("compute", "add,1,1", 2),
            "compute",
            Schedule::Immediate,
        )
        .await?;

    queue.unpause("compute").await?;
    info!("compute queue unpaused");

    Ok(())
}
