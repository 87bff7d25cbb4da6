//! Simple worker example
//!
//! Demonstrates registering handlers and running the server's dispatch loop.
//!
//! To run: make sure Redis is running on localhost:6379, then
//! `cargo run --example simple_worker`.

use std::sync::Arc;

use cppq::{Handler, HandlerRegistry, Schedule, Server, ServerConfig, Task, TaskError, TaskQueue};
use tracing::{info, Level};

/// Adds two numbers encoded in the payload as `"a,b"`.
struct AddHandler;

#[async_trait::async_trait]
impl Handler for AddHandler {
    async fn call(&self, task: &mut Task) -> Result<(), TaskError> {
        let (a, b) = task
            .payload
            .split_once(',')
            .and_then(|(a, b)| Some((a.trim().parse::<i64>().ok()?, b.trim().parse::<i64>().ok()?)))
            .ok_or_else(|| TaskError::handler_failure("add", "payload must be \"a,b\""))?;

        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        info!(a, b, sum = a + b, "computed sum");
        task.result = Some((a + b).to_string());
        Ok(())
    }
}

/// Upper- or lower-cases a message encoded as `"<message>|upper"` or `"<message>|lower"`.
struct MessageHandler;

#[async_trait::async_trait]
impl Handler for MessageHandler {
    async fn call(&self, task: &mut Task) -> Result<(), TaskError> {
        let (message, mode) = task
            .payload
            .split_once('|')
            .ok_or_else(|| TaskError::handler_failure("message", "payload must be \"<message>|<mode>\""))?;

        tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;
        let result = if mode == "upper" {
            message.to_uppercase()
        } else {
            message.to_lowercase()
        };
        info!(message, result = %result, "processed message");
        task.result = Some(result);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("starting simple worker example");

    let queue = Arc::new(TaskQueue::new_default().await?);

    for i in 0..5i64 {
        queue
            .enqueue(
                Task::new("add", format!("{i},{}", i * 2), 3),
                "math",
                Schedule::Immediate,
            )
            .await?;
    }

    for (msg, mode) in [("Hello World", "upper"), ("Rust is Amazing", "lower")] {
        queue
            .enqueue(
                Task::new("message", format!("{msg}|{mode}"), 3),
                "examples",
                Schedule::Immediate,
            )
            .await?;
    }

    let handlers = Arc::new(HandlerRegistry::new());
    handlers.register("add", AddHandler).await;
    handlers.register("message", MessageHandler).await;

    let config = ServerConfig::new(vec![("math", 10), ("examples", 0)]);
    let server = Server::new(queue, handlers, config);

    info!("dispatch loop running, ctrl-c to stop");
    server.run().await?;
    Ok(())
}
