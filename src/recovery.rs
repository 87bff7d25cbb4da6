//! Recovery sweeper: reclaims active tasks whose worker went silent (spec §4.7)

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::queue::TaskQueue;
use crate::time::now_ms;

/// Operator-tunable recovery behavior.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// An active task whose `dequeuedAtMs + timeout_ms < now` is considered orphaned.
    pub timeout_ms: u64,
    /// How often the sweep runs.
    pub check_every_ms: u64,
    /// Spec §4.7: "Implementers MAY offer a config flag to increment on recovery."
    /// Off by default, matching `original_source/cppq.hpp`'s recovery, which never
    /// touches `retried`.
    pub increment_retry_on_recovery: bool,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            check_every_ms: 10_000,
            increment_retry_on_recovery: false,
        }
    }
}

/// Whether an active task has overstayed its welcome (spec §4.7's demotion predicate,
/// lifted out for unit testing without a live Redis).
pub fn is_stalled(dequeued_at_ms: u64, timeout_ms: u64, now_ms: u64) -> bool {
    dequeued_at_ms + timeout_ms < now_ms
}

/// Run the recovery sweep forever. Intended to be spawned once by `Server::run`, but
/// exposed standalone so a host program can run it as its own process against the
/// same Redis (spec §6 lists `recovery` as a language-neutral entry point).
pub async fn run(queue: Arc<TaskQueue>, queues: Vec<String>, config: RecoveryConfig) {
    loop {
        tokio::time::sleep(Duration::from_millis(config.check_every_ms)).await;
        sweep_once(&queue, &queues, &config).await;
    }
}

async fn sweep_once(queue: &TaskQueue, queues: &[String], config: &RecoveryConfig) {
    let now = now_ms();

    for queue_name in queues {
        let uuids = match queue.active_uuids(queue_name).await {
            Ok(uuids) => uuids,
            Err(e) => {
                error!(queue = %queue_name, error = %e, "recovery failed to list active tasks");
                continue;
            }
        };

        for uuid in uuids {
            let (dequeued_at_ms, had_schedule) = match queue.active_task_liveness(queue_name, &uuid).await
            {
                Ok(liveness) => liveness,
                Err(e) => {
                    error!(queue = %queue_name, uuid = %uuid, error = %e, "recovery failed to read task liveness");
                    continue;
                }
            };

            if !is_stalled(dequeued_at_ms, config.timeout_ms, now) {
                continue;
            }

            if config.increment_retry_on_recovery {
                if let Err(e) = queue.increment_retry_then_recover(queue_name, &uuid, had_schedule).await {
                    error!(queue = %queue_name, uuid = %uuid, error = %e, "recovery failed to demote stalled task");
                }
                continue;
            }

            match queue.recover(queue_name, &uuid, had_schedule).await {
                Ok(()) => {
                    warn!(queue = %queue_name, uuid = %uuid, "recovered stalled active task");
                }
                Err(e) => {
                    error!(queue = %queue_name, uuid = %uuid, error = %e, "recovery failed to demote stalled task");
                }
            }
        }
    }

    debug!(queues = queues.len(), "recovery sweep complete");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_past_timeout_is_stalled() {
        assert!(is_stalled(1_000, 500, 2_000));
    }

    #[test]
    fn task_within_timeout_is_not_stalled() {
        assert!(!is_stalled(1_000, 500, 1_400));
    }

    #[test]
    fn boundary_is_exclusive() {
        // dequeued_at_ms + timeout_ms < now, so equality is NOT stalled
        assert!(!is_stalled(1_000, 500, 1_500));
        assert!(is_stalled(1_000, 500, 1_501));
    }
}
