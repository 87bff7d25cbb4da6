//! Task queue implementation with a Redis backend (spec §4.1-§4.4, §4.8)

use redis::aio::Connection;
use redis::{AsyncCommands, Client};
use tracing::debug;
use uuid::Uuid;

use crate::error::{TaskError, TaskResult};
use crate::task::{Schedule, Task, TaskState};
use crate::time::now_ms;

/// Fixed key prefix for every key this crate touches. Not configurable: spec §6
/// pins it to `cppq`, matching `original_source/cppq.hpp`.
const PREFIX: &str = "cppq";

/// Well-known set of `<name>:<priority>` strings published by the server at startup
pub const QUEUES_SET_KEY: &str = "cppq:queues";

/// Pause registry set
pub const PAUSED_SET_KEY: &str = "cppq:queues:paused";

/// Lua script backing scheduled dequeue (spec §4.4), preserved byte-for-byte from
/// `original_source/cppq.hpp`'s `getScheduledScript`, including its deliberately
/// lexicographic seconds-concatenated-with-microseconds comparison (spec §9 Open
/// Question: this crate does not silently "fix" it).
pub const SCHEDULED_SCRIPT_SRC: &str = r#"
local timeCall = redis.call('time')
local time = timeCall[1] .. timeCall[2]
local scheduled = redis.call('LRANGE', 'cppq:' .. ARGV[1] .. ':scheduled', 0, -1)
for _, key in ipairs(scheduled) do
  if (time > redis.call('HGET', 'cppq:' .. ARGV[1] .. ':task:' .. key, 'schedule')) then
    return key
  end
end
"#;

fn value_to_string(value: &redis::Value) -> Option<String> {
    match value {
        redis::Value::Data(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        _ => None,
    }
}

/// Connection settings for the queue's store adapter
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub redis_url: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

/// Thin store adapter over Redis: single commands, `MULTI`/`EXEC` transactions, and
/// scripted atomic selection. The task lifecycle engine (enqueue/dequeue/recovery)
/// depends only on the methods exposed here.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    client: Client,
}

impl TaskQueue {
    /// Connect and verify the connection with a PING, mirroring the teacher's
    /// `TaskQueue::new` startup check.
    pub async fn new(config: QueueConfig) -> TaskResult<Self> {
        let client = Client::open(config.redis_url.as_str())?;
        let mut conn = client.get_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(Self { client })
    }

    pub async fn new_default() -> TaskResult<Self> {
        Self::new(QueueConfig::default()).await
    }

    async fn connection(&self) -> TaskResult<Connection> {
        Ok(self.client.get_async_connection().await?)
    }

    fn queue_key(queue: &str, suffix: &str) -> String {
        format!("{PREFIX}:{queue}:{suffix}")
    }

    fn task_key(queue: &str, uuid: &str) -> String {
        format!("{PREFIX}:{queue}:task:{uuid}")
    }

    /// §4.2: materialize a task's membership and hash under a single atomic
    /// transaction. On commit failure neither is written; on success both are.
    pub async fn enqueue(&self, mut task: Task, queue: &str, schedule: Schedule) -> TaskResult<Task> {
        match &schedule {
            Schedule::Immediate => {
                task.state = TaskState::Pending;
                task.schedule = None;
                task.cron = None;
            }
            Schedule::DelayedAt(ms) => {
                task.state = TaskState::Scheduled;
                task.schedule = Some(*ms);
                task.cron = None;
            }
            Schedule::Cron(expr) => {
                task.state = TaskState::Scheduled;
                task.schedule = None;
                task.cron = Some(expr.clone());
            }
        }

        let list_key = match schedule {
            Schedule::Immediate => Self::queue_key(queue, "pending"),
            Schedule::DelayedAt(_) | Schedule::Cron(_) => Self::queue_key(queue, "scheduled"),
        };
        let task_key = Self::task_key(queue, &task.uuid.to_string());
        let fields = task.to_hash_fields();
        let uuid = task.uuid.to_string();

        let mut conn = self.connection().await?;
        redis::pipe()
            .atomic()
            .lpush(&list_key, &uuid)
            .ignore()
            .hset_multiple(&task_key, &fields)
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!(uuid = %uuid, queue, state = %task.state, "enqueued task");
        Ok(task)
    }

    /// §4.3: pop the oldest pending UUID and promote it to active.
    pub async fn dequeue(&self, queue: &str) -> TaskResult<Option<Task>> {
        let pending_key = Self::queue_key(queue, "pending");
        let mut conn = self.connection().await?;

        let peek: Vec<String> = redis::cmd("LRANGE")
            .arg(&pending_key)
            .arg(-1)
            .arg(-1)
            .query_async(&mut conn)
            .await?;

        let uuid = match peek.into_iter().next() {
            Some(uuid) => uuid,
            None => return Ok(None),
        };

        self.promote_to_active(&mut conn, queue, &uuid, &pending_key, false, now_ms())
            .await
    }

    /// §4.4: evaluate the due-selection script, then promote the winning UUID the
    /// same way `dequeue` does (with one extra `schedule` HGET).
    pub async fn dequeue_scheduled(
        &self,
        queue: &str,
        script: &redis::Script,
    ) -> TaskResult<Option<Task>> {
        let mut conn = self.connection().await?;

        let selected: Option<String> = script.arg(queue).invoke_async(&mut conn).await?;
        let uuid = match selected {
            Some(uuid) => uuid,
            None => return Ok(None),
        };

        let scheduled_key = Self::queue_key(queue, "scheduled");
        self.promote_to_active(&mut conn, queue, &uuid, &scheduled_key, true, now_ms())
            .await
    }

    /// Shared promotion sequence for both dequeue paths: `LREM` the UUID from its
    /// source list, `HGET` the hash fields the in-memory `Task` needs, `HSET` the new
    /// `dequeuedAtMs`/`state`, and `LPUSH` onto active — all inside one transaction.
    /// If the reply doesn't carry the expected sub-reply count, this is a ShapeError
    /// (spec §7): return `Ok(None)` rather than raising, since the original list entry
    /// survives an uncommitted transaction.
    async fn promote_to_active(
        &self,
        conn: &mut Connection,
        queue: &str,
        uuid: &str,
        source_list_key: &str,
        include_schedule: bool,
        now_ms: u64,
    ) -> TaskResult<Option<Task>> {
        let task_key = Self::task_key(queue, uuid);
        let active_key = Self::queue_key(queue, "active");

        let mut pipe = redis::pipe();
        pipe.atomic()
            .lrem(source_list_key, 1, uuid)
            .hget(&task_key, "type")
            .hget(&task_key, "payload")
            .hget(&task_key, "state")
            .hget(&task_key, "maxRetry")
            .hget(&task_key, "retried")
            .hget(&task_key, "dequeuedAtMs");
        if include_schedule {
            pipe.hget(&task_key, "schedule");
        }
        pipe.hset(&task_key, "dequeuedAtMs", now_ms)
            .hset(&task_key, "state", TaskState::Active.to_string())
            .lpush(&active_key, uuid);

        let reply: Vec<redis::Value> = pipe.query_async(conn).await?;

        let expected = if include_schedule { 11 } else { 10 };
        if reply.len() != expected {
            return Ok(None);
        }

        let task_type = match value_to_string(&reply[1]) {
            Some(v) => v,
            None => return Ok(None),
        };
        let payload = match value_to_string(&reply[2]) {
            Some(v) => v,
            None => return Ok(None),
        };
        let max_retry: u64 = value_to_string(&reply[4])
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let retried: u64 = value_to_string(&reply[5])
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let schedule = if include_schedule {
            value_to_string(&reply[7]).and_then(|s| s.parse().ok())
        } else {
            None
        };
        let uuid_parsed = match Uuid::parse_str(uuid) {
            Ok(u) => u,
            Err(_) => return Ok(None),
        };

        Ok(Some(Task {
            uuid: uuid_parsed,
            task_type,
            payload,
            state: TaskState::Active,
            max_retry,
            retried,
            dequeued_at_ms: now_ms,
            schedule,
            cron: None,
            result: None,
        }))
    }

    /// §4.5 step 3: commit a successful handler run.
    pub async fn complete(&self, queue: &str, task: &Task) -> TaskResult<()> {
        let task_key = Self::task_key(queue, &task.uuid.to_string());
        let active_key = Self::queue_key(queue, "active");
        let completed_key = Self::queue_key(queue, "completed");
        let uuid = task.uuid.to_string();

        let mut conn = self.connection().await?;
        redis::pipe()
            .atomic()
            .lrem(&active_key, 1, &uuid)
            .ignore()
            .hset(&task_key, "state", TaskState::Completed.to_string())
            .ignore()
            .hset(&task_key, "result", task.result.clone().unwrap_or_default())
            .ignore()
            .lpush(&completed_key, &uuid)
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!(uuid = %uuid, queue, "task completed");
        Ok(())
    }

    /// §4.5 step 4: demote back to pending for another attempt.
    pub async fn retry(&self, queue: &str, task: &Task) -> TaskResult<()> {
        let task_key = Self::task_key(queue, &task.uuid.to_string());
        let active_key = Self::queue_key(queue, "active");
        let pending_key = Self::queue_key(queue, "pending");
        let uuid = task.uuid.to_string();

        let mut conn = self.connection().await?;
        redis::pipe()
            .atomic()
            .lrem(&active_key, 1, &uuid)
            .ignore()
            .hset(&task_key, "retried", task.retried)
            .ignore()
            .hset(&task_key, "state", TaskState::Pending.to_string())
            .ignore()
            .lpush(&pending_key, &uuid)
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!(uuid = %uuid, queue, retried = task.retried, "task requeued for retry");
        Ok(())
    }

    /// §4.5 step 4: terminal failure, either exhausted retries or no handler found.
    pub async fn fail(&self, queue: &str, task: &Task) -> TaskResult<()> {
        let task_key = Self::task_key(queue, &task.uuid.to_string());
        let active_key = Self::queue_key(queue, "active");
        let failed_key = Self::queue_key(queue, "failed");
        let uuid = task.uuid.to_string();

        let mut conn = self.connection().await?;
        redis::pipe()
            .atomic()
            .lrem(&active_key, 1, &uuid)
            .ignore()
            .hset(&task_key, "retried", task.retried)
            .ignore()
            .hset(&task_key, "state", TaskState::Failed.to_string())
            .ignore()
            .lpush(&failed_key, &uuid)
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!(uuid = %uuid, queue, retried = task.retried, "task failed terminally");
        Ok(())
    }

    /// §4.7: demote a stalled active task back to pending or scheduled.
    pub async fn recover(
        &self,
        queue: &str,
        uuid: &str,
        had_schedule: bool,
    ) -> TaskResult<()> {
        let task_key = Self::task_key(queue, uuid);
        let active_key = Self::queue_key(queue, "active");
        let destination_key = if had_schedule {
            Self::queue_key(queue, "scheduled")
        } else {
            Self::queue_key(queue, "pending")
        };

        let mut conn = self.connection().await?;
        redis::pipe()
            .atomic()
            .lrem(&active_key, 1, uuid)
            .ignore()
            .hset(&task_key, "state", TaskState::Pending.to_string())
            .ignore()
            .lpush(&destination_key, uuid)
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!(uuid, queue, had_schedule, "recovered stalled active task");
        Ok(())
    }

    /// Variant of `recover` for the optional `increment_retry_on_recovery` config
    /// flag (spec §4.7: "Implementers MAY offer a config flag to increment on
    /// recovery"). If the increment reaches `maxRetry`, the task is routed to
    /// `failed` instead of being requeued, mirroring the runner's own retry-cap
    /// accounting in §4.5.
    pub async fn increment_retry_then_recover(
        &self,
        queue: &str,
        uuid: &str,
        had_schedule: bool,
    ) -> TaskResult<()> {
        let task_key = Self::task_key(queue, uuid);
        let active_key = Self::queue_key(queue, "active");

        let mut conn = self.connection().await?;
        let (retried, max_retry): (u64, u64) = {
            let retried: Option<String> = conn.hget(&task_key, "retried").await?;
            let max_retry: Option<String> = conn.hget(&task_key, "maxRetry").await?;
            (
                retried.and_then(|s| s.parse().ok()).unwrap_or(0),
                max_retry.and_then(|s| s.parse().ok()).unwrap_or(0),
            )
        };
        let retried = retried + 1;

        if retried >= max_retry {
            let failed_key = Self::queue_key(queue, "failed");
            redis::pipe()
                .atomic()
                .lrem(&active_key, 1, uuid)
                .ignore()
                .hset(&task_key, "retried", retried)
                .ignore()
                .hset(&task_key, "state", TaskState::Failed.to_string())
                .ignore()
                .lpush(&failed_key, uuid)
                .ignore()
                .query_async(&mut conn)
                .await?;
            debug!(uuid, queue, retried, "recovery exhausted retries, task failed");
            return Ok(());
        }

        let destination_key = if had_schedule {
            Self::queue_key(queue, "scheduled")
        } else {
            Self::queue_key(queue, "pending")
        };
        redis::pipe()
            .atomic()
            .lrem(&active_key, 1, uuid)
            .ignore()
            .hset(&task_key, "retried", retried)
            .ignore()
            .hset(&task_key, "state", TaskState::Pending.to_string())
            .ignore()
            .lpush(&destination_key, uuid)
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!(uuid, queue, retried, had_schedule, "recovered stalled active task with retry increment");
        Ok(())
    }

    /// Read every UUID currently assigned to a worker for `queue` (spec §4.7 step 1).
    pub async fn active_uuids(&self, queue: &str) -> TaskResult<Vec<String>> {
        let active_key = Self::queue_key(queue, "active");
        let mut conn = self.connection().await?;
        Ok(conn.lrange(&active_key, 0, -1).await?)
    }

    /// Read `dequeuedAtMs` and `schedule` for a given active task UUID, for the
    /// recovery sweep's liveness check.
    pub async fn active_task_liveness(&self, queue: &str, uuid: &str) -> TaskResult<(u64, bool)> {
        let task_key = Self::task_key(queue, uuid);
        let mut conn = self.connection().await?;

        let dequeued_at_ms: Option<String> = conn.hget(&task_key, "dequeuedAtMs").await?;
        let schedule: Option<String> = conn.hget(&task_key, "schedule").await?;

        let dequeued_at_ms = dequeued_at_ms.and_then(|s| s.parse().ok()).unwrap_or(0);
        Ok((dequeued_at_ms, schedule.is_some()))
    }

    /// Publish `<name>:<priority>` into the well-known registered-queues set
    /// (called once at server startup, spec §4.6).
    pub async fn register_queue(&self, queue: &str, priority: i64) -> TaskResult<()> {
        let mut conn = self.connection().await?;
        let member = format!("{queue}:{priority}");
        let _: () = conn.sadd(QUEUES_SET_KEY, member).await?;
        Ok(())
    }

    /// §4.8
    pub async fn pause(&self, queue: &str) -> TaskResult<()> {
        let mut conn = self.connection().await?;
        let _: () = conn.sadd(PAUSED_SET_KEY, queue).await?;
        Ok(())
    }

    /// §4.8
    pub async fn unpause(&self, queue: &str) -> TaskResult<()> {
        let mut conn = self.connection().await?;
        let _: () = conn.srem(PAUSED_SET_KEY, queue).await?;
        Ok(())
    }

    /// §4.8: direct `SISMEMBER`, which spec.md notes is "equivalent and preferable"
    /// to `SMEMBERS` plus a linear scan.
    pub async fn is_paused(&self, queue: &str) -> TaskResult<bool> {
        let mut conn = self.connection().await?;
        Ok(conn.sismember(PAUSED_SET_KEY, queue).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_key_uses_the_fixed_cppq_prefix() {
        assert_eq!(TaskQueue::queue_key("default", "pending"), "cppq:default:pending");
        assert_eq!(
            TaskQueue::task_key("default", "abc-123"),
            "cppq:default:task:abc-123"
        );
    }

    #[test]
    fn value_to_string_decodes_bulk_strings_only() {
        let bulk = redis::Value::Data(b"hello".to_vec());
        assert_eq!(value_to_string(&bulk).as_deref(), Some("hello"));
        assert_eq!(value_to_string(&redis::Value::Nil), None);
    }

    #[tokio::test]
    #[ignore = "requires a reachable redis://127.0.0.1:6379"]
    async fn enqueue_then_dequeue_promotes_to_active() {
        let queue = TaskQueue::new_default().await.unwrap();
        let task = Task::new("email:deliver", r#"{"UserID":666,"TemplateID":"AH"}"#, 10);
        let uuid = task.uuid;

        queue
            .enqueue(task, "default", Schedule::Immediate)
            .await
            .unwrap();

        let dequeued = queue.dequeue("default").await.unwrap().unwrap();
        assert_eq!(dequeued.uuid, uuid);
        assert_eq!(dequeued.state, TaskState::Active);
        assert!(dequeued.dequeued_at_ms > 0);
    }
}
