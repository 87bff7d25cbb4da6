//! Task record and state encoding

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

/// Unique identifier for tasks
pub type TaskId = Uuid;

/// Task lifecycle state (spec §3). Round-trips through its spelled English name when
/// stored in the per-task Redis hash; an unknown string decodes to `Unknown` rather
/// than erroring, matching `original_source/cppq.hpp`'s `stringToState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Unknown,
    Pending,
    Scheduled,
    Active,
    Failed,
    Completed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Unknown => "Unknown",
            TaskState::Pending => "Pending",
            TaskState::Scheduled => "Scheduled",
            TaskState::Active => "Active",
            TaskState::Failed => "Failed",
            TaskState::Completed => "Completed",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Pending" => TaskState::Pending,
            "Scheduled" => TaskState::Scheduled,
            "Active" => TaskState::Active,
            "Failed" => TaskState::Failed,
            "Completed" => TaskState::Completed,
            _ => TaskState::Unknown,
        })
    }
}

/// How a task should enter the queue (spec §4.2)
#[derive(Debug, Clone)]
pub enum Schedule {
    /// Dispatched as soon as a worker is free
    Immediate,
    /// Not eligible until `schedule` (ms since epoch) is in the past
    DelayedAt(u64),
    /// Recorded for a host program's cron evaluator; never evaluated by this core (spec §9)
    Cron(String),
}

/// A single unit of work. `payload` and `result` are opaque strings the core never
/// parses — their encoding is a convention between the producer and the handler.
#[derive(Debug, Clone)]
pub struct Task {
    pub uuid: TaskId,
    pub task_type: String,
    pub payload: String,
    pub state: TaskState,
    pub max_retry: u64,
    pub retried: u64,
    pub dequeued_at_ms: u64,
    pub schedule: Option<u64>,
    pub cron: Option<String>,
    pub result: Option<String>,
}

impl Task {
    /// Create a fresh task. `state` starts `Unknown`; `enqueue` is what assigns
    /// `Pending`/`Scheduled` (spec §3: "mutated by ... creation only" for every other field).
    pub fn new(task_type: impl Into<String>, payload: impl Into<String>, max_retry: u64) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            task_type: task_type.into(),
            payload: payload.into(),
            state: TaskState::Unknown,
            max_retry,
            retried: 0,
            dequeued_at_ms: 0,
            schedule: None,
            cron: None,
            result: None,
        }
    }

    /// Whether a further retry is permitted (I2: `retried <= max_retry`)
    pub fn can_retry(&self) -> bool {
        self.retried < self.max_retry
    }

    /// Serialize the complete hash field set for this task, honoring I4 (schedule is
    /// present iff the task was created with delayed or cron scheduling).
    pub fn to_hash_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("type".to_string(), self.task_type.clone()),
            ("payload".to_string(), self.payload.clone()),
            ("state".to_string(), self.state.to_string()),
            ("maxRetry".to_string(), self.max_retry.to_string()),
            ("retried".to_string(), self.retried.to_string()),
            ("dequeuedAtMs".to_string(), self.dequeued_at_ms.to_string()),
        ];
        if let Some(schedule) = self.schedule {
            fields.push(("schedule".to_string(), schedule.to_string()));
        }
        if let Some(cron) = &self.cron {
            fields.push(("cron".to_string(), cron.clone()));
        }
        fields
    }

    /// Reconstruct a task from its UUID plus a field map read back from the hash
    /// (the inverse of `to_hash_fields`, per spec §4.1).
    pub fn from_hash(uuid: TaskId, fields: &HashMap<String, String>) -> Option<Self> {
        Some(Self {
            uuid,
            task_type: fields.get("type")?.clone(),
            payload: fields.get("payload")?.clone(),
            state: fields
                .get("state")
                .map(|s| s.parse().unwrap_or(TaskState::Unknown))
                .unwrap_or(TaskState::Unknown),
            max_retry: fields.get("maxRetry")?.parse().ok()?,
            retried: fields.get("retried")?.parse().ok()?,
            dequeued_at_ms: fields.get("dequeuedAtMs")?.parse().unwrap_or(0),
            schedule: fields.get("schedule").and_then(|s| s.parse().ok()),
            cron: fields.get("cron").cloned(),
            result: fields.get("result").cloned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_its_name() {
        for state in [
            TaskState::Unknown,
            TaskState::Pending,
            TaskState::Scheduled,
            TaskState::Active,
            TaskState::Failed,
            TaskState::Completed,
        ] {
            let rendered = state.to_string();
            let parsed: TaskState = rendered.parse().unwrap();
            assert_eq!(parsed, state);
        }
    }

    #[test]
    fn unknown_state_string_maps_to_unknown() {
        let parsed: TaskState = "garbage".parse().unwrap();
        assert_eq!(parsed, TaskState::Unknown);
    }

    #[test]
    fn state_strings_are_case_sensitive() {
        let parsed: TaskState = "pending".parse().unwrap();
        assert_eq!(parsed, TaskState::Unknown);
    }

    #[test]
    fn new_task_has_unknown_state_and_zeroed_counters() {
        let task = Task::new("email:deliver", "{}", 10);
        assert_eq!(task.state, TaskState::Unknown);
        assert_eq!(task.retried, 0);
        assert_eq!(task.dequeued_at_ms, 0);
        assert!(task.schedule.is_none());
        assert!(task.cron.is_none());
    }

    #[test]
    fn can_retry_respects_max_retry_bound() {
        let mut task = Task::new("t", "p", 2);
        assert!(task.can_retry());
        task.retried = 2;
        assert!(!task.can_retry());
    }

    #[test]
    fn immediate_enqueue_shape_has_no_schedule_or_cron_fields() {
        let mut task = Task::new("t", "p", 1);
        task.state = TaskState::Pending;
        let fields: HashMap<_, _> = task.to_hash_fields().into_iter().collect();
        assert!(!fields.contains_key("schedule"));
        assert!(!fields.contains_key("cron"));
    }

    #[test]
    fn delayed_enqueue_shape_carries_schedule_field() {
        let mut task = Task::new("t", "p", 1);
        task.state = TaskState::Scheduled;
        task.schedule = Some(1_700_000_000_000);
        let fields: HashMap<_, _> = task.to_hash_fields().into_iter().collect();
        assert_eq!(fields.get("schedule").unwrap(), "1700000000000");
        assert!(!fields.contains_key("cron"));
    }

    #[test]
    fn hash_round_trip_reconstructs_the_task() {
        let mut task = Task::new("email:deliver", "payload-body", 5);
        task.state = TaskState::Pending;
        let fields: HashMap<_, _> = task.to_hash_fields().into_iter().collect();

        let restored = Task::from_hash(task.uuid, &fields).unwrap();
        assert_eq!(restored.task_type, task.task_type);
        assert_eq!(restored.payload, task.payload);
        assert_eq!(restored.state, TaskState::Pending);
        assert_eq!(restored.max_retry, task.max_retry);
    }
}
