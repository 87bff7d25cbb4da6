//! Shared wall-clock helper, used anywhere the lifecycle engine needs epoch-ms
//! (dequeue's `dequeuedAtMs`, recovery's liveness check).

/// Current wall-clock time as milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}
