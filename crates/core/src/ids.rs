//! Process-local identifiers for requests, tasks, and batches. Millisecond
//! timestamp plus a monotonic counter keeps them sortable and collision-free
//! within one process, which is all the runtime needs.

use std::sync::atomic::{AtomicU64, Ordering};

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn next(prefix: &str) -> String {
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let millis = chrono::Utc::now().timestamp_millis();
    format!("{prefix}-{millis:x}-{seq:04x}")
}

pub fn request_id() -> String {
    next("req")
}

pub fn task_id() -> String {
    next("task")
}

pub fn batch_id() -> String {
    next("batch")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_prefixed() {
        let a = task_id();
        let b = task_id();
        assert_ne!(a, b);
        assert!(a.starts_with("task-"));
        assert!(batch_id().starts_with("batch-"));
        assert!(request_id().starts_with("req-"));
    }
}
