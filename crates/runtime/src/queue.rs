use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;

use priority_queue::PriorityQueue;
use tokio::sync::Notify;

use firmscout_core::ExtractRequest;

/// Max-heap key: higher priority first, FIFO within equal priorities.
#[derive(Debug, Clone)]
struct QueuePriority {
    priority: f64,
    seq: u64,
}

impl PartialEq for QueuePriority {
    fn eq(&self, other: &Self) -> bool {
        self.priority.to_bits() == other.priority.to_bits() && self.seq == other.seq
    }
}

impl Eq for QueuePriority {}

impl PartialOrd for QueuePriority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuePriority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .partial_cmp(&other.priority)
            .unwrap_or(Ordering::Equal)
            // Earlier submissions win ties, so a smaller seq is "greater".
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct TaskKey(String);

#[derive(Debug)]
pub struct QueuedTask {
    pub task_id: String,
    pub request: ExtractRequest,
    pub priority: f64,
}

struct QueueInner {
    heap: PriorityQueue<TaskKey, QueuePriority>,
    requests: HashMap<String, ExtractRequest>,
}

/// Concurrent priority queue for extraction tasks. `pop_wait` suspends until
/// work arrives; shutdown is signalled by the worker loop's `select!`, not
/// the queue itself.
pub struct TaskQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
    seq: AtomicU64,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                heap: PriorityQueue::new(),
                requests: HashMap::new(),
            }),
            notify: Notify::new(),
            seq: AtomicU64::new(0),
        }
    }

    pub fn push(&self, task_id: String, request: ExtractRequest, priority: f64) {
        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        {
            let mut inner = self.inner.lock().unwrap();
            inner.requests.insert(task_id.clone(), request);
            inner.heap.push(TaskKey(task_id), QueuePriority { priority, seq });
        }
        self.notify.notify_one();
    }

    pub fn try_pop(&self) -> Option<QueuedTask> {
        let mut inner = self.inner.lock().unwrap();
        let (key, priority) = inner.heap.pop()?;
        let request = inner.requests.remove(&key.0)?;
        Some(QueuedTask {
            task_id: key.0,
            request,
            priority: priority.priority,
        })
    }

    /// Suspends until a task is available. Fair enough for a worker pool:
    /// every push stores a wakeup permit, so no pop is lost.
    pub async fn pop_wait(&self) -> QueuedTask {
        loop {
            if let Some(task) = self.try_pop() {
                return task;
            }
            self.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str) -> ExtractRequest {
        ExtractRequest::builder(name).build().unwrap()
    }

    #[test]
    fn pops_highest_priority_first() {
        let queue = TaskQueue::new();
        queue.push("low".into(), request("Low"), 1.0);
        queue.push("high".into(), request("High"), 3.0);
        queue.push("mid".into(), request("Mid"), 2.0);

        assert_eq!(queue.try_pop().unwrap().task_id, "high");
        assert_eq!(queue.try_pop().unwrap().task_id, "mid");
        assert_eq!(queue.try_pop().unwrap().task_id, "low");
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn equal_priority_is_fifo() {
        let queue = TaskQueue::new();
        for i in 0..5 {
            queue.push(format!("t{i}"), request("X"), 1.0);
        }
        for i in 0..5 {
            assert_eq!(queue.try_pop().unwrap().task_id, format!("t{i}"));
        }
    }

    #[tokio::test]
    async fn pop_wait_wakes_on_push() {
        let queue = std::sync::Arc::new(TaskQueue::new());
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop_wait().await.task_id })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        queue.push("t1".into(), request("X"), 1.0);
        assert_eq!(waiter.await.unwrap(), "t1");
    }
}
