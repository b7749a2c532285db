//! Concurrent extraction runtime: a priority task queue drained by a fixed
//! worker pool, with task state tracked for async callers.

pub mod queue;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use firmscout_core::{
    ids, ErrorEntry, ErrorKind, ExtractError, ExtractRequest, ExtractResponse, Extractor,
    ResourceGauges,
};
use firmscout_resilience::TokenBucket;

pub use queue::{QueuedTask, TaskQueue};

/// How long a worker waits for an extraction token before failing the task.
const EXTRACTION_TOKEN_WAIT: Duration = Duration::from_secs(10);
/// Poll cadence of `wait_for`.
const STATUS_POLL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub company_name: String,
    pub state: TaskState,
    pub priority: f64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEntry>,
}

struct TaskRecord {
    snapshot: TaskSnapshot,
    response: Option<ExtractResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub workers: usize,
}

/// Worker pool over the task queue. One instance per process; batch
/// orchestration submits through it like any other caller.
pub struct ExtractionRuntime {
    queue: Arc<TaskQueue>,
    tasks: Arc<DashMap<String, TaskRecord>>,
    shutdown_tx: broadcast::Sender<()>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

impl ExtractionRuntime {
    pub fn start(
        extractor: Arc<dyn Extractor>,
        extraction_limiter: Arc<TokenBucket>,
        worker_count: usize,
        gauges: Option<Arc<ResourceGauges>>,
    ) -> Arc<Self> {
        let worker_count = worker_count.max(1);
        let queue = Arc::new(TaskQueue::new());
        let tasks: Arc<DashMap<String, TaskRecord>> = Arc::new(DashMap::new());
        let (shutdown_tx, _) = broadcast::channel(1);

        let mut handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let queue = Arc::clone(&queue);
            let tasks = Arc::clone(&tasks);
            let extractor = Arc::clone(&extractor);
            let limiter = Arc::clone(&extraction_limiter);
            let gauges = gauges.clone();
            let mut shutdown = shutdown_tx.subscribe();
            handles.push(tokio::spawn(async move {
                info!(worker_id, "extraction worker started");
                loop {
                    tokio::select! {
                        _ = shutdown.recv() => {
                            info!(worker_id, "extraction worker shutting down");
                            break;
                        }
                        task = queue.pop_wait() => {
                            Self::process(
                                worker_id,
                                task,
                                &tasks,
                                extractor.as_ref(),
                                &limiter,
                                gauges.as_ref(),
                            )
                            .await;
                        }
                    }
                }
            }));
        }

        info!(workers = worker_count, "extraction runtime started");
        Arc::new(Self {
            queue,
            tasks,
            shutdown_tx,
            workers: Mutex::new(handles),
            worker_count,
        })
    }

    async fn process(
        worker_id: usize,
        task: QueuedTask,
        tasks: &DashMap<String, TaskRecord>,
        extractor: &dyn Extractor,
        limiter: &TokenBucket,
        gauges: Option<&Arc<ResourceGauges>>,
    ) {
        let task_id = task.task_id.clone();
        if let Some(mut record) = tasks.get_mut(&task_id) {
            record.snapshot.state = TaskState::Processing;
            record.snapshot.started_at = Some(Utc::now());
        }

        if !limiter.wait_for(1, EXTRACTION_TOKEN_WAIT).await {
            warn!(worker_id, task_id = %task_id, "no extraction token, failing task");
            if let Some(mut record) = tasks.get_mut(&task_id) {
                record.snapshot.state = TaskState::Failed;
                record.snapshot.finished_at = Some(Utc::now());
                record.snapshot.error = Some(ErrorEntry::new(
                    ErrorKind::RateLimited,
                    "extraction token wait timed out",
                ));
            }
            return;
        }

        let _request_guard = gauges.map(|g| g.track_request());
        let response = extractor.extract(task.request).await;

        if let Some(mut record) = tasks.get_mut(&task_id) {
            record.snapshot.state = TaskState::Completed;
            record.snapshot.finished_at = Some(Utc::now());
            if !response.success {
                record.snapshot.error = response.errors.last().cloned();
            }
            record.response = Some(response);
        }
    }

    /// Queues a request and returns its task id. The request is validated
    /// here so a malformed submission fails fast instead of inside a worker.
    pub fn submit(&self, request: ExtractRequest, priority: f64) -> Result<String, ExtractError> {
        request.validate()?;
        let task_id = ids::task_id();
        self.tasks.insert(
            task_id.clone(),
            TaskRecord {
                snapshot: TaskSnapshot {
                    task_id: task_id.clone(),
                    company_name: request.company_name.clone(),
                    state: TaskState::Queued,
                    priority,
                    created_at: Utc::now(),
                    started_at: None,
                    finished_at: None,
                    error: None,
                },
                response: None,
            },
        );
        self.queue.push(task_id.clone(), request, priority);
        Ok(task_id)
    }

    pub fn status(&self, task_id: &str) -> Option<TaskSnapshot> {
        self.tasks.get(task_id).map(|r| r.snapshot.clone())
    }

    pub fn result(&self, task_id: &str) -> Option<ExtractResponse> {
        self.tasks.get(task_id).and_then(|r| r.response.clone())
    }

    /// Polls every 500 ms until all listed tasks reach a terminal state or
    /// the timeout passes; returns whatever snapshots exist either way.
    pub async fn wait_for(
        &self,
        task_ids: &[String],
        timeout: Duration,
    ) -> HashMap<String, TaskSnapshot> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let snapshots: HashMap<String, TaskSnapshot> = task_ids
                .iter()
                .filter_map(|id| self.status(id).map(|s| (id.clone(), s)))
                .collect();
            let all_settled = task_ids
                .iter()
                .all(|id| snapshots.get(id).is_some_and(|s| s.state.is_terminal()));
            if all_settled || tokio::time::Instant::now() >= deadline {
                return snapshots;
            }
            tokio::time::sleep(STATUS_POLL.min(
                deadline.saturating_duration_since(tokio::time::Instant::now()),
            ))
            .await;
        }
    }

    pub fn stats(&self) -> QueueStats {
        let mut processing = 0;
        let mut completed = 0;
        let mut failed = 0;
        for entry in self.tasks.iter() {
            match entry.snapshot.state {
                TaskState::Processing => processing += 1,
                TaskState::Completed => completed += 1,
                TaskState::Failed => failed += 1,
                TaskState::Queued => {}
            }
        }
        QueueStats {
            queued: self.queue.len(),
            processing,
            completed,
            failed,
            workers: self.worker_count,
        }
    }

    /// Cooperative shutdown: workers finish their current task and exit.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            let _ = handle.await;
        }
        info!("extraction runtime stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use firmscout_core::ExtractionMetadata;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Extractor double: sleeps briefly, then succeeds unless the company
    /// name contains "fail".
    struct StubExtractor {
        calls: AtomicUsize,
        delay: Duration,
    }

    impl StubExtractor {
        fn new(delay: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay,
            }
        }
    }

    #[async_trait]
    impl Extractor for StubExtractor {
        async fn extract(&self, request: ExtractRequest) -> ExtractResponse {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let success = !request.company_name.contains("fail");
            ExtractResponse {
                request_id: "r".into(),
                company_name: request.company_name,
                success,
                record: None,
                metadata: ExtractionMetadata::empty(request.mode),
                errors: if success {
                    vec![]
                } else {
                    vec![ErrorEntry::new(ErrorKind::CompanyNotFound, "not found")]
                },
                warnings: vec![],
                processing_time: 0.01,
            }
        }
    }

    fn limiter(capacity: u64) -> Arc<TokenBucket> {
        Arc::new(TokenBucket::new(
            "extraction",
            capacity,
            capacity.max(1),
            Duration::from_millis(100),
        ))
    }

    fn request(name: &str) -> ExtractRequest {
        ExtractRequest::builder(name).build().unwrap()
    }

    #[tokio::test]
    async fn submit_and_wait_completes_tasks() {
        let runtime = ExtractionRuntime::start(
            Arc::new(StubExtractor::new(Duration::from_millis(5))),
            limiter(100),
            2,
            None,
        );
        let a = runtime.submit(request("Acme"), 1.0).unwrap();
        let b = runtime.submit(request("Globex"), 2.0).unwrap();

        let results = runtime
            .wait_for(&[a.clone(), b.clone()], Duration::from_secs(5))
            .await;
        assert_eq!(results[&a].state, TaskState::Completed);
        assert_eq!(results[&b].state, TaskState::Completed);
        assert!(runtime.result(&a).unwrap().success);
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn invalid_submission_is_rejected() {
        let runtime = ExtractionRuntime::start(
            Arc::new(StubExtractor::new(Duration::ZERO)),
            limiter(10),
            1,
            None,
        );
        let mut bad = request("Acme");
        bad.timeout_s = 1;
        assert!(runtime.submit(bad, 1.0).is_err());
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn failed_extraction_still_carries_its_response() {
        let runtime = ExtractionRuntime::start(
            Arc::new(StubExtractor::new(Duration::ZERO)),
            limiter(10),
            1,
            None,
        );
        let id = runtime.submit(request("will-fail-co"), 1.0).unwrap();
        let results = runtime.wait_for(&[id.clone()], Duration::from_secs(5)).await;
        assert_eq!(results[&id].state, TaskState::Completed);
        let response = runtime.result(&id).unwrap();
        assert!(!response.success);
        assert!(results[&id].error.is_some());
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn wait_for_times_out_on_slow_tasks() {
        let runtime = ExtractionRuntime::start(
            Arc::new(StubExtractor::new(Duration::from_secs(10))),
            limiter(10),
            1,
            None,
        );
        let id = runtime.submit(request("Slowpoke"), 1.0).unwrap();
        let results = runtime
            .wait_for(&[id.clone()], Duration::from_millis(100))
            .await;
        assert!(!results[&id].state.is_terminal());
    }

    #[tokio::test]
    async fn token_starvation_fails_the_task() {
        // Zero-refill bucket with nothing in it: the worker cannot get a
        // token and must fail the task with a rate-limit error.
        let bucket = Arc::new(TokenBucket::new(
            "extraction",
            1,
            0,
            Duration::from_secs(3600),
        ));
        assert!(bucket.acquire(1));
        let runtime = ExtractionRuntime::start(
            Arc::new(StubExtractor::new(Duration::ZERO)),
            bucket,
            1,
            None,
        );
        let id = runtime.submit(request("Starved"), 1.0).unwrap();
        let results = runtime
            .wait_for(&[id.clone()], Duration::from_secs(15))
            .await;
        assert_eq!(results[&id].state, TaskState::Failed);
        assert_eq!(
            results[&id].error.as_ref().unwrap().kind,
            ErrorKind::RateLimited
        );
        runtime.shutdown().await;
    }
}
