//! Batch orchestration: bounded concurrent batches scheduled by priority
//! bucket, each fanning its companies out to the extraction runtime, with
//! progress observers, summary statistics, and file export.

pub mod export;
pub mod stats;
pub mod types;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use priority_queue::PriorityQueue;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use firmscout_cache::batch_key;
use firmscout_core::{
    Cache, ErrorEntry, ExtractError, ExtractRequest, ExtractResponse, ExtractionMetadata,
};
use firmscout_runtime::{ExtractionRuntime, TaskState};

pub use export::write_export;
pub use stats::summarize;
pub use types::{
    BatchPriority, BatchProgress, BatchRequest, BatchResult, BatchStatus, BatchSubmission,
    ExportFormat, ProgressObserver, SummaryStats,
};

/// Max-heap key for pending batches: lower bucket score first, FIFO ties.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingPriority {
    score: u8,
    seq: u64,
}

impl PartialOrd for PendingPriority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingPriority {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .cmp(&self.score)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct BatchEntry {
    status: BatchStatus,
    total: usize,
    created_at: DateTime<Utc>,
    progress: Option<BatchProgress>,
    result: Option<BatchResult>,
    cancelled: Arc<AtomicBool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchStatusView {
    pub batch_id: String,
    pub status: BatchStatus,
    pub total: usize,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<BatchProgress>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchStats {
    pub pending: usize,
    pub active: usize,
    pub finished: usize,
    pub max_concurrent_batches: usize,
}

struct PendingQueue {
    heap: PriorityQueue<String, PendingPriority>,
    requests: HashMap<String, BatchRequest>,
    seq: u64,
}

pub struct BatchOrchestrator {
    runtime: Arc<ExtractionRuntime>,
    pending: StdMutex<PendingQueue>,
    registry: DashMap<String, BatchEntry>,
    observers: DashMap<String, HashMap<String, Arc<dyn ProgressObserver>>>,
    cache: Option<Arc<dyn Cache>>,
    batch_ttl: Duration,
    notify: Notify,
    shutdown_tx: broadcast::Sender<()>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    max_active: usize,
    export_dir: PathBuf,
    poll_interval: Duration,
}

impl BatchOrchestrator {
    pub fn start(
        runtime: Arc<ExtractionRuntime>,
        max_concurrent_batches: usize,
        export_dir: PathBuf,
        cache: Option<Arc<dyn Cache>>,
        batch_ttl: Duration,
    ) -> Arc<Self> {
        Self::start_with_poll(
            runtime,
            max_concurrent_batches,
            export_dir,
            cache,
            batch_ttl,
            Duration::from_secs(2),
        )
    }

    /// Like [`start`] with a custom progress poll interval. The 2 s default
    /// is right for production; tests shorten it.
    pub fn start_with_poll(
        runtime: Arc<ExtractionRuntime>,
        max_concurrent_batches: usize,
        export_dir: PathBuf,
        cache: Option<Arc<dyn Cache>>,
        batch_ttl: Duration,
        poll_interval: Duration,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);
        let orchestrator = Arc::new(Self {
            runtime,
            pending: StdMutex::new(PendingQueue {
                heap: PriorityQueue::new(),
                requests: HashMap::new(),
                seq: 0,
            }),
            registry: DashMap::new(),
            observers: DashMap::new(),
            cache,
            batch_ttl,
            notify: Notify::new(),
            shutdown_tx,
            dispatcher: Mutex::new(None),
            max_active: max_concurrent_batches.max(1),
            export_dir,
            poll_interval,
        });

        let handle = {
            let this = Arc::clone(&orchestrator);
            // Subscribe before spawning so a shutdown sent before the task
            // first runs is still delivered.
            let shutdown = orchestrator.shutdown_tx.subscribe();
            tokio::spawn(async move { this.dispatch_loop(shutdown).await })
        };
        // The lock is uncontended here: nothing else has the Arc yet.
        if let Ok(mut slot) = orchestrator.dispatcher.try_lock() {
            *slot = Some(handle);
        }
        orchestrator
    }

    async fn dispatch_loop(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let active: DashMap<String, JoinHandle<()>> = DashMap::new();
        info!(max_active = self.max_active, "batch dispatcher started");
        loop {
            active.retain(|_, handle| !handle.is_finished());
            while active.len() < self.max_active {
                let Some(request) = self.pop_pending() else {
                    break;
                };
                let batch_id = request.batch_id.clone();
                info!(batch_id = %batch_id, companies = request.companies.len(), "batch started");
                let this = Arc::clone(&self);
                let handle = tokio::spawn(async move {
                    let batch_id = request.batch_id.clone();
                    this.run_batch(request).await;
                    this.observers.remove(&batch_id);
                    this.notify.notify_one();
                });
                active.insert(batch_id, handle);
            }

            tokio::select! {
                _ = shutdown.recv() => break,
                _ = self.notify.notified() => {}
            }
        }
        // Drain: let active batches finish before stopping.
        let keys: Vec<String> = active.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((batch_id, handle)) = active.remove(&key) {
                if let Err(e) = handle.await {
                    warn!(batch_id = %batch_id, error = %e, "batch worker failed to join");
                }
            }
        }
        info!("batch dispatcher stopped");
    }

    fn pop_pending(&self) -> Option<BatchRequest> {
        let mut pending = self.pending.lock().unwrap();
        let (batch_id, _) = pending.heap.pop()?;
        pending.requests.remove(&batch_id)
    }

    /// Validates and enqueues a batch; returns its id. The batch starts once
    /// an active slot frees up, in priority-bucket order.
    pub fn submit_batch(&self, submission: BatchSubmission) -> Result<String, ExtractError> {
        let request = BatchRequest::validated(submission)?;
        let batch_id = request.batch_id.clone();
        self.registry.insert(
            batch_id.clone(),
            BatchEntry {
                status: BatchStatus::Queued,
                total: request.companies.len(),
                created_at: request.created_at,
                progress: None,
                result: None,
                cancelled: Arc::new(AtomicBool::new(false)),
            },
        );
        {
            let mut pending = self.pending.lock().unwrap();
            let seq = pending.seq;
            pending.seq += 1;
            let priority = PendingPriority {
                score: request.submission.priority.score(),
                seq,
            };
            pending.requests.insert(batch_id.clone(), request);
            pending.heap.push(batch_id.clone(), priority);
        }
        self.notify.notify_one();
        info!(batch_id = %batch_id, "batch queued");
        Ok(batch_id)
    }

    fn failed_response(company: &str, entry: ErrorEntry) -> ExtractResponse {
        ExtractResponse {
            request_id: firmscout_core::ids::request_id(),
            company_name: company.to_string(),
            success: false,
            record: None,
            metadata: ExtractionMetadata::empty(firmscout_core::ExtractionMode::Basic),
            errors: vec![entry],
            warnings: Vec::new(),
            processing_time: 0.0,
        }
    }

    fn set_status(&self, batch_id: &str, status: BatchStatus) {
        if let Some(mut entry) = self.registry.get_mut(batch_id) {
            entry.status = status;
        }
    }

    fn publish_progress(&self, batch_id: &str, progress: BatchProgress) {
        if let Some(mut entry) = self.registry.get_mut(batch_id) {
            entry.progress = Some(progress.clone());
        }
        if let Some(observers) = self.observers.get(batch_id) {
            for observer in observers.values() {
                observer.on_progress(&progress);
            }
        }
    }

    async fn run_batch(&self, request: BatchRequest) {
        let batch_id = request.batch_id.clone();
        let started = Instant::now();
        self.set_status(&batch_id, BatchStatus::Processing);
        let cancelled = self
            .registry
            .get(&batch_id)
            .map(|e| Arc::clone(&e.cancelled))
            .unwrap_or_default();

        let submission = &request.submission;
        let mut tasks: Vec<(String, Result<String, ErrorEntry>)> = Vec::new();
        for company in &request.companies {
            let mut builder = ExtractRequest::builder(company)
                .mode(submission.mode)
                .country(&submission.country)
                .language(&submission.language)
                .timeout_s(submission.timeout_s)
                .max_pages(submission.max_pages);
            if let Some(domain) = submission.domain_hints.get(company) {
                builder = builder.domain(domain);
            }
            let submitted = builder.build().and_then(|req| {
                self.runtime
                    .submit(req, submission.priority.task_priority())
            });
            match submitted {
                Ok(task_id) => tasks.push((company.clone(), Ok(task_id))),
                Err(e) => {
                    warn!(batch_id = %batch_id, company = %company, error = %e, "task submission failed");
                    tasks.push((company.clone(), Err(e.entry())));
                }
            }
        }

        let total = tasks.len();
        loop {
            let mut completed = 0;
            let mut failed = 0;
            let mut processing = 0;
            let mut queued = 0;
            let mut settled_time = 0.0;
            for (_, task) in &tasks {
                match task {
                    Err(_) => failed += 1,
                    Ok(task_id) => match self.runtime.status(task_id) {
                        Some(snapshot) => match snapshot.state {
                            TaskState::Completed => {
                                match self.runtime.result(task_id) {
                                    Some(response) => {
                                        settled_time += response.processing_time;
                                        if response.success {
                                            completed += 1;
                                        } else {
                                            failed += 1;
                                        }
                                    }
                                    None => failed += 1,
                                }
                            }
                            TaskState::Failed => failed += 1,
                            TaskState::Processing => processing += 1,
                            TaskState::Queued => queued += 1,
                        },
                        None => failed += 1,
                    },
                }
            }

            let settled = completed + failed;
            let avg = if settled > 0 {
                settled_time / settled as f64
            } else {
                0.0
            };
            let remaining = total - settled;
            self.publish_progress(
                &batch_id,
                BatchProgress {
                    batch_id: batch_id.clone(),
                    total,
                    completed,
                    failed,
                    processing,
                    queued,
                    success_rate: if settled > 0 {
                        completed as f64 / settled as f64
                    } else {
                        0.0
                    },
                    avg_processing_time: avg,
                    eta_s: (remaining > 0 && settled > 0).then(|| avg * remaining as f64),
                },
            );

            if settled == total || cancelled.load(AtomicOrdering::SeqCst) {
                break;
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        if cancelled.load(AtomicOrdering::SeqCst) {
            info!(batch_id = %batch_id, "batch cancelled");
            self.set_status(&batch_id, BatchStatus::Cancelled);
            return;
        }

        // Results in submission order, independent of completion order.
        let mut results: Vec<(String, ExtractResponse)> = Vec::with_capacity(total);
        for (company, task) in tasks {
            let response = match task {
                Ok(task_id) => self.runtime.result(&task_id).unwrap_or_else(|| {
                    let entry = self
                        .runtime
                        .status(&task_id)
                        .and_then(|s| s.error)
                        .unwrap_or_else(|| {
                            ErrorEntry::new(
                                firmscout_core::ErrorKind::Unexpected,
                                "task finished without a result",
                            )
                        });
                    Self::failed_response(&company, entry)
                }),
                Err(entry) => Self::failed_response(&company, entry),
            };
            results.push((company, response));
        }

        let succeeded = results.iter().filter(|(_, r)| r.success).count();
        let failed = total - succeeded;
        let status = if succeeded == total {
            BatchStatus::Completed
        } else if succeeded > 0 {
            BatchStatus::PartiallyCompleted
        } else {
            BatchStatus::Failed
        };

        let mut result = BatchResult {
            batch_id: batch_id.clone(),
            status,
            total,
            succeeded,
            failed,
            summary: summarize(&results),
            results,
            processing_time: started.elapsed().as_secs_f64(),
            created_at: request.created_at,
            export_path: None,
        };

        match write_export(&result, submission.export_format, &self.export_dir) {
            Ok(path) => result.export_path = Some(path.display().to_string()),
            Err(e) => warn!(batch_id = %batch_id, error = %e, "export failed"),
        }

        if let Some(cache) = &self.cache {
            let key = batch_key(&request.companies, submission.mode);
            if let Ok(value) = serde_json::to_value(&result) {
                if let Err(e) = cache.set(&key, value, self.batch_ttl).await {
                    warn!(batch_id = %batch_id, error = %e, "batch cache write failed");
                }
            }
        }

        info!(
            batch_id = %batch_id,
            ?status,
            succeeded,
            failed,
            elapsed_s = result.processing_time,
            "batch finished"
        );
        if let Some(mut entry) = self.registry.get_mut(&batch_id) {
            entry.status = status;
            entry.result = Some(result);
        }
    }

    pub fn batch_status(&self, batch_id: &str) -> Option<BatchStatusView> {
        self.registry.get(batch_id).map(|entry| BatchStatusView {
            batch_id: batch_id.to_string(),
            status: entry.status,
            total: entry.total,
            created_at: entry.created_at,
            progress: entry.progress.clone(),
        })
    }

    /// Copy of the finished result; `None` while the batch is still running.
    pub fn batch_result(&self, batch_id: &str) -> Option<BatchResult> {
        self.registry
            .get(batch_id)
            .and_then(|entry| entry.result.clone())
    }

    /// Cancels a queued batch outright, or flags a running one to stop at
    /// its next progress poll. Returns false for unknown or finished ids.
    pub fn cancel_batch(&self, batch_id: &str) -> bool {
        let removed_from_pending = {
            let mut pending = self.pending.lock().unwrap();
            pending.requests.remove(batch_id).is_some() && pending.heap.remove(batch_id).is_some()
        };
        if removed_from_pending {
            self.set_status(batch_id, BatchStatus::Cancelled);
            return true;
        }
        match self.registry.get(batch_id) {
            Some(entry) if !entry.status.is_terminal() => {
                entry.cancelled.store(true, AtomicOrdering::SeqCst);
                true
            }
            _ => false,
        }
    }

    pub fn register_observer(
        &self,
        batch_id: &str,
        observer_id: &str,
        observer: Arc<dyn ProgressObserver>,
    ) {
        self.observers
            .entry(batch_id.to_string())
            .or_default()
            .insert(observer_id.to_string(), observer);
    }

    pub fn unregister_observer(&self, batch_id: &str, observer_id: &str) {
        if let Some(mut observers) = self.observers.get_mut(batch_id) {
            observers.remove(observer_id);
        }
    }

    pub fn stats(&self) -> BatchStats {
        let pending = self.pending.lock().unwrap().heap.len();
        let mut active = 0;
        let mut finished = 0;
        for entry in self.registry.iter() {
            if entry.status.is_terminal() {
                finished += 1;
            } else if entry.status == BatchStatus::Processing {
                active += 1;
            }
        }
        BatchStats {
            pending,
            active,
            finished,
            max_concurrent_batches: self.max_active,
        }
    }

    /// Cooperative shutdown: stops accepting dispatches and drains active
    /// batches before returning.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        let handle = self.dispatcher.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use firmscout_core::{CompanyRecord, Extractor, Scores};
    use firmscout_resilience::TokenBucket;
    use std::sync::atomic::AtomicUsize;

    /// Succeeds for every company except those containing "missing".
    struct StubExtractor {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Extractor for StubExtractor {
        async fn extract(&self, request: ExtractRequest) -> ExtractResponse {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            let success = !request.company_name.to_lowercase().contains("missing");
            let record = success.then(|| {
                let mut record = CompanyRecord::new(&request.company_name);
                record.basic.industry = Some("Software".into());
                record.scores = Scores {
                    confidence: 0.7,
                    data_quality: 0.5,
                    completeness: 0.5,
                };
                record
            });
            ExtractResponse {
                request_id: "r".into(),
                company_name: request.company_name,
                success,
                record,
                metadata: ExtractionMetadata::empty(request.mode),
                errors: Vec::new(),
                warnings: Vec::new(),
                processing_time: 0.005,
            }
        }
    }

    fn runtime() -> Arc<ExtractionRuntime> {
        ExtractionRuntime::start(
            Arc::new(StubExtractor {
                calls: AtomicUsize::new(0),
            }),
            Arc::new(TokenBucket::new(
                "extraction",
                1000,
                100,
                Duration::from_millis(50),
            )),
            4,
            None,
        )
    }

    fn orchestrator(dir: &std::path::Path) -> Arc<BatchOrchestrator> {
        BatchOrchestrator::start_with_poll(
            runtime(),
            3,
            dir.to_path_buf(),
            None,
            Duration::from_secs(3600),
            Duration::from_millis(20),
        )
    }

    async fn wait_terminal(orch: &BatchOrchestrator, batch_id: &str) -> BatchResult {
        for _ in 0..500 {
            if let Some(result) = orch.batch_result(batch_id) {
                return result;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("batch {batch_id} did not finish");
    }

    #[tokio::test]
    async fn batch_with_duplicate_runs_deduped_and_exports() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path());

        let batch_id = orch
            .submit_batch(BatchSubmission::new(vec![
                "OpenAI".into(),
                "openai".into(),
                "Anthropic".into(),
            ]))
            .unwrap();
        let result = wait_terminal(&orch, &batch_id).await;

        assert_eq!(result.total, 2);
        assert_eq!(result.succeeded, 2);
        assert_eq!(result.status, BatchStatus::Completed);
        assert_eq!(result.summary.industry_distribution["Software"], 2);
        let export = result.export_path.unwrap();
        assert!(std::path::Path::new(&export).exists());
        orch.shutdown().await;
    }

    #[tokio::test]
    async fn accounting_and_submission_order_hold() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path());

        let batch_id = orch
            .submit_batch(BatchSubmission::new(vec![
                "Zeta".into(),
                "missing-co".into(),
                "Alpha".into(),
            ]))
            .unwrap();
        let result = wait_terminal(&orch, &batch_id).await;

        assert_eq!(result.succeeded + result.failed, result.total);
        assert_eq!(result.status, BatchStatus::PartiallyCompleted);
        let order: Vec<&str> = result.results.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(order, vec!["Zeta", "missing-co", "Alpha"]);
        assert!(!result.results[1].1.success);
        orch.shutdown().await;
    }

    #[tokio::test]
    async fn progress_observers_receive_snapshots() {
        struct Recorder {
            seen: StdMutex<Vec<BatchProgress>>,
        }
        impl ProgressObserver for Recorder {
            fn on_progress(&self, progress: &BatchProgress) {
                self.seen.lock().unwrap().push(progress.clone());
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path());
        let recorder = Arc::new(Recorder {
            seen: StdMutex::new(Vec::new()),
        });

        let batch_id = orch
            .submit_batch(BatchSubmission::new(vec!["One".into(), "Two".into()]))
            .unwrap();
        orch.register_observer(&batch_id, "test", recorder.clone());

        let result = wait_terminal(&orch, &batch_id).await;
        assert_eq!(result.total, 2);
        let seen = recorder.seen.lock().unwrap();
        assert!(!seen.is_empty());
        let last = seen.last().unwrap();
        assert_eq!(last.completed + last.failed, last.total);
        orch.shutdown().await;
    }

    #[tokio::test]
    async fn cancel_pending_batch() {
        let dir = tempfile::tempdir().unwrap();
        // Zero active slots cannot be configured (min 1), so saturate the
        // single slot with a long batch and cancel the queued one.
        let orch = BatchOrchestrator::start_with_poll(
            runtime(),
            1,
            dir.path().to_path_buf(),
            None,
            Duration::from_secs(3600),
            Duration::from_millis(20),
        );
        let names: Vec<String> = (0..50).map(|i| format!("Busy {i}")).collect();
        let _busy = orch.submit_batch(BatchSubmission::new(names)).unwrap();
        let queued = orch
            .submit_batch(BatchSubmission::new(vec!["Later".into()]))
            .unwrap();

        assert!(orch.cancel_batch(&queued));
        let status = orch.batch_status(&queued).unwrap();
        assert_eq!(status.status, BatchStatus::Cancelled);
        assert!(!orch.cancel_batch(&queued));
        orch.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_batch_ids_return_none() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path());
        assert!(orch.batch_status("batch-nope").is_none());
        assert!(orch.batch_result("batch-nope").is_none());
        assert!(!orch.cancel_batch("batch-nope"));
        orch.shutdown().await;
    }
}
