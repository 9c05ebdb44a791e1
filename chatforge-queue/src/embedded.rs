//! Embedded in-process job backend
//!
//! Reference implementation of the `JobBackend` boundary: priority-ordered
//! FIFO queues with per-queue consumers honoring concurrency and rate
//! limits, hard job timeouts, retry-with-backoff, and bounded retention of
//! terminal jobs. Durable for the process lifetime only; single-node
//! deployments and tests run against it.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use tokio::sync::Notify;
use tracing::{debug, trace};

use chatforge_resilience::TokenBucket;

use crate::backend::{ConsumerOptions, EnqueueOptions, HandlerError, JobBackend, JobHandler};
use crate::error::BackendError;
use crate::job::{Job, JobId, JobStatus, QueueCounts};

/// Fallback wakeup for consumer loops, in case a notify races a push
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Embedded in-process job backend
pub struct EmbeddedBackend {
    shared: Arc<Shared>,
}

struct Shared {
    queues: Mutex<HashMap<String, Arc<QueueState>>>,
    closed: AtomicBool,
}

impl Shared {
    fn queue(&self, name: &str) -> Arc<QueueState> {
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(QueueState::new(name)))
            .clone()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct QueueState {
    name: String,
    inner: Mutex<QueueInner>,
    notify: Notify,
}

#[derive(Default)]
struct QueueInner {
    next_id: JobId,
    next_seq: u64,
    ready: BinaryHeap<ReadyEntry>,
    jobs: HashMap<JobId, StoredJob>,
    completed_order: VecDeque<JobId>,
    failed_order: VecDeque<JobId>,
}

struct StoredJob {
    job: Job,
    opts: EnqueueOptions,
}

/// Heap entry; `Ord` is inverted so the max-heap yields the lowest
/// priority value first, FIFO within a priority class
struct ReadyEntry {
    priority: u8,
    seq: u64,
    id: JobId,
}

impl PartialEq for ReadyEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for ReadyEntry {}

impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReadyEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl QueueState {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            inner: Mutex::new(QueueInner::default()),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enqueue(&self, payload: JsonValue, opts: EnqueueOptions) -> JobId {
        let mut inner = self.lock();
        inner.next_id += 1;
        inner.next_seq += 1;
        let id = inner.next_id;
        let seq = inner.next_seq;

        let job = Job {
            id,
            queue_name: self.name.clone(),
            payload,
            priority: opts.priority,
            attempt: 1,
            status: JobStatus::Queued,
            created_at: Utc::now(),
            result: None,
            error: None,
        };

        inner.ready.push(ReadyEntry {
            priority: opts.priority,
            seq,
            id,
        });
        inner.jobs.insert(id, StoredJob { job, opts });
        drop(inner);

        self.notify.notify_one();
        id
    }

    fn has_ready(&self) -> bool {
        !self.lock().ready.is_empty()
    }

    /// Pop the most urgent queued job and mark it active
    fn take_next(&self) -> Option<(Job, EnqueueOptions)> {
        let mut inner = self.lock();
        while let Some(entry) = inner.ready.pop() {
            if let Some(stored) = inner.jobs.get_mut(&entry.id) {
                if stored.job.status == JobStatus::Queued {
                    stored.job.status = JobStatus::Active;
                    return Some((stored.job.clone(), stored.opts.clone()));
                }
            }
        }
        None
    }

    fn complete(&self, id: JobId, result: JsonValue) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let keep = match inner.jobs.get_mut(&id) {
            Some(stored) => {
                stored.job.status = JobStatus::Completed;
                stored.job.result = Some(result);
                stored.opts.keep_completed
            }
            None => return,
        };
        inner.completed_order.push_back(id);
        Self::trim(&mut inner.completed_order, &mut inner.jobs, keep);
        trace!(queue = %self.name, job = id, "job completed");
    }

    /// Apply the retry decision for a failed attempt. Returns the backoff
    /// delay when a retry was scheduled; None means the job went terminal.
    fn fail(&self, id: JobId, error: String) -> Option<Duration> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let (delay, keep) = match inner.jobs.get_mut(&id) {
            Some(stored) => {
                let attempt = stored.job.attempt;
                match stored.opts.retry.delay_for_attempt(attempt) {
                    Some(delay) => {
                        stored.job.status = JobStatus::FailedRetryable;
                        stored.job.attempt = attempt + 1;
                        (Some(delay), None)
                    }
                    None => {
                        stored.job.status = JobStatus::FailedTerminal;
                        stored.job.error = Some(error);
                        (None, Some(stored.opts.keep_failed))
                    }
                }
            }
            None => return None,
        };

        if let Some(keep) = keep {
            inner.failed_order.push_back(id);
            Self::trim(&mut inner.failed_order, &mut inner.jobs, keep);
            debug!(queue = %self.name, job = id, "job failed terminally");
        }
        delay
    }

    /// Move a retryable job back into the ready set after its backoff
    fn requeue(&self, id: JobId) {
        let mut inner = self.lock();
        let priority = match inner.jobs.get_mut(&id) {
            Some(stored) if stored.job.status == JobStatus::FailedRetryable => {
                stored.job.status = JobStatus::Queued;
                stored.job.priority
            }
            _ => return,
        };
        inner.next_seq += 1;
        let seq = inner.next_seq;
        inner.ready.push(ReadyEntry { priority, seq, id });
        drop(inner);
        self.notify.notify_one();
    }

    /// Evict the oldest terminal jobs beyond the retention limit
    fn trim(order: &mut VecDeque<JobId>, jobs: &mut HashMap<JobId, StoredJob>, keep: usize) {
        while order.len() > keep {
            if let Some(evicted) = order.pop_front() {
                jobs.remove(&evicted);
            }
        }
    }

    fn counts(&self) -> QueueCounts {
        let inner = self.lock();
        let mut counts = QueueCounts::default();
        for stored in inner.jobs.values() {
            match stored.job.status {
                JobStatus::Queued | JobStatus::FailedRetryable => counts.waiting += 1,
                JobStatus::Active => counts.active += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::FailedTerminal => counts.failed += 1,
            }
        }
        counts
    }

    fn job(&self, id: JobId) -> Option<Job> {
        self.lock().jobs.get(&id).map(|stored| stored.job.clone())
    }
}

impl EmbeddedBackend {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                queues: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Snapshot a job by id, while it remains within the retention window
    pub fn job(&self, queue: &str, id: JobId) -> Option<Job> {
        self.shared.queue(queue).job(id)
    }
}

impl Default for EmbeddedBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobBackend for EmbeddedBackend {
    async fn enqueue(
        &self,
        queue: &str,
        payload: JsonValue,
        opts: EnqueueOptions,
    ) -> Result<JobId, BackendError> {
        if self.shared.is_closed() {
            return Err(BackendError::Closed);
        }
        let state = self.shared.queue(queue);
        Ok(state.enqueue(payload, opts))
    }

    async fn consume(
        &self,
        queue: &str,
        opts: ConsumerOptions,
        handler: Arc<dyn JobHandler>,
    ) -> Result<(), BackendError> {
        if self.shared.is_closed() {
            return Err(BackendError::Closed);
        }

        let state = self.shared.queue(queue);
        let bucket = Arc::new(TokenBucket::new(
            opts.rate_limit.max,
            opts.rate_limit.window,
        ));

        for _ in 0..opts.concurrency.max(1) {
            tokio::spawn(consumer_loop(
                Arc::clone(&self.shared),
                Arc::clone(&state),
                Arc::clone(&bucket),
                Arc::clone(&handler),
            ));
        }

        debug!(
            queue,
            concurrency = opts.concurrency,
            "installed embedded queue consumers"
        );
        Ok(())
    }

    async fn counts(&self, queue: &str) -> Result<QueueCounts, BackendError> {
        if self.shared.is_closed() {
            return Err(BackendError::Closed);
        }
        Ok(self.shared.queue(queue).counts())
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.shared.closed.store(true, Ordering::SeqCst);
        let queues = self.shared.queues.lock().unwrap_or_else(|e| e.into_inner());
        for state in queues.values() {
            state.notify.notify_waiters();
        }
        Ok(())
    }
}

async fn consumer_loop(
    shared: Arc<Shared>,
    state: Arc<QueueState>,
    bucket: Arc<TokenBucket>,
    handler: Arc<dyn JobHandler>,
) {
    loop {
        // Wait for a runnable job or backend close
        loop {
            if shared.is_closed() {
                return;
            }
            if state.has_ready() {
                break;
            }
            tokio::select! {
                _ = state.notify.notified() => {}
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }
        }

        bucket.acquire().await;
        if shared.is_closed() {
            return;
        }

        // Another consumer may have taken the job while we waited for a token
        let Some((job, opts)) = state.take_next() else {
            continue;
        };

        match run_job(handler.as_ref(), &job, opts.timeout).await {
            Ok(result) => state.complete(job.id, result),
            Err(err) => {
                if let Some(delay) = state.fail(job.id, err.to_string()) {
                    let shared = Arc::clone(&shared);
                    let state = Arc::clone(&state);
                    let id = job.id;
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        if !shared.is_closed() {
                            state.requeue(id);
                        }
                    });
                }
            }
        }
    }
}

/// Execute the handler, enforcing the hard per-job timeout.
///
/// A timeout drops the handler future; the job is treated exactly like a
/// throwing handler and goes through the normal retry decision.
async fn run_job(
    handler: &dyn JobHandler,
    job: &Job,
    timeout: Option<Duration>,
) -> Result<JsonValue, HandlerError> {
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, handler.handle(job)).await {
            Ok(result) => result,
            Err(_) => Err(format!("job timed out after {}ms", limit.as_millis()).into()),
        },
        None => handler.handle(job).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatforge_config::RateLimitConfig;
    use chatforge_resilience::{BackoffKind, RetryPolicy};
    use serde_json::json;
    use tokio::time::Instant;

    fn opts(retry: RetryPolicy, timeout: Option<Duration>) -> EnqueueOptions {
        EnqueueOptions {
            priority: 50,
            retry,
            timeout,
            keep_completed: 100,
            keep_failed: 100,
        }
    }

    fn consumer(concurrency: usize) -> ConsumerOptions {
        ConsumerOptions {
            concurrency,
            rate_limit: RateLimitConfig {
                max: 1000,
                window: Duration::from_secs(1),
            },
        }
    }

    struct RecordingHandler {
        seen: Mutex<Vec<JsonValue>>,
    }

    #[async_trait]
    impl JobHandler for RecordingHandler {
        async fn handle(&self, job: &Job) -> Result<JsonValue, HandlerError> {
            self.seen
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(job.payload.clone());
            Ok(json!({"ok": true}))
        }
    }

    struct FailingHandler {
        attempts: Mutex<Vec<Instant>>,
    }

    #[async_trait]
    impl JobHandler for FailingHandler {
        async fn handle(&self, _job: &Job) -> Result<JsonValue, HandlerError> {
            self.attempts
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(Instant::now());
            Err("boom".into())
        }
    }

    async fn wait_for_status(
        backend: &EmbeddedBackend,
        queue: &str,
        id: JobId,
        status: JobStatus,
    ) -> Job {
        let deadline = Instant::now() + Duration::from_secs(300);
        loop {
            if let Some(job) = backend.job(queue, id) {
                if job.status == status {
                    return job;
                }
            }
            assert!(Instant::now() < deadline, "job {} never reached {:?}", id, status);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_completes_and_records_result() {
        let backend = EmbeddedBackend::new();
        let handler = Arc::new(RecordingHandler {
            seen: Mutex::new(Vec::new()),
        });

        backend.consume("chat", consumer(2), handler).await.unwrap();
        let id = backend
            .enqueue("chat", json!({"msg": "hi"}), opts(RetryPolicy::default(), None))
            .await
            .unwrap();

        let job = wait_for_status(&backend, "chat", id, JobStatus::Completed).await;
        assert_eq!(job.result, Some(json!({"ok": true})));
        assert!(job.error.is_none());
        assert_eq!(job.attempt, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_priority_then_fifo_ordering() {
        let backend = EmbeddedBackend::new();

        // Enqueue before any consumer exists so ordering is decided by
        // the heap, not by arrival timing
        let retry = RetryPolicy::none();
        for (payload, priority) in [
            (json!({"n": 1}), 50u8),
            (json!({"n": 2}), 50),
            (json!({"n": 3}), 10),
            (json!({"n": 4}), 90),
            (json!({"n": 5}), 10),
        ] {
            let mut o = opts(retry.clone(), None);
            o.priority = priority;
            backend.enqueue("chat", payload, o).await.unwrap();
        }

        let handler = Arc::new(RecordingHandler {
            seen: Mutex::new(Vec::new()),
        });
        backend
            .consume("chat", consumer(1), Arc::clone(&handler) as Arc<dyn JobHandler>)
            .await
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(60);
        while backend.counts("chat").await.unwrap().completed < 5 {
            assert!(Instant::now() < deadline);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let seen = handler.seen.lock().unwrap_or_else(|e| e.into_inner()).clone();
        // Priority 10 jobs first in submission order, then 50s, then 90
        assert_eq!(
            seen,
            vec![
                json!({"n": 3}),
                json!({"n": 5}),
                json!({"n": 1}),
                json!({"n": 2}),
                json!({"n": 4}),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_backoff_then_terminal() {
        let backend = EmbeddedBackend::new();
        let handler = Arc::new(FailingHandler {
            attempts: Mutex::new(Vec::new()),
        });

        backend
            .consume(
                "embedding",
                consumer(10),
                Arc::clone(&handler) as Arc<dyn JobHandler>,
            )
            .await
            .unwrap();

        let retry = RetryPolicy {
            max_attempts: 2,
            backoff: BackoffKind::Exponential,
            initial_delay: Duration::from_secs(5),
        };
        let id = backend
            .enqueue(
                "embedding",
                json!({"doc": 7}),
                opts(retry, Some(Duration::from_secs(120))),
            )
            .await
            .unwrap();

        let job = wait_for_status(&backend, "embedding", id, JobStatus::FailedTerminal).await;
        assert_eq!(job.attempt, 2);
        assert!(job.error.is_some());
        assert!(job.result.is_none());

        let attempts = handler.attempts.lock().unwrap_or_else(|e| e.into_inner()).clone();
        assert_eq!(attempts.len(), 2, "expected exactly two attempts");
        assert!(
            attempts[1] - attempts[0] >= Duration::from_secs(5),
            "second attempt started {:?} after the first",
            attempts[1] - attempts[0]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_queue_never_retries() {
        let backend = EmbeddedBackend::new();
        let handler = Arc::new(FailingHandler {
            attempts: Mutex::new(Vec::new()),
        });

        backend
            .consume(
                "analytics",
                consumer(5),
                Arc::clone(&handler) as Arc<dyn JobHandler>,
            )
            .await
            .unwrap();

        let id = backend
            .enqueue("analytics", json!({"tick": 1}), opts(RetryPolicy::none(), None))
            .await
            .unwrap();

        let job = wait_for_status(&backend, "analytics", id, JobStatus::FailedTerminal).await;
        assert_eq!(job.attempt, 1);
        assert_eq!(
            handler.attempts.lock().unwrap_or_else(|e| e.into_inner()).len(),
            1
        );
    }

    struct SlowHandler;

    #[async_trait]
    impl JobHandler for SlowHandler {
        async fn handle(&self, _job: &Job) -> Result<JsonValue, HandlerError> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(json!({"too": "late"}))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_treated_as_failure() {
        let backend = EmbeddedBackend::new();
        backend
            .consume("chat", consumer(1), Arc::new(SlowHandler))
            .await
            .unwrap();

        let id = backend
            .enqueue(
                "chat",
                json!({"msg": "slow"}),
                opts(RetryPolicy::none(), Some(Duration::from_secs(1))),
            )
            .await
            .unwrap();

        let job = wait_for_status(&backend, "chat", id, JobStatus::FailedTerminal).await;
        assert!(job.error.unwrap().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retention_evicts_oldest_completed() {
        let backend = EmbeddedBackend::new();
        let handler = Arc::new(RecordingHandler {
            seen: Mutex::new(Vec::new()),
        });
        backend.consume("analytics", consumer(1), handler).await.unwrap();

        let mut ids = Vec::new();
        for n in 0..5 {
            let mut o = opts(RetryPolicy::none(), None);
            o.keep_completed = 2;
            ids.push(
                backend
                    .enqueue("analytics", json!({"n": n}), o)
                    .await
                    .unwrap(),
            );
        }

        // The last submission finishes last under a single consumer
        wait_for_status(&backend, "analytics", ids[4], JobStatus::Completed).await;

        let counts = backend.counts("analytics").await.unwrap();
        assert_eq!(counts.completed, 2);
        // The oldest three fell out of the retention window
        assert!(backend.job("analytics", ids[0]).is_none());
        assert!(backend.job("analytics", ids[1]).is_none());
        assert!(backend.job("analytics", ids[2]).is_none());
        assert!(backend.job("analytics", ids[3]).is_some());
        assert!(backend.job("analytics", ids[4]).is_some());
    }

    #[tokio::test]
    async fn test_closed_backend_rejects_enqueue() {
        let backend = EmbeddedBackend::new();
        backend.close().await.unwrap();
        let err = backend
            .enqueue("chat", json!({}), opts(RetryPolicy::default(), None))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Closed));
    }
}
