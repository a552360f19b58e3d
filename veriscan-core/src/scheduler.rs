//! Bounded-pool probe scheduler
//!
//! Dispatches the registered probe tasks onto a semaphore-bounded worker pool,
//! enforces per-task and overall deadlines, and collects one entry per task
//! into the shared scan map. One probe's fault can never abort the scan: every
//! error, panic or timeout is converted to an [`ErrorRecord`] at the task
//! boundary.
//!
//! Timeouts are best-effort abandonment, not guaranteed termination: the
//! probed channel offers no native cancellation, so an expired task's future
//! is dropped and its pool slot reclaimed, but non-cooperative work on the
//! device may keep running.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::models::{ErrorRecord, ProbeOutcome, ProbeResult, ScanResults};

/// Shared scan state written by the workers. Each task name is written by
/// exactly one worker, so there is no key-level write race by construction.
type Shared<T> = Arc<Mutex<T>>;

/// A named, idempotent unit of heavyweight diagnostic work.
pub struct ProbeTask {
    pub name: String,
    pub description: String,
    pub timeout: Duration,
    run: Box<dyn Fn() -> BoxFuture<'static, anyhow::Result<ProbeResult>> + Send + Sync>,
}

impl ProbeTask {
    pub fn new<F, Fut>(name: &str, description: &str, timeout: Duration, run: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<ProbeResult>> + Send + 'static,
    {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            timeout,
            run: Box::new(move || run().boxed()),
        }
    }
}

impl std::fmt::Debug for ProbeTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeTask")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Advisory progress notifications for observability tooling. Not part of the
/// result contract; send failures are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    TaskStarted {
        task: String,
    },
    TaskCompleted {
        task: String,
        completed: usize,
        total: usize,
    },
}

/// Run every task on a pool of at most `max_workers` concurrent workers.
///
/// Tasks start in registration order as worker slots free up. Returns within
/// `overall_timeout` (plus scheduling jitter) with whatever has been
/// collected; tasks still pending at the deadline are recorded as partial
/// timeout errors.
pub async fn run_all(
    tasks: Vec<ProbeTask>,
    max_workers: usize,
    overall_timeout: Duration,
    progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
) -> Result<ScanResults, EngineError> {
    if max_workers == 0 {
        return Err(EngineError::EmptyWorkerPool);
    }
    let mut seen = HashSet::new();
    for task in &tasks {
        if task.name.is_empty() {
            return Err(EngineError::UnnamedTask);
        }
        if !seen.insert(task.name.clone()) {
            return Err(EngineError::DuplicateTask(task.name.clone()));
        }
    }

    let total = tasks.len();
    let names: Vec<String> = tasks.iter().map(|t| t.name.clone()).collect();
    let results: Shared<ScanResults> = Arc::new(Mutex::new(ScanResults::new()));
    let completed = Arc::new(AtomicUsize::new(0));
    let pool = Arc::new(Semaphore::new(max_workers));

    let mut workers = JoinSet::new();
    for task in tasks {
        let pool = pool.clone();
        let results = results.clone();
        let completed = completed.clone();
        let progress = progress.clone();

        workers.spawn(async move {
            // Permit acquisition is FIFO, which gives registration order as
            // the dispatch tiebreak. A closed semaphore only happens on
            // abort, where the fill-in pass below records the task anyway.
            let _permit = match pool.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };

            if let Some(tx) = &progress {
                let _ = tx.send(ProgressEvent::TaskStarted {
                    task: task.name.clone(),
                });
            }
            debug!(task = %task.name, "probe started: {}", task.description);

            let guarded = AssertUnwindSafe((task.run)()).catch_unwind();
            let outcome = match tokio::time::timeout(task.timeout, guarded).await {
                Ok(Ok(Ok(value))) => ProbeOutcome::Success(value),
                Ok(Ok(Err(e))) => {
                    warn!(task = %task.name, "probe failed: {e:#}");
                    ProbeOutcome::Failed(ErrorRecord {
                        message: format!("{e:#}"),
                        partial: false,
                    })
                }
                Ok(Err(_)) => {
                    warn!(task = %task.name, "probe panicked");
                    ProbeOutcome::Failed(ErrorRecord {
                        message: "probe panicked".to_string(),
                        partial: false,
                    })
                }
                Err(_) => {
                    warn!(task = %task.name, timeout = ?task.timeout, "probe abandoned on per-task deadline");
                    ProbeOutcome::Failed(ErrorRecord {
                        message: format!("probe timed out after {:?}", task.timeout),
                        partial: true,
                    })
                }
            };

            results.lock().insert(task.name.clone(), outcome);
            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(tx) = &progress {
                let _ = tx.send(ProgressEvent::TaskCompleted {
                    task: task.name,
                    completed: done,
                    total,
                });
            }
        });
    }

    // Drain workers up to the overall deadline; whatever is recorded by then
    // is used as-is.
    let deadline = Instant::now() + overall_timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, workers.join_next()).await {
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(_) => {
                warn!("overall scan deadline reached with probes still pending");
                workers.abort_all();
                break;
            }
        }
    }

    let mut map = std::mem::take(&mut *results.lock());
    for name in names {
        map.entry(name).or_insert_with(|| {
            ProbeOutcome::Failed(ErrorRecord {
                message: "scan deadline exceeded before probe completed".to_string(),
                partial: true,
            })
        });
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn quick_task(name: &str, value: i64) -> ProbeTask {
        ProbeTask::new(name, "test probe", Duration::from_secs(5), move || async move {
            Ok(json!({ "value": value }))
        })
    }

    #[tokio::test]
    async fn test_every_task_recorded_once() {
        let tasks = vec![quick_task("a", 1), quick_task("b", 2), quick_task("c", 3)];
        let results = run_all(tasks, 2, Duration::from_secs(5), None).await.unwrap();
        assert_eq!(results.len(), 3);
        for name in ["a", "b", "c"] {
            assert!(results[name].is_success());
        }
    }

    #[tokio::test]
    async fn test_probe_error_is_isolated() {
        let tasks = vec![
            quick_task("ok", 1),
            ProbeTask::new("boom", "failing probe", Duration::from_secs(5), || async {
                Err(anyhow::anyhow!("device unreachable"))
            }),
        ];
        let results = run_all(tasks, 2, Duration::from_secs(5), None).await.unwrap();
        assert!(results["ok"].is_success());
        let record = results["boom"].error().unwrap();
        assert!(record.message.contains("device unreachable"));
        assert!(!record.partial);
    }

    #[tokio::test]
    async fn test_probe_panic_is_isolated() {
        let tasks = vec![
            ProbeTask::new("panic", "panicking probe", Duration::from_secs(5), || async {
                panic!("boom");
            }),
            quick_task("ok", 1),
        ];
        let results = run_all(tasks, 2, Duration::from_secs(5), None).await.unwrap();
        assert!(results["ok"].is_success());
        assert_eq!(results["panic"].error().unwrap().message, "probe panicked");
    }

    #[tokio::test]
    async fn test_hung_probe_marked_partial_without_delaying_siblings() {
        let start = Instant::now();
        let tasks = vec![
            ProbeTask::new("hung", "never returns", Duration::from_millis(100), || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(json!({}))
            }),
            quick_task("fast", 1),
        ];
        let results = run_all(tasks, 2, Duration::from_secs(10), None).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(results["fast"].is_success());
        let record = results["hung"].error().unwrap();
        assert!(record.partial);
        assert!(record.message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_overall_deadline_returns_promptly_with_partial_results() {
        let start = Instant::now();
        let tasks = vec![
            quick_task("fast", 1),
            ProbeTask::new("slow-a", "slow probe", Duration::from_secs(60), || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(json!({}))
            }),
            ProbeTask::new("slow-b", "slow probe", Duration::from_secs(60), || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(json!({}))
            }),
        ];
        let results = run_all(tasks, 1, Duration::from_millis(300), None).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(results.len(), 3);
        assert!(results["fast"].is_success());
        for name in ["slow-a", "slow-b"] {
            assert!(results[name].error().unwrap().partial);
        }
    }

    #[tokio::test]
    async fn test_worker_pool_is_bounded() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let tasks: Vec<ProbeTask> = (0..6)
            .map(|i| {
                let running = running.clone();
                let peak = peak.clone();
                ProbeTask::new(
                    &format!("task-{i}"),
                    "concurrency gauge",
                    Duration::from_secs(5),
                    move || {
                        let running = running.clone();
                        let peak = peak.clone();
                        async move {
                            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(30)).await;
                            running.fetch_sub(1, Ordering::SeqCst);
                            Ok(json!({}))
                        }
                    },
                )
            })
            .collect();

        let results = run_all(tasks, 2, Duration::from_secs(10), None).await.unwrap();
        assert_eq!(results.len(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_progress_events_emitted() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tasks = vec![quick_task("a", 1), quick_task("b", 2)];
        run_all(tasks, 2, Duration::from_secs(5), Some(tx)).await.unwrap();

        let mut started = 0;
        let mut completed = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                ProgressEvent::TaskStarted { .. } => started += 1,
                ProgressEvent::TaskCompleted { completed: done, total, .. } => {
                    assert_eq!(total, 2);
                    completed.push(done);
                }
            }
        }
        assert_eq!(started, 2);
        completed.sort_unstable();
        assert_eq!(completed, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_invalid_configurations_rejected() {
        let err = run_all(vec![quick_task("a", 1)], 0, Duration::from_secs(1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EmptyWorkerPool));

        let err = run_all(
            vec![quick_task("dup", 1), quick_task("dup", 2)],
            2,
            Duration::from_secs(1),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateTask(name) if name == "dup"));
    }
}
