//! Bounded-concurrency pool running one [`ItemPipeline`] per item.
//!
//! Items are started in list order; a permit from the concurrency limiter is
//! acquired before each pipeline task is spawned, so no more than
//! `max_concurrent` pipelines are ever in flight. Completion order is arbitrary.
//! Each pipeline's outcome is collected independently: a failing or even
//! panicking pipeline never cancels its siblings.

use crate::pipeline::ItemPipeline;
use crate::progress::ProgressSink;
use crate::types::{Event, ItemDescriptor, PipelineOutcome, RunReport, Stage};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Default number of pipelines allowed to run at once
pub const DEFAULT_MAX_CONCURRENT: usize = 50;

/// Runs item pipelines with bounded parallelism and aggregates their outcomes
#[derive(Clone, Debug)]
pub struct Scheduler {
    max_concurrent: usize,
    progress: ProgressSink,
}

impl Scheduler {
    /// Create a scheduler allowing `max_concurrent` (at least 1) active pipelines
    pub fn new(max_concurrent: usize, progress: ProgressSink) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            progress,
        }
    }

    /// Run every item through `pipeline` and wait for all of them to finish
    ///
    /// Progress (`completed/total`) is published as pipelines finish.
    pub async fn run(
        &self,
        items: Vec<ItemDescriptor>,
        pipeline: Arc<dyn ItemPipeline>,
    ) -> RunReport {
        let total = items.len();
        let mut report = RunReport::new(total);

        info!(
            total,
            max_concurrent = self.max_concurrent,
            "starting download pool"
        );

        let concurrent_limit = Arc::new(Semaphore::new(self.max_concurrent));
        let completed = Arc::new(AtomicUsize::new(0));
        let mut tasks = JoinSet::new();
        let mut task_items: HashMap<tokio::task::Id, String> = HashMap::with_capacity(total);

        for item in items {
            // Blocks while max_concurrent pipelines are in flight
            let permit = match Arc::clone(&concurrent_limit).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(error = %e, "concurrency limiter closed, no further items started");
                    break;
                }
            };

            let id = item.id().to_string();
            let pipeline = Arc::clone(&pipeline);
            let progress = self.progress.clone();
            let completed = Arc::clone(&completed);

            let handle = tasks.spawn(async move {
                let outcome = pipeline.process(&item).await;
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                progress.emit(Event::ItemFinished {
                    id: item.id().to_string(),
                    outcome: outcome.clone(),
                    completed: done,
                    total,
                });
                drop(permit);
                (item, outcome)
            });
            task_items.insert(handle.id(), id);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, (item, outcome))) => report.record(item.id(), &outcome),
                Err(join_error) => {
                    let id = task_items
                        .get(&join_error.id())
                        .cloned()
                        .unwrap_or_else(|| "<unknown>".to_string());
                    error!(item_id = %id, error = %join_error, "pipeline task panicked");

                    let outcome = PipelineOutcome::Failed {
                        stage: Stage::Pending,
                        reason: format!("pipeline task panicked: {}", join_error),
                    };
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    self.progress.emit(Event::ItemFinished {
                        id: id.clone(),
                        outcome: outcome.clone(),
                        completed: done,
                        total,
                    });
                    report.record(&id, &outcome);
                }
            }
        }

        report.finished_at = chrono::Utc::now();

        for failed in &report.failed {
            warn!(
                item_id = %failed.id,
                stage = %failed.stage,
                reason = %failed.reason,
                "item not updated"
            );
        }
        info!(
            total = report.total,
            succeeded = report.succeeded,
            skipped = report.skipped,
            failed = report.failed.len(),
            elapsed_ms = report.elapsed().num_milliseconds(),
            "download pool finished"
        );

        self.progress.emit(Event::RunComplete {
            skipped: report.skipped,
            succeeded: report.succeeded,
            failed: report.failed.len(),
        });

        report
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT, ProgressSink::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use url::Url;

    fn items(count: usize) -> Vec<ItemDescriptor> {
        (0..count)
            .map(|i| {
                ItemDescriptor::new(
                    format!("item-{i}"),
                    Url::parse(&format!("https://downloads.example.com/item-{i}.zip")).unwrap(),
                    "v1",
                )
                .unwrap()
            })
            .collect()
    }

    /// Pipeline that tracks how many instances are active at once
    #[derive(Default)]
    struct CountingPipeline {
        active: AtomicUsize,
        max_active: AtomicUsize,
        started: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl ItemPipeline for CountingPipeline {
        async fn process(&self, item: &ItemDescriptor) -> PipelineOutcome {
            self.started.lock().unwrap().push(item.id().to_string());
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            PipelineOutcome::Succeeded
        }
    }

    /// Pipeline failing (or panicking) for selected ids
    struct FlakyPipeline {
        fail: &'static str,
        panic: Option<&'static str>,
    }

    #[async_trait::async_trait]
    impl ItemPipeline for FlakyPipeline {
        async fn process(&self, item: &ItemDescriptor) -> PipelineOutcome {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if Some(item.id()) == self.panic {
                panic!("boom");
            }
            if item.id() == self.fail {
                return PipelineOutcome::Failed {
                    stage: Stage::Fetching,
                    reason: "HTTP 404".to_string(),
                };
            }
            PipelineOutcome::Succeeded
        }
    }

    #[tokio::test]
    async fn test_never_exceeds_max_concurrent() {
        let pipeline = Arc::new(CountingPipeline::default());
        let scheduler = Scheduler::new(5, ProgressSink::default());

        let report = scheduler.run(items(20), pipeline.clone()).await;

        assert_eq!(report.total, 20);
        assert_eq!(report.succeeded, 20);
        assert_eq!(pipeline.max_active.load(Ordering::SeqCst), 5);
        assert_eq!(pipeline.active.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_items_start_in_submission_order() {
        let pipeline = Arc::new(CountingPipeline::default());
        let scheduler = Scheduler::new(1, ProgressSink::default());

        scheduler.run(items(6), pipeline.clone()).await;

        let started = pipeline.started.lock().unwrap().clone();
        let expected: Vec<String> = (0..6).map(|i| format!("item-{i}")).collect();
        assert_eq!(started, expected);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_the_batch() {
        let pipeline = Arc::new(FlakyPipeline {
            fail: "item-3",
            panic: None,
        });
        let scheduler = Scheduler::new(4, ProgressSink::default());

        let report = scheduler.run(items(10), pipeline).await;

        assert_eq!(report.succeeded, 9);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].id, "item-3");
        assert_eq!(report.failed[0].stage, Stage::Fetching);
    }

    #[tokio::test]
    async fn test_panicking_pipeline_is_contained() {
        let pipeline = Arc::new(FlakyPipeline {
            fail: "none",
            panic: Some("item-1"),
        });
        let scheduler = Scheduler::new(3, ProgressSink::default());

        let report = scheduler.run(items(5), pipeline).await;

        assert_eq!(report.succeeded, 4);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].id, "item-1");
        assert!(report.failed[0].reason.contains("panicked"));
    }

    #[tokio::test]
    async fn test_progress_counts_completions() {
        let progress = ProgressSink::new(64);
        let mut rx = progress.subscribe();
        let scheduler = Scheduler::new(3, progress);

        scheduler
            .run(items(8), Arc::new(CountingPipeline::default()))
            .await;

        let mut completed = Vec::new();
        let mut run_complete = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                Event::ItemFinished {
                    completed: n,
                    total,
                    ..
                } => {
                    assert_eq!(total, 8);
                    completed.push(n);
                }
                Event::RunComplete { succeeded, .. } => {
                    assert_eq!(succeeded, 8);
                    run_complete = true;
                }
                _ => {}
            }
        }
        completed.sort_unstable();
        assert_eq!(completed, (1..=8).collect::<Vec<_>>());
        assert!(run_complete);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let scheduler = Scheduler::default();
        let report = scheduler
            .run(Vec::new(), Arc::new(CountingPipeline::default()))
            .await;
        assert_eq!(report.total, 0);
        assert_eq!(report.completed(), 0);
    }
}
