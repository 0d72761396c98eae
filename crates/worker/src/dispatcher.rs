//! Background report dispatcher.
//!
//! Polls for `Pending` reports every `poll_interval` and runs each one
//! through [`ReportPipeline::generate`] on its own task. A semaphore bounds
//! how many reports generate at once; the pipeline's compare-and-set
//! `Pending -> Generating` transition keeps two workers from running the
//! same report.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use vigil_core::types::DbId;
use vigil_db::StoreError;
use vigil_pipeline::{GenerationOutcome, ReportPipeline};

pub struct ReportDispatcher {
    pipeline: Arc<ReportPipeline>,
    poll_interval: Duration,
    permits: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<DbId>>>,
    tracker: TaskTracker,
}

impl ReportDispatcher {
    pub fn new(pipeline: Arc<ReportPipeline>, poll_interval: Duration, max_concurrent: usize) -> Self {
        Self {
            pipeline,
            poll_interval,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            tracker: TaskTracker::new(),
        }
    }

    /// Run the dispatcher loop until the cancellation token is triggered,
    /// then wait for in-flight reports to finish.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            max_concurrent = self.permits.available_permits(),
            "Report dispatcher started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Report dispatcher shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.dispatch_once().await {
                        tracing::error!(error = %e, "Dispatch cycle failed");
                    }
                }
            }
        }

        let in_flight = self.tracker.len();
        if in_flight > 0 {
            tracing::info!(in_flight, "Waiting for in-flight reports");
        }
        self.drain().await;
        tracing::info!("Report dispatcher stopped");
    }

    /// One dispatch cycle: claim as many pending reports as there are free
    /// permits. Returns how many generation tasks were spawned.
    pub async fn dispatch_once(&self) -> Result<usize, StoreError> {
        let available = self.permits.available_permits();
        if available == 0 {
            return Ok(0);
        }

        let pending = self.pipeline.store().list_pending(available as i64).await?;
        let mut spawned = 0;

        for report_id in pending {
            if !self.in_flight.lock().insert(report_id) {
                continue;
            }
            let claim = InFlight {
                ids: Arc::clone(&self.in_flight),
                report_id,
            };
            let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
                break;
            };

            let pipeline = Arc::clone(&self.pipeline);
            self.tracker.spawn(async move {
                let _claim = claim;
                let _permit = permit;
                let outcome = pipeline.generate(report_id).await;
                match &outcome {
                    GenerationOutcome::Completed => {}
                    other => tracing::debug!(report_id, outcome = ?other, "Dispatched report did not complete"),
                }
            });

            tracing::debug!(report_id, "Report dispatched");
            spawned += 1;
        }

        Ok(spawned)
    }

    /// Number of reports currently generating on this dispatcher.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Wait until every spawned generation task has finished.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

/// Membership in the in-flight set, released when the generation task
/// ends, including by panic.
struct InFlight {
    ids: Arc<Mutex<HashSet<DbId>>>,
    report_id: DbId,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.ids.lock().remove(&self.report_id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use vigil_cache::{CacheManager, CacheManagerConfig};
    use vigil_core::dataset::Dataset;
    use vigil_core::report::NewReport;
    use vigil_core::status::ReportStatus;
    use vigil_db::{MemoryReportStore, ReportStore};
    use vigil_events::{BusNotifier, EventBus};
    use vigil_pipeline::{
        Collaborators, CompileError, CompileRequest, DataCompiler, DefaultChartGenerator,
        FileExporter, OfflineNarrativeGenerator, PipelineConfig,
    };

    struct EmptyCompiler;

    #[async_trait]
    impl DataCompiler for EmptyCompiler {
        async fn compile(&self, _request: &CompileRequest) -> Result<Dataset, CompileError> {
            Ok(Dataset::default())
        }
    }

    struct PanickingCompiler;

    #[async_trait]
    impl DataCompiler for PanickingCompiler {
        async fn compile(&self, _request: &CompileRequest) -> Result<Dataset, CompileError> {
            panic!("inventory snapshot corrupted");
        }
    }

    fn pipeline(store: Arc<MemoryReportStore>) -> Arc<ReportPipeline> {
        pipeline_with(store, Arc::new(EmptyCompiler))
    }

    fn pipeline_with(
        store: Arc<MemoryReportStore>,
        compiler: Arc<dyn DataCompiler>,
    ) -> Arc<ReportPipeline> {
        let cache = Arc::new(CacheManager::new(CacheManagerConfig::default(), None).unwrap());
        let collaborators = Collaborators {
            compiler,
            narrative: Arc::new(OfflineNarrativeGenerator::new()),
            charts: Arc::new(DefaultChartGenerator::new()),
            notifier: Arc::new(BusNotifier::new(Arc::new(EventBus::default()))),
            exporter: Arc::new(FileExporter::new(std::env::temp_dir())),
        };
        Arc::new(ReportPipeline::new(store, cache, collaborators, PipelineConfig::default()))
    }

    async fn seed(store: &MemoryReportStore, count: usize) -> Vec<DbId> {
        let mut ids = Vec::new();
        for i in 0..count {
            let report = store
                .create(NewReport {
                    title: format!("Report {i}"),
                    ..Default::default()
                })
                .await
                .unwrap();
            ids.push(report.id);
        }
        ids
    }

    #[tokio::test]
    async fn dispatch_is_bounded_by_permits() {
        let store = Arc::new(MemoryReportStore::new());
        let ids = seed(&store, 3).await;
        let dispatcher = ReportDispatcher::new(pipeline(Arc::clone(&store)), Duration::from_secs(1), 2);

        assert_eq!(dispatcher.dispatch_once().await.unwrap(), 2);
        dispatcher.drain().await;
        assert_eq!(dispatcher.in_flight(), 0);

        assert_eq!(dispatcher.dispatch_once().await.unwrap(), 1);
        dispatcher.drain().await;

        for id in ids {
            let report = store.find_by_id(id).await.unwrap().unwrap();
            assert_eq!(report.status, ReportStatus::Completed);
        }
        assert_eq!(dispatcher.dispatch_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn panicking_generation_releases_its_slot() {
        let store = Arc::new(MemoryReportStore::new());
        seed(&store, 1).await;
        let dispatcher = ReportDispatcher::new(
            pipeline_with(Arc::clone(&store), Arc::new(PanickingCompiler)),
            Duration::from_secs(1),
            2,
        );

        assert_eq!(dispatcher.dispatch_once().await.unwrap(), 1);
        dispatcher.drain().await;

        assert_eq!(dispatcher.in_flight(), 0);
        assert_eq!(dispatcher.permits.available_permits(), 2);
    }

    #[tokio::test]
    async fn run_stops_on_cancel_after_draining() {
        let store = Arc::new(MemoryReportStore::new());
        let ids = seed(&store, 2).await;
        let dispatcher = Arc::new(ReportDispatcher::new(
            pipeline(Arc::clone(&store)),
            Duration::from_millis(10),
            4,
        ));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn({
            let dispatcher = Arc::clone(&dispatcher);
            let cancel = cancel.clone();
            async move { dispatcher.run(cancel).await }
        });

        // The first tick fires immediately.
        for _ in 0..100 {
            if store.list_pending(10).await.unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("dispatcher stops")
            .unwrap();

        for id in ids {
            let status = store.find_by_id(id).await.unwrap().unwrap().status;
            assert_eq!(status, ReportStatus::Completed);
        }
    }
}
