//! Concurrent fan-out of work items
//!
//! A fixed pool of workers pulls `(account, region, service, type)` items from
//! a bounded queue. Each item runs in its own task so a panic is contained and
//! turned into an error outcome. Finished outcomes are streamed to the sink as
//! they complete.

use super::job::{Job, JobAction, WorkItem};
use crate::cloud::Connector;
use crate::config::{DEFAULT_QUEUE_SIZE, DEFAULT_WORKERS};
use crate::resource::{
    Catalog, Discoverer, OutcomePayload, Resource, RunOutcome, Status, TagAction, TagSet, Tagger,
};
use crate::sink::Sink;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Worker pool sizing
#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    /// Number of worker tasks
    pub workers: usize,
    /// Maximum queued work items before submission blocks
    pub queue_size: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcomes: Vec<RunOutcome>,
    /// Items never started because the run was cancelled
    pub not_started: usize,
}

impl RunReport {
    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn error_count(&self) -> usize {
        self.outcomes.len() - self.success_count()
    }

    /// Resources discovered, or resources tagged, across all outcomes
    pub fn item_count(&self) -> usize {
        self.outcomes.iter().map(|o| o.payload.len()).sum()
    }

    pub fn summary(&self) -> String {
        format!(
            "run {}: {} triples ({} ok, {} failed, {} not started), {} resources",
            self.run_id,
            self.outcomes.len(),
            self.success_count(),
            self.error_count(),
            self.not_started,
            self.item_count()
        )
    }
}

/// What every worker shares
struct WorkerContext {
    discoverer: Discoverer,
    tagger: Tagger,
    sink: Arc<dyn Sink>,
    action: JobAction,
    run_id: Uuid,
}

/// Runs jobs across a bounded worker pool
pub struct Dispatcher {
    catalog: Arc<Catalog>,
    connector: Arc<dyn Connector>,
    sink: Arc<dyn Sink>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        catalog: Arc<Catalog>,
        connector: Arc<dyn Connector>,
        sink: Arc<dyn Sink>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            catalog,
            connector,
            sink,
            config,
        }
    }

    /// Run a job to completion (or until `cancel` fires)
    ///
    /// Never fails: every started item yields exactly one outcome.
    pub async fn run(&self, job: &Job, cancel: CancellationToken) -> RunReport {
        let run_id = Uuid::new_v4();
        let items = job.work_items(&self.catalog);
        let total = items.len();
        let started_at = Instant::now();

        let workers = self.config.workers.max(1);
        let queue_size = self.config.queue_size.max(1);

        info!(
            "Run {}: {} work items on {} workers (queue {})",
            run_id, total, workers, queue_size
        );

        let context = Arc::new(WorkerContext {
            discoverer: Discoverer::new(self.catalog.clone(), self.connector.clone()),
            tagger: Tagger::new(self.catalog.clone(), self.connector.clone()),
            sink: self.sink.clone(),
            action: job.action.clone(),
            run_id,
        });

        let (item_tx, item_rx) = mpsc::channel::<WorkItem>(queue_size);
        let item_rx = Arc::new(Mutex::new(item_rx));
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel::<RunOutcome>();

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let item_rx = Arc::clone(&item_rx);
            let outcome_tx = outcome_tx.clone();
            let context = Arc::clone(&context);
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                worker_task(worker_id, context, item_rx, outcome_tx, cancel).await;
            }));
        }
        drop(outcome_tx);

        // Submission blocks while the queue is full
        for item in items {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("Run {} cancelled, no further items submitted", run_id);
                    break;
                }
                sent = item_tx.send(item) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
        drop(item_tx);

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Worker task failed: {}", e);
            }
        }

        let mut outcomes = Vec::with_capacity(total);
        while let Some(outcome) = outcome_rx.recv().await {
            outcomes.push(outcome);
        }

        let report = RunReport {
            run_id,
            not_started: total.saturating_sub(outcomes.len()),
            outcomes,
        };

        info!(
            "{} in {:.1}s",
            report.summary(),
            started_at.elapsed().as_secs_f64()
        );

        report
    }
}

async fn worker_task(
    worker_id: usize,
    context: Arc<WorkerContext>,
    item_rx: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
    outcome_tx: mpsc::UnboundedSender<RunOutcome>,
    cancel: CancellationToken,
) {
    debug!("Worker {} starting", worker_id);

    loop {
        let item = {
            let mut rx = item_rx.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                item = rx.recv() => item,
            }
        };

        let Some(item) = item else {
            debug!("Worker {} stopping", worker_id);
            return;
        };

        let outcome = run_isolated(Arc::clone(&context), item).await;

        if let Err(e) = context.sink.record(context.run_id, &outcome).await {
            warn!("Failed to record outcome for {}: {:#}", outcome.label(), e);
        }

        if outcome_tx.send(outcome).is_err() {
            return;
        }
    }
}

/// Execute one item in its own task so a panic becomes an error outcome
async fn run_isolated(context: Arc<WorkerContext>, item: WorkItem) -> RunOutcome {
    let fallback = item.clone();
    let is_tagging = matches!(context.action, JobAction::Tag { .. });

    match tokio::spawn(async move { execute(&context, item).await }).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Work item {} aborted: {}", fallback.label(), e);
            let payload = if is_tagging {
                OutcomePayload::Tagging(Vec::new())
            } else {
                OutcomePayload::Resources(Vec::new())
            };
            outcome_for(&fallback, Status::Error, format!("worker failure: {}", e), payload)
        }
    }
}

async fn execute(context: &WorkerContext, item: WorkItem) -> RunOutcome {
    let discovery = context
        .discoverer
        .discover(
            &item.account_id,
            &item.region,
            &item.target.service,
            &item.target.resource_type,
        )
        .await;

    match &context.action {
        JobAction::Discover => outcome_for(
            &item,
            discovery.status,
            discovery.error,
            OutcomePayload::Resources(discovery.resources),
        ),
        JobAction::Tag { action, tags } => {
            if !discovery.is_success() {
                return outcome_for(
                    &item,
                    Status::Error,
                    discovery.error,
                    OutcomePayload::Tagging(Vec::new()),
                );
            }
            tag_discovered(context, &item, *action, tags, &discovery.resources).await
        }
    }
}

async fn tag_discovered(
    context: &WorkerContext,
    item: &WorkItem,
    action: TagAction,
    tags: &TagSet,
    resources: &[Resource],
) -> RunOutcome {
    let results = context.tagger.tag(action, resources, tags).await;
    outcome_for(item, Status::Success, String::new(), OutcomePayload::Tagging(results))
}

fn outcome_for(item: &WorkItem, status: Status, error: String, payload: OutcomePayload) -> RunOutcome {
    RunOutcome {
        account_id: item.account_id.clone(),
        region: item.region.clone(),
        service: item.target.service.clone(),
        resource_type: item.target.resource_type.clone(),
        status,
        error,
        payload,
    }
}
