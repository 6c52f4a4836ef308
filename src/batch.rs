//! Bounded concurrent batch processing.
//!
//! Every unit's pipeline is blocking, so each one runs on
//! `tokio::task::spawn_blocking` with at most `concurrency` in flight
//! (`buffer_unordered`). Records are collected in completion order; the
//! unit's identity fields are what reconcile output with input.
//!
//! Output count always equals input count:
//! - unit-level failures are already contained by [`UnitProcessor`];
//! - a worker that dies (panic, runtime shutdown) yields an
//!   `INFRASTRUCTURE_ERROR` record;
//! - units not yet started when the [`CancelFlag`] is raised yield
//!   `CANCELLED` records.

use crate::config::ExtractionConfig;
use crate::error::ActaError;
use crate::model::UnitDescriptor;
use crate::output::{BatchOutput, BatchStats, Outcome, ResultRecord};
use crate::process::UnitProcessor;
use crate::progress::{LogProgress, ProgressCallback};
use futures::future;
use futures::stream::{self, Stream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Cooperative cancellation signal, checked before each unit starts.
///
/// Clones share the same flag. Units already running complete normally.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs a [`UnitProcessor`] over many units with bounded parallelism.
pub struct BatchOrchestrator {
    processor: Arc<UnitProcessor>,
    concurrency: usize,
    callback: ProgressCallback,
    cancel: CancelFlag,
}

impl BatchOrchestrator {
    /// Parallelism and progress callback come from `config`; without a
    /// configured callback progress goes to [`LogProgress`].
    pub fn new(processor: Arc<UnitProcessor>, config: &ExtractionConfig) -> Self {
        Self {
            processor,
            concurrency: config.concurrency.max(1),
            callback: config
                .progress_callback
                .clone()
                .unwrap_or_else(|| Arc::new(LogProgress)),
            cancel: CancelFlag::new(),
        }
    }

    /// Use an externally owned cancellation flag.
    pub fn with_cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = flag;
        self
    }

    /// A handle that cancels this orchestrator's not-yet-started units.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Process every unit and collect the records in completion order.
    pub async fn run_batch(&self, units: Vec<UnitDescriptor>) -> BatchOutput {
        let start = Instant::now();
        let total = units.len();
        info!(
            "Starting batch: {} units, concurrency {}",
            total, self.concurrency
        );

        let records: Vec<ResultRecord> = self.completions(units).collect().await;

        let mut stats = BatchStats::default();
        for record in &records {
            stats.record(record.outcome);
        }
        stats.total_duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Batch complete: {}/{} succeeded, {} without document, {} failed, {} infrastructure errors, {} cancelled in {}ms",
            stats.success,
            stats.total_units,
            stats.no_document,
            stats.extraction_error,
            stats.infrastructure_error,
            stats.cancelled,
            stats.total_duration_ms
        );

        BatchOutput { records, stats }
    }

    /// Records as they complete, with progress events fired on the way out.
    pub(crate) fn completions(
        &self,
        units: Vec<UnitDescriptor>,
    ) -> impl Stream<Item = ResultRecord> + Send + 'static {
        let total = units.len();
        let callback = Arc::clone(&self.callback);

        // Batch-start events fire on first poll, not at construction.
        let start_cb = Arc::clone(&callback);
        let started = stream::once(async move {
            start_cb.on_batch_start(total);
            if total == 0 {
                start_cb.on_batch_complete(0, 0);
            }
        })
        .filter_map(|()| future::ready(None::<ResultRecord>));

        let processor = Arc::clone(&self.processor);
        let cancel = self.cancel.clone();
        let worker_cb = Arc::clone(&callback);

        let mut done = 0usize;
        let mut succeeded = 0usize;

        let records = stream::iter(units.into_iter().map(move |unit| {
            run_unit(
                Arc::clone(&processor),
                cancel.clone(),
                Arc::clone(&worker_cb),
                unit,
            )
        }))
        .buffer_unordered(self.concurrency)
        .map(move |record| {
            done += 1;
            if record.outcome == Outcome::Success {
                succeeded += 1;
            }
            callback.on_unit_complete(done, total, record.table_number, record.outcome);
            if done == total {
                callback.on_batch_complete(total, succeeded);
            }
            record
        });

        started.chain(records)
    }
}

/// One unit on a blocking worker; a dead worker becomes a record too.
async fn run_unit(
    processor: Arc<UnitProcessor>,
    cancel: CancelFlag,
    callback: ProgressCallback,
    unit: UnitDescriptor,
) -> ResultRecord {
    let fallback = unit.clone();
    let worker_cb = Arc::clone(&callback);

    let handle = tokio::task::spawn_blocking(move || {
        if cancel.is_cancelled() {
            return ResultRecord::failed(&unit, Outcome::Cancelled, "batch cancelled before unit started");
        }
        worker_cb.on_unit_start(unit.table_number);
        processor.process(&unit)
    });

    match handle.await {
        Ok(record) => record,
        Err(e) => {
            let detail = e.to_string();
            callback.on_task_failure(fallback.table_number, &detail);
            ResultRecord::failed(&fallback, Outcome::InfrastructureError, detail)
        }
    }
}

/// Build the production pipeline from `config` and run it over `units`.
pub async fn run(config: &ExtractionConfig, units: Vec<UnitDescriptor>) -> Result<BatchOutput, ActaError> {
    let processor = Arc::new(UnitProcessor::from_config(config)?);
    Ok(BatchOrchestrator::new(processor, config).run_batch(units).await)
}

/// Synchronous wrapper around [`run`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_batch_sync(config: &ExtractionConfig, units: Vec<UnitDescriptor>) -> Result<BatchOutput, ActaError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ActaError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(run(config, units))
}
