//! Streaming batch API: emit records as units complete.
//!
//! Large crawls run for hours. A stream lets callers write records to disk
//! or update a dashboard as they arrive instead of waiting for the whole
//! batch. Records come in completion order (not submission order); the
//! unit's `table_number` and `unit_id` identify each one.
//!
//! The stream yields exactly one record per input unit, with the same
//! containment and cancellation rules as
//! [`BatchOrchestrator::run_batch`](crate::batch::BatchOrchestrator::run_batch).

use crate::batch::BatchOrchestrator;
use crate::config::ExtractionConfig;
use crate::error::ActaError;
use crate::model::UnitDescriptor;
use crate::output::ResultRecord;
use crate::process::UnitProcessor;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of result records.
pub type RecordStream = Pin<Box<dyn Stream<Item = ResultRecord> + Send>>;

/// Stream `units` through `orchestrator`.
///
/// Work starts when the stream is first polled; dropping the stream stops
/// dispatching further units.
pub fn run_batch_stream(orchestrator: &BatchOrchestrator, units: Vec<UnitDescriptor>) -> RecordStream {
    info!("Starting streaming batch: {} units", units.len());
    Box::pin(orchestrator.completions(units))
}

/// Build the production pipeline from `config` and stream `units` through it.
///
/// # Example
/// ```rust,no_run
/// use acta_tally::{extract_stream, ExtractionConfig, UnitDescriptor};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let units: Vec<UnitDescriptor> = serde_json::from_str(&std::fs::read_to_string("mesas.json")?)?;
/// let config = ExtractionConfig::default();
/// let mut records = extract_stream(&config, units)?;
/// while let Some(record) = records.next().await {
///     println!("mesa {} → {}", record.table_number, record.outcome);
/// }
/// # Ok(())
/// # }
/// ```
pub fn extract_stream(config: &ExtractionConfig, units: Vec<UnitDescriptor>) -> Result<RecordStream, ActaError> {
    let processor = Arc::new(UnitProcessor::from_config(config)?);
    let orchestrator = BatchOrchestrator::new(processor, config);
    Ok(run_batch_stream(&orchestrator, units))
}
