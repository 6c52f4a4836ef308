//! Progress-callback trait for per-unit batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the orchestrator drains completed units.
//!
//! Completion events are delivered from the single task that collects
//! results, one per unit, in completion order. `on_unit_start` is called
//! from worker threads and may run concurrently.
//!
//! # Example
//!
//! ```rust
//! use acta_tally::{BatchProgressCallback, ExtractionConfig, Outcome};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     ok: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_unit_complete(&self, done: usize, total: usize, table: u32, outcome: Outcome) {
//!         if outcome == Outcome::Success {
//!             self.ok.fetch_add(1, Ordering::SeqCst);
//!         }
//!         eprintln!("[{done}/{total}] mesa {table} → {outcome}");
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { ok: AtomicUsize::new(0) });
//! let config = ExtractionConfig::builder()
//!     .progress_callback(cb as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::Outcome;
use std::sync::Arc;
use tracing::{error, info};

/// Called by the orchestrator as it processes each unit.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before any unit is dispatched.
    fn on_batch_start(&self, total_units: usize) {
        let _ = total_units;
    }

    /// Called on the worker just before a unit's pipeline runs.
    fn on_unit_start(&self, table_number: u32) {
        let _ = table_number;
    }

    /// Called once per unit as its record is collected.
    ///
    /// # Arguments
    /// * `done`: 1-based completion index
    /// * `total`: number of units in the batch
    /// * `table_number`: the unit's table number
    /// * `outcome`: the record's outcome
    fn on_unit_complete(&self, done: usize, total: usize, table_number: u32, outcome: Outcome) {
        let _ = (done, total, table_number, outcome);
    }

    /// Called when a worker died before returning a record.
    fn on_task_failure(&self, table_number: u32, error: &str) {
        let _ = (table_number, error);
    }

    /// Called once after every unit has a record.
    fn on_batch_complete(&self, total_units: usize, success_count: usize) {
        let _ = (total_units, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Writes the progress stream to `tracing`: one line per completion and
/// one per infrastructure failure.
///
/// Used when no callback is configured.
pub struct LogProgress;

impl BatchProgressCallback for LogProgress {
    fn on_unit_complete(&self, done: usize, total: usize, table_number: u32, outcome: Outcome) {
        info!("{}", completion_line(done, total, table_number, outcome));
    }

    fn on_task_failure(&self, table_number: u32, error: &str) {
        error!("Task for unit {} failed: {}", table_number, error);
    }
}

/// Formats the per-unit progress line.
pub fn completion_line(done: usize, total: usize, table_number: u32, outcome: Outcome) -> String {
    format!("[{done}/{total}] unit {table_number} → {outcome}")
}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
