//! # acta-tally
//!
//! Extract per-party vote tallies from scanned election result documents
//! ("actas") published by an electoral authority's public directory.
//!
//! ## Pipeline Overview
//!
//! ```text
//! UnitDescriptor
//!  │
//!  ├─ 1. Fetch      resolve the document reference into the local store
//!  ├─ 2. Render     rasterise the first page via pdfium
//!  ├─ 3. Isolate    crop the template's table rectangle
//!  ├─ 4. Normalize  grayscale + Gaussian adaptive threshold
//!  ├─ 5. Segment    split into one equal band per category
//!  ├─ 6. Recognize  read each band's digits via tesseract
//!  └─ 7. Record     ResultRecord with an explicit outcome
//! ```
//!
//! Units run concurrently on blocking workers with a fixed parallelism
//! degree. A unit that fails never aborts the batch: every input unit yields
//! exactly one [`ResultRecord`] whose [`Outcome`] explains any missing data.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use acta_tally::{directory::DirectoryClient, report, ExtractionConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let units = DirectoryClient::presidential()?
//!         .collect_units("04", "COPÁN")
//!         .await?;
//!     let config = ExtractionConfig::default();
//!     let output = acta_tally::run(&config, units).await?;
//!     report::write_json(Path::new("resultados_presidente.json"), &output.records)?;
//!     report::write_csv(Path::new("resultados_presidente.csv"), &output.records)?;
//!     eprintln!("{}/{} actas read", output.stats.success, output.stats.total_units);
//!     Ok(())
//! }
//! ```
//!
//! ## External engines
//!
//! Rasterisation needs a pdfium shared library (system path, or
//! [`ExtractionConfig::pdfium_library`]). Recognition runs the `tesseract`
//! binary ([`ExtractionConfig::tesseract_bin`]). Both sit behind traits
//! ([`Rasterizer`], [`DigitRecognizer`]) so tests and embedders can swap
//! them out.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `actas` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod directory;
pub mod error;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod report;
pub mod stream;

#[cfg(test)]
mod test_support;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{run, run_batch_sync, BatchOrchestrator, CancelFlag};
pub use config::{ExtractionConfig, ExtractionConfigBuilder, FractionalRect, TableTemplate, ThresholdParams};
pub use error::{ActaError, StageError};
pub use model::{Category, UnitDescriptor};
pub use output::{BatchOutput, BatchStats, Outcome, ResultRecord, VoteMap};
pub use pipeline::fetch::{DocumentFetcher, DocumentStore, HttpFetcher};
pub use pipeline::recognize::{DigitRecognizer, TesseractCli};
pub use pipeline::render::{PdfiumRasterizer, Rasterizer};
pub use process::UnitProcessor;
pub use progress::{BatchProgressCallback, LogProgress, NoopProgressCallback, ProgressCallback};
pub use stream::{extract_stream, run_batch_stream, RecordStream};
