//! Error types for the acta-tally library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ActaError`]: **Fatal**: the run cannot proceed at all (invalid
//!   configuration, directory API down, report cannot be written). Returned
//!   as `Err(ActaError)` from run-level entry points.
//!
//! * [`StageError`]: **Contained**: one unit's pipeline failed (download,
//!   rasterisation, geometry, recognition engine). It never leaves
//!   [`crate::process::UnitProcessor::process`]; it is downgraded to an
//!   `EXTRACTION_ERROR` record whose `error` field carries its text.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the acta-tally library.
#[derive(Debug, Error)]
pub enum ActaError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A template descriptor file could not be read or parsed.
    #[error("Failed to load table template '{path}': {reason}")]
    TemplateLoad { path: PathBuf, reason: String },

    /// A unit-list file could not be read or parsed.
    #[error("Failed to load units from '{path}': {reason}")]
    UnitsLoad { path: PathBuf, reason: String },

    // ── Directory errors ──────────────────────────────────────────────────
    /// A directory API request failed.
    #[error("Directory request failed for '{url}': {reason}")]
    Directory { url: String, reason: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write a report file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialising the report failed.
    #[error("Failed to serialise report: {0}")]
    Serialize(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A failure inside one unit's extraction pipeline.
///
/// Fetch-class variants come first, then rasterisation, then the image
/// stages. None of them abort a batch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StageError {
    // ── Fetch ─────────────────────────────────────────────────────────────
    /// The reference is neither an absolute URL nor resolvable against the base.
    #[error("Invalid document reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    /// Download failed at the network level.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// The server answered with a non-success status.
    #[error("Failed to download '{url}': HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// Downloaded body is not a PDF.
    #[error("Downloaded body for '{url}' is not a PDF (first bytes: {magic:?})")]
    NotADocument { url: String, magic: Vec<u8> },

    /// The local document store could not be written.
    #[error("Document store error at '{path}': {detail}")]
    Store { path: PathBuf, detail: String },

    // ── Rasterise ─────────────────────────────────────────────────────────
    /// No pdfium library could be bound.
    #[error("Failed to bind to pdfium library: {0}")]
    PdfiumUnavailable(String),

    /// The document could not be loaded or its first page rendered.
    #[error("Rasterisation failed for '{path}': {detail}")]
    Rasterize { path: PathBuf, detail: String },

    /// The document opened but has no pages.
    #[error("Document '{path}' has no pages")]
    EmptyDocument { path: PathBuf },

    // ── Image stages ──────────────────────────────────────────────────────
    /// The table crop is degenerate for this raster.
    #[error("Table region is empty for a {width}x{height} image")]
    Region { width: u32, height: u32 },

    /// Binarisation could not run.
    #[error("Normalisation failed: {0}")]
    Normalize(String),

    /// The table region is too short to split into rows.
    #[error("Cannot split a {height}px table into {rows} rows")]
    Segment { height: u32, rows: usize },

    /// The recognition engine itself failed (not an empty read).
    #[error("Recognition engine failed: {0}")]
    Recognize(String),
}

impl StageError {
    /// Whether a retry of the same fetch might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StageError::DownloadTimeout { .. } | StageError::DownloadFailed { .. } => true,
            StageError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
