//! Pipeline stages for extracting one unit's tally.
//!
//! Each submodule implements exactly one transformation step, so every stage
//! can be tested on its own and the external engines (pdfium, tesseract, HTTP)
//! sit behind traits that tests replace with fakes.
//!
//! ## Data Flow
//!
//! ```text
//! fetch ──▶ render ──▶ region ──▶ normalize ──▶ region ──▶ recognize
//! (store)   (pdfium)   (crop)     (threshold)   (rows)     (tesseract)
//! ```
//!
//! 1. [`fetch`]: resolve a document reference to a local file; the only
//!    stage with network I/O
//! 2. [`render`]: rasterise the first page
//! 3. [`region`]: crop the table rectangle, later split it into rows
//! 4. [`normalize`]: grayscale plus Gaussian adaptive threshold
//! 5. [`recognize`]: read each row as a non-negative integer
//!
//! All stages are blocking; [`crate::batch`] runs each unit on a
//! `spawn_blocking` thread.

pub mod fetch;
pub mod normalize;
pub mod recognize;
pub mod region;
pub mod render;
