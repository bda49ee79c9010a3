//! Pipeline stages, one transformation per module.
//!
//! ## Narration
//!
//! ```text
//! input ──▶ document ──▶ clean ──▶ segment ──▶ speech
//! (URL/path)  (parse)   (placeholders) (chunks)  (TTS API)
//! ```
//!
//! 1. [`input`]    canonicalise the user-supplied path or URL to a local file
//! 2. [`document`] parse HTML into an owned tree, entities decoded
//! 3. [`clean`]    swap code callouts, tab sets and references for placeholders
//! 4. [`segment`]  cut the chapter into chunks the speech API accepts
//! 5. [`speech`]   synthesise one chunk; the only stage with network I/O
//!
//! ## CPI tables
//!
//! ```text
//! pdf ──▶ grid ──▶ header ──▶ reshape ──▶ series ──▶ chart
//! ```
//!
//! 1. [`pdf`]     locate the table page and read positioned words (pdfium,
//!    blocking)
//! 2. [`grid`]    cluster words into rows and column bands
//! 3. [`header`]  rebuild one label per column from the stacked header
//! 4. [`reshape`] melt, split compound labels, pivot, concatenate
//! 5. [`series`]  pick categories and monthly dates for plotting
//! 6. [`chart`]   render the SVG line chart

pub mod chart;
pub mod clean;
pub mod document;
pub mod grid;
pub mod header;
pub mod input;
pub mod pdf;
pub mod reshape;
pub mod segment;
pub mod series;
pub mod speech;
