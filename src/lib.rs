//! # bookworks
//!
//! Production pipelines for a data-science book.
//!
//! * **Narration**: turn a rendered Quarto chapter into an audiobook track
//!   list. Code blocks and references are swapped for spoken placeholders,
//!   the chapter is cut along its sections into chunks the speech API
//!   accepts, and each chunk becomes `<prefix>-NN.mp3`.
//! * **CPI tables**: read "Table 1" out of a run of BLS Consumer Price Index
//!   reports, rebuild its stacked header, reshape everything into one tidy
//!   dataset and chart the unadjusted index for a few categories.
//!
//! ## Narration
//!
//! ```text
//! HTML ──▶ clean ──▶ segment ──▶ speech API ──▶ audio/<prefix>-00.mp3 …
//! ```
//!
//! ```rust,no_run
//! use bookworks::{narrate, NarrationConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NarrationConfig::builder()
//!         .api_key(std::env::var("OPENAI_API_KEY")?)
//!         .output_dir("audio/part-tools")
//!         .build()?;
//!     let output = narrate("_book/part-tools/04-scripts-notebooks.html", &config).await?;
//!     eprintln!("{} files, {} bytes", output.stats.total_chunks, output.stats.total_audio_bytes);
//!     Ok(())
//! }
//! ```
//!
//! ## CPI tables
//!
//! ```text
//! cpi_*.pdf ──▶ words ──▶ grid ──▶ labels ──▶ melt/pivot ──▶ series ──▶ SVG
//! ```
//!
//! ```rust,no_run
//! use bookworks::{normalize_reports, CpiConfig};
//! use bookworks::pipeline::chart::{write_svg, ChartOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let output = normalize_reports(&["data/bls-pdfs"], &CpiConfig::default()).await?;
//!     output.dataset.write_csv_file("cpi.csv".as_ref())?;
//!     write_svg(&output.series, &ChartOptions::default(), "cpi.svg".as_ref())?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `bookworks` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! pdfium is loaded at run time: pass a library path in [`CpiConfig`] or
//! install it where the system loader finds it.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod cpi;
pub mod error;
pub mod narrate;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    CpiConfig, CpiConfigBuilder, NarrationConfig, NarrationConfigBuilder, TablePage,
};
pub use cpi::{discover_reports, normalize_reports, read_report};
pub use error::BookworksError;
pub use narrate::{narrate, narrate_sync, segment_file, segment_html};
pub use output::{
    ChunkResult, CpiOutput, NarrationOutput, NarrationStats, ReportSummary, SegmentationOutput,
};
pub use pipeline::speech::{OpenAiSpeech, SpeechSynthesizer};
pub use progress::{NarrationProgressCallback, NoopProgressCallback, ProgressCallback};
