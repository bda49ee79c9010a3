//! Result types returned by the two pipelines.
//!
//! Everything here is plain data with `Serialize` so the CLI can print it
//! as JSON (`--json`) and library callers can log or persist it.

use crate::pipeline::reshape::TidyDataset;
use crate::pipeline::series::SeriesPoint;
use serde::Serialize;
use std::path::PathBuf;

// ── Narration ────────────────────────────────────────────────────────────

/// One synthesised chunk.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkResult {
    /// 0-based position; the `NN` in the file name.
    pub index: usize,
    pub path: PathBuf,
    /// Length of the narrated text in characters.
    pub chars: usize,
    pub audio_bytes: usize,
    pub duration_ms: u64,
    /// Attempts beyond the first.
    pub retries: u32,
}

/// Totals for one narration run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NarrationStats {
    pub total_chunks: usize,
    pub total_chars: usize,
    pub total_audio_bytes: usize,
    /// Subtrees swapped for a placeholder by the cleaner.
    pub replaced_subtrees: usize,
    /// Chunks that exceed the configured maximum and could not be split.
    pub oversized_chunks: usize,
    pub total_duration_ms: u64,
    pub synthesis_duration_ms: u64,
}

/// Everything produced by [`crate::narrate`].
#[derive(Debug, Clone, Serialize)]
pub struct NarrationOutput {
    pub chunks: Vec<ChunkResult>,
    pub stats: NarrationStats,
}

/// Dry-run result: the chunks that would be narrated.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentationOutput {
    pub chunks: Vec<String>,
    pub replaced_subtrees: usize,
    pub max_chars: usize,
}

impl SegmentationOutput {
    /// Chunks longer than `max_chars`.
    pub fn oversized(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| c.chars().count() > self.max_chars)
            .count()
    }
}

// ── CPI ──────────────────────────────────────────────────────────────────

/// One report that went through the table pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub path: PathBuf,
    pub report_date: chrono::NaiveDate,
    /// 1-indexed page the table was read from.
    pub page: usize,
    /// Column labels after header reconstruction.
    pub labels: Vec<String>,
    pub body_rows: usize,
    pub tidy_rows: usize,
}

/// Everything produced by [`crate::normalize_reports`].
#[derive(Debug, Clone, Serialize)]
pub struct CpiOutput {
    pub reports: Vec<ReportSummary>,
    pub dataset: TidyDataset,
    pub series: Vec<SeriesPoint>,
}
