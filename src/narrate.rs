//! Narration entry points: chapter HTML in, one audio file per chunk out.
//!
//! ```text
//! HTML ──▶ parse ──▶ clean ──▶ segment ──▶ synthesise ──▶ <prefix>-NN.mp3
//! ```
//!
//! Chunks are synthesised strictly in order, one request at a time. The
//! first chunk that still fails after `max_retries` aborts the run; files
//! already written stay on disk and are listed in the error log.

use crate::config::NarrationConfig;
use crate::error::BookworksError;
use crate::output::{ChunkResult, NarrationOutput, NarrationStats, SegmentationOutput};
use crate::pipeline::clean::clean_document;
use crate::pipeline::document::Document;
use crate::pipeline::input;
use crate::pipeline::segment::segment_document;
use crate::pipeline::speech::{OpenAiSpeech, SpeechSynthesizer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Narrate a rendered chapter (local path or URL).
///
/// The synthesiser is resolved before anything else, so a missing API key
/// fails with [`BookworksError::MissingCredential`] without touching the
/// input or the network.
pub async fn narrate(
    input_str: impl AsRef<str>,
    config: &NarrationConfig,
) -> Result<NarrationOutput, BookworksError> {
    let total_start = Instant::now();
    let input_str = input_str.as_ref();

    // ── Step 1: Speech provider ──────────────────────────────────────────
    let synthesizer = resolve_synthesizer(config)?;
    info!("Narrating {} with {}", input_str, synthesizer.name());

    // ── Step 2: Resolve and read input ───────────────────────────────────
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let html = resolved.read_to_string().await?;
    let prefix = config
        .file_prefix
        .clone()
        .unwrap_or_else(|| resolved.stem());

    // ── Step 3: Clean and segment ────────────────────────────────────────
    let segmented = segment_html(&html, input_str, config)?;
    let chunks = &segmented.chunks;
    let total = chunks.len();
    info!(
        "{} chunks to synthesise ({} subtrees replaced)",
        total, segmented.replaced_subtrees
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_narration_start(total);
    }

    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .map_err(|e| BookworksError::OutputWriteFailed {
            path: config.output_dir.clone(),
            source: e,
        })?;

    // ── Step 4: Synthesise sequentially ──────────────────────────────────
    let synth_start = Instant::now();
    let mut results = Vec::with_capacity(total);
    for (index, text) in chunks.iter().enumerate() {
        let chars = text.chars().count();
        if let Some(ref cb) = config.progress_callback {
            cb.on_chunk_start(index, total, chars);
        }

        let chunk_start = Instant::now();
        let (audio, retries) = match synthesize_with_retry(&synthesizer, index, text, config).await
        {
            Ok(ok) => ok,
            Err(e) => {
                warn!(
                    "Chunk {} failed; {} of {} files written before abort",
                    index,
                    results.len(),
                    total
                );
                if let Some(ref cb) = config.progress_callback {
                    cb.on_chunk_error(index, total, &e.to_string());
                }
                return Err(e);
            }
        };

        let path = chunk_path(&config.output_dir, &prefix, index, &config.response_format);
        write_atomic(&path, &audio).await?;
        debug!("Wrote {}", path.display());

        if let Some(ref cb) = config.progress_callback {
            cb.on_chunk_complete(index, total, audio.len());
        }
        results.push(ChunkResult {
            index,
            path,
            chars,
            audio_bytes: audio.len(),
            duration_ms: chunk_start.elapsed().as_millis() as u64,
            retries,
        });
    }

    let stats = NarrationStats {
        total_chunks: total,
        total_chars: results.iter().map(|r| r.chars).sum(),
        total_audio_bytes: results.iter().map(|r| r.audio_bytes).sum(),
        replaced_subtrees: segmented.replaced_subtrees,
        oversized_chunks: segmented.oversized(),
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        synthesis_duration_ms: synth_start.elapsed().as_millis() as u64,
    };

    info!(
        "Narration complete: {} files, {} bytes, {}ms",
        stats.total_chunks, stats.total_audio_bytes, stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_narration_complete(total, stats.total_audio_bytes);
    }

    Ok(NarrationOutput {
        chunks: results,
        stats,
    })
}

/// Synchronous wrapper around [`narrate`].
///
/// Creates a temporary tokio runtime internally.
pub fn narrate_sync(
    input_str: impl AsRef<str>,
    config: &NarrationConfig,
) -> Result<NarrationOutput, BookworksError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| BookworksError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(narrate(input_str, config))
}

/// Clean and segment a chapter without synthesising anything.
///
/// Needs no API key.
pub async fn segment_file(
    input_str: impl AsRef<str>,
    config: &NarrationConfig,
) -> Result<SegmentationOutput, BookworksError> {
    let input_str = input_str.as_ref();
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let html = resolved.read_to_string().await?;
    segment_html(&html, input_str, config)
}

/// Parse, clean and segment HTML markup already in memory.
pub fn segment_html(
    html: &str,
    source_name: &str,
    config: &NarrationConfig,
) -> Result<SegmentationOutput, BookworksError> {
    let mut doc = Document::parse(html, source_name)?;
    let report = clean_document(&mut doc);
    let chunks = segment_document(&doc, &config.container_id, &config.segment_options())?;
    Ok(SegmentationOutput {
        chunks,
        replaced_subtrees: report.total(),
        max_chars: config.max_chunk_chars,
    })
}

/// `<dir>/<prefix>-<NN>.<format>`, index zero-padded to two digits.
pub fn chunk_path(dir: &Path, prefix: &str, index: usize, format: &str) -> PathBuf {
    dir.join(format!("{prefix}-{index:02}.{format}"))
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn resolve_synthesizer(
    config: &NarrationConfig,
) -> Result<Arc<dyn SpeechSynthesizer>, BookworksError> {
    if let Some(ref s) = config.synthesizer {
        debug!("Using injected synthesizer: {}", s.name());
        return Ok(Arc::clone(s));
    }
    Ok(Arc::new(OpenAiSpeech::from_config(config)?))
}

/// One chunk with exponential backoff on transient errors.
///
/// Returns the audio and the number of retries it took.
async fn synthesize_with_retry(
    synthesizer: &Arc<dyn SpeechSynthesizer>,
    index: usize,
    text: &str,
    config: &NarrationConfig,
) -> Result<(Vec<u8>, u32), BookworksError> {
    let mut attempt: u32 = 0;
    loop {
        match synthesizer.synthesize(index, text).await {
            Ok(audio) => return Ok((audio, attempt)),
            Err(e) if e.is_transient() && attempt < config.max_retries => {
                attempt += 1;
                let backoff = backoff_ms(&e, attempt, config);
                warn!(
                    "Chunk {}: {}; retry {}/{} after {}ms",
                    index, e, attempt, config.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }
            Err(e) if attempt > 0 => {
                return Err(BookworksError::ChunkFailed {
                    chunk: index,
                    retries: attempt,
                    detail: e.to_string(),
                })
            }
            Err(e) => return Err(e),
        }
    }
}

/// Delay before retry number `attempt` (1-based), capped at
/// `max_backoff_ms`. A `Retry-After` from the server replaces the
/// exponential schedule.
fn backoff_ms(error: &BookworksError, attempt: u32, config: &NarrationConfig) -> u64 {
    let requested = match error {
        BookworksError::RateLimitExceeded {
            retry_after_secs: Some(secs),
            ..
        } => secs.saturating_mul(1000),
        _ => config
            .retry_backoff_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1))),
    };
    requested.min(config.max_backoff_ms)
}

/// Write to `<path>.tmp`, then rename, so a crash never leaves a partial file.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), BookworksError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| BookworksError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(BookworksError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        });
    }
    Ok(())
}
