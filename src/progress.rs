//! Progress-callback trait for per-chunk narration events.
//!
//! Inject an [`Arc<dyn NarrationProgressCallback>`] via
//! [`crate::config::NarrationConfigBuilder::progress_callback`] to receive
//! events as each chunk is synthesised and written. The CLI uses this to
//! drive its progress bar.
//!
//! # Example
//!
//! ```rust
//! use bookworks::{NarrationConfig, NarrationProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     written: AtomicUsize,
//! }
//!
//! impl NarrationProgressCallback for CountingCallback {
//!     fn on_chunk_complete(&self, index: usize, total: usize, audio_bytes: usize) {
//!         self.written.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("chunk {}/{} ({} bytes)", index + 1, total, audio_bytes);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { written: AtomicUsize::new(0) });
//! let config = NarrationConfig::builder()
//!     .progress_callback(counter as Arc<dyn NarrationProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the narration pipeline as it processes each chunk.
///
/// All methods default to no-ops so callers only override what they need.
/// Chunks are processed sequentially, in order; `index` is 0-based and
/// matches the `NN` in the output file name.
pub trait NarrationProgressCallback: Send + Sync {
    /// Called once after segmentation, before the first request.
    fn on_narration_start(&self, total_chunks: usize) {
        let _ = total_chunks;
    }

    /// Called just before the speech request for a chunk is sent.
    fn on_chunk_start(&self, index: usize, total: usize, chars: usize) {
        let _ = (index, total, chars);
    }

    /// Called after a chunk's audio file has been written.
    fn on_chunk_complete(&self, index: usize, total: usize, audio_bytes: usize) {
        let _ = (index, total, audio_bytes);
    }

    /// Called when a chunk fails after all retries; the run stops after this.
    fn on_chunk_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once when every chunk has been written.
    fn on_narration_complete(&self, total_chunks: usize, audio_bytes: usize) {
        let _ = (total_chunks, audio_bytes);
    }
}

/// The default when no callback is configured.
pub struct NoopProgressCallback;

impl NarrationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::NarrationConfig`].
pub type ProgressCallback = Arc<dyn NarrationProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        bytes: AtomicUsize,
    }

    impl NarrationProgressCallback for TrackingCallback {
        fn on_chunk_start(&self, _index: usize, _total: usize, _chars: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_chunk_complete(&self, _index: usize, _total: usize, audio_bytes: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
            self.bytes.fetch_add(audio_bytes, Ordering::SeqCst);
        }

        fn on_chunk_error(&self, _index: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_narration_start(3);
        cb.on_chunk_start(0, 3, 100);
        cb.on_chunk_complete(0, 3, 2048);
        cb.on_chunk_error(1, 3, "rate limited");
        cb.on_narration_complete(3, 2048);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = Arc::new(TrackingCallback::default());
        let cb: ProgressCallback = tracker.clone();

        cb.on_chunk_start(0, 2, 10);
        cb.on_chunk_complete(0, 2, 300);
        cb.on_chunk_start(1, 2, 12);
        cb.on_chunk_error(1, 2, "timeout");

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.bytes.load(Ordering::SeqCst), 300);
    }
}
