//! Progress-callback trait for batch OCR events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::OcrConfigBuilder::progress_callback`] to receive events
//! as the batch walks its inputs. The CLI forwards them to an `indicatif`
//! bar; library callers can forward them anywhere.
//!
//! # Example
//!
//! ```rust
//! use ocrbrain::{BatchProgressCallback, OcrConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     pages: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, _path: &str, page: usize, total: usize, text_len: usize) {
//!         self.pages.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {}/{} done ({} bytes)", page, total, text_len);
//!     }
//! }
//!
//! let config = OcrConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { pages: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::batch::BatchSummary;
use std::path::Path;
use std::sync::Arc;

/// Called by the batch runner as it processes each input.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Events arrive in order from one task at a time;
/// `on_token` may be called from a blocking worker thread.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once after discovery.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called before a file is loaded or rendered.
    ///
    /// # Arguments
    /// * `index`: 1-indexed position in the batch
    fn on_file_start(&self, index: usize, total_files: usize, path: &str) {
        let _ = (index, total_files, path);
    }

    /// Called before each generation. Images report page 1 of 1.
    fn on_page_start(&self, path: &str, page_num: usize, total_pages: usize) {
        let _ = (path, page_num, total_pages);
    }

    /// Called when a page has been transcribed.
    ///
    /// # Arguments
    /// * `text_len`: byte length of the transcription
    fn on_page_complete(
        &self,
        path: &str,
        page_num: usize,
        total_pages: usize,
        text_len: usize,
    ) {
        let _ = (path, page_num, total_pages, text_len);
    }

    /// Streamed text while a page is being generated (`--stream`).
    fn on_token(&self, piece: &str) {
        let _ = piece;
    }

    /// Called after the file's record has been written.
    fn on_file_complete(&self, path: &str, output: &Path) {
        let _ = (path, output);
    }

    /// Called when a file produced no output.
    fn on_file_error(&self, path: &str, error: &str) {
        let _ = (path, error);
    }

    /// Called once at the end of the batch.
    fn on_batch_complete(&self, summary: &BatchSummary) {
        let _ = summary;
    }
}

/// No-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Type stored in [`crate::config::OcrConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
