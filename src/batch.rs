//! Batch orchestration: discover → classify → transcribe → persist.
//!
//! ## Flow
//!
//! ```text
//! input ─┬─ URL       → download to TempDir ─┐
//!        ├─ file      → classify ────────────┤
//!        └─ directory → recursive walk ──────┤
//!                                            ▼
//!                   for each file, strictly in order:
//!                     image → load → plan → generate ──────────────┐
//!                     pdf   → render → per page: plan → generate ─┤
//!                                                                  ▼
//!                                                         OutputWriter
//! ```
//!
//! Files are processed one after another and the engine sees at most one
//! generation at a time. Blocking work (decode, rasterise, generate) runs on
//! Tokio's blocking pool.
//!
//! A failure while handling one file is logged, counted and skipped; only
//! [`OcrError::InputNotFound`] and [`OcrError::UnsupportedInput`] for the
//! top-level input abort the run, and they do so before any output file is
//! touched.

use crate::config::OcrConfig;
use crate::engine::{EngineHandle, GenerationEngine};
use crate::error::OcrError;
use crate::output::{DocumentResult, OutputWriter, PageResult};
use crate::pipeline::generate::run_generation;
use crate::pipeline::input::{self, InputFile, InputKind};
use crate::pipeline::render::{render_pages, PdfRasterizer};
use crate::progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
use crate::prompts::build_plan;
use image::DynamicImage;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// What happened to the files of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Supported files found.
    pub discovered: usize,
    /// Files whose record reached disk.
    pub written: usize,
    /// Files that failed to load, transcribe or write.
    pub failed: usize,
    /// PDFs that rendered to zero pages.
    pub skipped: usize,
}

/// Outcome of processing one file.
enum FileOutcome {
    Written(PathBuf),
    Skipped,
}

/// Runs batches against one engine and one rasterizer.
pub struct BatchRunner<E: GenerationEngine, R: PdfRasterizer> {
    engine: EngineHandle<E>,
    rasterizer: Arc<R>,
    config: OcrConfig,
}

impl<E: GenerationEngine, R: PdfRasterizer> BatchRunner<E, R> {
    pub fn new(engine: EngineHandle<E>, rasterizer: R, config: OcrConfig) -> Self {
        Self {
            engine,
            rasterizer: Arc::new(rasterizer),
            config,
        }
    }

    fn callback(&self) -> ProgressCallback {
        self.config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback))
    }

    /// Process every file reachable from `input` (path or URL).
    pub async fn run(&self, input: &str) -> Result<BatchSummary, OcrError> {
        let start = Instant::now();
        let cb = self.callback();

        // The download guard must outlive processing.
        let (files, _download) = if input::is_url(input) {
            match input::download_url(input, self.config.download_timeout_secs).await {
                Ok(downloaded) => (vec![downloaded.file.clone()], Some(downloaded)),
                Err(e @ OcrError::UnsupportedInput { .. }) => return Err(e),
                Err(e) => {
                    error!("{}", e);
                    cb.on_file_error(input, &e.to_string());
                    let summary = BatchSummary {
                        discovered: 1,
                        failed: 1,
                        ..BatchSummary::default()
                    };
                    cb.on_batch_complete(&summary);
                    return Ok(summary);
                }
            }
        } else {
            (input::discover(Path::new(input))?, None)
        };

        let mut summary = BatchSummary {
            discovered: files.len(),
            ..BatchSummary::default()
        };

        if files.is_empty() {
            warn!("No supported files found under {}", input);
        } else {
            info!("Found {} file(s) to process", files.len());
        }
        cb.on_batch_start(files.len());

        let mut writer = OutputWriter::new(&self.config.output_dir);
        let total = files.len();

        for (idx, file) in files.iter().enumerate() {
            cb.on_file_start(idx + 1, total, &file.label);
            info!("Processing {} ({}/{})", file.label, idx + 1, total);

            match self.process_file(file, &mut writer, cb.as_ref()).await {
                Ok(FileOutcome::Written(path)) => {
                    info!("Results saved to {}", path.display());
                    cb.on_file_complete(&file.label, &path);
                    summary.written += 1;
                }
                Ok(FileOutcome::Skipped) => {
                    summary.skipped += 1;
                }
                Err(e) => {
                    error!("Error processing {}: {}", file.label, e);
                    cb.on_file_error(&file.label, &e.to_string());
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Batch complete in {:?}: {} written, {} failed, {} skipped",
            start.elapsed(),
            summary.written,
            summary.failed,
            summary.skipped
        );
        cb.on_batch_complete(&summary);
        Ok(summary)
    }

    async fn process_file(
        &self,
        file: &InputFile,
        writer: &mut OutputWriter,
        cb: &dyn BatchProgressCallback,
    ) -> Result<FileOutcome, OcrError> {
        let result = match file.kind {
            InputKind::Image => {
                let path = file.path.clone();
                let image = tokio::task::spawn_blocking(move || input::load_image(&path))
                    .await
                    .map_err(|e| OcrError::Internal(format!("Image load task panicked: {e}")))??;

                cb.on_page_start(&file.label, 1, 1);
                let text = self.transcribe(image).await?;
                cb.on_page_complete(&file.label, 1, 1, text.len());
                DocumentResult::image(file.label.clone(), text)
            }
            InputKind::Pdf => {
                let images = render_pages(Arc::clone(&self.rasterizer), &file.path).await;
                if images.is_empty() {
                    error!("Could not convert PDF {} to images", file.label);
                    return Ok(FileOutcome::Skipped);
                }

                let total_pages = images.len();
                let mut pages = Vec::with_capacity(total_pages);
                for (idx, image) in images.into_iter().enumerate() {
                    let page_num = idx + 1;
                    cb.on_page_start(&file.label, page_num, total_pages);
                    debug!("Processing page {}/{} of {}", page_num, total_pages, file.label);

                    match self.transcribe(image).await {
                        Ok(text) => {
                            cb.on_page_complete(&file.label, page_num, total_pages, text.len());
                            pages.push(PageResult {
                                page: page_num,
                                ocr_result: text,
                            });
                        }
                        Err(e) => {
                            warn!("Page {} of {} failed: {}", page_num, file.label, e);
                        }
                    }
                }

                if pages.is_empty() {
                    return Err(OcrError::PdfRenderFailed {
                        path: file.path.clone(),
                        detail: format!("all {total_pages} page(s) failed to transcribe"),
                    });
                }
                DocumentResult::pdf(file.label.clone(), pages)
            }
        };

        writer.write(&result).await.map(FileOutcome::Written)
    }

    /// Plan and generate for one unit of work on the blocking pool.
    async fn transcribe(&self, image: DynamicImage) -> Result<String, OcrError> {
        let engine = self.engine.clone();
        let request = self.config.request();
        let decode = self.config.decode.clone();
        let cb = self.config.progress_callback.clone().filter(|_| self.config.stream_tokens);

        tokio::task::spawn_blocking(move || {
            let plan = build_plan(&request, image.width(), image.height())?;
            let forward = |piece: &str| {
                if let Some(cb) = &cb {
                    cb.on_token(piece);
                }
            };
            let streamer = cb.as_ref().map(|_| &forward as &(dyn Fn(&str) + Sync));

            engine.with(|e| run_generation(e, &plan, &image, &decode, streamer))?
        })
        .await
        .map_err(|e| OcrError::Internal(format!("Generation task panicked: {e}")))?
    }
}
