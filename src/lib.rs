//! # ocrbrain
//!
//! Batch OCR over images and PDFs with a vision-language generation model.
//!
//! Each input file becomes one JSON record: images carry a single
//! transcription, PDFs a list of per-page transcriptions in page order.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image / PDF / directory / URL
//!  │
//!  ├─ 1. Discover  walk directories, classify by extension
//!  ├─ 2. Render    rasterise PDF pages at 300 DPI (pdfium, spawn_blocking)
//!  ├─ 3. Plan      prompt template + region/colour hints + stop sequence
//!  ├─ 4. Generate  one call at a time through the engine handle
//!  └─ 5. Output    <basename>.json, one JSON object per line
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ocrbrain::{BatchRunner, EngineHandle, OcrConfig, PdfiumRasterizer, VlmEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = VlmEngine::from_settings(Some("ollama"), Some("got-ocr2"))?;
//!     let config = OcrConfig::builder().output_dir("results").build()?;
//!     let runner = BatchRunner::new(EngineHandle::new(engine), PdfiumRasterizer::default(), config);
//!     let summary = runner.run("scans/").await?;
//!     eprintln!("{} written, {} failed", summary.written, summary.failed);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocrbrain` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod settings;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{BatchRunner, BatchSummary};
pub use config::{OcrConfig, OcrConfigBuilder};
pub use engine::{DecodeOptions, EngineError, EngineHandle, GenerationEngine, VlmEngine};
pub use error::OcrError;
pub use output::{DocumentResult, OutputWriter, PageResult, Payload};
pub use pipeline::input::InputKind;
pub use pipeline::render::{PdfRasterizer, PdfiumRasterizer};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::{build_plan, DocumentType, GenerationPlan, OcrRequest, Region};
pub use settings::{ModelSettings, Settings};
