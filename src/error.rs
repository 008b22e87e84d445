//! Error types for the ocrbrain library.
//!
//! Errors fall into two groups that the orchestrator treats differently:
//!
//! * **Run-fatal**: [`OcrError::ConfigMissing`], [`OcrError::ConfigParse`]
//!   and [`OcrError::ArtifactFetchFailed`]. Nothing can be transcribed
//!   without a model, so the binary exits with status 1 before touching any
//!   input or output file.
//!
//! * **Unit-local**: everything raised while handling one file or one page
//!   ([`OcrError::ImageLoad`], [`OcrError::PdfRenderFailed`],
//!   [`OcrError::OutputWriteFailed`], [`OcrError::Engine`], …). The batch logs
//!   it, skips that unit's output and carries on with the next file.

use crate::engine::EngineError;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the ocrbrain library.
#[derive(Debug, Error)]
pub enum OcrError {
    // ── Configuration ─────────────────────────────────────────────────────
    /// A required configuration key is absent from every source.
    #[error("Configuration key '{key}' is not set.\nAdd it to one of: {sources}")]
    ConfigMissing { key: String, sources: String },

    /// A configuration file exists but is not valid YAML.
    #[error("Failed to parse configuration file '{path}': {detail}")]
    ConfigParse { path: PathBuf, detail: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Model artifact ────────────────────────────────────────────────────
    /// The model weights are absent and could not be downloaded.
    #[error(
        "Model artifact '{destination}' is unavailable and could not be fetched from '{url}'.\n\
Check your internet connection, or place the file there manually."
    )]
    ArtifactFetchFailed { url: String, destination: PathBuf },

    /// The generation backend could not be initialised.
    #[error("Generation engine is not available: {hint}")]
    EngineUnavailable { hint: String },

    // ── Input ─────────────────────────────────────────────────────────────
    /// Input path does not exist.
    #[error("Input path not found: '{path}'")]
    InputNotFound { path: PathBuf },

    /// A single-file input whose extension is neither an image nor a PDF.
    #[error(
        "Unsupported file type: '{path}'.\n\
Supported: .png .jpg .jpeg .gif .bmp .webp and .pdf"
    )]
    UnsupportedInput { path: PathBuf },

    /// Image could not be read, fetched or decoded.
    #[error("Failed to load image '{source_ref}': {detail}")]
    ImageLoad { source_ref: String, detail: String },

    /// PDF could not be rasterised (corrupt file, missing pdfium, …).
    #[error("Failed to render PDF '{path}': {detail}")]
    PdfRenderFailed { path: PathBuf, detail: String },

    // ── Prompt ────────────────────────────────────────────────────────────
    /// The region hint is malformed; rejected before the engine runs.
    #[error("Invalid region: {detail}")]
    InvalidRegion { detail: String },

    // ── Generation ────────────────────────────────────────────────────────
    /// The engine failed while tokenising, encoding or generating.
    #[error("Generation failed: {0}")]
    Engine(#[from] EngineError),

    // ── Output ────────────────────────────────────────────────────────────
    /// Could not create or write an output JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (task panic, poisoned lock).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OcrError {
    /// `true` for errors that must stop the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            OcrError::ConfigMissing { .. }
                | OcrError::ConfigParse { .. }
                | OcrError::InvalidConfig(_)
                | OcrError::ArtifactFetchFailed { .. }
                | OcrError::EngineUnavailable { .. }
        )
    }
}
