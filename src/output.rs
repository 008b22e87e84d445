//! Result types and the JSON output writer.
//!
//! Each input file produces one JSON object on one line in
//! `<output_dir>/<basename>.json`:
//!
//! ```text
//! {"input_path":"scans/a.png","type":"image","ocr_result":"…"}
//! {"input_path":"docs/b.pdf","type":"pdf","pages":[{"page":1,"ocr_result":"…"}]}
//! ```
//!
//! Image results append, so repeated runs accumulate lines. PDF results
//! replace the file the first time it is written in a run and append after
//! that, so two inputs sharing a basename never erase each other.

use crate::error::OcrError;
use crate::pipeline::input::{is_url, InputKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// One transcribed page of a PDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-indexed page number.
    pub page: usize,
    pub ocr_result: String,
}

/// Kind-specific part of a [`DocumentResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Payload {
    Image { ocr_result: String },
    Pdf { pages: Vec<PageResult> },
}

/// Everything recorded for one input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentResult {
    pub input_path: String,
    #[serde(flatten)]
    pub payload: Payload,
}

impl DocumentResult {
    pub fn image(input_path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            input_path: input_path.into(),
            payload: Payload::Image {
                ocr_result: text.into(),
            },
        }
    }

    pub fn pdf(input_path: impl Into<String>, pages: Vec<PageResult>) -> Self {
        Self {
            input_path: input_path.into(),
            payload: Payload::Pdf { pages },
        }
    }

    pub fn kind(&self) -> InputKind {
        match self.payload {
            Payload::Image { .. } => InputKind::Image,
            Payload::Pdf { .. } => InputKind::Pdf,
        }
    }

    /// Serialise as one JSON line. Non-ASCII text is kept literal.
    pub fn to_json_line(&self) -> Result<String, OcrError> {
        let mut line = serde_json::to_string(self)
            .map_err(|e| OcrError::Internal(format!("Failed to serialise result: {e}")))?;
        line.push('\n');
        Ok(line)
    }
}

/// How a record reaches its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Append,
    Truncate,
}

/// `<output_dir>/<basename(input_path)>.json`. URL inputs use the last path
/// segment.
pub fn output_path(output_dir: &Path, input_path: &str) -> PathBuf {
    let base = if is_url(input_path) {
        model_fetch::file_name_from_url(input_path)
    } else {
        Path::new(input_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
    };
    let base = base.unwrap_or_else(|| "output".to_string());
    output_dir.join(format!("{base}.json"))
}

/// Write one record to `path` using `mode`.
///
/// `Truncate` writes to a sibling temp file and renames it over `path`, so
/// a crash never leaves a half-written record behind. `Append` issues one
/// `write_all` of the whole line.
pub async fn write_record(path: &Path, line: &str, mode: WriteMode) -> Result<(), OcrError> {
    let io_err = |source: std::io::Error| OcrError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
    }

    match mode {
        WriteMode::Truncate => {
            let tmp = path.with_extension("json.tmp");
            tokio::fs::write(&tmp, line.as_bytes()).await.map_err(io_err)?;
            if let Err(e) = tokio::fs::rename(&tmp, path).await {
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(io_err(e));
            }
        }
        WriteMode::Append => {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .map_err(io_err)?;
            file.write_all(line.as_bytes()).await.map_err(io_err)?;
            file.flush().await.map_err(io_err)?;
        }
    }

    Ok(())
}

/// Per-run writer that remembers which files it has already replaced.
#[derive(Debug)]
pub struct OutputWriter {
    output_dir: PathBuf,
    replaced: HashSet<PathBuf>,
}

impl OutputWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            replaced: HashSet::new(),
        }
    }

    /// The mode the next write of a `kind` result to `path` would use.
    pub fn mode_for(&self, kind: InputKind, path: &Path) -> WriteMode {
        match kind {
            InputKind::Pdf if !self.replaced.contains(path) => WriteMode::Truncate,
            _ => WriteMode::Append,
        }
    }

    /// Persist `result`, returning the file it went to.
    pub async fn write(&mut self, result: &DocumentResult) -> Result<PathBuf, OcrError> {
        let path = output_path(&self.output_dir, &result.input_path);
        let mode = self.mode_for(result.kind(), &path);
        let line = result.to_json_line()?;

        write_record(&path, &line, mode).await?;
        debug!("Wrote {:?} record to {}", mode, path.display());

        if mode == WriteMode::Truncate {
            self.replaced.insert(path.clone());
        }
        Ok(path)
    }
}
