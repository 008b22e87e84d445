//! Input discovery and loading.
//!
//! A run starts from one user-supplied string: a file, a directory, or an
//! HTTP(S) URL. This module turns it into an ordered list of [`InputFile`]s
//! and loads individual images.
//!
//! ## Ordering
//!
//! Directory walks follow file-system enumeration order, top-down: a
//! directory's own files come before those of its subdirectories. The order
//! is **not** sorted and may differ between platforms.

use crate::error::OcrError;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Recognised image extensions (lower case, without the dot).
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];
/// Recognised document extensions.
pub const PDF_EXTENSIONS: &[&str] = &["pdf"];

/// How a discovered file is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Image,
    Pdf,
}

/// Classify by extension only, case-insensitively.
pub fn classify(path: &Path) -> Option<InputKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(InputKind::Image)
    } else if PDF_EXTENSIONS.contains(&ext.as_str()) {
        Some(InputKind::Pdf)
    } else {
        None
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// One unit of discovery: a local file plus the name it is reported under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    /// Where the bytes are on disk.
    pub path: PathBuf,
    pub kind: InputKind,
    /// Recorded as `input_path` in the output (the URL for downloads).
    pub label: String,
}

impl InputFile {
    pub fn local(path: PathBuf, kind: InputKind) -> Self {
        let label = path.to_string_lossy().into_owned();
        Self { path, kind, label }
    }
}

/// Discover the files to process under a local `input` path.
///
/// * file → itself, or [`OcrError::UnsupportedInput`] for an unknown
///   extension;
/// * directory → every supported file below it (others silently skipped);
/// * missing → [`OcrError::InputNotFound`].
pub fn discover(input: &Path) -> Result<Vec<InputFile>, OcrError> {
    if input.is_dir() {
        info!("Processing all supported files in directory: {}", input.display());
        let mut found = Vec::new();
        walk(input, &mut found);
        return Ok(found);
    }

    if input.is_file() {
        return match classify(input) {
            Some(kind) => Ok(vec![InputFile::local(input.to_path_buf(), kind)]),
            None => Err(OcrError::UnsupportedInput {
                path: input.to_path_buf(),
            }),
        };
    }

    Err(OcrError::InputNotFound {
        path: input.to_path_buf(),
    })
}

fn walk(dir: &Path, found: &mut Vec<InputFile>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot read directory {}: {}", dir.display(), e);
            return;
        }
    };

    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        // `DirEntry::file_type` does not follow symlinks.
        let is_link = entry.file_type().map(|t| t.is_symlink()).unwrap_or(false);
        if path.is_dir() {
            if is_link {
                debug!("Not following directory symlink {}", path.display());
            } else {
                subdirs.push(path);
            }
        } else if let Some(kind) = classify(&path) {
            found.push(InputFile::local(path, kind));
        } else {
            debug!("Skipping unsupported file {}", path.display());
        }
    }

    for sub in subdirs {
        walk(&sub, found);
    }
}

/// Load an image from disk as RGB.
pub fn load_image(path: &Path) -> Result<DynamicImage, OcrError> {
    let img = image::open(path).map_err(|e| OcrError::ImageLoad {
        source_ref: path.display().to_string(),
        detail: e.to_string(),
    })?;
    Ok(DynamicImage::ImageRgb8(img.to_rgb8()))
}

/// A URL input downloaded into a temporary directory.
///
/// The `TempDir` is kept alive until processing completes.
pub struct DownloadedInput {
    pub file: InputFile,
    _temp_dir: TempDir,
}

/// Classify a URL by the extension of its last path segment.
pub fn classify_url(url: &str) -> Option<(InputKind, String)> {
    let name = model_fetch::file_name_from_url(url)?;
    let kind = classify(Path::new(&name))?;
    Some((kind, name))
}

/// Download a URL input to a temporary directory.
///
/// Download failures surface as the error of the kind being fetched:
/// [`OcrError::ImageLoad`] for images, [`OcrError::PdfRenderFailed`] for PDFs.
pub async fn download_url(url: &str, timeout_secs: u64) -> Result<DownloadedInput, OcrError> {
    let (kind, filename) = classify_url(url).ok_or_else(|| OcrError::UnsupportedInput {
        path: PathBuf::from(url),
    })?;

    info!("Downloading input from: {}", url);

    let temp_dir = TempDir::new().map_err(|e| OcrError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let fail = |reason: String| match kind {
        InputKind::Image => OcrError::ImageLoad {
            source_ref: url.to_string(),
            detail: reason,
        },
        InputKind::Pdf => OcrError::PdfRenderFailed {
            path: PathBuf::from(url),
            detail: reason,
        },
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| fail(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            fail(format!("timed out after {timeout_secs}s"))
        } else {
            fail(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(fail(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| fail(e.to_string()))?;
    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| OcrError::Internal(format!("Failed to write temp file: {e}")))?;

    info!("Downloaded to: {}", file_path.display());

    Ok(DownloadedInput {
        file: InputFile {
            path: file_path,
            kind,
            label: url.to_string(),
        },
        _temp_dir: temp_dir,
    })
}
