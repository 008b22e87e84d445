//! # model-fetch
//!
//! Materialise large remote artifacts (model weights, the PDFium shared
//! library) on local disk exactly once.
//!
//! ## Guarantees
//!
//! 1. **Existence is completeness.** A file already present at the
//!    destination is never re-fetched and no checksum is taken.
//! 2. **No truncated files.** The body is streamed in 64 KiB chunks into a
//!    staging file next to the destination and renamed into place only after
//!    the last byte arrived. A transport error, a non-2xx status or a short
//!    body drops the staging file, so nothing appears at the destination.
//! 3. **Bounded memory.** Multi-gigabyte safetensors files never sit in
//!    memory as a whole.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use model_fetch::{ensure, DownloadTarget};
//!
//! let target = DownloadTarget::for_model_dir(
//!     "https://huggingface.co/org/model/resolve/main/model.safetensors?download=true",
//!     "models/got",
//! )
//! .expect("url has a file name");
//!
//! let ready = ensure(&target, Some(&|downloaded, total| {
//!     if let Some(t) = total {
//!         eprint!("\r{downloaded}/{t} bytes");
//!     }
//! }));
//! assert!(ready);
//! ```

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info};

pub mod pdfium;

pub use pdfium::{bind_pdfium, ensure_pdfium_library, is_pdfium_cached, pdfium_cache_dir};

/// Read buffer size for streamed transfers.
const CHUNK_SIZE: usize = 64 * 1024;

/// Progress callback: `(bytes_downloaded, total_size_option)`.
pub type ProgressFn<'a> = &'a dyn Fn(u64, Option<u64>);

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by fetch operations.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The current OS/architecture combination has no PDFium build.
    #[error("Unsupported platform: {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    /// The URL has no usable last path segment to name the local file.
    #[error("Cannot derive a file name from '{url}'")]
    InvalidUrl { url: String },

    /// Local file-system operation failed.
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Connection, TLS, redirect or mid-body read failure.
    #[error("GET {url} failed: {reason}")]
    Transport { url: String, reason: String },

    /// The server answered with a non-success status.
    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// The connection closed before the announced length was received.
    #[error("Transfer of {url} ended after {received} of {expected} bytes")]
    Truncated {
        url: String,
        received: u64,
        expected: u64,
    },

    /// gzip/tar extraction failed.
    #[error("Archive extraction failed: {0}")]
    Extract(String),

    /// `pdfium-render` could not load the library.
    #[error("Failed to bind PDFium from '{path}': {reason}")]
    Bind { path: PathBuf, reason: String },
}

// ── Targets ──────────────────────────────────────────────────────────────────

/// A remote artifact and the local path it must end up at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    pub url: String,
    pub destination: PathBuf,
}

impl DownloadTarget {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
        }
    }

    /// Place the artifact inside `dir`, named after the last segment of the
    /// URL path. Query strings such as `?download=true` are ignored.
    pub fn for_model_dir(url: &str, dir: impl AsRef<Path>) -> Result<Self, FetchError> {
        let name = file_name_from_url(url).ok_or_else(|| FetchError::InvalidUrl {
            url: url.to_string(),
        })?;
        Ok(Self::new(url, dir.as_ref().join(name)))
    }
}

/// Last non-empty path segment of `url`, without query or fragment.
pub fn file_name_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    if last.is_empty() {
        None
    } else {
        Some(last.to_string())
    }
}

/// What [`fetch`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// The destination existed; no network access happened.
    AlreadyPresent,
    /// The artifact was transferred in full.
    Downloaded { bytes: u64 },
}

// ── Public API ───────────────────────────────────────────────────────────────

/// Make sure `target.destination` exists, downloading it when absent.
///
/// Returns `true` when the artifact is ready to use. Failures are logged and
/// reported as `false`; use [`fetch`] to inspect the error.
pub fn ensure(target: &DownloadTarget, on_progress: Option<ProgressFn<'_>>) -> bool {
    match fetch(target, on_progress) {
        Ok(FetchStatus::AlreadyPresent) => {
            debug!("Artifact already present: {}", target.destination.display());
            true
        }
        Ok(FetchStatus::Downloaded { bytes }) => {
            info!(
                "Downloaded {} bytes to {}",
                bytes,
                target.destination.display()
            );
            true
        }
        Err(e) => {
            error!("Could not materialise {}: {}", target.destination.display(), e);
            false
        }
    }
}

/// Fallible form of [`ensure`].
pub fn fetch(
    target: &DownloadTarget,
    on_progress: Option<ProgressFn<'_>>,
) -> Result<FetchStatus, FetchError> {
    if target.destination.exists() {
        return Ok(FetchStatus::AlreadyPresent);
    }

    let parent = match target.destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|e| FetchError::Io {
        path: parent.clone(),
        source: e,
    })?;

    info!("Downloading {} → {}", target.url, target.destination.display());
    let bytes = stream_to_file(&target.url, &parent, &target.destination, on_progress)?;

    Ok(FetchStatus::Downloaded { bytes })
}

// ── Internal helpers ─────────────────────────────────────────────────────────

fn http_client(url: &str) -> Result<reqwest::blocking::Client, FetchError> {
    reqwest::blocking::Client::builder()
        .user_agent(concat!("model-fetch/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .connect_timeout(Duration::from_secs(30))
        // Weights can take many minutes; only the connect phase is bounded.
        .timeout(None::<Duration>)
        .build()
        .map_err(|e| FetchError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        })
}

/// Streams `url` into a staging file inside `staging_dir`, then renames it to
/// `destination`. Returns the number of body bytes written.
fn stream_to_file(
    url: &str,
    staging_dir: &Path,
    destination: &Path,
    on_progress: Option<ProgressFn<'_>>,
) -> Result<u64, FetchError> {
    let client = http_client(url)?;

    let mut response = client.get(url).send().map_err(|e| FetchError::Transport {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    let total = response.content_length();

    // Dropping the staging file on any early return deletes it.
    let mut staging = tempfile::Builder::new()
        .prefix(".download-")
        .suffix(".part")
        .tempfile_in(staging_dir)
        .map_err(|e| FetchError::Io {
            path: staging_dir.to_path_buf(),
            source: e,
        })?;

    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut downloaded: u64 = 0;

    loop {
        match response.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                staging
                    .write_all(&chunk[..n])
                    .map_err(|e| FetchError::Io {
                        path: staging.path().to_path_buf(),
                        source: e,
                    })?;
                downloaded += n as u64;
                if let Some(cb) = on_progress {
                    cb(downloaded, total);
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(FetchError::Transport {
                    url: url.to_string(),
                    reason: format!("read error after {downloaded} bytes: {e}"),
                });
            }
        }
    }

    if let Some(expected) = total {
        if downloaded != expected {
            return Err(FetchError::Truncated {
                url: url.to_string(),
                received: downloaded,
                expected,
            });
        }
    }

    staging.as_file().sync_all().map_err(|e| FetchError::Io {
        path: staging.path().to_path_buf(),
        source: e,
    })?;

    staging.persist(destination).map_err(|e| FetchError::Io {
        path: destination.to_path_buf(),
        source: e.error,
    })?;

    Ok(downloaded)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
