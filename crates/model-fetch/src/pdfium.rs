//! PDFium shared-library provisioning.
//!
//! The rasteriser needs a platform `libpdfium`. Resolution order:
//!
//! 1. `PDFIUM_LIB_PATH` pointing at an existing file.
//! 2. `{cache}/pdfium-{VERSION}/{lib_name}` from an earlier run.
//! 3. Download the release archive into the cache through [`crate::fetch`],
//!    extract the library, delete the archive.
//!
//! The cache root defaults to the platform cache dir (`~/.cache/ocrbrain` on
//! Linux) and can be moved with `OCRBRAIN_CACHE_DIR`.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use pdfium_render::prelude::Pdfium;
use tracing::{debug, warn};

use crate::{fetch, DownloadTarget, FetchError, ProgressFn};

/// The pdfium-binaries release tag used for downloads.
pub const PDFIUM_VERSION: &str = "7690";

const BASE_URL: &str = "https://github.com/bblanchon/pdfium-binaries/releases/download";

struct PlatformInfo {
    /// Asset filename in the release, e.g. `pdfium-linux-x64.tgz`.
    archive_name: &'static str,
    /// Path inside the archive.
    lib_path_in_archive: &'static str,
    /// Filename written to the cache.
    lib_name: &'static str,
}

fn detect_platform() -> Result<PlatformInfo, FetchError> {
    let (archive_name, lib_path_in_archive, lib_name) =
        match (std::env::consts::OS, std::env::consts::ARCH) {
            ("macos", "aarch64") => (
                "pdfium-mac-arm64.tgz",
                "lib/libpdfium.dylib",
                "libpdfium.dylib",
            ),
            ("macos", "x86_64") => ("pdfium-mac-x64.tgz", "lib/libpdfium.dylib", "libpdfium.dylib"),
            ("linux", "x86_64") => ("pdfium-linux-x64.tgz", "lib/libpdfium.so", "libpdfium.so"),
            ("linux", "aarch64") => ("pdfium-linux-arm64.tgz", "lib/libpdfium.so", "libpdfium.so"),
            ("windows", "x86_64") => ("pdfium-win-x64.tgz", "bin/pdfium.dll", "pdfium.dll"),
            ("windows", "aarch64") => ("pdfium-win-arm64.tgz", "bin/pdfium.dll", "pdfium.dll"),
            (os, arch) => {
                return Err(FetchError::UnsupportedPlatform {
                    os: os.to_string(),
                    arch: arch.to_string(),
                })
            }
        };

    Ok(PlatformInfo {
        archive_name,
        lib_path_in_archive,
        lib_name,
    })
}

/// Per-version cache directory for the PDFium library.
pub fn pdfium_cache_dir() -> PathBuf {
    let root = match std::env::var("OCRBRAIN_CACHE_DIR") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::cache_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
            .unwrap_or_else(std::env::temp_dir)
            .join("ocrbrain"),
    };
    root.join(format!("pdfium-{PDFIUM_VERSION}"))
}

static RESOLVED_PATH: OnceLock<PathBuf> = OnceLock::new();

fn env_override() -> Option<PathBuf> {
    let p = PathBuf::from(std::env::var("PDFIUM_LIB_PATH").ok()?);
    if p.exists() {
        Some(p)
    } else {
        warn!("PDFIUM_LIB_PATH '{}' not found; using the cache", p.display());
        None
    }
}

/// `true` when no download is needed to bind PDFium.
pub fn is_pdfium_cached() -> bool {
    env_override().is_some()
        || detect_platform()
            .map(|info| pdfium_cache_dir().join(info.lib_name).exists())
            .unwrap_or(false)
}

/// Resolves the PDFium library path, downloading it on first use.
///
/// The result is memoised for the lifetime of the process.
pub fn ensure_pdfium_library(on_progress: Option<ProgressFn<'_>>) -> Result<PathBuf, FetchError> {
    if let Some(path) = RESOLVED_PATH.get() {
        return Ok(path.clone());
    }

    let path = match env_override() {
        Some(p) => p,
        None => provision_into_cache(on_progress)?,
    };

    let _ = RESOLVED_PATH.set(path.clone());
    Ok(path)
}

/// Binds PDFium, provisioning the library first if necessary.
pub fn bind_pdfium() -> Result<Pdfium, FetchError> {
    let path = ensure_pdfium_library(None)?;
    Pdfium::bind_to_library(&path)
        .map(Pdfium::new)
        .map_err(|e| FetchError::Bind {
            path,
            reason: e.to_string(),
        })
}

fn provision_into_cache(on_progress: Option<ProgressFn<'_>>) -> Result<PathBuf, FetchError> {
    let info = detect_platform()?;
    let cache_dir = pdfium_cache_dir();
    let lib_path = cache_dir.join(info.lib_name);

    if lib_path.exists() {
        return Ok(lib_path);
    }

    let archive = DownloadTarget::new(
        format!("{BASE_URL}/chromium%2F{PDFIUM_VERSION}/{}", info.archive_name),
        cache_dir.join(info.archive_name),
    );
    fetch(&archive, on_progress)?;

    let extracted = extract_library(&archive.destination, info.lib_path_in_archive, &lib_path);
    if let Err(e) = std::fs::remove_file(&archive.destination) {
        debug!("Could not remove {}: {}", archive.destination.display(), e);
    }
    extracted?;

    Ok(lib_path)
}

/// Extracts a single entry of a gzipped tar archive into `dest_path`.
fn extract_library(
    archive_path: &Path,
    entry_name: &str,
    dest_path: &Path,
) -> Result<(), FetchError> {
    use flate2::read::GzDecoder;
    use tar::Archive;

    let file = std::fs::File::open(archive_path).map_err(|e| FetchError::Io {
        path: archive_path.to_path_buf(),
        source: e,
    })?;
    let mut archive = Archive::new(GzDecoder::new(file));

    for entry in archive
        .entries()
        .map_err(|e| FetchError::Extract(e.to_string()))?
    {
        let mut entry = entry.map_err(|e| FetchError::Extract(e.to_string()))?;
        let matches = entry
            .path()
            .map(|p| p.to_string_lossy() == entry_name)
            .map_err(|e| FetchError::Extract(e.to_string()))?;

        if matches {
            entry
                .unpack(dest_path)
                .map_err(|e| FetchError::Extract(format!("unpack failed: {e}")))?;
            return Ok(());
        }
    }

    Err(FetchError::Extract(format!(
        "'{entry_name}' not found in {}",
        archive_path.display()
    )))
}
