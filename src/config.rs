//! Configuration for a batch OCR run.
//!
//! Everything that shapes a run's output lives in [`OcrConfig`], built via
//! [`OcrConfigBuilder`]. Settings read from YAML files (model location,
//! endpoint) live in [`crate::settings`]; this struct holds the per-run
//! knobs that usually come from the command line.

use crate::engine::DecodeOptions;
use crate::error::OcrError;
use crate::pipeline::render::DEFAULT_DPI;
use crate::progress::ProgressCallback;
use crate::prompts::{DocumentType, OcrRequest, Region};
use std::fmt;
use std::path::PathBuf;

/// Configuration for one batch run.
///
/// # Example
/// ```rust
/// use ocrbrain::{DocumentType, OcrConfig};
///
/// let config = OcrConfig::builder()
///     .document_type(DocumentType::Formatted)
///     .region(vec![10.0, 20.0, 300.0, 400.0])
///     .output_dir("out")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct OcrConfig {
    /// Plain or formatted transcription. Default: plain.
    pub document_type: DocumentType,

    /// Region hint in source pixels, applied to every unit of work.
    pub region: Option<Region>,

    /// Colour hint, e.g. `"red"`.
    pub color: Option<String>,

    /// PDF rasterisation DPI. Range: 72–600. Default: 300.
    pub dpi: u32,

    /// Decoding knobs handed to the engine.
    pub decode: DecodeOptions,

    /// Directory receiving `<basename>.json` files. Default: `results`.
    pub output_dir: PathBuf,

    /// Forward generated text to [`crate::BatchProgressCallback::on_token`].
    pub stream_tokens: bool,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    pub progress_callback: Option<ProgressCallback>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            document_type: DocumentType::default(),
            region: None,
            color: None,
            dpi: DEFAULT_DPI,
            decode: DecodeOptions::default(),
            output_dir: PathBuf::from("results"),
            stream_tokens: false,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for OcrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrConfig")
            .field("document_type", &self.document_type)
            .field("region", &self.region)
            .field("color", &self.color)
            .field("dpi", &self.dpi)
            .field("decode", &self.decode)
            .field("output_dir", &self.output_dir)
            .field("stream_tokens", &self.stream_tokens)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl OcrConfig {
    /// Create a new builder for `OcrConfig`.
    pub fn builder() -> OcrConfigBuilder {
        OcrConfigBuilder {
            config: Self::default(),
        }
    }

    /// The request every unit of work in this run is transcribed with.
    pub fn request(&self) -> OcrRequest {
        OcrRequest {
            document_type: self.document_type,
            region: self.region.clone(),
            color: self.color.clone(),
        }
    }
}

/// Builder for [`OcrConfig`].
#[derive(Debug)]
pub struct OcrConfigBuilder {
    config: OcrConfig,
}

impl OcrConfigBuilder {
    pub fn document_type(mut self, document_type: DocumentType) -> Self {
        self.config.document_type = document_type;
        self
    }

    pub fn region(mut self, region: impl Into<Region>) -> Self {
        self.config.region = Some(region.into());
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.config.color = Some(color.into());
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_new_tokens(mut self, n: usize) -> Self {
        self.config.decode.max_new_tokens = n;
        self
    }

    pub fn decode(mut self, decode: DecodeOptions) -> Self {
        self.config.decode = decode;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn stream_tokens(mut self, v: bool) -> Self {
        self.config.stream_tokens = v;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<OcrConfig, OcrError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(OcrError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.decode.max_new_tokens == 0 {
            return Err(OcrError::InvalidConfig(
                "max_new_tokens must be ≥ 1".into(),
            ));
        }
        if let Some(region) = &c.region {
            region.validate()?;
        }
        if matches!(&c.color, Some(color) if color.trim().is_empty()) {
            return Err(OcrError::InvalidConfig("color must not be empty".into()));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopProgressCallback;
    use std::sync::Arc;

    #[test]
    fn defaults() {
        let c = OcrConfig::default();
        assert_eq!(c.dpi, 300);
        assert_eq!(c.document_type, DocumentType::Plain);
        assert_eq!(c.output_dir, PathBuf::from("results"));
        assert_eq!(c.decode.max_new_tokens, 4096);
        assert!(c.region.is_none() && c.color.is_none());
    }

    #[test]
    fn builder_sets_request_fields() {
        let c = OcrConfig::builder()
            .document_type(DocumentType::Formatted)
            .region(vec![1.0, 2.0])
            .color("green")
            .build()
            .unwrap();
        let req = c.request();
        assert_eq!(req.document_type, DocumentType::Formatted);
        assert_eq!(req.region, Some(Region(vec![1.0, 2.0])));
        assert_eq!(req.color.as_deref(), Some("green"));
    }

    #[test]
    fn build_rejects_bad_values() {
        assert!(matches!(
            OcrConfig::builder().dpi(50).build(),
            Err(OcrError::InvalidConfig(_))
        ));
        assert!(matches!(
            OcrConfig::builder().region(vec![1.0, 2.0, 3.0]).build(),
            Err(OcrError::InvalidRegion { .. })
        ));
        assert!(OcrConfig::builder().color("  ").build().is_err());
        assert!(OcrConfig::builder().max_new_tokens(0).build().is_err());
    }

    #[test]
    fn debug_hides_callback() {
        let c = OcrConfig::builder()
            .progress_callback(Arc::new(NoopProgressCallback))
            .build()
            .unwrap();
        let dbg = format!("{:?}", c);
        assert!(dbg.contains("<dyn BatchProgressCallback>"));
    }
}
