//! Layered YAML settings.
//!
//! Settings come from `appDev.yaml` then `models.yaml` in one directory.
//! Mappings are merged key by key and later files win, so `models.yaml` can
//! override a single nested key without repeating its siblings. A missing
//! file is skipped; an unparsable one is an error.
//!
//! ```yaml
//! # config/models.yaml
//! ocr:
//!   modelPath: ./models/got-ocr2
//!   downloadUrl: https://example.com/got-ocr2/model.safetensors
//!   provider: ollama      # optional
//!   model: got-ocr2       # optional
//! ```

use crate::error::OcrError;
use model_fetch::DownloadTarget;
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default directory holding the YAML files.
pub const DEFAULT_CONFIG_DIR: &str = "config";

/// Files read from the config directory, lowest precedence first.
pub const CONFIG_FILES: [&str; 2] = ["appDev.yaml", "models.yaml"];

pub const MODEL_PATH_KEY: &str = "ocr.modelPath";
pub const DOWNLOAD_URL_KEY: &str = "ocr.downloadUrl";
pub const PROVIDER_KEY: &str = "ocr.provider";
pub const MODEL_KEY: &str = "ocr.model";

/// The merged view over every settings file.
#[derive(Debug, Clone)]
pub struct Settings {
    root: Value,
    sources: Vec<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root: Value::Null,
            sources: Vec::new(),
        }
    }
}

impl Settings {
    /// Load [`CONFIG_FILES`] from `dir`.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, OcrError> {
        let paths: Vec<PathBuf> = CONFIG_FILES.iter().map(|f| dir.as_ref().join(f)).collect();
        Self::load_files(&paths)
    }

    /// Load `paths` in order; later files override earlier ones.
    pub fn load_files(paths: &[PathBuf]) -> Result<Self, OcrError> {
        let mut settings = Settings {
            root: Value::Null,
            sources: paths.to_vec(),
        };

        for path in paths {
            let text = match std::fs::read_to_string(path) {
                Ok(text) => text,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("Settings file {} not present, skipping", path.display());
                    continue;
                }
                Err(e) => {
                    return Err(OcrError::ConfigParse {
                        path: path.clone(),
                        detail: e.to_string(),
                    })
                }
            };

            let value: Value = serde_yaml::from_str(&text).map_err(|e| OcrError::ConfigParse {
                path: path.clone(),
                detail: e.to_string(),
            })?;
            debug!("Loaded settings from {}", path.display());
            settings.merge(value);
        }

        Ok(settings)
    }

    /// Parse a single YAML document. Used by tests and embedders.
    pub fn from_yaml_str(text: &str) -> Result<Self, OcrError> {
        let mut settings = Settings::default();
        let value: Value = serde_yaml::from_str(text).map_err(|e| OcrError::ConfigParse {
            path: PathBuf::from("<inline>"),
            detail: e.to_string(),
        })?;
        settings.merge(value);
        Ok(settings)
    }

    /// Overlay `value` on top of the current settings.
    pub fn merge(&mut self, value: Value) {
        merge_values(&mut self.root, value);
    }

    /// Look up a dotted key such as `ocr.modelPath`. Numbers and booleans
    /// are returned in their YAML spelling.
    pub fn get_str(&self, key: &str) -> Option<String> {
        let mut node = &self.root;
        for part in key.split('.') {
            node = node.get(part)?;
        }
        match node {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    fn require(&self, key: &str) -> Result<String, OcrError> {
        self.get_str(key)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| OcrError::ConfigMissing {
                key: key.to_string(),
                sources: self.describe_sources(),
            })
    }

    fn describe_sources(&self) -> String {
        if self.sources.is_empty() {
            return "<no settings files>".to_string();
        }
        self.sources
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// The typed `ocr` section. Fails with [`OcrError::ConfigMissing`] if a
    /// required key is absent.
    pub fn model_settings(&self) -> Result<ModelSettings, OcrError> {
        Ok(ModelSettings {
            model_path: PathBuf::from(self.require(MODEL_PATH_KEY)?),
            download_url: self.require(DOWNLOAD_URL_KEY)?,
            provider: self.get_str(PROVIDER_KEY),
            model: self.get_str(MODEL_KEY),
        })
    }
}

fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Where the model lives and how the engine endpoint is selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSettings {
    pub model_path: PathBuf,
    pub download_url: String,
    pub provider: Option<String>,
    pub model: Option<String>,
}

impl ModelSettings {
    /// `modelPath / basename(downloadUrl)`.
    pub fn download_target(&self) -> Result<DownloadTarget, OcrError> {
        DownloadTarget::for_model_dir(&self.download_url, &self.model_path).map_err(|e| {
            OcrError::InvalidConfig(format!("{DOWNLOAD_URL_KEY} '{}': {e}", self.download_url))
        })
    }
}
