//! The seam between the pipeline and the generation model.
//!
//! The model itself (tokenizer, vision encoder, decoder) is opaque to the
//! rest of the crate. The pipeline only needs the four capabilities of
//! [`GenerationEngine`]; [`crate::pipeline::generate`] composes them into a
//! single OCR call.
//!
//! ## Why a handle with a lock?
//!
//! A loaded model owns its weights and device memory and must serve one
//! generation at a time. [`EngineHandle`] makes that exclusivity explicit:
//! every call goes through [`EngineHandle::with`], which holds the mutex for
//! the whole encode → generate → decode sequence.

pub mod vlm;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::error::OcrError;

pub use vlm::VlmEngine;

/// Errors raised inside an engine implementation.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("tokenization failed: {0}")]
    Tokenize(String),

    #[error("detokenization failed: {0}")]
    Decode(String),

    #[error("image encoding failed: {0}")]
    ImageEncode(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// The two image views the model consumes per unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImagePass {
    /// Global, low-detail view.
    Base,
    /// High-detail view of the same image.
    HighDetail,
}

/// Decoding knobs passed to [`GenerationEngine::generate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeOptions {
    pub max_new_tokens: usize,
    pub do_sample: bool,
    pub num_beams: usize,
    /// Forbid repeating any n-gram of this size; guards against loops.
    pub no_repeat_ngram_size: Option<usize>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_new_tokens: 4096,
            do_sample: false,
            num_beams: 1,
            no_repeat_ngram_size: Some(20),
        }
    }
}

/// Decides after each generated token whether decoding should end.
///
/// `output_ids` is the full sequence so far, prompt included.
pub trait StoppingCriteria: Sync {
    fn should_stop(&self, output_ids: &[u32]) -> bool;
}

impl<F> StoppingCriteria for F
where
    F: Fn(&[u32]) -> bool + Sync,
{
    fn should_stop(&self, output_ids: &[u32]) -> bool {
        self(output_ids)
    }
}

/// Stops once the generated span ends with the tokenized keyword.
#[derive(Debug, Clone)]
pub struct KeywordStop {
    keyword_ids: Vec<u32>,
    prompt_len: usize,
}

impl KeywordStop {
    pub fn new(keyword_ids: Vec<u32>, prompt_len: usize) -> Self {
        Self {
            keyword_ids,
            prompt_len,
        }
    }
}

impl StoppingCriteria for KeywordStop {
    fn should_stop(&self, output_ids: &[u32]) -> bool {
        if self.keyword_ids.is_empty() {
            return false;
        }
        let generated = output_ids.get(self.prompt_len..).unwrap_or(&[]);
        generated.ends_with(&self.keyword_ids)
    }
}

/// Receives decoded text pieces while generation is running.
pub type TextStreamer<'a> = &'a (dyn Fn(&str) + Sync);

/// Everything one `generate` call needs.
pub struct GenerateRequest<'a, I> {
    pub input_ids: &'a [u32],
    /// One `(base, high_detail)` pair per image slot in the prompt.
    pub images: &'a [(I, I)],
    pub options: &'a DecodeOptions,
    pub stopping: &'a dyn StoppingCriteria,
    pub streamer: Option<TextStreamer<'a>>,
}

/// A loaded vision-language model.
pub trait GenerationEngine: Send + 'static {
    /// Engine-specific encoded image (a tensor, an upload payload, …).
    type Image: Send;

    fn encode_image(&self, image: &DynamicImage, pass: ImagePass)
        -> Result<Self::Image, EngineError>;

    fn tokenize(&self, text: &str) -> Result<Vec<u32>, EngineError>;

    fn decode(&self, tokens: &[u32]) -> Result<String, EngineError>;

    /// Returns the prompt ids followed by the generated ids.
    fn generate(&mut self, request: GenerateRequest<'_, Self::Image>)
        -> Result<Vec<u32>, EngineError>;
}

/// Shared, exclusive handle to the single loaded engine.
pub struct EngineHandle<E> {
    inner: Arc<Mutex<E>>,
}

impl<E> Clone for EngineHandle<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: GenerationEngine> EngineHandle<E> {
    pub fn new(engine: E) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    /// Run `f` with exclusive access to the engine.
    pub fn with<R>(&self, f: impl FnOnce(&mut E) -> R) -> Result<R, OcrError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| OcrError::Internal("generation engine lock poisoned".into()))?;
        Ok(f(&mut guard))
    }
}
