//! [`GenerationEngine`] backed by a vision endpoint reached through
//! `edgequake-llm` (an OpenAI-compatible server, Ollama, vLLM, …) that
//! serves the OCR model from the configured model directory.
//!
//! Token ids on this backend are UTF-8 bytes: the endpoint takes and returns
//! text, so byte ids let the pipeline slice off the echoed prompt and match
//! the stop sequence exactly as it would with a local tokenizer.
//!
//! Sampling controls the endpoint does not expose (`num_beams`,
//! `no_repeat_ngram_size`) are left to the server; decoding is always greedy
//! (`temperature = 0`).

use super::{DecodeOptions, EngineError, GenerateRequest, GenerationEngine, ImagePass};
use crate::error::OcrError;
use crate::pipeline::encode::{encode_image, ImageDetail};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use image::DynamicImage;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::debug;

/// Default model id requested from the endpoint.
pub const DEFAULT_MODEL: &str = "got-ocr2";

pub struct VlmEngine {
    provider: Arc<dyn LLMProvider>,
    runtime: Handle,
}

impl VlmEngine {
    /// Wrap an existing provider. Must be called from within a Tokio runtime.
    pub fn new(provider: Arc<dyn LLMProvider>) -> Result<Self, OcrError> {
        let runtime = Handle::try_current().map_err(|e| OcrError::EngineUnavailable {
            hint: format!("no Tokio runtime: {e}"),
        })?;
        Ok(Self { provider, runtime })
    }

    /// Resolve the provider from most-specific to least-specific:
    ///
    /// 1. `provider` (+ optional `model`) from configuration;
    /// 2. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` from the environment;
    /// 3. full auto-detection via [`ProviderFactory::from_env`].
    pub fn from_settings(provider: Option<&str>, model: Option<&str>) -> Result<Self, OcrError> {
        if let Some(name) = provider {
            return Self::new(create_provider(name, model.unwrap_or(DEFAULT_MODEL))?);
        }

        if let (Ok(prov), Ok(model)) = (
            std::env::var("EDGEQUAKE_LLM_PROVIDER"),
            std::env::var("EDGEQUAKE_MODEL"),
        ) {
            if !prov.is_empty() && !model.is_empty() {
                return Self::new(create_provider(&prov, &model)?);
            }
        }

        let (llm, _embedding) =
            ProviderFactory::from_env().map_err(|e| OcrError::EngineUnavailable {
                hint: format!(
                    "no vision endpoint configured.\n\
                    Set ocr.provider in config/models.yaml or EDGEQUAKE_LLM_PROVIDER.\n\
                    Error: {e}"
                ),
            })?;
        Self::new(llm)
    }
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, OcrError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| OcrError::EngineUnavailable {
        hint: format!("provider '{name}' with model '{model}': {e}"),
    })
}

fn byte_ids(text: &str) -> Vec<u32> {
    text.bytes().map(u32::from).collect()
}

fn text_from_byte_ids(ids: &[u32]) -> Result<String, EngineError> {
    let bytes = ids
        .iter()
        .map(|&t| u8::try_from(t).map_err(|_| EngineError::Decode(format!("id {t} is not a byte"))))
        .collect::<Result<Vec<u8>, _>>()?;
    String::from_utf8(bytes).map_err(|e| EngineError::Decode(e.to_string()))
}

fn build_options(options: &DecodeOptions) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(0.0),
        max_tokens: Some(options.max_new_tokens),
        ..Default::default()
    }
}

impl GenerationEngine for VlmEngine {
    type Image = ImageData;

    fn encode_image(
        &self,
        image: &DynamicImage,
        pass: ImagePass,
    ) -> Result<Self::Image, EngineError> {
        let detail = match pass {
            ImagePass::Base => ImageDetail::Low,
            ImagePass::HighDetail => ImageDetail::High,
        };
        encode_image(image, detail).map_err(|e| EngineError::ImageEncode(e.to_string()))
    }

    fn tokenize(&self, text: &str) -> Result<Vec<u32>, EngineError> {
        Ok(byte_ids(text))
    }

    fn decode(&self, tokens: &[u32]) -> Result<String, EngineError> {
        text_from_byte_ids(tokens)
    }

    fn generate(
        &mut self,
        request: GenerateRequest<'_, Self::Image>,
    ) -> Result<Vec<u32>, EngineError> {
        let prompt = self.decode(request.input_ids)?;
        let images: Vec<ImageData> = request
            .images
            .iter()
            .flat_map(|(base, high)| [base.clone(), high.clone()])
            .collect();

        debug!(
            "Sending prompt ({} bytes, {} images) to the vision endpoint",
            prompt.len(),
            images.len()
        );

        let messages = vec![ChatMessage::user_with_images(prompt.as_str(), images)];
        let options = build_options(request.options);

        let response = self
            .runtime
            .block_on(self.provider.chat(&messages, Some(&options)))
            .map_err(|e| EngineError::Backend(e.to_string()))?;

        let mut output = request.input_ids.to_vec();
        let mut buf = [0u8; 4];
        for ch in response.content.chars() {
            let piece = ch.encode_utf8(&mut buf);
            output.extend(piece.bytes().map(u32::from));
            if let Some(stream) = request.streamer {
                stream(piece);
            }
            if request.stopping.should_stop(&output) {
                break;
            }
        }

        debug!(
            "Generation finished: {} completion tokens reported",
            response.completion_tokens
        );
        Ok(output)
    }
}
