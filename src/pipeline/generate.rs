//! Generation adapter: one image + one [`GenerationPlan`] → transcription.
//!
//! ## Sequence
//!
//! 1. encode the image twice ([`ImagePass::Base`], [`ImagePass::HighDetail`]);
//! 2. tokenize the prompt and the stop sequence;
//! 3. generate greedily with a [`KeywordStop`] on the stop sequence;
//! 4. decode only the ids after the prompt, strip a trailing stop sequence,
//!    trim whitespace.
//!
//! The optional streamer sees text while it is produced; the returned string
//! is computed from the token ids alone, so attaching a streamer never
//! changes the result.

use crate::engine::{
    DecodeOptions, GenerateRequest, GenerationEngine, ImagePass, KeywordStop, TextStreamer,
};
use crate::error::OcrError;
use crate::prompts::GenerationPlan;
use image::DynamicImage;
use std::time::Instant;
use tracing::debug;

/// Run one OCR generation against `engine`.
pub fn run_generation<E: GenerationEngine>(
    engine: &mut E,
    plan: &GenerationPlan,
    image: &DynamicImage,
    options: &DecodeOptions,
    streamer: Option<TextStreamer<'_>>,
) -> Result<String, OcrError> {
    let start = Instant::now();

    let base = engine.encode_image(image, ImagePass::Base)?;
    let high = engine.encode_image(image, ImagePass::HighDetail)?;
    let images = [(base, high)];

    let input_ids = engine.tokenize(&plan.prompt_text)?;
    let stop_ids = engine.tokenize(&plan.stop_sequence)?;
    let stopping = KeywordStop::new(stop_ids, input_ids.len());

    let output_ids = engine.generate(GenerateRequest {
        input_ids: &input_ids,
        images: &images,
        options,
        stopping: &stopping,
        streamer,
    })?;

    let generated = output_ids.get(input_ids.len()..).unwrap_or(&[]);
    let text = engine.decode(generated)?;

    debug!(
        "Generated {} tokens in {:?}",
        generated.len(),
        start.elapsed()
    );

    Ok(strip_stop_sequence(&text, &plan.stop_sequence))
}

/// Trim, drop one trailing `stop`, trim again.
pub fn strip_stop_sequence(text: &str, stop: &str) -> String {
    let trimmed = text.trim();
    let without = if stop.is_empty() {
        trimmed
    } else {
        trimmed.strip_suffix(stop).unwrap_or(trimmed)
    };
    without.trim().to_string()
}
