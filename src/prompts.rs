//! Prompt construction for the OCR model.
//!
//! Everything here is pure: the same [`OcrRequest`] and image size always
//! produce the same [`GenerationPlan`], which keeps prompt regressions
//! testable without loading a model.
//!
//! ## Prompt layout
//!
//! ```text
//! <|im_start|>system\n{preamble}<|im_end|>
//! <|im_start|>user\n<img><imgpad>×256</img>\n[{color}] [{x0}, {y0}, {x1}, {y1}] OCR: <|im_end|>
//! <|im_start|>assistant\n
//! ```
//!
//! (line breaks between turns added for readability only)

use crate::error::OcrError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Marks the start of the image slot in the prompt.
pub const IM_START_TOKEN: &str = "<img>";
/// One visual token position.
pub const IMAGE_PATCH_TOKEN: &str = "<imgpad>";
/// Marks the end of the image slot.
pub const IM_END_TOKEN: &str = "</img>";
/// Fixed visual-token budget of the model.
pub const IMAGE_TOKEN_LEN: usize = 256;

/// Coordinates are expressed on a 0–1000 grid in the prompt.
const COORD_SCALE: f64 = 1000.0;

// ── Conversation template ───────────────────────────────────────────────

/// A chat template with a single separator that doubles as the stop string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conversation {
    pub system: &'static str,
    pub user_role: &'static str,
    pub assistant_role: &'static str,
    pub sep: &'static str,
}

/// The "mpt"-style template the model was trained on.
pub const MPT_CONVERSATION: Conversation = Conversation {
    system: "<|im_start|>system\nYou should follow the instructions carefully and explain your answers in detail.",
    user_role: "<|im_start|>user\n",
    assistant_role: "<|im_start|>assistant\n",
    sep: "<|im_end|>",
};

impl Conversation {
    /// One user turn holding `message`, followed by an empty assistant turn.
    pub fn render_single_turn(&self, message: &str) -> String {
        format!(
            "{}{}{}{}{}{}",
            self.system, self.sep, self.user_role, message, self.sep, self.assistant_role
        )
    }

    /// Generation halts once this string has been produced.
    pub fn stop_sequence(&self) -> &'static str {
        self.sep
    }
}

// ── Request types ───────────────────────────────────────────────────────

/// Which transcription the model is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    /// Plain text.
    #[default]
    Plain,
    /// Formatted output (markdown / LaTeX / tables).
    #[serde(rename = "format")]
    Formatted,
}

impl DocumentType {
    pub fn instruction(&self) -> &'static str {
        match self {
            DocumentType::Plain => "OCR: ",
            DocumentType::Formatted => "OCR with format: ",
        }
    }
}

/// A region hint in source-image pixels: `[x, y]` or `[x0, y0, x1, y1]`.
///
/// Arity is checked by [`build_plan`], not on construction, so a malformed
/// region is always reported as [`OcrError::InvalidRegion`] before any
/// generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region(pub Vec<f64>);

impl From<Vec<f64>> for Region {
    fn from(coords: Vec<f64>) -> Self {
        Region(coords)
    }
}

impl Region {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check arity and finiteness.
    pub fn validate(&self) -> Result<(), OcrError> {
        if self.0.len() != 2 && self.0.len() != 4 {
            return Err(OcrError::InvalidRegion {
                detail: format!("expected 2 or 4 coordinates, got {}", self.0.len()),
            });
        }
        if let Some(bad) = self.0.iter().find(|c| !c.is_finite()) {
            return Err(OcrError::InvalidRegion {
                detail: format!("coordinate {bad} is not a finite number"),
            });
        }
        Ok(())
    }

    /// Rescale onto the 0–1000 grid. Even indices are x (against `width`),
    /// odd indices are y (against `height`).
    pub fn normalized(&self, width: u32, height: u32) -> Result<Vec<i64>, OcrError> {
        self.validate()?;
        if width == 0 || height == 0 {
            return Err(OcrError::InvalidRegion {
                detail: format!("image has zero extent ({width}x{height})"),
            });
        }

        Ok(self
            .0
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let dim = if i % 2 == 0 { width } else { height };
                (c / f64::from(dim) * COORD_SCALE).round() as i64
            })
            .collect())
    }
}

/// Parses `"[x0, y0, x1, y1]"`, `"(x, y)"` or a bare `"x0,y0,x1,y1"`.
///
/// Only numbers are accepted; the text is never evaluated.
impl FromStr for Region {
    type Err = OcrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let inner = trimmed
            .strip_prefix('[')
            .and_then(|t| t.strip_suffix(']'))
            .or_else(|| trimmed.strip_prefix('(').and_then(|t| t.strip_suffix(')')))
            .unwrap_or(trimmed);

        if inner.trim().is_empty() {
            return Err(OcrError::InvalidRegion {
                detail: format!("no coordinates in '{s}'"),
            });
        }

        let coords = inner
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<f64>()
                    .map_err(|_| OcrError::InvalidRegion {
                        detail: format!("'{}' is not a number", part.trim()),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Region(coords))
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

/// One unit of OCR intent: document type plus optional hints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrRequest {
    pub document_type: DocumentType,
    pub region: Option<Region>,
    pub color: Option<String>,
}

/// The fully rendered prompt and the string that ends generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationPlan {
    pub prompt_text: String,
    pub stop_sequence: String,
}

// ── Builder ─────────────────────────────────────────────────────────────

/// Turn a request into a prompt for an image of `width` × `height` pixels.
pub fn build_plan(
    request: &OcrRequest,
    width: u32,
    height: u32,
) -> Result<GenerationPlan, OcrError> {
    build_plan_with(&MPT_CONVERSATION, request, width, height)
}

/// [`build_plan`] against an explicit conversation template.
pub fn build_plan_with(
    conversation: &Conversation,
    request: &OcrRequest,
    width: u32,
    height: u32,
) -> Result<GenerationPlan, OcrError> {
    let mut query = request.document_type.instruction().to_string();

    if let Some(region) = &request.region {
        let scaled = region.normalized(width, height)?;
        query = format!("{} {}", render_list(&scaled), query);
    }

    if let Some(color) = &request.color {
        query = format!("[{color}] {query}");
    }

    let message = format!(
        "{}{}{}\n{}",
        IM_START_TOKEN,
        IMAGE_PATCH_TOKEN.repeat(IMAGE_TOKEN_LEN),
        IM_END_TOKEN,
        query
    );

    Ok(GenerationPlan {
        prompt_text: conversation.render_single_turn(&message),
        stop_sequence: conversation.stop_sequence().to_string(),
    })
}

fn render_list(values: &[i64]) -> String {
    let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(document_type: DocumentType) -> OcrRequest {
        OcrRequest {
            document_type,
            ..Default::default()
        }
    }

    #[test]
    fn plain_and_formatted_instructions() {
        let plain = build_plan(&request(DocumentType::Plain), 100, 100).unwrap();
        assert!(plain.prompt_text.contains("\nOCR: <|im_end|>"));
        assert!(!plain.prompt_text.contains("OCR with format: "));

        let fmt = build_plan(&request(DocumentType::Formatted), 100, 100).unwrap();
        assert!(fmt.prompt_text.contains("OCR with format: "));
    }

    #[test]
    fn prompt_follows_template() {
        let plan = build_plan(&request(DocumentType::Plain), 640, 480).unwrap();
        let expected_user = format!(
            "<|im_start|>user\n<img>{}</img>\nOCR: <|im_end|>",
            "<imgpad>".repeat(256)
        );
        assert!(plan.prompt_text.starts_with(
            "<|im_start|>system\nYou should follow the instructions carefully and explain your answers in detail.<|im_end|>"
        ));
        assert!(plan.prompt_text.contains(&expected_user));
        assert!(plan.prompt_text.ends_with("<|im_start|>assistant\n"));
        assert_eq!(plan.stop_sequence, "<|im_end|>");
        assert_eq!(plan.prompt_text.matches(IMAGE_PATCH_TOKEN).count(), IMAGE_TOKEN_LEN);
    }

    #[test]
    fn four_point_region_scales_per_axis() {
        let req = OcrRequest {
            region: Some(Region(vec![100.0, 50.0, 300.0, 150.0])),
            ..Default::default()
        };
        let plan = build_plan(&req, 400, 200).unwrap();
        assert!(plan.prompt_text.contains("\n[250, 250, 750, 750] OCR: "));
    }

    #[test]
    fn region_scaling_rounds() {
        let region = Region(vec![1.0, 2.0, 333.0, 666.0]);
        // 1/3*1000 = 333.33 → 333, 2/3*1000 = 666.67 → 667, 333/3*1000 = 111000
        assert_eq!(region.normalized(3, 3).unwrap(), vec![333, 667, 111000, 222000]);

        let region = Region(vec![1.0, 1.0]);
        // 1/1999*1000 = 0.50025 → 1 ; 1/2001*1000 = 0.49975 → 0
        assert_eq!(region.normalized(1999, 2001).unwrap(), vec![1, 0]);
    }

    #[test]
    fn region_scaling_is_deterministic() {
        let req = OcrRequest {
            region: Some(Region(vec![12.5, 99.0, 801.0, 333.3])),
            color: Some("red".into()),
            document_type: DocumentType::Formatted,
        };
        assert_eq!(build_plan(&req, 1024, 768).unwrap(), build_plan(&req, 1024, 768).unwrap());
    }

    #[test]
    fn two_point_region() {
        let req = OcrRequest {
            region: Some(Region(vec![50.0, 25.0])),
            ..Default::default()
        };
        let plan = build_plan(&req, 100, 100).unwrap();
        assert!(plan.prompt_text.contains("\n[500, 250] OCR: "));
    }

    #[test]
    fn invalid_region_arity_rejected() {
        for coords in [vec![1.0], vec![1.0, 2.0, 3.0], vec![], vec![1.0; 5]] {
            let req = OcrRequest {
                region: Some(Region(coords)),
                ..Default::default()
            };
            assert!(matches!(
                build_plan(&req, 100, 100),
                Err(OcrError::InvalidRegion { .. })
            ));
        }
    }

    #[test]
    fn zero_sized_image_rejected_with_region() {
        let req = OcrRequest {
            region: Some(Region(vec![1.0, 1.0])),
            ..Default::default()
        };
        assert!(build_plan(&req, 0, 10).is_err());
        // Without a region the size is irrelevant.
        assert!(build_plan(&OcrRequest::default(), 0, 0).is_ok());
    }

    #[test]
    fn color_precedes_region_and_instruction() {
        let req = OcrRequest {
            document_type: DocumentType::Formatted,
            region: Some(Region(vec![0.0, 0.0, 10.0, 10.0])),
            color: Some("green".into()),
        };
        let plan = build_plan(&req, 10, 10).unwrap();
        assert!(plan
            .prompt_text
            .contains("</img>\n[green] [0, 0, 1000, 1000] OCR with format: <|im_end|>"));
    }

    #[test]
    fn region_parses_typed_numbers_only() {
        assert_eq!(
            "[10, 20, 30.5, 40]".parse::<Region>().unwrap(),
            Region(vec![10.0, 20.0, 30.5, 40.0])
        );
        assert_eq!("(3,4)".parse::<Region>().unwrap(), Region(vec![3.0, 4.0]));
        assert_eq!("1,2,3".parse::<Region>().unwrap().len(), 3);
        assert!("[__import__('os')]".parse::<Region>().is_err());
        assert!("[]".parse::<Region>().is_err());
        assert!("[1,,2]".parse::<Region>().is_err());
    }

    #[test]
    fn document_type_serde_names() {
        assert_eq!(serde_json::to_string(&DocumentType::Plain).unwrap(), "\"plain\"");
        assert_eq!(serde_json::to_string(&DocumentType::Formatted).unwrap(), "\"format\"");
    }
}
