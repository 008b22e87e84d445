//! Shared fakes for the integration tests.

#![allow(dead_code)]

use image::DynamicImage;
use ocrbrain::engine::{EngineError, GenerateRequest, ImagePass};
use ocrbrain::{GenerationEngine, OcrError, PdfRasterizer};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Byte-level engine that answers `"<w>x<h> <prompt tail>"` for every image
/// and then keeps talking past the stop sequence.
#[derive(Clone, Default)]
pub struct ScriptedEngine {
    pub calls: Arc<AtomicUsize>,
    pub prompts: Arc<Mutex<Vec<String>>>,
    /// Replies used instead of the size echo, keyed by image width.
    pub replies: HashMap<u32, String>,
}

impl ScriptedEngine {
    pub fn with_reply(mut self, width: u32, reply: &str) -> Self {
        self.replies.insert(width, reply.to_string());
        self
    }
}

impl GenerationEngine for ScriptedEngine {
    type Image = (u32, u32);

    fn encode_image(
        &self,
        image: &DynamicImage,
        _pass: ImagePass,
    ) -> Result<Self::Image, EngineError> {
        Ok((image.width(), image.height()))
    }

    fn tokenize(&self, text: &str) -> Result<Vec<u32>, EngineError> {
        Ok(text.bytes().map(u32::from).collect())
    }

    fn decode(&self, tokens: &[u32]) -> Result<String, EngineError> {
        let bytes: Vec<u8> = tokens.iter().map(|&t| t as u8).collect();
        String::from_utf8(bytes).map_err(|e| EngineError::Decode(e.to_string()))
    }

    fn generate(
        &mut self,
        request: GenerateRequest<'_, Self::Image>,
    ) -> Result<Vec<u32>, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = self.decode(request.input_ids)?;
        self.prompts.lock().unwrap().push(prompt);

        let (w, h) = request.images[0].0;
        let body = self
            .replies
            .get(&w)
            .cloned()
            .unwrap_or_else(|| format!("{w}x{h}"));
        let reply = format!("{body}<|im_end|>trailing chatter");

        let mut out = request.input_ids.to_vec();
        for b in reply.bytes() {
            out.push(u32::from(b));
            if request.stopping.should_stop(&out) {
                break;
            }
        }
        if let Some(stream) = request.streamer {
            stream(&body);
        }
        Ok(out)
    }
}

/// Renders `pages[file name]` blank pages of width 100, 101, …; any other
/// PDF fails.
#[derive(Default)]
pub struct FakeRasterizer {
    pub pages: HashMap<String, u32>,
}

impl FakeRasterizer {
    pub fn with(mut self, name: &str, pages: u32) -> Self {
        self.pages.insert(name.to_string(), pages);
        self
    }
}

impl PdfRasterizer for FakeRasterizer {
    fn render(&self, pdf_path: &Path) -> Result<Vec<DynamicImage>, OcrError> {
        let name = pdf_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match self.pages.get(&name) {
            Some(&n) => Ok((0..n).map(|i| DynamicImage::new_rgb8(100 + i, 80)).collect()),
            None => Err(OcrError::PdfRenderFailed {
                path: pdf_path.to_path_buf(),
                detail: "not a PDF".into(),
            }),
        }
    }
}

/// Write a small RGB PNG of the given size.
pub fn write_png(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    image::RgbImage::new(width, height).save(path).unwrap();
}

/// Every JSON line of `path`.
pub fn json_lines(path: &Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}
