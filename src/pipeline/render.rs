//! PDF rasterisation: one RGB image per page, in page order.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and is CPU-bound. [`render_pages`] moves the work onto Tokio's
//! blocking pool so the executor threads never stall.
//!
//! Pages are rendered at a fixed DPI by scaling each page's point size by
//! `dpi / 72` (PDF user space is 72 units per inch).

use crate::error::OcrError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Rendering resolution for OCR.
pub const DEFAULT_DPI: u32 = 300;

/// PDF user-space units per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// Turns a PDF into page images. Implementations are blocking.
pub trait PdfRasterizer: Send + Sync + 'static {
    /// All pages, first page first.
    fn render(&self, pdf_path: &Path) -> Result<Vec<DynamicImage>, OcrError>;
}

/// Rasterizer backed by pdfium.
#[derive(Debug, Clone, Copy)]
pub struct PdfiumRasterizer {
    dpi: u32,
}

impl PdfiumRasterizer {
    pub fn new(dpi: u32) -> Self {
        Self { dpi }
    }

    pub fn scale(&self) -> f32 {
        self.dpi as f32 / POINTS_PER_INCH
    }
}

impl Default for PdfiumRasterizer {
    fn default() -> Self {
        Self::new(DEFAULT_DPI)
    }
}

impl PdfRasterizer for PdfiumRasterizer {
    fn render(&self, pdf_path: &Path) -> Result<Vec<DynamicImage>, OcrError> {
        let fail = |detail: String| OcrError::PdfRenderFailed {
            path: pdf_path.to_path_buf(),
            detail,
        };

        let pdfium = model_fetch::bind_pdfium().map_err(|e| fail(e.to_string()))?;

        let document = pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| fail(format!("{:?}", e)))?;

        let pages = document.pages();
        info!("PDF loaded: {} pages", pages.len());

        let render_config = PdfRenderConfig::new().scale_page_by_factor(self.scale());

        let mut images = Vec::with_capacity(pages.len() as usize);
        for (idx, page) in pages.iter().enumerate() {
            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| fail(format!("page {}: {:?}", idx + 1, e)))?;

            let image = DynamicImage::ImageRgb8(bitmap.as_image().to_rgb8());
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
            images.push(image);
        }

        Ok(images)
    }
}

/// Render `pdf_path` off the async executor.
///
/// Failures are logged and reported as an empty list; the caller skips the
/// file.
pub async fn render_pages<R: PdfRasterizer>(
    rasterizer: Arc<R>,
    pdf_path: &Path,
) -> Vec<DynamicImage> {
    let path = pdf_path.to_path_buf();

    let result = tokio::task::spawn_blocking(move || rasterizer.render(&path))
        .await
        .map_err(|e| OcrError::Internal(format!("Render task panicked: {}", e)))
        .and_then(|r| r);

    match result {
        Ok(images) => images,
        Err(e) => {
            error!("{}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    impl PdfRasterizer for Failing {
        fn render(&self, pdf_path: &Path) -> Result<Vec<DynamicImage>, OcrError> {
            Err(OcrError::PdfRenderFailed {
                path: pdf_path.to_path_buf(),
                detail: "corrupt".into(),
            })
        }
    }

    struct Pages(u32);

    impl PdfRasterizer for Pages {
        fn render(&self, _pdf_path: &Path) -> Result<Vec<DynamicImage>, OcrError> {
            Ok((1..=self.0).map(|i| DynamicImage::new_rgb8(i, i)).collect())
        }
    }

    #[test]
    fn default_scale_is_300_dpi() {
        let r = PdfiumRasterizer::default();
        assert!((r.scale() - 300.0 / 72.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn failure_becomes_empty_sequence() {
        let pages = render_pages(Arc::new(Failing), Path::new("x.pdf")).await;
        assert!(pages.is_empty());
    }

    #[tokio::test]
    async fn page_order_is_preserved() {
        let pages = render_pages(Arc::new(Pages(3)), Path::new("x.pdf")).await;
        let widths: Vec<u32> = pages.iter().map(|p| p.width()).collect();
        assert_eq!(widths, vec![1, 2, 3]);
    }
}
