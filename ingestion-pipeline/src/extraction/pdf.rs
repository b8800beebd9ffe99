use std::path::Path;

use ::common::error::AppError;
use image::DynamicImage;
use pdfium_render::prelude::*;

/// Magnification applied when rasterizing a page for OCR; high enough to
/// keep small glyphs legible.
pub const RENDER_SCALE: f32 = 3.0;

pub trait PageRasterizer: Send + Sync {
    fn render(&self, pdf_path: &Path, page_no: u32) -> Result<DynamicImage, AppError>;
}

/// Rasterizes pages through the system pdfium library.
pub struct PdfiumRasterizer {
    scale: f32,
}

impl PdfiumRasterizer {
    pub fn new() -> Self {
        Self {
            scale: RENDER_SCALE,
        }
    }
}

impl Default for PdfiumRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn render(&self, pdf_path: &Path, page_no: u32) -> Result<DynamicImage, AppError> {
        let bindings = Pdfium::bind_to_system_library()
            .map_err(|err| AppError::Processing(format!("failed to bind pdfium: {err}")))?;
        let pdfium = Pdfium::new(bindings);

        let document = pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|err| AppError::Processing(format!("failed to open PDF for rendering: {err}")))?;

        let index = page_no.saturating_sub(1) as u16;
        let page = document.pages().get(index).map_err(|err| {
            AppError::Processing(format!("page {page_no} not available for rendering: {err}"))
        })?;

        let bitmap = page
            .render_with_config(&PdfRenderConfig::new().scale_page_by_factor(self.scale))
            .map_err(|err| {
                AppError::Processing(format!("failed to rasterize page {page_no}: {err}"))
            })?;

        Ok(bitmap.as_image())
    }
}

/// Reads the embedded text layer, one string per page.
pub fn extract_page_texts(bytes: &[u8]) -> Result<Vec<String>, AppError> {
    pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|err| AppError::Processing(format!("failed to read PDF text layer: {err}")))
}
