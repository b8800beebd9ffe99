pub mod ocr;
pub mod pdf;
pub mod preprocess;

use std::{path::Path, sync::Arc};

use common::error::AppError;
use tracing::{debug, info};

use self::ocr::{best_ocr_outcome, OcrEngine};
use self::pdf::PageRasterizer;
use self::preprocess::preprocess_variants;

/// Extraction result for one page. `ocr_confidence` is `None` when the text
/// came from the embedded layer, which is trusted unconditionally.
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub page_no: u32,
    pub text: String,
    pub ocr_confidence: Option<f32>,
}

/// Text-first page extractor: embedded text wins, OCR over the
/// variant/configuration grid is the fallback for pages without it.
pub struct PageExtractor {
    ocr: Arc<dyn OcrEngine>,
    rasterizer: Arc<dyn PageRasterizer>,
}

impl PageExtractor {
    pub fn new(ocr: Arc<dyn OcrEngine>, rasterizer: Arc<dyn PageRasterizer>) -> Self {
        Self { ocr, rasterizer }
    }

    /// Extracts every page of a PDF. All work here is blocking; callers run
    /// it under `spawn_blocking`.
    pub fn extract_pdf(&self, path: &Path) -> Result<Vec<PageText>, AppError> {
        let bytes = std::fs::read(path)?;
        let layers = pdf::extract_page_texts(&bytes)?;

        let mut pages = Vec::with_capacity(layers.len());
        for (index, layer) in layers.iter().enumerate() {
            let page_no = index as u32 + 1;

            if has_embedded_text(layer) {
                debug!(page = page_no, chars = layer.len(), "using embedded text layer");
                pages.push(PageText {
                    page_no,
                    text: layer.clone(),
                    ocr_confidence: None,
                });
                continue;
            }

            let rendered = self.rasterizer.render(path, page_no)?;
            let variants = preprocess_variants(&rendered);
            let outcome = best_ocr_outcome(self.ocr.as_ref(), &variants)?;
            info!(
                page = page_no,
                confidence = outcome.confidence,
                chars = outcome.text.len(),
                "page recognized via OCR"
            );
            pages.push(PageText {
                page_no,
                text: outcome.text,
                ocr_confidence: Some(outcome.confidence),
            });
        }

        Ok(pages)
    }

    /// Treats an image file as a single-page document and OCRs it.
    pub fn extract_image(&self, path: &Path) -> Result<Vec<PageText>, AppError> {
        let image = image::open(path)
            .map_err(|err| AppError::Processing(format!("failed to read image: {err}")))?;
        let variants = preprocess_variants(&image);
        let outcome = best_ocr_outcome(self.ocr.as_ref(), &variants)?;
        info!(
            confidence = outcome.confidence,
            chars = outcome.text.len(),
            "image recognized via OCR"
        );

        Ok(vec![PageText {
            page_no: 1,
            text: outcome.text,
            ocr_confidence: Some(outcome.confidence),
        }])
    }
}

/// At least one alphabetic character counts as a usable text layer; pure
/// numbers or whitespace do not.
pub fn has_embedded_text(text: &str) -> bool {
    text.chars().any(char::is_alphabetic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{single_page_pdf, write_temp_pdf, CountingOcr, StubRasterizer};
    use super::ocr::OcrToken;

    #[test]
    fn test_has_embedded_text_requires_letters() {
        assert!(has_embedded_text("Revenue grew 12%"));
        assert!(!has_embedded_text("123 456"));
        assert!(!has_embedded_text("   \n"));
        assert!(!has_embedded_text(""));
    }

    #[test]
    fn test_embedded_text_pages_never_invoke_ocr() {
        let ocr = Arc::new(CountingOcr::returning(Vec::new()));
        let rasterizer = Arc::new(StubRasterizer::failing());
        let extractor = PageExtractor::new(ocr.clone(), rasterizer);

        let file = write_temp_pdf(&single_page_pdf("Revenue grew 12% in Q1."));
        let pages = extractor.extract_pdf(file.path()).expect("extraction failed");

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].page_no, 1);
        assert!(pages[0].text.contains("Revenue grew 12% in Q1."));
        assert_eq!(pages[0].ocr_confidence, None);
        assert_eq!(ocr.calls(), 0, "OCR must not run for embedded text");
    }

    #[test]
    fn test_textless_page_falls_back_to_ocr_grid() {
        let ocr = Arc::new(CountingOcr::returning(vec![
            OcrToken {
                text: "SCANNED".into(),
                confidence: Some(72.0),
            },
            OcrToken {
                text: "LINE".into(),
                confidence: Some(68.0),
            },
        ]));
        let rasterizer = Arc::new(StubRasterizer::blank(32, 32));
        let extractor = PageExtractor::new(ocr.clone(), rasterizer);

        let file = write_temp_pdf(&single_page_pdf("12345"));
        let pages = extractor.extract_pdf(file.path()).expect("extraction failed");

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].text, "SCANNED LINE");
        assert_eq!(pages[0].ocr_confidence, Some(70.0));
        assert_eq!(ocr.calls(), 9, "3 variants x 3 configurations");
    }

    #[test]
    fn test_image_file_is_treated_as_a_single_ocr_page() {
        let ocr = Arc::new(CountingOcr::returning(vec![OcrToken {
            text: "PHOTOGRAPHED".into(),
            confidence: Some(81.0),
        }]));
        let extractor = PageExtractor::new(ocr.clone(), Arc::new(StubRasterizer::failing()));

        let file = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .expect("temp image created");
        image::GrayImage::from_pixel(24, 24, image::Luma([255u8]))
            .save(file.path())
            .expect("image written");

        let pages = extractor
            .extract_image(file.path())
            .expect("extraction failed");

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].page_no, 1);
        assert_eq!(pages[0].text, "PHOTOGRAPHED");
        assert_eq!(pages[0].ocr_confidence, Some(81.0));
        assert_eq!(ocr.calls(), 9);
    }

    #[test]
    fn test_exhausted_ocr_grid_returns_empty_text_with_zero_confidence() {
        let ocr = Arc::new(CountingOcr::returning(Vec::new()));
        let rasterizer = Arc::new(StubRasterizer::blank(16, 16));
        let extractor = PageExtractor::new(ocr, rasterizer);

        let file = write_temp_pdf(&single_page_pdf("4711"));
        let pages = extractor.extract_pdf(file.path()).expect("extraction failed");

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].text, "");
        assert_eq!(pages[0].ocr_confidence, Some(0.0));
    }
}
