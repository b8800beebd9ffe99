//! Shared fixtures for pipeline tests: tiny in-memory PDFs and scripted
//! OCR/rasterizer doubles.

use std::{
    io::Write,
    path::Path,
    sync::atomic::{AtomicUsize, Ordering},
};

use common::error::AppError;
use image::{DynamicImage, GrayImage};
use lopdf::{
    content::{Content, Operation},
    dictionary, Document, Object, Stream,
};
use tempfile::NamedTempFile;

use crate::extraction::{
    ocr::{OcrEngine, OcrParams, OcrToken},
    pdf::PageRasterizer,
};

/// Builds a minimal one-page PDF whose text layer holds `text`.
pub fn single_page_pdf(text: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 712.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        content.encode().expect("content stream encodes"),
    ));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Resources" => resources_id,
    });

    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("pdf serializes");
    bytes
}

pub fn write_temp_pdf(bytes: &[u8]) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".pdf")
        .tempfile()
        .expect("temp pdf created");
    file.write_all(bytes).expect("temp pdf written");
    file
}

/// OCR double that returns the same token list for every call and counts
/// invocations.
pub struct CountingOcr {
    tokens: Vec<OcrToken>,
    calls: AtomicUsize,
}

impl CountingOcr {
    pub fn returning(tokens: Vec<OcrToken>) -> Self {
        Self {
            tokens,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl OcrEngine for CountingOcr {
    fn recognize(&self, _image: &GrayImage, _params: &OcrParams) -> Result<Vec<OcrToken>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.tokens.clone())
    }
}

/// OCR double whose output depends on the configuration it is called with.
pub struct ScriptedOcr {
    script: Box<dyn Fn(&OcrParams) -> Vec<OcrToken> + Send + Sync>,
    calls: AtomicUsize,
}

impl ScriptedOcr {
    pub fn by_params(script: impl Fn(&OcrParams) -> Vec<OcrToken> + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl OcrEngine for ScriptedOcr {
    fn recognize(&self, _image: &GrayImage, params: &OcrParams) -> Result<Vec<OcrToken>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((self.script)(params))
    }
}

/// Rasterizer double: either serves a blank canvas or refuses to be called.
pub struct StubRasterizer {
    image: Option<DynamicImage>,
}

impl StubRasterizer {
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            image: Some(DynamicImage::ImageLuma8(GrayImage::from_pixel(
                width,
                height,
                image::Luma([255u8]),
            ))),
        }
    }

    pub fn failing() -> Self {
        Self { image: None }
    }
}

impl PageRasterizer for StubRasterizer {
    fn render(&self, _pdf_path: &Path, page_no: u32) -> Result<DynamicImage, AppError> {
        self.image.clone().ok_or_else(|| {
            AppError::Processing(format!(
                "rasterizer should not have been called for page {page_no}"
            ))
        })
    }
}
