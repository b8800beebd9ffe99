use std::process::Command;

use common::error::AppError;
use image::GrayImage;

/// One OCR engine configuration: a page segmentation assumption passed to
/// the engine alongside the preprocessed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OcrParams {
    pub label: &'static str,
    pub psm: u8,
}

/// Segmentation assumptions tried for every preprocessing variant.
pub const OCR_PARAM_GRID: [OcrParams; 3] = [
    OcrParams {
        label: "block",
        psm: 6,
    },
    OcrParams {
        label: "column",
        psm: 4,
    },
    OcrParams {
        label: "sparse",
        psm: 11,
    },
];

/// A recognized token. `confidence` is `None` when the engine reported its
/// "no confidence" sentinel for the word.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrToken {
    pub text: String,
    pub confidence: Option<f32>,
}

pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &GrayImage, params: &OcrParams) -> Result<Vec<OcrToken>, AppError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct OcrOutcome {
    pub text: String,
    pub confidence: f32,
}

/// Runs every (variant, configuration) pair through the engine and keeps the
/// single highest-confidence non-empty result; ties keep the first found.
/// When every combination comes back empty the outcome is empty text with
/// zero confidence, which downstream chunking turns into zero chunks.
pub fn best_ocr_outcome(
    engine: &dyn OcrEngine,
    variants: &[GrayImage],
) -> Result<OcrOutcome, AppError> {
    let mut best = OcrOutcome {
        text: String::new(),
        confidence: 0.0,
    };

    for variant in variants {
        for params in &OCR_PARAM_GRID {
            let tokens = engine.recognize(variant, params)?;

            let mut pieces = Vec::new();
            let mut scores = Vec::new();
            for token in tokens {
                let trimmed = token.text.trim();
                if trimmed.is_empty() {
                    continue;
                }
                pieces.push(trimmed.to_string());
                if let Some(confidence) = token.confidence {
                    scores.push(confidence);
                }
            }

            let text = pieces.join(" ");
            let confidence = if scores.is_empty() {
                0.0
            } else {
                scores.iter().sum::<f32>() / scores.len() as f32
            };

            if !text.is_empty() && confidence > best.confidence {
                best = OcrOutcome { text, confidence };
            }
        }
    }

    Ok(best)
}

/// Drives the `tesseract` binary in TSV mode, which reports one confidence
/// value per recognized word (`-1` for rows that carry no word).
pub struct TesseractCli {
    lang: String,
}

impl TesseractCli {
    pub fn new(lang: impl Into<String>) -> Self {
        Self { lang: lang.into() }
    }
}

impl OcrEngine for TesseractCli {
    fn recognize(&self, image: &GrayImage, params: &OcrParams) -> Result<Vec<OcrToken>, AppError> {
        let input = tempfile::Builder::new()
            .prefix("ocr-page-")
            .suffix(".png")
            .tempfile()?;
        image.save(input.path()).map_err(|err| {
            AppError::Processing(format!("failed to write OCR input image: {err}"))
        })?;

        let output = Command::new("tesseract")
            .arg(input.path())
            .arg("stdout")
            .args(["-l", &self.lang])
            .args(["--oem", "1"])
            .args(["--psm", &params.psm.to_string()])
            .arg("tsv")
            .output()?;

        if !output.status.success() {
            return Err(AppError::Processing(format!(
                "tesseract ({}) exited with {}: {}",
                params.label,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(parse_tsv(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn parse_tsv(raw: &str) -> Vec<OcrToken> {
    raw.lines()
        .skip(1)
        .filter_map(|line| {
            let columns: Vec<&str> = line.split('\t').collect();
            if columns.len() < 12 {
                return None;
            }
            let text = columns[11].trim();
            if text.is_empty() {
                return None;
            }
            let confidence = columns[10]
                .parse::<f32>()
                .ok()
                .filter(|confidence| *confidence >= 0.0);
            Some(OcrToken {
                text: text.to_string(),
                confidence,
            })
        })
        .collect()
}
