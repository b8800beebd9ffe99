//! Score fusion for the hybrid retriever. Lexical BM25 ranks and vector
//! similarities live on non-comparable scales, so each candidate set is
//! z-score-normalized independently before the weighted sum; that keeps the
//! blend meaningful regardless of corpus size or query selectivity.

pub const SEMANTIC_WEIGHT: f32 = 0.6;
pub const LEXICAL_WEIGHT: f32 = 0.4;
pub const LOW_CONFIDENCE_THRESHOLD: f32 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZStats {
    pub mean: f32,
    pub std_dev: f32,
}

/// Sample statistics over the finite values only. Empty sets fall back to
/// mean 0 / stddev 1, and a zero stddev is treated as 1 so normalization
/// never divides by zero.
pub fn z_stats(values: &[f32]) -> ZStats {
    let finite: Vec<f32> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return ZStats {
            mean: 0.0,
            std_dev: 1.0,
        };
    }

    let mean = finite.iter().sum::<f32>() / finite.len() as f32;
    let denominator = (finite.len() - 1).max(1) as f32;
    let variance = finite.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / denominator;
    let std_dev = variance.sqrt();

    ZStats {
        mean,
        std_dev: if std_dev > 0.0 { std_dev } else { 1.0 },
    }
}

pub fn z_normalize(value: f32, stats: &ZStats) -> f32 {
    (value - stats.mean) / stats.std_dev
}

/// Down-weights low-confidence OCR text without ever zeroing it:
/// 0.85 at confidence 0, 1.0 at confidence 100. Embedded text (`None`)
/// is trusted fully.
pub fn confidence_multiplier(ocr_confidence: Option<f32>) -> f32 {
    let confidence = ocr_confidence.unwrap_or(100.0);
    0.85 + 0.15 * confidence.clamp(0.0, 100.0) / 100.0
}

pub fn is_low_confidence(ocr_confidence: Option<f32>) -> bool {
    ocr_confidence.is_some_and(|confidence| confidence < LOW_CONFIDENCE_THRESHOLD)
}

pub fn fuse_scores(semantic: f32, lexical: f32, ocr_confidence: Option<f32>) -> f32 {
    (SEMANTIC_WEIGHT * semantic + LEXICAL_WEIGHT * lexical)
        * confidence_multiplier(ocr_confidence)
}
