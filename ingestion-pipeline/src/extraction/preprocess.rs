use image::{imageops, DynamicImage, GrayImage};
use imageproc::{
    contrast::{adaptive_threshold, otsu_level, threshold, ThresholdType},
    filter::median_filter,
};

const ADAPTIVE_RADIUS_TIGHT: u32 = 15;
const ADAPTIVE_RADIUS_WIDE: u32 = 20;
const WIDE_VARIANT_BIAS: i32 = -8;

/// Produces the deterministic preprocessing variants fed to the OCR grid:
/// two adaptive thresholds with different window/bias parameters and one
/// global Otsu threshold.
pub fn preprocess_variants(image: &DynamicImage) -> Vec<GrayImage> {
    let gray = image.to_luma8();
    let denoised = median_filter(&gray, 1, 1);

    let tight = adaptive_threshold(&denoised, ADAPTIVE_RADIUS_TIGHT);
    let biased = imageops::brighten(&denoised, WIDE_VARIANT_BIAS);
    let wide = adaptive_threshold(&biased, ADAPTIVE_RADIUS_WIDE);
    let global = threshold(&denoised, otsu_level(&denoised), ThresholdType::Binary);

    vec![tight, wide, global]
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn synthetic_page() -> DynamicImage {
        let mut canvas = GrayImage::from_pixel(64, 64, Luma([230u8]));
        for x in 10..50 {
            for y in 20..28 {
                canvas.put_pixel(x, y, Luma([15u8]));
            }
        }
        DynamicImage::ImageLuma8(canvas)
    }

    #[test]
    fn test_produces_three_variants_with_source_dimensions() {
        let source = synthetic_page();
        let variants = preprocess_variants(&source);

        assert_eq!(variants.len(), 3);
        for variant in &variants {
            assert_eq!(variant.dimensions(), (64, 64));
        }
    }

    #[test]
    fn test_variants_are_binary() {
        let variants = preprocess_variants(&synthetic_page());
        for variant in &variants {
            assert!(variant
                .pixels()
                .all(|pixel| pixel.0[0] == 0 || pixel.0[0] == 255));
        }
    }

    #[test]
    fn test_variants_are_deterministic() {
        let source = synthetic_page();
        let first = preprocess_variants(&source);
        let second = preprocess_variants(&source);
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.as_raw(), b.as_raw());
        }
    }
}
