//! # Image Rasterizer
//!
//! Converts a decoded image of any color depth into a [`BitmapCanvas`] exactly
//! as wide as the printer.
//!
//! ## Pipeline
//!
//! ```text
//! DynamicImage ─► resize (nearest) ─► luma (over white) ─► threshold ─► canvas
//! ```
//!
//! - **Scaling**: nearest-neighbor, so the output is deterministic and hard
//!   edges in line art stay hard.
//! - **Height**: `round(src_height × width / src_width)`, at least one row.
//! - **Luma**: `0.299 R + 0.587 G + 0.114 B`, with alpha composited over
//!   white paper, so transparent regions print nothing.
//! - **Threshold**: see [`ThresholdPolicy`]. The default is a fixed cutoff.
//!
//! ## Narrow Images
//!
//! With [`ImageRasterizer::image_width`] the image is scaled to fewer dots
//! than the paper and placed left, center or right on a white row:
//!
//! ```text
//! ┌──────────────┬──────────────┬──────────────┐
//! │    white     │    image     │    white     │   Alignment::Center
//! └──────────────┴──────────────┴──────────────┘
//! ```

use image::{DynamicImage, imageops::FilterType};

use super::canvas::BitmapCanvas;
use super::dither::ThresholdPolicy;
use super::text::Alignment;
use crate::error::{Result, ThermalinkError};

/// Rasterizes images to a fixed dot width.
#[derive(Debug, Clone, Copy)]
pub struct ImageRasterizer {
    width_dots: usize,
    policy: ThresholdPolicy,
    image_width: Option<usize>,
    align: Alignment,
}

impl ImageRasterizer {
    pub fn new(width_dots: usize) -> Self {
        Self {
            width_dots,
            policy: ThresholdPolicy::default(),
            image_width: None,
            align: Alignment::Left,
        }
    }

    /// Scale the image to `dots` wide instead of the full width, padding the
    /// rest with white. Widths beyond the full width are capped.
    pub fn image_width(mut self, dots: usize) -> Self {
        self.image_width = Some(dots);
        self
    }

    /// Where a narrow image sits on the paper.
    pub fn align(mut self, align: Alignment) -> Self {
        self.align = align;
        self
    }

    /// Choose how gray pixels become dots.
    pub fn policy(mut self, policy: ThresholdPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Decode an encoded image (PNG, JPEG, ...) and rasterize it.
    pub fn rasterize_bytes(&self, bytes: &[u8]) -> Result<BitmapCanvas> {
        self.check_width()?;
        let image = image::load_from_memory(bytes)
            .map_err(|e| ThermalinkError::UnsupportedImageFormat(e.to_string()))?;
        self.rasterize(&image)
    }

    /// Rasterize an already-decoded image.
    pub fn rasterize(&self, image: &DynamicImage) -> Result<BitmapCanvas> {
        self.check_width()?;
        let (src_w, src_h) = (image.width(), image.height());
        if src_w == 0 || src_h == 0 {
            return Err(ThermalinkError::UnsupportedImageFormat(format!(
                "image has no pixels ({}x{})",
                src_w, src_h
            )));
        }

        let width = self.width_dots;
        let inner = self.inner_width()?;
        let height = scaled_height(src_w, src_h, inner);
        log::debug!(
            "rasterizing {}x{} image to {}x{} on {} dots ({:?})",
            src_w,
            src_h,
            inner,
            height,
            width,
            self.policy
        );

        let resized = image
            .resize_exact(inner as u32, height as u32, FilterType::Nearest)
            .to_rgba8();
        let scaled: Vec<u8> = resized.pixels().map(|p| luma_over_white(p.0)).collect();
        let luma = if inner == width {
            scaled
        } else {
            let left = self.align.offset(width, inner);
            let mut padded = vec![u8::MAX; width * height];
            for (row, src) in padded.chunks_exact_mut(width).zip(scaled.chunks_exact(inner)) {
                row[left..left + inner].copy_from_slice(src);
            }
            padded
        };

        let mut canvas = BitmapCanvas::new(width, height)?;
        self.policy.apply(&luma, &mut canvas);
        Ok(canvas)
    }

    /// Dots the scaled image itself occupies.
    fn inner_width(&self) -> Result<usize> {
        match self.image_width {
            None => Ok(self.width_dots),
            Some(0) => Err(ThermalinkError::InvalidDimension {
                width: 0,
                height: 0,
            }),
            Some(dots) => Ok(dots.min(self.width_dots)),
        }
    }

    fn check_width(&self) -> Result<()> {
        if self.width_dots == 0 || self.width_dots % 8 != 0 {
            return Err(ThermalinkError::InvalidDimension {
                width: self.width_dots,
                height: 0,
            });
        }
        Ok(())
    }
}

/// Aspect-preserving row count for a target width, never below one row.
fn scaled_height(src_w: u32, src_h: u32, width: usize) -> usize {
    let height = (src_h as f64 * width as f64 / src_w as f64).round() as usize;
    height.max(1)
}

/// Perceptual luma of an RGBA pixel printed on white paper.
#[inline]
fn luma_over_white([r, g, b, a]: [u8; 4]) -> u8 {
    let y = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    let alpha = a as f32 / 255.0;
    (y * alpha + 255.0 * (1.0 - alpha)).round().clamp(0.0, 255.0) as u8
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgba, RgbaImage};

    fn solid_rgba(w: u32, h: u32, color: [u8; 4]) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba(color)))
    }

    #[test]
    fn test_aspect_ratio() {
        let image = solid_rgba(200, 100, [255, 255, 255, 255]);
        let canvas = ImageRasterizer::new(384).rasterize(&image).unwrap();
        assert_eq!(canvas.width(), 384);
        assert_eq!(canvas.height(), 192);
    }

    #[test]
    fn test_height_rounds_to_nearest() {
        // 3 rows * 64/10 = 19.2 -> 19
        assert_eq!(scaled_height(10, 3, 64), 19);
        // 1 row * 8/3 = 2.67 -> 3
        assert_eq!(scaled_height(3, 1, 8), 3);
        // Very wide images keep at least one row
        assert_eq!(scaled_height(10_000, 1, 8), 1);
    }

    #[test]
    fn test_white_image_is_blank() {
        for width in [8, 64, 384, 576] {
            let image = solid_rgba(37, 23, [255, 255, 255, 255]);
            let canvas = ImageRasterizer::new(width).rasterize(&image).unwrap();
            assert!(canvas.is_blank());
        }
    }

    #[test]
    fn test_black_image_is_solid() {
        for width in [8, 64, 384, 576] {
            let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(13, 29, Luma([0])));
            for policy in [
                ThresholdPolicy::default(),
                ThresholdPolicy::Bayer,
                ThresholdPolicy::FloydSteinberg,
            ] {
                let canvas = ImageRasterizer::new(width)
                    .policy(policy)
                    .rasterize(&image)
                    .unwrap();
                assert!(canvas.as_bytes().iter().all(|&b| b == 0xFF));
            }
        }
    }

    #[test]
    fn test_transparent_prints_nothing() {
        let image = solid_rgba(16, 16, [0, 0, 0, 0]);
        let canvas = ImageRasterizer::new(16).rasterize(&image).unwrap();
        assert!(canvas.is_blank());
    }

    #[test]
    fn test_left_half_black() {
        let mut img = RgbaImage::from_pixel(16, 4, Rgba([255, 255, 255, 255]));
        for y in 0..4 {
            for x in 0..8 {
                img.put_pixel(x, y, Rgba([10, 10, 10, 255]));
            }
        }
        let canvas = ImageRasterizer::new(16)
            .rasterize(&DynamicImage::ImageRgba8(img))
            .unwrap();
        for row in canvas.rows() {
            assert_eq!(row, &[0xFF, 0x00]);
        }
    }

    fn black(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(w, h, Luma([0])))
    }

    #[test]
    fn test_narrow_image_alignment() {
        // 16 dots of black on 64 dots of paper
        let cases = [
            (Alignment::Left, [0xFF, 0xFF, 0, 0, 0, 0, 0, 0]),
            (Alignment::Center, [0, 0, 0, 0xFF, 0xFF, 0, 0, 0]),
            (Alignment::Right, [0, 0, 0, 0, 0, 0, 0xFF, 0xFF]),
        ];
        for (align, expected) in cases {
            let canvas = ImageRasterizer::new(64)
                .image_width(16)
                .align(align)
                .rasterize(&black(4, 2))
                .unwrap();
            assert_eq!(canvas.width(), 64);
            // Height follows the image width, not the paper width
            assert_eq!(canvas.height(), 8);
            for row in canvas.rows() {
                assert_eq!(row, &expected, "{:?}", align);
            }
        }
    }

    #[test]
    fn test_narrow_image_uneven_margin() {
        // 13 leftover dots split 6 left, 7 right
        let canvas = ImageRasterizer::new(24)
            .image_width(11)
            .align(Alignment::Center)
            .rasterize(&black(11, 1))
            .unwrap();
        let ink: Vec<usize> = (0..24).filter(|&x| canvas.get_pixel(x, 0)).collect();
        assert_eq!(ink, (6..17).collect::<Vec<_>>());
    }

    #[test]
    fn test_image_width_capped_and_validated() {
        let capped = ImageRasterizer::new(16)
            .image_width(1000)
            .rasterize(&black(8, 8))
            .unwrap();
        assert_eq!(capped.height(), 16);
        assert_eq!(capped.count_ink(), 16 * 16);

        let err = ImageRasterizer::new(16)
            .image_width(0)
            .rasterize(&black(8, 8))
            .unwrap_err();
        assert!(matches!(err, ThermalinkError::InvalidDimension { .. }));
    }

    #[test]
    fn test_luma_weights() {
        assert_eq!(luma_over_white([255, 255, 255, 255]), 255);
        assert_eq!(luma_over_white([0, 0, 0, 255]), 0);
        // Pure green is perceptually light, pure blue dark
        assert!(luma_over_white([0, 255, 0, 255]) > 128);
        assert!(luma_over_white([0, 0, 255, 255]) < 128);
    }

    #[test]
    fn test_unaligned_width_rejected() {
        let image = solid_rgba(4, 4, [0, 0, 0, 255]);
        let err = ImageRasterizer::new(100).rasterize(&image).unwrap_err();
        assert!(matches!(err, ThermalinkError::InvalidDimension { width: 100, .. }));
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        let err = ImageRasterizer::new(384)
            .rasterize_bytes(b"definitely not a png")
            .unwrap_err();
        assert!(matches!(err, ThermalinkError::UnsupportedImageFormat(_)));
    }

    #[test]
    fn test_png_bytes_roundtrip() {
        let mut png = Vec::new();
        solid_rgba(8, 8, [0, 0, 0, 255])
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let canvas = ImageRasterizer::new(8).rasterize_bytes(&png).unwrap();
        assert_eq!(canvas.height(), 8);
        assert_eq!(canvas.count_ink(), 64);
    }
}
