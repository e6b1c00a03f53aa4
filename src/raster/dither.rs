//! # Threshold Policies
//!
//! Converts a grayscale intensity buffer into 1-bit printer dots.
//!
//! ## Policies
//!
//! | Policy | Speed | Gradients | Notes |
//! |--------|-------|-----------|-------|
//! | [`ThresholdPolicy::Fixed`] | Fastest | Lost (banding) | Default, cutoff 128 |
//! | [`ThresholdPolicy::Bayer`] | Fast | Regular halftone | Row-parallel |
//! | [`ThresholdPolicy::FloydSteinberg`] | Slow | Best | Error diffusion, sequential |
//!
//! The fixed cutoff is the default: receipts are mostly line art and text,
//! where a hard threshold keeps edges crisp. Photographs should opt into one
//! of the dithering policies.
//!
//! ## Intensity Convention
//!
//! Every policy works on *luma* values: 0 = black, 255 = white. Pure black
//! always prints and pure white never does, whichever policy is chosen.
//!
//! ## The Bayer Matrix
//!
//! ```text
//!     0   1   2   3   4   5   6   7   (x mod 8)
//! 0 │ 0 │32 │ 8 │40 │ 2 │34 │10 │42 │
//! 1 │48 │16 │56 │24 │50 │18 │58 │26 │
//! 2 │12 │44 │ 4 │36 │14 │46 │ 6 │38 │
//! 3 │60 │28 │52 │20 │62 │30 │54 │22 │
//! 4 │ 3 │35 │11 │43 │ 1 │33 │ 9 │41 │
//! 5 │51 │19 │59 │27 │49 │17 │57 │25 │
//! 6 │15 │47 │ 7 │39 │13 │45 │ 5 │37 │
//! 7 │63 │31 │55 │23 │61 │29 │53 │21 │
//! (y mod 8)
//! ```

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::canvas::BitmapCanvas;

/// Default luma cutoff: darker than this prints.
pub const DEFAULT_CUTOFF: u8 = 128;

/// Bayer 8x8 dithering matrix (values 0-63)
pub const BAYER8: [[u8; 8]; 8] = [
    [0, 32, 8, 40, 2, 34, 10, 42],
    [48, 16, 56, 24, 50, 18, 58, 26],
    [12, 44, 4, 36, 14, 46, 6, 38],
    [60, 28, 52, 20, 62, 30, 54, 22],
    [3, 35, 11, 43, 1, 33, 9, 41],
    [51, 19, 59, 27, 49, 17, 57, 25],
    [15, 47, 7, 39, 13, 45, 5, 37],
    [63, 31, 55, 23, 61, 29, 53, 21],
];

/// How grayscale becomes black and white.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThresholdPolicy {
    /// Luma strictly below `cutoff` prints.
    Fixed { cutoff: u8 },
    /// Ordered dithering with the 8x8 Bayer matrix.
    Bayer,
    /// Floyd–Steinberg error diffusion.
    FloydSteinberg,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self::Fixed {
            cutoff: DEFAULT_CUTOFF,
        }
    }
}

impl ThresholdPolicy {
    /// Parse a CLI name: `fixed`, `fixed:CUTOFF`, `bayer`, `floyd-steinberg`.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "fixed" | "threshold" => Ok(Self::default()),
            "bayer" => Ok(Self::Bayer),
            "floyd-steinberg" | "floyd" | "fs" => Ok(Self::FloydSteinberg),
            other if other.starts_with("fixed:") => {
                let value = &other["fixed:".len()..];
                let cutoff = value
                    .parse()
                    .map_err(|_| format!("Invalid cutoff: {}", value))?;
                Ok(Self::Fixed { cutoff })
            }
            _ => Err(format!(
                "Unknown threshold policy '{}'. Use 'fixed', 'fixed:N', 'bayer' or 'floyd-steinberg'",
                s
            )),
        }
    }

    /// Threshold a row-major luma buffer into `canvas`.
    ///
    /// `luma` must hold `canvas.width() * canvas.height()` values.
    pub fn apply(self, luma: &[u8], canvas: &mut BitmapCanvas) {
        let width = canvas.width();
        debug_assert_eq!(luma.len(), width * canvas.height());

        match self {
            Self::Fixed { cutoff } => {
                canvas
                    .rows_mut()
                    .collect::<Vec<_>>()
                    .into_par_iter()
                    .zip(luma.par_chunks(width))
                    .for_each(|(row, src)| {
                        pack_row_into(row, src.iter().map(|&l| l < cutoff));
                    });
            }
            Self::Bayer => {
                canvas
                    .rows_mut()
                    .collect::<Vec<_>>()
                    .into_par_iter()
                    .zip(luma.par_chunks(width))
                    .enumerate()
                    .for_each(|(y, (row, src))| {
                        pack_row_into(
                            row,
                            src.iter()
                                .enumerate()
                                .map(|(x, &l)| should_print(x, y, 1.0 - l as f32 / 255.0)),
                        );
                    });
            }
            Self::FloydSteinberg => floyd_steinberg(luma, canvas),
        }
    }
}

/// Get the Bayer threshold for a pixel position, in (0, 1).
///
/// ```text
/// threshold = (BAYER8[y mod 8][x mod 8] + 0.5) / 64.0
/// ```
#[inline]
pub fn threshold(x: usize, y: usize) -> f32 {
    let matrix_value = BAYER8[y & 7][x & 7];
    (matrix_value as f32 + 0.5) / 64.0
}

/// Whether a dot prints under Bayer dithering.
///
/// `intensity` is darkness: 0.0 = white, 1.0 = black.
#[inline]
pub fn should_print(x: usize, y: usize, intensity: f32) -> bool {
    intensity > threshold(x, y)
}

/// Pack a row of boolean pixel values into bytes, MSB first.
///
/// If the row length is not a multiple of 8, the last byte is padded with
/// zeros (white) on the right.
///
/// ```
/// use thermalink::raster::dither::pack_row;
///
/// let row = vec![true, true, false, false, true, false, true, false];
/// assert_eq!(pack_row(&row), vec![0b11001010]);
/// ```
pub fn pack_row(pixels: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; pixels.len().div_ceil(8)];
    pack_row_into(&mut bytes, pixels.iter().copied());
    bytes
}

fn pack_row_into(row: &mut [u8], pixels: impl Iterator<Item = bool>) {
    row.fill(0);
    for (i, pixel) in pixels.enumerate() {
        if pixel {
            row[i / 8] |= 0x80 >> (i % 8);
        }
    }
}

/// Classic Floyd–Steinberg: 7/16 right, 3/16 down-left, 5/16 down,
/// 1/16 down-right.
fn floyd_steinberg(luma: &[u8], canvas: &mut BitmapCanvas) {
    let width = canvas.width();
    let height = canvas.height();
    let mut buf: Vec<f32> = luma.iter().map(|&l| l as f32).collect();
    let mut dots = vec![false; width];

    for (y, row) in canvas.rows_mut().enumerate() {
        for x in 0..width {
            let idx = y * width + x;
            let old = buf[idx];
            let black = old < 128.0;
            let new = if black { 0.0 } else { 255.0 };
            dots[x] = black;

            let err = old - new;
            if x + 1 < width {
                buf[idx + 1] += err * 7.0 / 16.0;
            }
            if y + 1 < height {
                if x > 0 {
                    buf[idx + width - 1] += err * 3.0 / 16.0;
                }
                buf[idx + width] += err * 5.0 / 16.0;
                if x + 1 < width {
                    buf[idx + width + 1] += err * 1.0 / 16.0;
                }
            }
        }
        pack_row_into(row, dots.iter().copied());
    }
}

// ============================================================================
// TESTS
// ============================================================================
