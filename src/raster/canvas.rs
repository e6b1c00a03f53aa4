//! # Bitmap Canvas
//!
//! A packed 1-bit-per-pixel grid, laid out exactly the way raster commands
//! expect it on the wire.
//!
//! ## Bit Packing
//!
//! - Bit 7 (MSB) = leftmost dot of the byte
//! - Bit 0 (LSB) = rightmost dot
//! - 1 = black (print), 0 = white (no print)
//!
//! ```text
//! Byte value 0xF0 = 11110000 = ████░░░░
//! Byte value 0x0F = 00001111 = ░░░░████
//! ```
//!
//! Rows are stored top to bottom, each `width / 8` bytes long. The width is
//! always a multiple of 8, so no row carries padding bits.

use image::{GrayImage, Luma};

use super::font::GlyphBitmap;
use crate::error::{Result, ThermalinkError};

/// Monochrome raster image with a byte-aligned row stride.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitmapCanvas {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl BitmapCanvas {
    /// Create a blank canvas.
    ///
    /// Fails with [`ThermalinkError::InvalidDimension`] if `width` is not a
    /// positive multiple of 8 or `height` is zero.
    pub fn new(width: usize, height: usize) -> Result<Self> {
        if height == 0 {
            return Err(ThermalinkError::InvalidDimension { width, height });
        }
        let mut canvas = Self::empty(width)?;
        canvas.height = height;
        canvas.data = vec![0; canvas.stride() * height];
        Ok(canvas)
    }

    /// A canvas with no rows. Rendering an empty string produces one of these.
    pub fn empty(width: usize) -> Result<Self> {
        if width == 0 || width % 8 != 0 {
            return Err(ThermalinkError::InvalidDimension { width, height: 0 });
        }
        Ok(Self {
            width,
            height: 0,
            data: Vec::new(),
        })
    }

    /// Wrap already-packed row data.
    ///
    /// `data` must hold exactly `width / 8 * height` bytes.
    pub fn from_raw(width: usize, height: usize, data: Vec<u8>) -> Result<Self> {
        let mut canvas = Self::empty(width)?;
        if data.len() != canvas.stride() * height {
            return Err(ThermalinkError::InvalidDimension { width, height });
        }
        canvas.height = height;
        canvas.data = data;
        Ok(canvas)
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Bytes per row.
    #[inline]
    pub fn stride(&self) -> usize {
        self.width / 8
    }

    /// The packed pixel data, rows concatenated top to bottom.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access to each packed row, for bulk writers such as the
    /// image thresholding pass.
    pub(crate) fn rows_mut(&mut self) -> std::slice::ChunksExactMut<'_, u8> {
        let stride = self.stride();
        self.data.chunks_exact_mut(stride)
    }

    /// Set or clear one pixel.
    pub fn set_pixel(&mut self, x: usize, y: usize, on: bool) -> Result<()> {
        if x >= self.width || y >= self.height {
            return Err(ThermalinkError::OutOfBounds { x, y });
        }
        let idx = y * self.stride() + x / 8;
        let mask = 0x80 >> (x % 8);
        if on {
            self.data[idx] |= mask;
        } else {
            self.data[idx] &= !mask;
        }
        Ok(())
    }

    /// Read one pixel. Anything outside the canvas is blank.
    pub fn get_pixel(&self, x: usize, y: usize) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        self.data[y * self.stride() + x / 8] & (0x80 >> (x % 8)) != 0
    }

    /// Set or clear the half-open span `x0..x1` on row `y`.
    ///
    /// Whole bytes inside the span are written directly; only the partial
    /// bytes at either end are masked.
    pub fn draw_horizontal_run(&mut self, x0: usize, x1: usize, y: usize, on: bool) -> Result<()> {
        if y >= self.height {
            return Err(ThermalinkError::OutOfBounds { x: x0, y });
        }
        if x1 > self.width {
            return Err(ThermalinkError::OutOfBounds { x: x1 - 1, y });
        }
        if x0 >= x1 {
            return Ok(());
        }

        let stride = self.stride();
        let row = &mut self.data[y * stride..(y + 1) * stride];
        let mut x = x0;
        while x < x1 {
            let byte = x / 8;
            let bit = x % 8;
            if bit == 0 && x + 8 <= x1 {
                row[byte] = if on { 0xFF } else { 0x00 };
                x += 8;
                continue;
            }
            let span = (8 - bit).min(x1 - x);
            let mask = ((0xFFu16 << (8 - span)) as u8) >> bit;
            if on {
                row[byte] |= mask;
            } else {
                row[byte] &= !mask;
            }
            x += span;
        }
        Ok(())
    }

    /// The packed bytes of row `y`.
    ///
    /// # Panics
    ///
    /// Panics if `y >= height`.
    pub fn row_bytes(&self, y: usize) -> &[u8] {
        let stride = self.stride();
        &self.data[y * stride..(y + 1) * stride]
    }

    /// Iterate over packed rows, top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks_exact(self.stride())
    }

    /// OR a glyph mask onto the canvas with its top-left corner at `(x, y)`.
    ///
    /// Pixels that fall outside the canvas are clipped.
    pub fn blit(&mut self, glyph: &GlyphBitmap, x: i32, y: i32) {
        for gy in 0..glyph.height {
            let cy = y + gy as i32;
            if cy < 0 || cy as usize >= self.height {
                continue;
            }
            for gx in 0..glyph.width {
                let cx = x + gx as i32;
                if cx < 0 || cx as usize >= self.width || !glyph.get(gx, gy) {
                    continue;
                }
                let idx = cy as usize * self.stride() + cx as usize / 8;
                self.data[idx] |= 0x80 >> (cx as usize % 8);
            }
        }
    }

    /// Duplicate every column. Width doubles, height is unchanged.
    pub fn double_width(&self) -> Self {
        let stride = self.stride();
        let mut data = Vec::with_capacity(self.data.len() * 2);
        for row in self.rows() {
            for &byte in row {
                let wide = spread_bits(byte);
                data.push((wide >> 8) as u8);
                data.push(wide as u8);
            }
        }
        debug_assert_eq!(data.len(), stride * 2 * self.height);
        Self {
            width: self.width * 2,
            height: self.height,
            data,
        }
    }

    /// Duplicate every row. Height doubles, width is unchanged.
    pub fn double_height(&self) -> Self {
        let mut data = Vec::with_capacity(self.data.len() * 2);
        for row in self.rows() {
            data.extend_from_slice(row);
            data.extend_from_slice(row);
        }
        Self {
            width: self.width,
            height: self.height * 2,
            data,
        }
    }

    /// Expand every pixel into a 2×2 block.
    pub fn double_both(&self) -> Self {
        self.double_width().double_height()
    }

    /// True if no pixel is set.
    pub fn is_blank(&self) -> bool {
        self.data.iter().all(|&b| b == 0)
    }

    /// Number of black pixels.
    pub fn count_ink(&self) -> usize {
        self.data.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Render as an 8-bit grayscale image (black = 0, white = 255) for
    /// previews.
    pub fn to_gray_image(&self) -> GrayImage {
        let mut img = GrayImage::new(self.width as u32, self.height as u32);
        for y in 0..self.height {
            for x in 0..self.width {
                let color = if self.get_pixel(x, y) { 0u8 } else { 255u8 };
                img.put_pixel(x as u32, y as u32, Luma([color]));
            }
        }
        img
    }
}

/// Spread the 8 bits of `byte` over 16 bits, each bit doubled.
///
/// `0b1010_0000` → `0b1100_1100_0000_0000`
#[inline]
fn spread_bits(byte: u8) -> u16 {
    let mut out = 0u16;
    for bit in 0..8 {
        if byte & (0x80 >> bit) != 0 {
            out |= 0xC000 >> (bit * 2);
        }
    }
    out
}

// ============================================================================
// TESTS
// ============================================================================
