//! # Rasterization
//!
//! Everything that turns print content into a 1-bit [`BitmapCanvas`].
//!
//! ## Module Structure
//!
//! - [`canvas`]: the packed bitmap itself
//! - [`font`]: glyph sources (Spleen bitmap font, TrueType, registry)
//! - [`text`]: styled text layout
//! - [`image`]: image scaling and thresholding
//! - [`dither`]: threshold policies
//!
//! ## Usage Example
//!
//! ```
//! use thermalink::printer::PrinterConfig;
//! use thermalink::raster::{self, font::FontBook, text::TextStyle};
//!
//! let fonts = FontBook::default();
//! let style = TextStyle::default().center();
//! let canvas = raster::rasterize_text("TOTAL  $4.20", &style, &fonts, &PrinterConfig::PT210).unwrap();
//!
//! assert_eq!(canvas.width(), 384);
//! assert!(canvas.height() > 0);
//! ```

pub mod canvas;
pub mod dither;
pub mod font;
pub mod image;
pub mod text;

pub use canvas::BitmapCanvas;
pub use dither::ThresholdPolicy;
pub use font::{FontBook, GlyphSource};
pub use image::ImageRasterizer;
pub use text::{Alignment, TextRasterizer, TextStyle};

use crate::error::Result;
use crate::printer::PrinterConfig;

/// Render `text` at the full width and resolution of `printer`.
pub fn rasterize_text(
    text: &str,
    style: &TextStyle,
    glyphs: &dyn GlyphSource,
    printer: &PrinterConfig,
) -> Result<BitmapCanvas> {
    TextRasterizer::new(glyphs, printer.width_dots as usize, printer.dpi).rasterize(text, style)
}

/// Scale and threshold an image to `width` dots with the default policy.
pub fn rasterize_image(image: &::image::DynamicImage, width: usize) -> Result<BitmapCanvas> {
    ImageRasterizer::new(width).rasterize(image)
}
