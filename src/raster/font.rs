//! # Glyph Sources
//!
//! The text rasterizer never talks to a font engine directly. It asks a
//! [`GlyphSource`] for line metrics, advance widths and 1-bit glyph masks.
//!
//! ## Available Sources
//!
//! | Source | Family | Backing |
//! |--------|--------|---------|
//! | [`SpleenFont`] | `monospace`, `spleen` | Spleen PSF2 bitmap fonts (6×12, 12×24) |
//! | [`TtfFont`] | any name you give it | TrueType/OpenType via ab_glyph |
//! | [`FontBook`] | dispatches by family | registry of the above |
//!
//! ## Synthetic Styles
//!
//! Neither backing has separate bold or italic faces here, so both are
//! synthesized on the 1-bit mask:
//!
//! ```text
//! bold:   each row ORed with itself shifted one dot right
//! italic: rows above the baseline shifted right by 1 dot per 4 rows
//! ```

use std::collections::HashMap;
use std::path::Path;

use ab_glyph::{Font, FontArc, ScaleFont};
use spleen_font::{FONT_6X12, FONT_12X24, PSF2Font};

use crate::error::{Result, ThermalinkError};

/// Rows of height per dot of italic shear.
const ITALIC_SLOPE: usize = 4;

/// Anti-aliased coverage at or above this counts as ink.
const COVERAGE_THRESHOLD: f32 = 0.5;

// ============================================================================
// REQUEST AND METRIC TYPES
// ============================================================================

/// A resolved font request: family, pixel size and style.
#[derive(Debug, Clone, PartialEq)]
pub struct FontRequest {
    pub family: String,
    pub size_px: f32,
    pub bold: bool,
    pub italic: bool,
}

impl FontRequest {
    pub fn new(family: impl Into<String>, size_px: f32) -> Self {
        Self {
            family: family.into(),
            size_px,
            bold: false,
            italic: false,
        }
    }
}

/// Vertical metrics shared by every glyph of a face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineMetrics {
    /// Dots from the top of the line cell to the baseline
    pub ascent: usize,
    /// Dots from the baseline to the bottom of the line cell
    pub descent: usize,
}

impl LineMetrics {
    #[inline]
    pub fn height(&self) -> usize {
        self.ascent + self.descent
    }
}

/// Horizontal metrics of a single glyph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlyphMetrics {
    /// Pen advance in dots
    pub advance: usize,
}

/// A 1-bit glyph mask positioned relative to the pen and the baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphBitmap {
    pub width: usize,
    pub height: usize,
    /// Horizontal offset of the mask's left edge from the pen position
    pub left: i32,
    /// Rows of the mask above the baseline
    pub top: i32,
    /// Row-major, `width * height` entries
    pub pixels: Vec<bool>,
}

impl GlyphBitmap {
    /// A glyph with no ink (e.g. a space).
    pub fn blank() -> Self {
        Self {
            width: 0,
            height: 0,
            left: 0,
            top: 0,
            pixels: Vec::new(),
        }
    }

    /// A solid block, mostly useful for tests and fallback glyphs.
    pub fn filled(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            left: 0,
            top: height as i32,
            pixels: vec![true; width * height],
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height && self.pixels[y * self.width + x]
    }

    /// First and last inked column, if any.
    pub fn ink_columns(&self) -> Option<(usize, usize)> {
        let inked = |x: usize| (0..self.height).any(|y| self.get(x, y));
        let first = (0..self.width).find(|&x| inked(x))?;
        let last = (first..self.width).rev().find(|&x| inked(x))?;
        Some((first, last))
    }

    /// Thicken vertical strokes by one dot.
    pub fn embolden(&self) -> Self {
        if self.width == 0 {
            return self.clone();
        }
        let width = self.width + 1;
        let mut pixels = vec![false; width * self.height];
        for y in 0..self.height {
            for x in 0..self.width {
                if self.get(x, y) {
                    pixels[y * width + x] = true;
                    pixels[y * width + x + 1] = true;
                }
            }
        }
        Self {
            width,
            pixels,
            ..self.clone()
        }
    }

    /// Lean the glyph to the right, pivoting on the baseline.
    pub fn slant(&self) -> Self {
        if self.width == 0 {
            return self.clone();
        }
        let shift_at = |y: usize| -> usize {
            let above = self.top - y as i32;
            if above > 0 {
                above as usize / ITALIC_SLOPE
            } else {
                0
            }
        };
        let extra = shift_at(0);
        let width = self.width + extra;
        let mut pixels = vec![false; width * self.height];
        for y in 0..self.height {
            let shift = shift_at(y);
            for x in 0..self.width {
                if self.get(x, y) {
                    pixels[y * width + x + shift] = true;
                }
            }
        }
        Self {
            width,
            pixels,
            ..self.clone()
        }
    }

    /// Apply synthetic bold and italic as requested.
    pub fn styled(self, request: &FontRequest) -> Self {
        let glyph = if request.bold { self.embolden() } else { self };
        if request.italic { glyph.slant() } else { glyph }
    }
}

// ============================================================================
// GLYPH SOURCE TRAIT
// ============================================================================

/// Capability to measure and rasterize glyphs.
///
/// Implementations report [`ThermalinkError::UnsupportedFont`] when the
/// requested family is not theirs.
pub trait GlyphSource: Send + Sync {
    fn line_metrics(&self, request: &FontRequest) -> Result<LineMetrics>;

    fn measure_glyph(&self, request: &FontRequest, ch: char) -> Result<GlyphMetrics>;

    fn render_glyph(&self, request: &FontRequest, ch: char) -> Result<GlyphBitmap>;
}

// ============================================================================
// SPLEEN BITMAP FONT
// ============================================================================

/// The Spleen bitmap fonts, scaled by whole multiples.
///
/// Requests below 18px use the 6×12 face, anything larger the 12×24 face,
/// multiplied up by `round(size / 24)` for big type.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpleenFont;

/// One concrete Spleen face at an integer scale.
#[derive(Debug, Clone, Copy)]
struct SpleenFace {
    data: &'static [u8],
    cell_width: usize,
    cell_height: usize,
    ascent: usize,
    scale: usize,
}

impl SpleenFont {
    pub const FAMILIES: [&'static str; 2] = ["monospace", "spleen"];

    fn face(&self, request: &FontRequest) -> Result<SpleenFace> {
        if !Self::FAMILIES.contains(&request.family.to_lowercase().as_str()) {
            return Err(ThermalinkError::UnsupportedFont(request.family.clone()));
        }
        if request.size_px < 18.0 {
            Ok(SpleenFace {
                data: FONT_6X12,
                cell_width: 6,
                cell_height: 12,
                ascent: 10,
                scale: 1,
            })
        } else {
            Ok(SpleenFace {
                data: FONT_12X24,
                cell_width: 12,
                cell_height: 24,
                ascent: 19,
                scale: ((request.size_px / 24.0).round() as usize).max(1),
            })
        }
    }
}

impl GlyphSource for SpleenFont {
    fn line_metrics(&self, request: &FontRequest) -> Result<LineMetrics> {
        let face = self.face(request)?;
        Ok(LineMetrics {
            ascent: face.ascent * face.scale,
            descent: (face.cell_height - face.ascent) * face.scale,
        })
    }

    fn measure_glyph(&self, request: &FontRequest, _ch: char) -> Result<GlyphMetrics> {
        let face = self.face(request)?;
        let bold = if request.bold { 1 } else { 0 };
        Ok(GlyphMetrics {
            advance: face.cell_width * face.scale + bold,
        })
    }

    fn render_glyph(&self, request: &FontRequest, ch: char) -> Result<GlyphBitmap> {
        let face = self.face(request)?;
        let (w, h) = (face.cell_width, face.cell_height);
        let mut cell = vec![false; w * h];

        let mut spleen = PSF2Font::new(face.data)
            .map_err(|_| ThermalinkError::UnsupportedFont(request.family.clone()))?;
        let utf8 = ch.to_string();
        match spleen.glyph_for_utf8(utf8.as_bytes()) {
            Some(glyph) => {
                for (row_y, row) in glyph.enumerate() {
                    for (col_x, on) in row.enumerate() {
                        if row_y < h && col_x < w {
                            cell[row_y * w + col_x] = on;
                        }
                    }
                }
            }
            None => draw_box(&mut cell, w, h),
        }

        let scale = face.scale;
        let (sw, sh) = (w * scale, h * scale);
        let mut pixels = vec![false; sw * sh];
        for y in 0..sh {
            for x in 0..sw {
                pixels[y * sw + x] = cell[(y / scale) * w + x / scale];
            }
        }

        let glyph = GlyphBitmap {
            width: sw,
            height: sh,
            left: 0,
            top: (face.ascent * scale) as i32,
            pixels,
        };
        Ok(glyph.styled(request))
    }
}

/// Outline box for characters the font does not cover.
fn draw_box(cell: &mut [bool], width: usize, height: usize) {
    for x in 0..width {
        cell[x] = true;
        cell[(height - 1) * width + x] = true;
    }
    for y in 0..height {
        cell[y * width] = true;
        cell[y * width + width - 1] = true;
    }
}

// ============================================================================
// TRUETYPE FONT
// ============================================================================

/// A TrueType/OpenType face loaded at runtime and rendered with ab_glyph.
#[derive(Clone)]
pub struct TtfFont {
    family: String,
    font: FontArc,
}

impl std::fmt::Debug for TtfFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtfFont").field("family", &self.family).finish()
    }
}

impl TtfFont {
    /// Parse font data. Invalid data is reported as an unsupported font.
    pub fn from_bytes(family: impl Into<String>, data: Vec<u8>) -> Result<Self> {
        let family = family.into();
        let font = FontArc::try_from_vec(data)
            .map_err(|e| ThermalinkError::UnsupportedFont(format!("{}: {}", family, e)))?;
        Ok(Self { family, font })
    }

    /// Load a font file from disk.
    pub fn from_file<P: AsRef<Path>>(family: impl Into<String>, path: P) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Self::from_bytes(family, data)
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    fn check_family(&self, request: &FontRequest) -> Result<()> {
        if request.family.eq_ignore_ascii_case(&self.family) {
            Ok(())
        } else {
            Err(ThermalinkError::UnsupportedFont(request.family.clone()))
        }
    }
}

impl GlyphSource for TtfFont {
    fn line_metrics(&self, request: &FontRequest) -> Result<LineMetrics> {
        self.check_family(request)?;
        let scaled = self.font.as_scaled(request.size_px);
        Ok(LineMetrics {
            ascent: scaled.ascent().ceil().max(0.0) as usize,
            descent: (-scaled.descent()).ceil().max(0.0) as usize,
        })
    }

    fn measure_glyph(&self, request: &FontRequest, ch: char) -> Result<GlyphMetrics> {
        self.check_family(request)?;
        let scaled = self.font.as_scaled(request.size_px);
        let advance = scaled.h_advance(self.font.glyph_id(ch)).round().max(0.0) as usize;
        let bold = if request.bold { 1 } else { 0 };
        Ok(GlyphMetrics {
            advance: advance + bold,
        })
    }

    fn render_glyph(&self, request: &FontRequest, ch: char) -> Result<GlyphBitmap> {
        self.check_family(request)?;
        let glyph = self
            .font
            .glyph_id(ch)
            .with_scale_and_position(request.size_px, ab_glyph::point(0.0, 0.0));

        let Some(outlined) = self.font.outline_glyph(glyph) else {
            return Ok(GlyphBitmap::blank());
        };

        let bounds = outlined.px_bounds();
        let width = bounds.width().ceil() as usize;
        let height = bounds.height().ceil() as usize;
        let mut pixels = vec![false; width * height];
        outlined.draw(|px, py, coverage| {
            let (x, y) = (px as usize, py as usize);
            if x < width && y < height && coverage >= COVERAGE_THRESHOLD {
                pixels[y * width + x] = true;
            }
        });

        let glyph = GlyphBitmap {
            width,
            height,
            left: bounds.min.x.floor() as i32,
            top: -(bounds.min.y.floor() as i32),
            pixels,
        };
        Ok(glyph.styled(request))
    }
}

// ============================================================================
// FONT BOOK
// ============================================================================

/// Registry that maps family names to glyph sources.
///
/// ```
/// use thermalink::raster::font::{FontBook, FontRequest, GlyphSource};
///
/// let book = FontBook::default();
/// assert!(book.line_metrics(&FontRequest::new("monospace", 24.0)).is_ok());
/// assert!(book.line_metrics(&FontRequest::new("Comic Sans", 24.0)).is_err());
/// ```
pub struct FontBook {
    sources: HashMap<String, Box<dyn GlyphSource>>,
}

impl FontBook {
    /// A book with no fonts at all.
    pub fn new() -> Self {
        Self {
            sources: HashMap::new(),
        }
    }

    /// Register `source` under `family`. Family lookup is case-insensitive.
    pub fn register(&mut self, family: &str, source: Box<dyn GlyphSource>) {
        self.sources.insert(family.to_lowercase(), source);
    }

    /// Register a TrueType font under its own family name.
    pub fn register_ttf(&mut self, font: TtfFont) {
        let family = font.family().to_string();
        self.register(&family, Box::new(font));
    }

    pub fn families(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sources.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn source(&self, request: &FontRequest) -> Result<&dyn GlyphSource> {
        self.sources
            .get(&request.family.to_lowercase())
            .map(|source| source.as_ref())
            .ok_or_else(|| ThermalinkError::UnsupportedFont(request.family.clone()))
    }
}

impl Default for FontBook {
    fn default() -> Self {
        let mut book = Self::new();
        for family in SpleenFont::FAMILIES {
            book.register(family, Box::new(SpleenFont));
        }
        book
    }
}

impl GlyphSource for FontBook {
    fn line_metrics(&self, request: &FontRequest) -> Result<LineMetrics> {
        self.source(request)?.line_metrics(request)
    }

    fn measure_glyph(&self, request: &FontRequest, ch: char) -> Result<GlyphMetrics> {
        self.source(request)?.measure_glyph(request, ch)
    }

    fn render_glyph(&self, request: &FontRequest, ch: char) -> Result<GlyphBitmap> {
        self.source(request)?.render_glyph(request, ch)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spleen_small_face() {
        let request = FontRequest::new("monospace", 12.0);
        let metrics = SpleenFont.line_metrics(&request).unwrap();
        assert_eq!(metrics.height(), 12);
        assert_eq!(SpleenFont.measure_glyph(&request, 'A').unwrap().advance, 6);
    }

    #[test]
    fn test_spleen_large_face_scales() {
        let request = FontRequest::new("spleen", 48.0);
        let metrics = SpleenFont.line_metrics(&request).unwrap();
        assert_eq!(metrics.height(), 48);
        let glyph = SpleenFont.render_glyph(&request, 'W').unwrap();
        assert_eq!((glyph.width, glyph.height), (24, 48));
        assert_eq!(glyph.top, metrics.ascent as i32);
    }

    #[test]
    fn test_spleen_renders_ink() {
        let glyph = SpleenFont
            .render_glyph(&FontRequest::new("monospace", 24.0), 'A')
            .unwrap();
        assert_eq!(glyph.pixels.len(), 12 * 24);
        assert!(glyph.pixels.iter().any(|&p| p));
    }

    #[test]
    fn test_spleen_rejects_other_families() {
        let err = SpleenFont
            .line_metrics(&FontRequest::new("serif", 24.0))
            .unwrap_err();
        assert!(matches!(err, ThermalinkError::UnsupportedFont(f) if f == "serif"));
    }

    #[test]
    fn test_ink_columns() {
        let glyph = GlyphBitmap {
            width: 5,
            height: 2,
            left: 0,
            top: 2,
            pixels: vec![
                false, false, true, false, false, //
                false, true, false, true, false,
            ],
        };
        assert_eq!(glyph.ink_columns(), Some((1, 3)));
        assert_eq!(GlyphBitmap::blank().ink_columns(), None);
        assert_eq!(GlyphBitmap::filled(3, 1).ink_columns(), Some((0, 2)));
    }

    #[test]
    fn test_embolden_widens() {
        let glyph = GlyphBitmap {
            width: 2,
            height: 1,
            left: 0,
            top: 1,
            pixels: vec![true, false],
        };
        let bold = glyph.embolden();
        assert_eq!(bold.width, 3);
        assert_eq!(bold.pixels, vec![true, true, false]);
    }

    #[test]
    fn test_slant_shifts_top_rows() {
        let glyph = GlyphBitmap {
            width: 1,
            height: 8,
            left: 0,
            top: 8,
            pixels: vec![true; 8],
        };
        let italic = glyph.slant();
        // Top row is 8 rows above the baseline: shifted 2 dots
        assert_eq!(italic.width, 3);
        assert!(italic.get(2, 0));
        // Four rows above the baseline: shifted 1 dot
        assert!(italic.get(1, 4));
        assert!(!italic.get(0, 4));
        // Less than four rows above the baseline: unshifted
        for y in 5..8 {
            assert!(italic.get(0, y), "row {} moved", y);
        }
    }

    #[test]
    fn test_blank_glyph_styles_are_noops() {
        let request = FontRequest {
            bold: true,
            italic: true,
            ..FontRequest::new("monospace", 12.0)
        };
        assert_eq!(GlyphBitmap::blank().styled(&request), GlyphBitmap::blank());
    }

    #[test]
    fn test_ttf_rejects_garbage() {
        let err = TtfFont::from_bytes("broken", vec![0, 1, 2, 3]).unwrap_err();
        assert!(matches!(err, ThermalinkError::UnsupportedFont(_)));
    }

    #[test]
    fn test_font_book_dispatch() {
        let book = FontBook::default();
        assert_eq!(book.families(), vec!["monospace", "spleen"]);
        assert!(book.line_metrics(&FontRequest::new("MONOSPACE", 12.0)).is_ok());
        assert!(matches!(
            book.render_glyph(&FontRequest::new("fantasy", 12.0), 'x'),
            Err(ThermalinkError::UnsupportedFont(_))
        ));
    }
}
