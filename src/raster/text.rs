//! # Text Rasterizer
//!
//! Renders a styled run of text into a [`BitmapCanvas`] as wide as the printer.
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────── width_dots ────────────────┐
//! │   ascent  ┌─┐┌─┐                           │ ← line 0
//! │ ─baseline─└─┘└─┘─────────────              │
//! │   descent                                  │
//! │   line_spacing                             │
//! │           ┌─┐┌─┐┌─┐                        │ ← line 1
//! └────────────────────────────────────────────┘
//! ```
//!
//! 1. Font metrics come from a [`GlyphSource`]; point sizes are converted
//!    to pixels at the printer's DPI.
//! 2. Words are laid out greedily, wrapping on whitespace. A word that does
//!    not fit on a line of its own is broken mid-word. Explicit `\n` always
//!    starts a new line.
//! 3. Each line is offset for alignment, glyphs are blitted, and underlines
//!    are drawn a fixed distance below the baseline. Centered and
//!    right-aligned lines are placed by their inked extent (plus the
//!    underline, when drawn), so side bearings never skew the margins.
//! 4. Double width/height are applied to the finished canvas, so spacing
//!    doubles along with the glyphs.
//!
//! Glyphs wider than the printer are clipped, not rejected.

use serde::{Deserialize, Serialize};

use super::canvas::BitmapCanvas;
use super::font::{FontRequest, GlyphBitmap, GlyphSource, LineMetrics};
use crate::error::{Result, ThermalinkError};

/// Distance of the underline below the baseline, in dots.
const UNDERLINE_OFFSET: usize = 2;

/// Horizontal alignment of each line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
}

impl Alignment {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "center" | "centre" => Ok(Self::Center),
            "right" => Ok(Self::Right),
            _ => Err(ThermalinkError::Config(format!(
                "Unknown alignment '{}'. Use 'left', 'center' or 'right'",
                s
            ))),
        }
    }

    /// Offset of a line of `used` dots inside `available` dots.
    #[inline]
    pub(crate) fn offset(self, available: usize, used: usize) -> usize {
        let leftover = available.saturating_sub(used);
        match self {
            Self::Left => 0,
            Self::Center => leftover / 2,
            Self::Right => leftover,
        }
    }
}

/// Everything that describes how a run of text looks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextStyle {
    pub family: String,
    /// Size in points (1/72 inch)
    pub size_pt: f32,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub double_width: bool,
    pub double_height: bool,
    /// Extra dots between adjacent glyphs
    pub letter_spacing: usize,
    /// Extra dots between lines
    pub line_spacing: usize,
    pub align: Alignment,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            family: "monospace".to_string(),
            size_pt: 8.5,
            bold: false,
            italic: false,
            underline: false,
            double_width: false,
            double_height: false,
            letter_spacing: 0,
            line_spacing: 0,
            align: Alignment::Left,
        }
    }
}

impl TextStyle {
    pub fn new(family: impl Into<String>, size_pt: f32) -> Self {
        Self {
            family: family.into(),
            size_pt,
            ..Self::default()
        }
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    pub fn italic(mut self) -> Self {
        self.italic = true;
        self
    }

    pub fn underline(mut self) -> Self {
        self.underline = true;
        self
    }

    pub fn double_width(mut self) -> Self {
        self.double_width = true;
        self
    }

    pub fn double_height(mut self) -> Self {
        self.double_height = true;
        self
    }

    pub fn letter_spacing(mut self, dots: usize) -> Self {
        self.letter_spacing = dots;
        self
    }

    pub fn line_spacing(mut self, dots: usize) -> Self {
        self.line_spacing = dots;
        self
    }

    pub fn align(mut self, align: Alignment) -> Self {
        self.align = align;
        self
    }

    pub fn center(self) -> Self {
        self.align(Alignment::Center)
    }

    pub fn right(self) -> Self {
        self.align(Alignment::Right)
    }
}

/// One laid-out line: glyphs with their pen positions, and the inked width.
#[derive(Debug, Default)]
struct Line {
    glyphs: Vec<(char, usize)>,
    width: usize,
}

/// Greedy line builder.
struct LineBuilder<'a> {
    source: &'a dyn GlyphSource,
    request: &'a FontRequest,
    spacing: usize,
    max_width: usize,
    lines: Vec<Line>,
    current: Line,
}

impl<'a> LineBuilder<'a> {
    fn advance(&self, ch: char) -> Result<usize> {
        Ok(self.source.measure_glyph(self.request, ch)?.advance)
    }

    /// Width the current line would have with `extra` dots of glyphs appended.
    fn width_with(&self, extra: usize) -> usize {
        if self.current.glyphs.is_empty() {
            extra
        } else {
            self.current.width + self.spacing + extra
        }
    }

    fn push_glyph(&mut self, ch: char, advance: usize) {
        let x = if self.current.glyphs.is_empty() {
            0
        } else {
            self.current.width + self.spacing
        };
        self.current.glyphs.push((ch, x));
        self.current.width = x + advance;
    }

    fn break_line(&mut self) {
        let line = std::mem::take(&mut self.current);
        self.lines.push(line);
    }

    fn push_word(&mut self, word: &str) -> Result<()> {
        let advances = word
            .chars()
            .map(|ch| Ok((ch, self.advance(ch)?)))
            .collect::<Result<Vec<_>>>()?;
        let word_width = advances.iter().map(|&(_, a)| a).sum::<usize>()
            + self.spacing * advances.len().saturating_sub(1);

        if !self.current.glyphs.is_empty() {
            let space = self.advance(' ')?;
            let joined = self.width_with(space) + self.spacing + word_width;
            if joined <= self.max_width {
                self.push_glyph(' ', space);
            } else {
                self.break_line();
            }
        }

        // Hard-break words that do not fit on a line of their own
        for (ch, advance) in advances {
            if !self.current.glyphs.is_empty() && self.width_with(advance) > self.max_width {
                self.break_line();
            }
            self.push_glyph(ch, advance);
        }
        Ok(())
    }
}

/// Renders styled text with glyphs from a [`GlyphSource`].
pub struct TextRasterizer<'a> {
    source: &'a dyn GlyphSource,
    width_dots: usize,
    dpi: u16,
}

impl<'a> TextRasterizer<'a> {
    pub fn new(source: &'a dyn GlyphSource, width_dots: usize, dpi: u16) -> Self {
        Self {
            source,
            width_dots,
            dpi,
        }
    }

    /// Render `text`. The canvas is `width_dots` wide and exactly as tall as
    /// the text block; an empty string yields zero rows.
    pub fn rasterize(&self, text: &str, style: &TextStyle) -> Result<BitmapCanvas> {
        if !(style.size_pt > 0.0 && style.size_pt.is_finite()) {
            return Err(ThermalinkError::Config(format!(
                "Font size must be a positive number of points, got {}",
                style.size_pt
            )));
        }
        let request = FontRequest {
            family: style.family.clone(),
            size_px: style.size_pt * self.dpi as f32 / 72.0,
            bold: style.bold,
            italic: style.italic,
        };
        // Resolve the font before anything else so unknown families fail
        // even for empty input.
        let metrics = self.source.line_metrics(&request)?;

        if text.is_empty() {
            return BitmapCanvas::empty(self.width_dots);
        }

        // Lay out at half width when the result will be doubled horizontally
        let layout_width = if style.double_width {
            (self.width_dots / 2) & !7
        } else {
            self.width_dots
        };
        if layout_width == 0 {
            return Err(ThermalinkError::InvalidDimension {
                width: self.width_dots,
                height: 0,
            });
        }

        let lines = self.layout(text, &request, style.letter_spacing, layout_width)?;
        let mut canvas = self.draw(&lines, &request, metrics, style, layout_width)?;

        if style.double_width {
            canvas = canvas.double_width();
        }
        if style.double_height {
            canvas = canvas.double_height();
        }
        log::debug!(
            "rasterized {} line(s) of {:?} {}pt to {}x{}",
            lines.len(),
            style.family,
            style.size_pt,
            canvas.width(),
            canvas.height()
        );
        Ok(canvas)
    }

    fn layout(
        &self,
        text: &str,
        request: &FontRequest,
        spacing: usize,
        max_width: usize,
    ) -> Result<Vec<Line>> {
        let mut builder = LineBuilder {
            source: self.source,
            request,
            spacing,
            max_width,
            lines: Vec::new(),
            current: Line::default(),
        };

        for paragraph in text.split('\n') {
            for word in paragraph.split_whitespace() {
                builder.push_word(word)?;
            }
            builder.break_line();
        }
        Ok(builder.lines)
    }

    fn draw(
        &self,
        lines: &[Line],
        request: &FontRequest,
        metrics: LineMetrics,
        style: &TextStyle,
        layout_width: usize,
    ) -> Result<BitmapCanvas> {
        let cell = metrics.height().max(1);
        let height = lines.len() * cell + lines.len().saturating_sub(1) * style.line_spacing;
        let mut canvas = BitmapCanvas::new(layout_width, height)?;

        for (i, line) in lines.iter().enumerate() {
            let top = i * (cell + style.line_spacing);
            let baseline = top + metrics.ascent;
            let underline = style.underline && line.width > 0;

            let glyphs = line
                .glyphs
                .iter()
                .map(|&(ch, pen)| Ok((pen, self.source.render_glyph(request, ch)?)))
                .collect::<Result<Vec<_>>>()?;
            let x0 = line_origin(style.align, layout_width, line.width, &glyphs, underline);

            for (pen, glyph) in &glyphs {
                let gx = x0 + *pen as i32 + glyph.left;
                let gy = baseline as i32 - glyph.top;
                canvas.blit(glyph, gx, gy);
            }

            if underline {
                let y = (baseline + UNDERLINE_OFFSET).min(top + cell - 1);
                let x1 = (x0 + line.width as i32).clamp(0, layout_width as i32) as usize;
                canvas.draw_horizontal_run(x0.max(0) as usize, x1, y, true)?;
            }
        }
        Ok(canvas)
    }
}

/// Pen origin of a line. Left-aligned lines start at the pen; the others
/// are placed by the columns they actually ink.
fn line_origin(
    align: Alignment,
    available: usize,
    pen_width: usize,
    glyphs: &[(usize, GlyphBitmap)],
    underline: bool,
) -> i32 {
    if align == Alignment::Left {
        return 0;
    }

    let mut extent = underline.then_some((0, pen_width as i32));
    for (pen, glyph) in glyphs {
        if let Some((first, last)) = glyph.ink_columns() {
            let start = *pen as i32 + glyph.left + first as i32;
            let end = *pen as i32 + glyph.left + last as i32 + 1;
            extent = Some(match extent {
                Some((lo, hi)) => (lo.min(start), hi.max(end)),
                None => (start, end),
            });
        }
    }

    match extent {
        Some((start, end)) => align.offset(available, (end - start) as usize) as i32 - start,
        None => align.offset(available, pen_width) as i32,
    }
}

// ============================================================================
// TESTS
// ============================================================================
