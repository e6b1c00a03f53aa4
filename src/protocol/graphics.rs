//! # Raster Graphics Encoding
//!
//! Turns a [`BitmapCanvas`] into the printer's raster-image command, and back.
//!
//! ## Wire Layout
//!
//! ```text
//! ┌──────────── header ────────────┐┌───────── data ─────────┐
//! │ dialect bytes │ xL xH │ yL yH │…││ row 0 │ row 1 │ … │ row h-1 │
//! └────────────────────────────────┘└────────────────────────┘
//!   x = width in bytes (LE u16), y = rows (LE u16)
//! ```
//!
//! Each row is `width / 8` bytes, MSB = leftmost dot, 1 = black. Rows follow
//! the header directly with no separators or padding. See
//! [`Dialect::raster_header`] for the exact header bytes.
//!
//! ## Banding
//!
//! A single command can carry at most 65535 rows, and small printers stall
//! on very large commands over a slow link. [`RasterEncoder::encode_banded`]
//! splits the canvas into consecutive commands of at most `max_rows` rows:
//!
//! ```text
//! // For a 1000-row image and 256-row bands:
//! // Band 1: rows    0..256
//! // Band 2: rows  256..512
//! // Band 3: rows  512..768
//! // Band 4: rows  768..1000
//! ```

use super::commands::Dialect;
use crate::error::{Result, ThermalinkError};
use crate::raster::BitmapCanvas;

/// Largest row count a single header can express.
const MAX_ROWS_PER_COMMAND: usize = u16::MAX as usize;

/// A raster command ready to serialize: header plus borrowed canvas rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterCommand<'a> {
    pub header: Vec<u8>,
    pub rows: Vec<&'a [u8]>,
}

impl RasterCommand<'_> {
    /// Serialized length: header plus every row.
    pub fn len(&self) -> usize {
        self.header.len() + self.rows.iter().map(|row| row.len()).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append the header and rows to `out`.
    pub fn write_to(self, out: &mut Vec<u8>) {
        out.reserve(self.len());
        out.extend_from_slice(&self.header);
        for row in self.rows {
            out.extend_from_slice(row);
        }
    }

    pub fn to_bytes(self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out);
        out
    }
}

/// Encodes canvases for one command dialect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RasterEncoder {
    dialect: Dialect,
}

impl RasterEncoder {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Build one command for rows `start..end` of `canvas`.
    pub fn command<'a>(&self, canvas: &'a BitmapCanvas, start: usize, end: usize) -> RasterCommand<'a> {
        debug_assert!(start <= end && end <= canvas.height());
        debug_assert!(end - start <= MAX_ROWS_PER_COMMAND);
        debug_assert!(canvas.stride() <= u16::MAX as usize);

        let header = self
            .dialect
            .raster_header(canvas.stride() as u16, (end - start) as u16);
        let rows = (start..end).map(|y| canvas.row_bytes(y)).collect();
        RasterCommand { header, rows }
    }

    /// Split `canvas` into commands of at most `max_rows` rows each.
    ///
    /// A canvas with no rows yields a single zero-row command. `max_rows` of
    /// zero, or anything above 65535, is treated as 65535.
    pub fn bands<'a>(&self, canvas: &'a BitmapCanvas, max_rows: usize) -> Vec<RasterCommand<'a>> {
        let band = match max_rows {
            0 => MAX_ROWS_PER_COMMAND,
            n => n.min(MAX_ROWS_PER_COMMAND),
        };
        if canvas.height() == 0 {
            return vec![self.command(canvas, 0, 0)];
        }
        (0..canvas.height())
            .step_by(band)
            .map(|start| self.command(canvas, start, (start + band).min(canvas.height())))
            .collect()
    }

    /// Encode the whole canvas.
    ///
    /// Canvases taller than one header can describe are split into
    /// consecutive 65535-row commands.
    pub fn encode(&self, canvas: &BitmapCanvas) -> Vec<u8> {
        self.encode_banded(canvas, MAX_ROWS_PER_COMMAND)
    }

    /// Encode the canvas as consecutive bands of at most `max_rows` rows.
    pub fn encode_banded(&self, canvas: &BitmapCanvas, max_rows: usize) -> Vec<u8> {
        let bands = self.bands(canvas, max_rows);
        let total: usize = bands.iter().map(RasterCommand::len).sum();
        let mut out = Vec::with_capacity(total);
        for band in bands {
            band.write_to(&mut out);
        }
        log::debug!(
            "encoded {}x{} canvas as {} bytes ({})",
            canvas.width(),
            canvas.height(),
            out.len(),
            self.dialect
        );
        out
    }
}

/// Encode with the default dialect (ESC/POS `GS v 0`).
///
/// ```
/// use thermalink::protocol::graphics::encode;
/// use thermalink::raster::BitmapCanvas;
///
/// let canvas = BitmapCanvas::new(16, 2).unwrap();
/// let bytes = encode(&canvas);
/// assert_eq!(&bytes[..8], &[0x1D, 0x76, 0x30, 0x00, 2, 0, 2, 0]);
/// assert_eq!(bytes.len(), 8 + 4);
/// ```
pub fn encode(canvas: &BitmapCanvas) -> Vec<u8> {
    RasterEncoder::default().encode(canvas)
}

// ============================================================================
// REFERENCE DECODER
// ============================================================================

/// Decode one or more consecutive raster commands back into a canvas.
///
/// The dialect is detected from the first header; every following command
/// must use the same dialect and width. Bands are stacked top to bottom.
/// Truncated or malformed input is reported as
/// [`ThermalinkError::InvalidDimension`].
pub fn decode(bytes: &[u8]) -> Result<BitmapCanvas> {
    let dialect = [Dialect::EscPos, Dialect::StarPrnt]
        .into_iter()
        .find(|d| d.parse_raster_header(bytes).is_some())
        .ok_or(ThermalinkError::InvalidDimension {
            width: 0,
            height: 0,
        })?;

    let mut width_bytes = None;
    let mut height = 0usize;
    let mut data = Vec::new();
    let mut rest = bytes;

    while !rest.is_empty() {
        let (xb, rows) =
            dialect
                .parse_raster_header(rest)
                .ok_or(ThermalinkError::InvalidDimension {
                    width: width_bytes.unwrap_or(0) * 8,
                    height,
                })?;
        let xb = xb as usize;
        let rows = rows as usize;
        if *width_bytes.get_or_insert(xb) != xb {
            return Err(ThermalinkError::InvalidDimension {
                width: xb * 8,
                height: rows,
            });
        }

        let body = &rest[dialect.raster_header_len()..];
        let len = xb * rows;
        if body.len() < len {
            return Err(ThermalinkError::InvalidDimension {
                width: xb * 8,
                height: rows,
            });
        }
        data.extend_from_slice(&body[..len]);
        height += rows;
        rest = &body[len..];
    }

    let width = width_bytes.unwrap_or(0) * 8;
    BitmapCanvas::from_raw(width, height, data)
}

// ============================================================================
// TESTS
// ============================================================================
