//! # Print Jobs
//!
//! Assembles a complete byte stream for one print: printer reset, raster
//! blocks, trailing feed and cut.
//!
//! ```text
//! ┌──────┬──────────┬──────────┬─────┬──────┬─────┬────────┐
//! │ init │ raster 1 │ raster 2 │ ... │ feed │ cut │ drawer │
//! └──────┴──────────┴──────────┴─────┴──────┴─────┴────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use thermalink::printer::PrinterConfig;
//! use thermalink::protocol::job::PrintJob;
//! use thermalink::raster::BitmapCanvas;
//!
//! let canvas = BitmapCanvas::new(384, 48).unwrap();
//! let bytes = PrintJob::new(&PrinterConfig::PT210)
//!     .image(&canvas)
//!     .feed_mm(3.0)
//!     .cut()
//!     .build();
//!
//! assert_eq!(&bytes[..2], &[0x1B, 0x40]);
//! ```

use super::commands::Dialect;
use super::graphics::RasterEncoder;
use crate::printer::PrinterConfig;
use crate::raster::BitmapCanvas;

/// Builder for the bytes of a single print job.
#[derive(Debug, Clone)]
pub struct PrintJob {
    dialect: Dialect,
    max_band_rows: usize,
    data: Vec<u8>,
}

impl PrintJob {
    /// Start a job for `printer`, beginning with a printer reset.
    pub fn new(printer: &PrinterConfig) -> Self {
        Self {
            dialect: printer.dialect,
            max_band_rows: printer.max_band_rows as usize,
            data: printer.dialect.init(),
        }
    }

    /// Start a job with no reset prefix, for appending to an existing stream.
    pub fn bare(printer: &PrinterConfig) -> Self {
        Self {
            data: Vec::new(),
            ..Self::new(printer)
        }
    }

    /// Append a canvas, split into bands of the printer's maximum height.
    ///
    /// A canvas with no rows adds nothing.
    pub fn image(mut self, canvas: &BitmapCanvas) -> Self {
        if canvas.height() > 0 {
            let encoder = RasterEncoder::new(self.dialect);
            for band in encoder.bands(canvas, self.max_band_rows) {
                band.write_to(&mut self.data);
            }
        }
        self
    }

    /// Advance the paper by `mm` millimeters.
    pub fn feed_mm(mut self, mm: f32) -> Self {
        self.data.extend(self.dialect.feed_mm(mm));
        self
    }

    pub fn cut(mut self) -> Self {
        self.data.extend(self.dialect.cut());
        self
    }

    /// Kick the cash drawer connected to the printer.
    pub fn open_drawer(mut self) -> Self {
        self.data.extend(self.dialect.open_drawer());
        self
    }

    /// Append bytes as-is.
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.data.extend_from_slice(bytes);
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn build(self) -> Vec<u8> {
        self.data
    }
}

// ============================================================================
// TESTS
// ============================================================================
