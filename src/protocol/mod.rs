//! # Printer Protocol
//!
//! Byte-level command builders for raster printing.
//!
//! ## Module Structure
//!
//! - [`commands`]: dialect selection and the init, feed, cut and raster headers
//! - [`graphics`]: canvas to raster command encoding, plus a reference decoder
//! - [`job`]: assembles a whole print job
//!
//! ## Usage Example
//!
//! ```
//! use thermalink::protocol::{commands::Dialect, graphics::RasterEncoder};
//! use thermalink::raster::BitmapCanvas;
//!
//! let mut data = Vec::new();
//! data.extend(Dialect::EscPos.init());
//!
//! // A 24-row black band across a 58mm printer
//! let mut canvas = BitmapCanvas::new(384, 24).unwrap();
//! for y in 0..24 {
//!     canvas.draw_horizontal_run(0, 384, y, true).unwrap();
//! }
//! data.extend(RasterEncoder::new(Dialect::EscPos).encode(&canvas));
//! data.extend(Dialect::EscPos.cut());
//!
//! // Send `data` to the printer via a transport session...
//! ```

pub mod commands;
pub mod graphics;
pub mod job;

pub use commands::Dialect;
pub use graphics::{RasterCommand, RasterEncoder, decode, encode};
pub use job::PrintJob;
