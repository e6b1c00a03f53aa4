//! # Thermalink - Thermal Receipt Printer Library
//!
//! Thermalink turns text and images into 1-bit raster jobs and delivers them
//! to pocket thermal printers over a wireless link. It provides:
//!
//! - **Rasterization**: a packed bitmap canvas, styled text layout, image
//!   scaling and thresholding
//! - **Protocol**: ESC/POS and StarPRNT raster encoding and job assembly
//! - **Transport**: a connection state machine with chunked, flow-controlled
//!   writes behind a pluggable platform seam
//!
//! ## Quick Start
//!
//! ```no_run
//! use thermalink::{
//!     printer::{PrinterConfig, TransportConfig},
//!     protocol::PrintJob,
//!     raster::{self, FontBook, TextStyle},
//!     transport::{Session, platform::event_channel, rfcomm::RfcommPlatform},
//! };
//!
//! # async fn demo() -> thermalink::Result<()> {
//! let printer = PrinterConfig::PT210;
//!
//! // Rasterize a line of text across the full paper width
//! let fonts = FontBook::default();
//! let canvas = raster::rasterize_text("Hello!", &TextStyle::default().bold(), &fonts, &printer)?;
//!
//! // Build the job: init, raster bands, feed, cut
//! let job = PrintJob::new(&printer).image(&canvas).feed_mm(5.0).cut().build();
//!
//! // Connect and send
//! let (events_tx, events_rx) = event_channel();
//! let mut session = Session::new(
//!     Box::new(RfcommPlatform::new(events_tx)),
//!     events_rx,
//!     TransportConfig::default(),
//! );
//! session.connect(&"00:11:22:33:44:55".into()).await?;
//! session.submit(&job).await?.into_result()?;
//! session.disconnect().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`raster`] | Canvas, text and image rasterization |
//! | [`protocol`] | Raster command encoding and print jobs |
//! | [`transport`] | Connection state machine, session, platform backends |
//! | [`printer`] | Printer and transport configuration |
//! | [`error`] | Error types |
//!
//! ## Supported Printers
//!
//! - Generic 58mm ESC/POS printers (PT-210 class, 384 dots, 203 DPI)
//! - Star TSP650II (80mm paper, 576 dots, StarPRNT)
//!
//! Other widths work through `PrinterConfig::custom`.

pub mod error;
pub mod printer;
pub mod protocol;
pub mod raster;
pub mod transport;

// Re-exports for convenience
pub use error::{Result, ThermalinkError};
pub use printer::PrinterConfig;
