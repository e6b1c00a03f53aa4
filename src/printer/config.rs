//! # Printer Configuration
//!
//! This module defines hardware specifications for supported thermal printers
//! and the tuning knobs of the wireless transport.
//!
//! ## Supported Printers
//!
//! | Model | Width (dots) | Resolution | Dialect |
//! |-------|--------------|------------|---------|
//! | Generic 58mm (PT-210 class) | 384 | 203 DPI | ESC/POS |
//! | Star TSP650II | 576 | 203 DPI | StarPRNT |
//!
//! ## Usage
//!
//! ```
//! use thermalink::printer::PrinterConfig;
//!
//! let config = PrinterConfig::PT210;
//! println!("Print width: {} dots ({} bytes)",
//!          config.width_dots,
//!          config.width_bytes);
//! ```
//!
//! ## Config Files
//!
//! [`Config`] can be loaded from JSON. Every field is optional:
//!
//! ```json
//! {
//!   "printer": "tsp650ii",
//!   "transport": { "chunk_size": 180, "write_delay_ms": 10 }
//! }
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, ThermalinkError};
use crate::protocol::commands::Dialect;

/// # Printer Configuration
///
/// Defines the hardware characteristics of a thermal printer.
///
/// ## Calculations
///
/// ```text
/// dots_per_mm = dpi / 25.4
/// width_mm = width_dots / dots_per_mm
///
/// For a 58mm printer:
///   dots_per_mm = 203 / 25.4 ≈ 8
///   width_mm = 384 / 8 = 48mm
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrinterConfig {
    /// Printer model name
    pub name: &'static str,

    /// Maximum print width in dots (pixels)
    pub width_dots: u16,

    /// Print width in bytes (width_dots / 8)
    pub width_bytes: u16,

    /// Resolution in dots per inch
    pub dpi: u16,

    /// Command dialect spoken by the printer
    pub dialect: Dialect,

    /// Maximum rows per raster command before the image is split into bands
    pub max_band_rows: u16,
}

impl PrinterConfig {
    /// # Generic 58mm ESC/POS Printer
    ///
    /// The common PT-210 / "POS-58" class of pocket Bluetooth printers.
    /// The host sends raster images in 24-row bands, so each band fits
    /// comfortably in the receive buffer.
    pub const PT210: Self = Self {
        name: "Generic 58mm",
        width_dots: 384,
        width_bytes: 48,
        dpi: 203,
        dialect: Dialect::EscPos,
        max_band_rows: 24,
    };

    /// # Star TSP650II Configuration
    ///
    /// 80mm paper width thermal receipt printer.
    ///
    /// ```text
    /// ├── 4mm ──┼────── 72mm printable ──────┼── 4mm ──┤
    /// │ margin  │         576 dots           │ margin  │
    /// ```
    pub const TSP650II: Self = Self {
        name: "Star TSP650II",
        width_dots: 576,
        width_bytes: 72,
        dpi: 203,
        dialect: Dialect::StarPrnt,
        max_band_rows: 256,
    };

    /// A configuration for an arbitrary ESC/POS printer of the given width.
    ///
    /// The width is rounded down to a whole number of bytes.
    pub fn custom(width_dots: u16) -> Self {
        let width_bytes = width_dots / 8;
        Self {
            name: "Custom",
            width_dots: width_bytes * 8,
            width_bytes,
            ..Self::PT210
        }
    }

    /// Calculate dots per millimeter
    ///
    /// ## Example
    ///
    /// ```
    /// use thermalink::printer::PrinterConfig;
    ///
    /// let config = PrinterConfig::PT210;
    /// assert!((config.dots_per_mm() - 8.0).abs() < 0.1);
    /// ```
    #[inline]
    pub fn dots_per_mm(&self) -> f32 {
        self.dpi as f32 / 25.4
    }

    /// Calculate print width in millimeters
    #[inline]
    pub fn width_mm(&self) -> f32 {
        self.width_dots as f32 / self.dots_per_mm()
    }

    /// Convert millimeters to dots
    #[inline]
    pub fn mm_to_dots(&self, mm: f32) -> u16 {
        (mm * self.dots_per_mm()).round() as u16
    }

    /// Convert typographic points (1/72 inch) to pixels at this printer's DPI
    #[inline]
    pub fn pt_to_px(&self, pt: f32) -> f32 {
        pt * self.dpi as f32 / 72.0
    }
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self::PT210
    }
}

// ============================================================================
// PRINTER PROFILE
// ============================================================================

/// A printer selected by name, as it appears on the command line or in a
/// config file.
///
/// Formats:
/// - `"pt210"` → generic 58mm ESC/POS printer
/// - `"tsp650ii"` → Star TSP650II
/// - `"custom:WIDTH"` → ESC/POS printer `WIDTH` dots wide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PrinterProfile(PrinterConfig);

impl PrinterProfile {
    pub fn config(&self) -> PrinterConfig {
        self.0
    }
}

impl Default for PrinterProfile {
    fn default() -> Self {
        Self(PrinterConfig::PT210)
    }
}

impl FromStr for PrinterProfile {
    type Err = ThermalinkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pt210" | "58mm" => Ok(Self(PrinterConfig::PT210)),
            "tsp650ii" => Ok(Self(PrinterConfig::TSP650II)),
            other if other.starts_with("custom:") => {
                let dims = &other["custom:".len()..];
                let width: u16 = dims
                    .parse()
                    .map_err(|_| ThermalinkError::Config(format!("Invalid width: {}", dims)))?;
                if width < 8 {
                    return Err(ThermalinkError::Config(format!(
                        "Width {} is narrower than one byte",
                        width
                    )));
                }
                Ok(Self(PrinterConfig::custom(width)))
            }
            _ => Err(ThermalinkError::Config(format!(
                "Unknown printer '{}'. Use 'pt210', 'tsp650ii' or 'custom:WIDTH'",
                s
            ))),
        }
    }
}

impl TryFrom<String> for PrinterProfile {
    type Error = ThermalinkError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<PrinterProfile> for String {
    fn from(profile: PrinterProfile) -> Self {
        profile.to_string()
    }
}

impl fmt::Display for PrinterProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let config = self.0;
        if config == PrinterConfig::PT210 {
            write!(f, "pt210")
        } else if config == PrinterConfig::TSP650II {
            write!(f, "tsp650ii")
        } else {
            write!(f, "custom:{}", config.width_dots)
        }
    }
}

// ============================================================================
// TRANSPORT TUNING
// ============================================================================

/// Default time to wait for a connection confirmation (milliseconds)
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Default time to wait for a single write acknowledgment (milliseconds)
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 5_000;

/// Default ATT payload: 23-byte MTU minus the 3-byte ATT header
pub const DEFAULT_CHUNK_SIZE: usize = 20;

/// Upper bound on a single write, whatever MTU the link negotiates
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 512;

/// Pause between unacknowledged writes (milliseconds)
pub const DEFAULT_WRITE_DELAY_MS: u64 = 20;

/// # Transport Configuration
///
/// Timeouts and flow-control settings for the wireless link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Bound on `Connecting`
    pub connect_timeout_ms: u64,

    /// Bound on waiting for each write acknowledgment
    pub write_timeout_ms: u64,

    /// Chunk size used when the link reports no negotiated MTU
    pub chunk_size: usize,

    /// Hard cap on chunk size
    pub max_chunk_size: usize,

    /// Delay after each write when the characteristic has no acknowledgment
    pub write_delay_ms: u64,

    /// Write to this characteristic instead of the first writable one
    pub characteristic_uuid: Option<Uuid>,

    /// Only report discovered devices whose name starts with this prefix
    pub name_prefix: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            write_delay_ms: DEFAULT_WRITE_DELAY_MS,
            characteristic_uuid: None,
            name_prefix: None,
        }
    }
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn write_delay(&self) -> Duration {
        Duration::from_millis(self.write_delay_ms)
    }

    /// Chunk size for a link with the given negotiated MTU.
    ///
    /// The ATT header takes 3 bytes of every MTU. Without a negotiated MTU the
    /// configured `chunk_size` is used. The result is always at least 1 and
    /// never above `max_chunk_size`.
    pub fn chunk_size_for(&self, mtu: Option<u16>) -> usize {
        let size = match mtu {
            Some(mtu) => (mtu as usize).saturating_sub(3),
            None => self.chunk_size,
        };
        size.min(self.max_chunk_size).max(1)
    }

    /// Reject settings that would stall the transport.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.max_chunk_size == 0 {
            return Err(ThermalinkError::Config(
                "chunk sizes must be at least 1 byte".to_string(),
            ));
        }
        if self.connect_timeout_ms == 0 || self.write_timeout_ms == 0 {
            return Err(ThermalinkError::Config(
                "timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// CONFIG FILE
// ============================================================================

/// Top-level configuration: which printer, and how to talk to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub printer: PrinterProfile,
    pub transport: TransportConfig,
}

impl Config {
    /// Parse a JSON config document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ThermalinkError::Config(format!("Invalid config: {}", e)))?;
        config.transport.validate()?;
        Ok(config)
    }

    /// Load a JSON config file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ThermalinkError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }
}

// ============================================================================
// TESTS
// ============================================================================
