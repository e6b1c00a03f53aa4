//! # Error Types
//!
//! This module defines the error type used throughout the thermalink library.
//!
//! Rasterization errors are plain validation failures: retrying with the same
//! input fails the same way. Transport errors carry enough state (bytes
//! delivered, machine state) for the caller to decide whether to resend the
//! whole job. Nothing in the crate retries on its own.

use thiserror::Error;

/// Convenience alias used by every fallible operation in the crate.
pub type Result<T> = std::result::Result<T, ThermalinkError>;

/// Main error type for thermalink operations
#[derive(Debug, Error)]
pub enum ThermalinkError {
    /// Canvas width not a positive multiple of 8, or height of zero
    #[error("Invalid dimension: {width}x{height} (width must be a positive multiple of 8)")]
    InvalidDimension { width: usize, height: usize },

    /// Pixel coordinate outside the canvas
    #[error("Pixel ({x}, {y}) is out of bounds")]
    OutOfBounds { x: usize, y: usize },

    /// Requested font family is not registered
    #[error("Unsupported font: {0}")]
    UnsupportedFont(String),

    /// The image decoder could not produce pixel data
    #[error("Unsupported image format: {0}")]
    UnsupportedImageFormat(String),

    /// No connection confirmation within the connect timeout
    #[error("Connection timed out")]
    ConnectionTimeout,

    /// The connected peripheral exposes no writable characteristic
    #[error("No writable characteristic found")]
    CharacteristicNotFound,

    /// A job is already in flight
    #[error("Transport busy: a print job is already in flight")]
    Busy,

    /// Operation not permitted in the current transport state
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    /// A print job stopped before all bytes reached the printer
    #[error("Write failed after {bytes_delivered} bytes: {reason}")]
    WriteFailed {
        bytes_delivered: usize,
        reason: String,
    },

    /// The platform reported that the link dropped
    #[error("Link to printer lost")]
    LinkLost,

    /// The pending operation was cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// Error reported by the platform BLE collaborator
    #[error("Platform error: {0}")]
    Platform(String),

    /// Invalid or unreadable configuration
    #[error("Config error: {0}")]
    Config(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
