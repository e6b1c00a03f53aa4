//! # Printer Module
//!
//! This module provides printer-specific configurations and utilities.
//!
//! ## Modules
//!
//! - [`config`]: Printer hardware specifications and transport tuning

pub mod config;

pub use config::{Config, PrinterConfig, PrinterProfile, TransportConfig};
