//! # Printer Transport Layer
//!
//! Gets job bytes from the host to the printer over a wireless link whose
//! writes are small, acknowledged (or paced) and may fail at any moment.
//!
//! ## Module Structure
//!
//! - [`platform`]: the seam to the radio stack ([`BlePlatform`], [`PlatformEvent`])
//! - [`machine`]: sans-IO connection state machine and chunked job delivery
//! - [`session`]: async driver with timeouts and cancellation
//! - [`rfcomm`]: Linux RFCOMM serial backend
//!
//! ## States
//!
//! ```text
//!            start_scan                connect
//!   Idle ──────────────► Scanning ───────────────► Connecting
//!    ▲  ◄──────────────     │                          │ link up +
//!    │     stop_scan        │ link lost                │ characteristic
//!    │                      ▼                          ▼
//!    │ reset          Disconnected ◄────────────── Connected ◄──┐
//!    └─────────────────────┘          link lost        │        │ job
//!                                                      ▼        │ finished
//!                                                   Writing ────┘
//! ```
//!
//! `disconnect` returns to Idle from anywhere; only an unrequested drop
//! lands in Disconnected.

pub mod machine;
pub mod platform;
pub mod rfcomm;
pub mod session;

pub use machine::{JobFailure, JobResult, State, TransportMachine};
pub use platform::{BlePlatform, Device, DeviceId, PlatformEvent};
pub use session::{CancelHandle, Session};
