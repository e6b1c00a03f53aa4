//! # Platform Seam
//!
//! The radio stack is not ours. A [`BlePlatform`] accepts commands (scan,
//! connect, write, ...) and reports what happened later, as
//! [`PlatformEvent`]s pushed onto an unbounded channel. The session drains
//! that channel one event at a time, so platform callbacks never reenter the
//! state machine.
//!
//! ```text
//!            commands                      events
//!  Session ───────────► BlePlatform ───────────────► mpsc ──► Session
//!           (async fn)                (from any thread)
//! ```
//!
//! A command returning `Ok` only means the request was accepted. Completion
//! (connected, written, ...) always arrives as an event.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result;

/// Sending half of the platform event channel.
pub type EventSender = mpsc::UnboundedSender<PlatformEvent>;

/// Receiving half of the platform event channel, owned by the session.
pub type EventReceiver = mpsc::UnboundedReceiver<PlatformEvent>;

/// Create the channel a platform reports its events on.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Opaque peripheral identifier (a MAC address, a platform UUID, a device
/// path, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A peripheral seen while scanning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    /// Advertised name
    pub name: Option<String>,
    /// Signal strength in dBm
    pub rssi: Option<i16>,
}

impl Device {
    pub fn new(id: impl Into<DeviceId>) -> Self {
        Self {
            id: id.into(),
            name: None,
            rssi: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)?;
        if let Some(name) = &self.name {
            write!(f, " ({})", name)?;
        }
        if let Some(rssi) = self.rssi {
            write!(f, " {} dBm", rssi)?;
        }
        Ok(())
    }
}

/// A GATT characteristic and the write modes it supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Characteristic {
    pub uuid: Uuid,
    /// Write with acknowledgment
    pub write: bool,
    /// Write without response
    pub write_without_response: bool,
}

impl Characteristic {
    pub fn is_writable(&self) -> bool {
        self.write || self.write_without_response
    }
}

/// Everything a platform can report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    DeviceDiscovered(Device),
    /// The link is up. `mtu` is the negotiated ATT MTU, if the platform
    /// knows it.
    Connected { device: DeviceId, mtu: Option<u16> },
    CharacteristicsDiscovered(Vec<Characteristic>),
    /// The link dropped without being asked to.
    Disconnected,
    WriteAcknowledged,
    WriteFailed(String),
}

/// A wireless stack able to reach the printer.
#[async_trait]
pub trait BlePlatform: Send {
    async fn start_scan(&mut self) -> Result<()>;

    async fn stop_scan(&mut self) -> Result<()>;

    async fn connect(&mut self, device: &DeviceId) -> Result<()>;

    /// Tear the link down. Must not report [`PlatformEvent::Disconnected`]
    /// for a disconnect the session asked for.
    async fn disconnect(&mut self) -> Result<()>;

    async fn discover_characteristics(&mut self) -> Result<()>;

    /// Send one chunk. With `with_response`, completion is reported as
    /// [`PlatformEvent::WriteAcknowledged`]; without it, nothing is
    /// reported and the session paces writes itself.
    async fn write(&mut self, characteristic: Uuid, data: &[u8], with_response: bool) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_display() {
        let device = Device::new("00:11:22:33:44:55").named("PT-210").rssi(-60);
        assert_eq!(device.to_string(), "00:11:22:33:44:55 (PT-210) -60 dBm");
        assert_eq!(Device::new("abc").to_string(), "abc");
    }

    #[test]
    fn test_characteristic_writable() {
        let uuid = Uuid::nil();
        let none = Characteristic {
            uuid,
            write: false,
            write_without_response: false,
        };
        assert!(!none.is_writable());
        assert!(Characteristic { write: true, ..none }.is_writable());
        assert!(
            Characteristic {
                write_without_response: true,
                ..none
            }
            .is_writable()
        );
    }

    #[tokio::test]
    async fn test_event_channel_order() {
        let (tx, mut rx) = event_channel();
        tx.send(PlatformEvent::WriteAcknowledged).unwrap();
        tx.send(PlatformEvent::Disconnected).unwrap();
        assert_eq!(rx.recv().await, Some(PlatformEvent::WriteAcknowledged));
        assert_eq!(rx.recv().await, Some(PlatformEvent::Disconnected));
    }
}
