//! # RFCOMM Platform (Linux)
//!
//! A [`BlePlatform`] for classic Bluetooth printers bound to an RFCOMM
//! serial device. Most pocket ESC/POS printers speak the Serial Port Profile
//! rather than GATT, so this backend maps the GATT-shaped seam onto a TTY:
//!
//! | Platform call | RFCOMM behavior |
//! |---------------|-----------------|
//! | `start_scan` | reports every binding in `/proc/net/rfcomm` |
//! | `connect` | opens `/dev/rfcommN` in raw mode |
//! | `discover_characteristics` | reports one SPP "characteristic", unacknowledged |
//! | `write` | writes the chunk to the TTY |
//!
//! ## Bluetooth Setup
//!
//! The printer must be paired and bound first:
//!
//! ```bash
//! $ bluetoothctl
//! [bluetooth]# pair 00:11:22:XX:XX:XX
//! $ sudo rfcomm bind 0 00:11:22:XX:XX:XX
//! # This creates /dev/rfcomm0
//! ```
//!
//! ## TTY Configuration
//!
//! The device is opened in raw mode so binary raster data passes through
//! unmodified: no input or output processing, 8-bit characters, no echo,
//! non-canonical, and no XON/XOFF flow control.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::platform::{BlePlatform, Characteristic, Device, DeviceId, EventSender, PlatformEvent};
use crate::error::{Result, ThermalinkError};

/// Serial Port Profile service UUID.
pub const SPP_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);

/// Default RFCOMM device path
pub const DEFAULT_DEVICE: &str = "/dev/rfcomm0";

/// Kernel table of RFCOMM bindings.
const RFCOMM_TABLE: &str = "/proc/net/rfcomm";

/// One line of `/proc/net/rfcomm`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RfcommBinding {
    /// Device node name, e.g. `rfcomm0`
    pub node: String,
    /// Remote MAC address, upper case
    pub address: String,
    pub channel: Option<u8>,
}

impl RfcommBinding {
    pub fn path(&self) -> PathBuf {
        Path::new("/dev").join(&self.node)
    }
}

/// Parse the kernel's RFCOMM table.
///
/// Lines look like `rfcomm0: 00:11:22:33:44:55 channel 1 clean`. Lines that
/// don't parse are skipped.
pub fn parse_rfcomm_table(contents: &str) -> Vec<RfcommBinding> {
    contents
        .lines()
        .filter_map(|line| {
            let (node, rest) = line.split_once(':')?;
            let mut fields = rest.split_whitespace();
            let address = fields.next()?;
            if !is_valid_mac(address) {
                return None;
            }
            let channel = match (fields.next(), fields.next()) {
                (Some("channel"), Some(n)) => n.parse().ok(),
                _ => None,
            };
            Some(RfcommBinding {
                node: node.trim().to_string(),
                address: address.to_uppercase(),
                channel,
            })
        })
        .collect()
}

/// Validate a Bluetooth MAC address format (XX:XX:XX:XX:XX:XX).
pub fn is_valid_mac(mac: &str) -> bool {
    let parts: Vec<&str> = mac.split(':').collect();
    if parts.len() != 6 {
        return false;
    }
    parts
        .iter()
        .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Where to open `device`: a path is used as-is, a MAC address is looked up
/// in the binding table.
pub fn resolve_device_path(device: &DeviceId, bindings: &[RfcommBinding]) -> Result<PathBuf> {
    let id = device.as_str();
    if id.starts_with('/') {
        return Ok(PathBuf::from(id));
    }
    if !is_valid_mac(id) {
        return Err(ThermalinkError::Platform(format!(
            "'{}' is neither a device path nor a MAC address",
            id
        )));
    }
    bindings
        .iter()
        .find(|b| b.address.eq_ignore_ascii_case(id))
        .map(RfcommBinding::path)
        .ok_or_else(|| {
            ThermalinkError::Platform(format!(
                "{} is not bound to an RFCOMM device (try 'rfcomm bind 0 {}')",
                id, id
            ))
        })
}

/// RFCOMM serial backend.
pub struct RfcommPlatform {
    events: EventSender,
    table: PathBuf,
    port: Option<File>,
}

impl RfcommPlatform {
    pub fn new(events: EventSender) -> Self {
        Self {
            events,
            table: PathBuf::from(RFCOMM_TABLE),
            port: None,
        }
    }

    /// Read bindings from another table file.
    pub fn with_table<P: Into<PathBuf>>(mut self, table: P) -> Self {
        self.table = table.into();
        self
    }

    async fn bindings(&self) -> Result<Vec<RfcommBinding>> {
        match tokio::fs::read_to_string(&self.table).await {
            Ok(contents) => Ok(parse_rfcomm_table(&contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(ThermalinkError::Platform(format!(
                "Failed to read {}: {}",
                self.table.display(),
                e
            ))),
        }
    }

    fn emit(&self, event: PlatformEvent) {
        if self.events.send(event).is_err() {
            log::debug!("event receiver dropped");
        }
    }
}

#[async_trait]
impl BlePlatform for RfcommPlatform {
    async fn start_scan(&mut self) -> Result<()> {
        let bindings = self.bindings().await?;
        log::debug!("{} rfcomm binding(s)", bindings.len());
        for binding in bindings {
            let device = Device::new(binding.address.clone()).named(binding.node.clone());
            self.emit(PlatformEvent::DeviceDiscovered(device));
        }
        Ok(())
    }

    async fn stop_scan(&mut self) -> Result<()> {
        Ok(())
    }

    async fn connect(&mut self, device: &DeviceId) -> Result<()> {
        let bindings = self.bindings().await?;
        let path = resolve_device_path(device, &bindings)?;

        let file = OpenOptions::new().write(true).open(&path).map_err(|e| {
            ThermalinkError::Platform(format!("Failed to open {}: {}", path.display(), e))
        })?;
        configure_tty_raw(&file)?;
        log::debug!("opened {}", path.display());

        self.port = Some(File::from_std(file));
        self.emit(PlatformEvent::Connected {
            device: device.clone(),
            mtu: None,
        });
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            port.flush().await?;
        }
        Ok(())
    }

    async fn discover_characteristics(&mut self) -> Result<()> {
        self.emit(PlatformEvent::CharacteristicsDiscovered(vec![Characteristic {
            uuid: SPP_UUID,
            write: false,
            write_without_response: true,
        }]));
        Ok(())
    }

    async fn write(&mut self, _characteristic: Uuid, data: &[u8], with_response: bool) -> Result<()> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| ThermalinkError::Platform("port is not open".to_string()))?;
        port.write_all(data).await?;
        port.flush().await?;
        if with_response {
            self.emit(PlatformEvent::WriteAcknowledged);
        }
        Ok(())
    }
}

/// Configure a serial device for raw binary transfer.
///
/// ## What Gets Disabled
///
/// - **Input flags**: IGNBRK, BRKINT, PARMRK, ISTRIP, INLCR, IGNCR, ICRNL, IXON, IXOFF, IXANY
/// - **Output flags**: OPOST
/// - **Local flags**: ECHO, ECHONL, ICANON, ISIG, IEXTEN
/// - **Control flags**: CSIZE, PARENB (then CS8 is set)
///
/// XON/XOFF must be off: 0x11 and 0x13 show up in raster data.
#[cfg(unix)]
fn configure_tty_raw(file: &std::fs::File) -> Result<()> {
    use std::mem::MaybeUninit;
    use std::os::unix::io::AsRawFd;

    let fd = file.as_raw_fd();
    let mut termios = MaybeUninit::uninit();
    let result = unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) };
    if result != 0 {
        return Err(ThermalinkError::Platform(format!(
            "tcgetattr failed: {}",
            io::Error::last_os_error()
        )));
    }
    let mut termios = unsafe { termios.assume_init() };

    termios.c_iflag &= !(libc::IGNBRK
        | libc::BRKINT
        | libc::PARMRK
        | libc::ISTRIP
        | libc::INLCR
        | libc::IGNCR
        | libc::ICRNL
        | libc::IXON
        | libc::IXOFF
        | libc::IXANY);
    termios.c_oflag &= !libc::OPOST;
    termios.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);
    termios.c_cflag &= !(libc::CSIZE | libc::PARENB);
    termios.c_cflag |= libc::CS8;

    let result = unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) };
    if result != 0 {
        return Err(ThermalinkError::Platform(format!(
            "tcsetattr failed: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(())
}

#[cfg(not(unix))]
fn configure_tty_raw(_file: &std::fs::File) -> Result<()> {
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::platform::event_channel;

    const TABLE: &str = "\
rfcomm0: 00:11:22:33:44:55 channel 1 clean
rfcomm1: aa:bb:cc:dd:ee:ff channel 3 connected [tty-attached]
garbage line
rfcomm2: not-a-mac channel 1 clean
";

    #[test]
    fn test_spp_uuid() {
        assert_eq!(
            SPP_UUID.to_string(),
            "00001101-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_valid_mac_addresses() {
        assert!(is_valid_mac("00:11:22:33:44:55"));
        assert!(is_valid_mac("AA:BB:CC:DD:EE:FF"));
        assert!(is_valid_mac("aa:bb:cc:dd:ee:ff"));
    }

    #[test]
    fn test_invalid_mac_addresses() {
        assert!(!is_valid_mac("00:11:22:33:44")); // too short
        assert!(!is_valid_mac("00:11:22:33:44:55:66")); // too long
        assert!(!is_valid_mac("00-11-22-33-44-55")); // wrong separator
        assert!(!is_valid_mac("GG:HH:II:JJ:KK:LL")); // invalid hex
        assert!(!is_valid_mac(""));
    }

    #[test]
    fn test_parse_rfcomm_table() {
        let bindings = parse_rfcomm_table(TABLE);
        assert_eq!(
            bindings,
            vec![
                RfcommBinding {
                    node: "rfcomm0".to_string(),
                    address: "00:11:22:33:44:55".to_string(),
                    channel: Some(1),
                },
                RfcommBinding {
                    node: "rfcomm1".to_string(),
                    address: "AA:BB:CC:DD:EE:FF".to_string(),
                    channel: Some(3),
                },
            ]
        );
        assert_eq!(bindings[1].path(), PathBuf::from("/dev/rfcomm1"));
    }

    #[test]
    fn test_resolve_device_path() {
        let bindings = parse_rfcomm_table(TABLE);
        assert_eq!(
            resolve_device_path(&"aa:bb:cc:dd:ee:ff".into(), &bindings).unwrap(),
            PathBuf::from("/dev/rfcomm1")
        );
        assert_eq!(
            resolve_device_path(&"/dev/ttyUSB0".into(), &bindings).unwrap(),
            PathBuf::from("/dev/ttyUSB0")
        );
        assert!(resolve_device_path(&"11:11:11:11:11:11".into(), &bindings).is_err());
        assert!(resolve_device_path(&"printer".into(), &bindings).is_err());
    }

    #[tokio::test]
    async fn test_scan_reports_bindings() {
        let dir = std::env::temp_dir().join(format!("thermalink-rfcomm-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let table = dir.join("rfcomm");
        std::fs::write(&table, TABLE).unwrap();

        let (tx, mut rx) = event_channel();
        let mut platform = RfcommPlatform::new(tx).with_table(&table);
        platform.start_scan().await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(
            first,
            PlatformEvent::DeviceDiscovered(Device::new("00:11:22:33:44:55").named("rfcomm0"))
        );
        assert!(matches!(rx.recv().await, Some(PlatformEvent::DeviceDiscovered(_))));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_missing_table_finds_nothing() {
        let (tx, mut rx) = event_channel();
        let mut platform = RfcommPlatform::new(tx).with_table("/nonexistent/rfcomm");
        platform.start_scan().await.unwrap();
        drop(platform);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_write_without_port_fails() {
        let (tx, _rx) = event_channel();
        let mut platform = RfcommPlatform::new(tx);
        assert!(platform.write(SPP_UUID, b"x", false).await.is_err());
    }
}
