//! # Transport State Machine
//!
//! A sans-IO model of the printer link. Caller operations and
//! [`PlatformEvent`]s go in; [`Action`]s come out. Nothing here waits, sleeps
//! or touches a radio, so every transition is testable synchronously.
//!
//! ## States
//!
//! ```text
//!              start_scan               select_device
//!   ┌──────┐ ───────────► ┌──────────┐ ─────────────► ┌────────────┐
//!   │ Idle │              │ Scanning │                │ Connecting │
//!   └──────┘ ◄─────────── └──────────┘                └────────────┘
//!     ▲  ▲     cancel                    connect(id) ▲       │ characteristic
//!     │  └───────────────────────────────────────────┘       │ resolved
//!     │ reset                                                 ▼
//! ┌──────────────┐   link lost / write failed        ┌───────────┐
//! │ Disconnected │ ◄──────────────────────────────── │ Connected │
//! └──────────────┘                                   └───────────┘
//!        ▲                                  submit │   ▲ last chunk
//!        │       link lost / failure / cancel      ▼   │ acknowledged
//!        └──────────────────────────────────── ┌─────────┐
//!                                              │ Writing │
//!                                              └─────────┘
//! ```
//!
//! ## Flow Control
//!
//! A job is split into chunks of the connection's chunk size. Exactly one
//! chunk is in flight at a time; the next is only emitted once
//! [`PlatformEvent::WriteAcknowledged`] arrives. For characteristics without
//! acknowledged writes the session synthesizes that event after a short
//! delay, so the machine sees the same sequence either way.

use std::collections::{HashSet, VecDeque};
use std::fmt;

use uuid::Uuid;

use super::platform::{Characteristic, Device, DeviceId, PlatformEvent};
use crate::error::{Result, ThermalinkError};
use crate::printer::TransportConfig;

// ============================================================================
// PUBLIC TYPES
// ============================================================================

/// Observable transport state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Idle,
    Scanning,
    Connecting,
    Connected,
    Writing,
    Disconnected,
}

impl State {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Writing => "writing",
            Self::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One slice of a print job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteChunk {
    /// Position in the job, from 0
    pub index: usize,
    pub data: Vec<u8>,
}

/// Something the platform must be told to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartScan,
    StopScan,
    Connect(DeviceId),
    DiscoverCharacteristics,
    Write {
        characteristic: Uuid,
        chunk: WriteChunk,
        with_response: bool,
    },
    Disconnect,
}

/// Why a connection attempt did not reach `Connected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectFailure {
    Timeout,
    CharacteristicNotFound,
    LinkLost,
    Cancelled,
    Platform(String),
}

impl From<ConnectFailure> for ThermalinkError {
    fn from(failure: ConnectFailure) -> Self {
        match failure {
            ConnectFailure::Timeout => ThermalinkError::ConnectionTimeout,
            ConnectFailure::CharacteristicNotFound => ThermalinkError::CharacteristicNotFound,
            ConnectFailure::LinkLost => ThermalinkError::LinkLost,
            ConnectFailure::Cancelled => ThermalinkError::Cancelled,
            ConnectFailure::Platform(reason) => ThermalinkError::Platform(reason),
        }
    }
}

/// Why a job stopped early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobFailure {
    LinkLost,
    /// The platform refused a write
    Rejected(String),
    /// No acknowledgment within the write timeout
    Timeout,
    Cancelled,
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LinkLost => write!(f, "link lost"),
            Self::Rejected(reason) => write!(f, "write rejected: {}", reason),
            Self::Timeout => write!(f, "write timed out"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Outcome of a submitted buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub bytes_delivered: usize,
    pub total_bytes: usize,
    pub chunks_delivered: usize,
    pub failure: Option<JobFailure>,
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Turn a failed job into [`ThermalinkError::WriteFailed`].
    pub fn into_result(self) -> Result<Self> {
        match &self.failure {
            None => Ok(self),
            Some(failure) => Err(ThermalinkError::WriteFailed {
                bytes_delivered: self.bytes_delivered,
                reason: failure.to_string(),
            }),
        }
    }
}

/// Something the caller should learn about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    DeviceFound(Device),
    Connected { device: DeviceId, chunk_size: usize },
    ConnectFailed(ConnectFailure),
    JobFinished(JobResult),
}

/// Output of every machine step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Command(Command),
    Notice(Notice),
}

// ============================================================================
// INTERNAL PHASES
// ============================================================================

/// An established link and how to write to it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Connection {
    device: DeviceId,
    characteristic: Uuid,
    with_response: bool,
    chunk_size: usize,
}

#[derive(Debug)]
struct Job {
    queue: VecDeque<WriteChunk>,
    in_flight: Option<WriteChunk>,
    total_bytes: usize,
    bytes_delivered: usize,
    chunks_delivered: usize,
}

impl Job {
    fn new(data: &[u8], chunk_size: usize) -> Self {
        let queue = data
            .chunks(chunk_size)
            .enumerate()
            .map(|(index, chunk)| WriteChunk {
                index,
                data: chunk.to_vec(),
            })
            .collect();
        Self {
            queue,
            in_flight: None,
            total_bytes: data.len(),
            bytes_delivered: 0,
            chunks_delivered: 0,
        }
    }

    fn result(&self, failure: Option<JobFailure>) -> JobResult {
        JobResult {
            bytes_delivered: self.bytes_delivered,
            total_bytes: self.total_bytes,
            chunks_delivered: self.chunks_delivered,
            failure,
        }
    }
}

#[derive(Debug)]
enum Phase {
    Idle,
    Scanning {
        seen: HashSet<DeviceId>,
    },
    Connecting {
        device: DeviceId,
        /// Set once the platform confirms the link
        mtu: Option<Option<u16>>,
    },
    Connected(Connection),
    Writing {
        conn: Connection,
        job: Job,
    },
    Disconnected,
}

impl Phase {
    fn state(&self) -> State {
        match self {
            Self::Idle => State::Idle,
            Self::Scanning { .. } => State::Scanning,
            Self::Connecting { .. } => State::Connecting,
            Self::Connected(_) => State::Connected,
            Self::Writing { .. } => State::Writing,
            Self::Disconnected => State::Disconnected,
        }
    }
}

// ============================================================================
// STATE MACHINE
// ============================================================================

/// The printer link, minus the I/O.
#[derive(Debug)]
pub struct TransportMachine {
    config: TransportConfig,
    phase: Phase,
}

impl TransportMachine {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            phase: Phase::Idle,
        }
    }

    pub fn state(&self) -> State {
        self.phase.state()
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// The device being connected to, or connected.
    pub fn device(&self) -> Option<&DeviceId> {
        match &self.phase {
            Phase::Connecting { device, .. } => Some(device),
            Phase::Connected(conn) | Phase::Writing { conn, .. } => Some(&conn.device),
            _ => None,
        }
    }

    fn enter(&mut self, phase: Phase) -> Phase {
        let from = self.phase.state();
        let to = phase.state();
        if from != to {
            log::debug!("transport: {} -> {}", from, to);
        }
        std::mem::replace(&mut self.phase, phase)
    }

    fn invalid(&self, operation: &'static str) -> ThermalinkError {
        ThermalinkError::InvalidState {
            operation,
            state: self.state().as_str(),
        }
    }

    // ------------------------------------------------------------------------
    // Discovery
    // ------------------------------------------------------------------------

    /// Idle → Scanning.
    pub fn start_scan(&mut self) -> Result<Vec<Action>> {
        if !matches!(self.phase, Phase::Idle) {
            return Err(self.invalid("start scan"));
        }
        self.enter(Phase::Scanning {
            seen: HashSet::new(),
        });
        Ok(vec![Action::Command(Command::StartScan)])
    }

    /// Scanning → Idle.
    pub fn stop_scan(&mut self) -> Result<Vec<Action>> {
        if !matches!(self.phase, Phase::Scanning { .. }) {
            return Err(self.invalid("stop scan"));
        }
        self.enter(Phase::Idle);
        Ok(vec![Action::Command(Command::StopScan)])
    }

    /// Scanning → Connecting. Devices seen so far are forgotten.
    pub fn select_device(&mut self, device: DeviceId) -> Result<Vec<Action>> {
        if !matches!(self.phase, Phase::Scanning { .. }) {
            return Err(self.invalid("select device"));
        }
        self.enter(Phase::Connecting {
            device: device.clone(),
            mtu: None,
        });
        Ok(vec![
            Action::Command(Command::StopScan),
            Action::Command(Command::Connect(device)),
        ])
    }

    /// Connect to a known device. From `Idle` this skips scanning; from
    /// `Scanning` it is the same as [`select_device`](Self::select_device).
    pub fn connect(&mut self, device: DeviceId) -> Result<Vec<Action>> {
        match self.phase {
            Phase::Scanning { .. } => self.select_device(device),
            Phase::Idle => {
                self.enter(Phase::Connecting {
                    device: device.clone(),
                    mtu: None,
                });
                Ok(vec![Action::Command(Command::Connect(device))])
            }
            _ => Err(self.invalid("connect")),
        }
    }

    /// The connect timeout elapsed. Connecting → Idle.
    pub fn connect_timed_out(&mut self) -> Vec<Action> {
        if !matches!(self.phase, Phase::Connecting { .. }) {
            log::debug!("connect timeout ignored while {}", self.state());
            return Vec::new();
        }
        log::warn!("connection attempt timed out");
        self.enter(Phase::Idle);
        vec![
            Action::Command(Command::Disconnect),
            Action::Notice(Notice::ConnectFailed(ConnectFailure::Timeout)),
        ]
    }

    // ------------------------------------------------------------------------
    // Jobs
    // ------------------------------------------------------------------------

    /// Queue `data` for delivery. Connected → Writing.
    ///
    /// Fails with [`ThermalinkError::Busy`] while another job is in flight,
    /// leaving that job untouched.
    pub fn submit(&mut self, data: &[u8]) -> Result<Vec<Action>> {
        let conn = match &self.phase {
            Phase::Connected(conn) => conn.clone(),
            Phase::Writing { .. } => return Err(ThermalinkError::Busy),
            _ => return Err(self.invalid("submit")),
        };

        let mut job = Job::new(data, conn.chunk_size);
        if job.queue.is_empty() {
            log::debug!("empty job completes immediately");
            return Ok(vec![Action::Notice(Notice::JobFinished(job.result(None)))]);
        }

        log::debug!(
            "job of {} bytes in {} chunk(s) of {}",
            data.len(),
            job.queue.len(),
            conn.chunk_size
        );
        let first = Self::next_write(&conn, &mut job);
        self.enter(Phase::Writing { conn, job });
        Ok(first.into_iter().collect())
    }

    /// Move the next queued chunk in flight and build its write command.
    fn next_write(conn: &Connection, job: &mut Job) -> Option<Action> {
        let chunk = job.queue.pop_front()?;
        job.in_flight = Some(chunk.clone());
        Some(Action::Command(Command::Write {
            characteristic: conn.characteristic,
            chunk,
            with_response: conn.with_response,
        }))
    }

    /// No acknowledgment within the write timeout. Writing → Disconnected.
    pub fn write_timed_out(&mut self) -> Vec<Action> {
        if !matches!(self.phase, Phase::Writing { .. }) {
            log::debug!("write timeout ignored while {}", self.state());
            return Vec::new();
        }
        log::warn!("write acknowledgment timed out");
        self.abort_job(JobFailure::Timeout, true)
    }

    /// Writing → Disconnected, reporting the job with `failure`.
    fn abort_job(&mut self, failure: JobFailure, send_disconnect: bool) -> Vec<Action> {
        let Phase::Writing { job, .. } = self.enter(Phase::Disconnected) else {
            return Vec::new();
        };
        let result = job.result(Some(failure));
        log::info!(
            "job aborted after {}/{} bytes: {:?}",
            result.bytes_delivered,
            result.total_bytes,
            result.failure
        );

        let mut actions = Vec::new();
        if send_disconnect {
            actions.push(Action::Command(Command::Disconnect));
        }
        actions.push(Action::Notice(Notice::JobFinished(result)));
        actions
    }

    // ------------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------------

    /// Abandon whatever is pending.
    ///
    /// - Scanning → Idle
    /// - Connecting → Idle, reporting `Cancelled`
    /// - Writing → Disconnected, reporting the partial job as `Cancelled`
    ///
    /// Other states are left alone.
    pub fn cancel(&mut self) -> Vec<Action> {
        match self.phase {
            Phase::Scanning { .. } => {
                self.enter(Phase::Idle);
                vec![Action::Command(Command::StopScan)]
            }
            Phase::Connecting { .. } => {
                self.enter(Phase::Idle);
                vec![
                    Action::Command(Command::Disconnect),
                    Action::Notice(Notice::ConnectFailed(ConnectFailure::Cancelled)),
                ]
            }
            Phase::Writing { .. } => self.abort_job(JobFailure::Cancelled, true),
            _ => {
                log::debug!("nothing to cancel while {}", self.state());
                Vec::new()
            }
        }
    }

    /// Explicit teardown from any state. Ends in Idle.
    pub fn disconnect(&mut self) -> Vec<Action> {
        match self.enter(Phase::Idle) {
            Phase::Idle | Phase::Disconnected => Vec::new(),
            Phase::Scanning { .. } => vec![Action::Command(Command::StopScan)],
            Phase::Connecting { .. } => vec![
                Action::Command(Command::Disconnect),
                Action::Notice(Notice::ConnectFailed(ConnectFailure::Cancelled)),
            ],
            Phase::Connected(_) => vec![Action::Command(Command::Disconnect)],
            Phase::Writing { job, .. } => vec![
                Action::Command(Command::Disconnect),
                Action::Notice(Notice::JobFinished(job.result(Some(JobFailure::Cancelled)))),
            ],
        }
    }

    /// Disconnected → Idle. A no-op when already Idle.
    pub fn reset(&mut self) -> Result<()> {
        match self.phase {
            Phase::Disconnected => {
                self.enter(Phase::Idle);
                Ok(())
            }
            Phase::Idle => Ok(()),
            _ => Err(self.invalid("reset")),
        }
    }

    /// A platform command could not even be issued.
    pub fn command_failed(&mut self, command: &Command, reason: String) -> Vec<Action> {
        match (command, &self.phase) {
            (Command::StartScan, Phase::Scanning { .. }) => {
                self.enter(Phase::Idle);
                Vec::new()
            }
            (Command::Connect(_) | Command::DiscoverCharacteristics, Phase::Connecting { .. }) => {
                self.enter(Phase::Idle);
                vec![
                    Action::Command(Command::Disconnect),
                    Action::Notice(Notice::ConnectFailed(ConnectFailure::Platform(reason))),
                ]
            }
            (Command::Write { .. }, Phase::Writing { .. }) => {
                self.abort_job(JobFailure::Rejected(reason), true)
            }
            _ => {
                log::warn!("{:?} failed while {}: {}", command, self.state(), reason);
                Vec::new()
            }
        }
    }

    // ------------------------------------------------------------------------
    // Platform events
    // ------------------------------------------------------------------------

    /// Feed one platform event.
    pub fn handle_event(&mut self, event: PlatformEvent) -> Vec<Action> {
        match event {
            PlatformEvent::DeviceDiscovered(device) => self.on_device(device),
            PlatformEvent::Connected { device, mtu } => self.on_connected(device, mtu),
            PlatformEvent::CharacteristicsDiscovered(chars) => self.on_characteristics(&chars),
            PlatformEvent::Disconnected => self.on_link_lost(),
            PlatformEvent::WriteAcknowledged => self.on_write_ack(),
            PlatformEvent::WriteFailed(reason) => self.on_write_failed(reason),
        }
    }

    fn stray(&self, event: &str) -> Vec<Action> {
        log::warn!("ignoring {} while {}", event, self.state());
        Vec::new()
    }

    fn on_device(&mut self, device: Device) -> Vec<Action> {
        let Phase::Scanning { seen } = &mut self.phase else {
            log::debug!("late discovery of {} ignored", device.id);
            return Vec::new();
        };
        if let Some(prefix) = &self.config.name_prefix {
            let matches = device
                .name
                .as_deref()
                .is_some_and(|name| name.starts_with(prefix.as_str()));
            if !matches {
                return Vec::new();
            }
        }
        if !seen.insert(device.id.clone()) {
            return Vec::new();
        }
        log::debug!("found {}", device);
        vec![Action::Notice(Notice::DeviceFound(device))]
    }

    fn on_connected(&mut self, id: DeviceId, negotiated: Option<u16>) -> Vec<Action> {
        match &mut self.phase {
            Phase::Connecting { device, mtu } if *device == id && mtu.is_none() => {
                log::debug!("link to {} up (mtu {:?})", id, negotiated);
                *mtu = Some(negotiated);
                vec![Action::Command(Command::DiscoverCharacteristics)]
            }
            _ => self.stray("connected event"),
        }
    }

    fn on_characteristics(&mut self, chars: &[Characteristic]) -> Vec<Action> {
        let Phase::Connecting {
            device,
            mtu: Some(mtu),
        } = &self.phase
        else {
            return self.stray("characteristics");
        };
        let (device, mtu) = (device.clone(), *mtu);

        let Some(characteristic) = self.resolve_characteristic(chars) else {
            log::warn!("{} has no usable characteristic", device);
            self.enter(Phase::Disconnected);
            return vec![
                Action::Command(Command::Disconnect),
                Action::Notice(Notice::ConnectFailed(ConnectFailure::CharacteristicNotFound)),
            ];
        };

        let conn = Connection {
            device: device.clone(),
            characteristic: characteristic.uuid,
            with_response: characteristic.write,
            chunk_size: self.config.chunk_size_for(mtu),
        };
        log::info!(
            "connected to {} via {} ({}, {} byte chunks)",
            device,
            conn.characteristic,
            if conn.with_response {
                "acknowledged"
            } else {
                "paced"
            },
            conn.chunk_size
        );
        let chunk_size = conn.chunk_size;
        self.enter(Phase::Connected(conn));
        vec![Action::Notice(Notice::Connected { device, chunk_size })]
    }

    /// Configured UUID first, then the first acknowledged characteristic,
    /// then the first unacknowledged one.
    fn resolve_characteristic(&self, chars: &[Characteristic]) -> Option<Characteristic> {
        if let Some(uuid) = self.config.characteristic_uuid {
            return chars
                .iter()
                .find(|c| c.uuid == uuid && c.is_writable())
                .copied();
        }
        chars
            .iter()
            .find(|c| c.write)
            .or_else(|| chars.iter().find(|c| c.write_without_response))
            .copied()
    }

    fn on_link_lost(&mut self) -> Vec<Action> {
        match self.phase {
            Phase::Idle | Phase::Disconnected => {
                log::debug!("link loss ignored while {}", self.state());
                Vec::new()
            }
            Phase::Scanning { .. } | Phase::Connected(_) => {
                log::warn!("link lost while {}", self.state());
                self.enter(Phase::Disconnected);
                Vec::new()
            }
            Phase::Connecting { .. } => {
                log::warn!("link lost while connecting");
                self.enter(Phase::Disconnected);
                vec![Action::Notice(Notice::ConnectFailed(ConnectFailure::LinkLost))]
            }
            Phase::Writing { .. } => {
                log::warn!("link lost mid-job");
                self.abort_job(JobFailure::LinkLost, false)
            }
        }
    }

    fn on_write_ack(&mut self) -> Vec<Action> {
        let Phase::Writing { conn, job } = &mut self.phase else {
            return self.stray("write acknowledgment");
        };
        let Some(chunk) = job.in_flight.take() else {
            return self.stray("unexpected write acknowledgment");
        };
        job.bytes_delivered += chunk.data.len();
        job.chunks_delivered += 1;

        if let Some(write) = Self::next_write(conn, job) {
            return vec![write];
        }

        let result = job.result(None);
        log::info!(
            "job delivered: {} bytes in {} chunk(s)",
            result.bytes_delivered,
            result.chunks_delivered
        );
        let conn = conn.clone();
        self.enter(Phase::Connected(conn));
        vec![Action::Notice(Notice::JobFinished(result))]
    }

    fn on_write_failed(&mut self, reason: String) -> Vec<Action> {
        if !matches!(self.phase, Phase::Writing { .. }) {
            return self.stray("write failure");
        }
        log::warn!("write failed: {}", reason);
        self.abort_job(JobFailure::Rejected(reason), true)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CHAR: Uuid = Uuid::from_u128(0x49535343_8841_43f4_a8d4_ecbe34729bb3);

    fn acked() -> Characteristic {
        Characteristic {
            uuid: CHAR,
            write: true,
            write_without_response: false,
        }
    }

    fn config(chunk_size: usize) -> TransportConfig {
        TransportConfig {
            chunk_size,
            ..TransportConfig::default()
        }
    }

    /// Drive a fresh machine to `Connected` with `chars`.
    fn connected(chunk_size: usize, chars: Vec<Characteristic>) -> TransportMachine {
        let mut m = TransportMachine::new(config(chunk_size));
        m.connect("printer".into()).unwrap();
        m.handle_event(PlatformEvent::Connected {
            device: "printer".into(),
            mtu: None,
        });
        m.handle_event(PlatformEvent::CharacteristicsDiscovered(chars));
        assert_eq!(m.state(), State::Connected);
        m
    }

    fn writes(actions: &[Action]) -> Vec<Vec<u8>> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Command(Command::Write { chunk, .. }) => Some(chunk.data.clone()),
                _ => None,
            })
            .collect()
    }

    fn job_result(actions: &[Action]) -> Option<JobResult> {
        actions.iter().find_map(|a| match a {
            Action::Notice(Notice::JobFinished(result)) => Some(result.clone()),
            _ => None,
        })
    }

    // ========================================================================
    // Discovery and connection
    // ========================================================================

    #[test]
    fn test_scan_dedupes_devices() {
        let mut m = TransportMachine::new(TransportConfig::default());
        assert_eq!(m.start_scan().unwrap(), vec![Action::Command(Command::StartScan)]);
        assert_eq!(m.state(), State::Scanning);

        let first = m.handle_event(PlatformEvent::DeviceDiscovered(Device::new("a")));
        let again = m.handle_event(PlatformEvent::DeviceDiscovered(Device::new("a").rssi(-40)));
        let other = m.handle_event(PlatformEvent::DeviceDiscovered(Device::new("b")));
        assert_eq!(first.len(), 1);
        assert!(again.is_empty());
        assert_eq!(
            other,
            vec![Action::Notice(Notice::DeviceFound(Device::new("b")))]
        );
    }

    #[test]
    fn test_scan_name_prefix_filter() {
        let mut m = TransportMachine::new(TransportConfig {
            name_prefix: Some("PT-".to_string()),
            ..TransportConfig::default()
        });
        m.start_scan().unwrap();
        assert!(
            m.handle_event(PlatformEvent::DeviceDiscovered(Device::new("x").named("Headphones")))
                .is_empty()
        );
        assert!(
            m.handle_event(PlatformEvent::DeviceDiscovered(Device::new("y")))
                .is_empty()
        );
        assert_eq!(
            m.handle_event(PlatformEvent::DeviceDiscovered(Device::new("z").named("PT-210")))
                .len(),
            1
        );
    }

    #[test]
    fn test_select_device_stops_scan() {
        let mut m = TransportMachine::new(TransportConfig::default());
        m.start_scan().unwrap();
        let actions = m.select_device("a".into()).unwrap();
        assert_eq!(
            actions,
            vec![
                Action::Command(Command::StopScan),
                Action::Command(Command::Connect("a".into())),
            ]
        );
        assert_eq!(m.state(), State::Connecting);
        // Discoveries after selection are dropped
        assert!(
            m.handle_event(PlatformEvent::DeviceDiscovered(Device::new("c")))
                .is_empty()
        );
    }

    #[test]
    fn test_connect_flow() {
        let mut m = TransportMachine::new(TransportConfig::default());
        assert_eq!(
            m.connect("p".into()).unwrap(),
            vec![Action::Command(Command::Connect("p".into()))]
        );
        assert_eq!(
            m.handle_event(PlatformEvent::Connected {
                device: "p".into(),
                mtu: Some(185),
            }),
            vec![Action::Command(Command::DiscoverCharacteristics)]
        );
        let actions = m.handle_event(PlatformEvent::CharacteristicsDiscovered(vec![acked()]));
        assert_eq!(
            actions,
            vec![Action::Notice(Notice::Connected {
                device: "p".into(),
                chunk_size: 182,
            })]
        );
        assert_eq!(m.state(), State::Connected);
        assert_eq!(m.device(), Some(&DeviceId::new("p")));
    }

    #[test]
    fn test_connected_event_for_other_device_ignored() {
        let mut m = TransportMachine::new(TransportConfig::default());
        m.connect("p".into()).unwrap();
        let actions = m.handle_event(PlatformEvent::Connected {
            device: "q".into(),
            mtu: None,
        });
        assert!(actions.is_empty());
        // Characteristics before the link is confirmed are stray too
        assert!(
            m.handle_event(PlatformEvent::CharacteristicsDiscovered(vec![acked()]))
                .is_empty()
        );
        assert_eq!(m.state(), State::Connecting);
    }

    #[test]
    fn test_characteristic_resolution_order() {
        let paced = Characteristic {
            uuid: Uuid::from_u128(1),
            write: false,
            write_without_response: true,
        };
        let ack = Characteristic {
            uuid: Uuid::from_u128(2),
            write: true,
            write_without_response: true,
        };
        let read_only = Characteristic {
            uuid: Uuid::from_u128(3),
            write: false,
            write_without_response: false,
        };

        let m = TransportMachine::new(TransportConfig::default());
        assert_eq!(m.resolve_characteristic(&[read_only, paced, ack]), Some(ack));
        assert_eq!(m.resolve_characteristic(&[read_only, paced]), Some(paced));
        assert_eq!(m.resolve_characteristic(&[read_only]), None);

        let pinned = TransportMachine::new(TransportConfig {
            characteristic_uuid: Some(paced.uuid),
            ..TransportConfig::default()
        });
        assert_eq!(pinned.resolve_characteristic(&[ack, paced]), Some(paced));
        assert_eq!(pinned.resolve_characteristic(&[ack]), None);
    }

    #[test]
    fn test_no_characteristic_disconnects() {
        let mut m = TransportMachine::new(TransportConfig::default());
        m.connect("p".into()).unwrap();
        m.handle_event(PlatformEvent::Connected {
            device: "p".into(),
            mtu: None,
        });
        let actions = m.handle_event(PlatformEvent::CharacteristicsDiscovered(vec![]));
        assert_eq!(
            actions,
            vec![
                Action::Command(Command::Disconnect),
                Action::Notice(Notice::ConnectFailed(ConnectFailure::CharacteristicNotFound)),
            ]
        );
        assert_eq!(m.state(), State::Disconnected);
        m.reset().unwrap();
        assert_eq!(m.state(), State::Idle);
    }

    #[test]
    fn test_connect_timeout() {
        let mut m = TransportMachine::new(TransportConfig::default());
        m.connect("p".into()).unwrap();
        let actions = m.connect_timed_out();
        assert_eq!(
            actions,
            vec![
                Action::Command(Command::Disconnect),
                Action::Notice(Notice::ConnectFailed(ConnectFailure::Timeout)),
            ]
        );
        assert_eq!(m.state(), State::Idle);
        // A late timeout is harmless
        assert!(m.connect_timed_out().is_empty());
    }

    #[test]
    fn test_invalid_operations() {
        let mut m = TransportMachine::new(TransportConfig::default());
        assert!(matches!(
            m.submit(b"x"),
            Err(ThermalinkError::InvalidState {
                operation: "submit",
                state: "idle"
            })
        ));
        assert!(m.stop_scan().is_err());
        assert!(m.select_device("a".into()).is_err());

        m.connect("p".into()).unwrap();
        assert!(m.start_scan().is_err());
        assert!(m.connect("q".into()).is_err());
        assert!(m.reset().is_err());
    }

    // ========================================================================
    // Jobs
    // ========================================================================

    #[test]
    fn test_37_bytes_in_chunks_of_20() {
        let mut m = connected(20, vec![acked()]);
        let data: Vec<u8> = (0..37).collect();

        let first = m.submit(&data).unwrap();
        assert_eq!(writes(&first), vec![data[..20].to_vec()]);
        assert_eq!(m.state(), State::Writing);

        let second = m.handle_event(PlatformEvent::WriteAcknowledged);
        assert_eq!(writes(&second), vec![data[20..].to_vec()]);

        let done = m.handle_event(PlatformEvent::WriteAcknowledged);
        assert_eq!(
            job_result(&done),
            Some(JobResult {
                bytes_delivered: 37,
                total_bytes: 37,
                chunks_delivered: 2,
                failure: None,
            })
        );
        assert_eq!(m.state(), State::Connected);
    }

    #[test]
    fn test_chunks_in_order() {
        for (n, size) in [(1usize, 1usize), (100, 7), (64, 64), (65, 64), (513, 20)] {
            let mut m = connected(size, vec![acked()]);
            let data: Vec<u8> = (0..n).map(|i| i as u8).collect();

            let mut actions = m.submit(&data).unwrap();
            let mut sent = Vec::new();
            let mut indices = Vec::new();
            loop {
                for action in &actions {
                    if let Action::Command(Command::Write { chunk, .. }) = action {
                        indices.push(chunk.index);
                        sent.extend_from_slice(&chunk.data);
                    }
                }
                if job_result(&actions).is_some() {
                    break;
                }
                actions = m.handle_event(PlatformEvent::WriteAcknowledged);
            }

            assert_eq!(indices.len(), n.div_ceil(size));
            assert!(indices.windows(2).all(|w| w[1] == w[0] + 1));
            assert_eq!(sent, data);
        }
    }

    #[test]
    fn test_busy_leaves_job_untouched() {
        let mut m = connected(4, vec![acked()]);
        m.submit(b"abcdefgh").unwrap();

        assert!(matches!(m.submit(b"zzzz"), Err(ThermalinkError::Busy)));
        assert_eq!(m.state(), State::Writing);

        let next = m.handle_event(PlatformEvent::WriteAcknowledged);
        assert_eq!(writes(&next), vec![b"efgh".to_vec()]);
        let done = m.handle_event(PlatformEvent::WriteAcknowledged);
        assert_eq!(job_result(&done).unwrap().bytes_delivered, 8);
    }

    #[test]
    fn test_empty_submit_completes_immediately() {
        let mut m = connected(20, vec![acked()]);
        let actions = m.submit(&[]).unwrap();
        assert_eq!(
            actions,
            vec![Action::Notice(Notice::JobFinished(JobResult {
                bytes_delivered: 0,
                total_bytes: 0,
                chunks_delivered: 0,
                failure: None,
            }))]
        );
        assert_eq!(m.state(), State::Connected);
    }

    #[test]
    fn test_link_lost_mid_job() {
        let mut m = connected(10, vec![acked()]);
        m.submit(&[0u8; 35]).unwrap();
        m.handle_event(PlatformEvent::WriteAcknowledged);

        let actions = m.handle_event(PlatformEvent::Disconnected);
        let result = job_result(&actions).unwrap();
        assert_eq!(result.failure, Some(JobFailure::LinkLost));
        assert_eq!(result.bytes_delivered, 10);
        assert!(result.bytes_delivered < result.total_bytes);
        // The link is already gone: no disconnect command
        assert!(!actions.contains(&Action::Command(Command::Disconnect)));
        assert_eq!(m.state(), State::Disconnected);

        // Remaining chunks were dropped
        assert!(m.handle_event(PlatformEvent::WriteAcknowledged).is_empty());

        let err = result.into_result().unwrap_err();
        assert!(matches!(
            err,
            ThermalinkError::WriteFailed {
                bytes_delivered: 10,
                ..
            }
        ));
    }

    #[test]
    fn test_write_failed_and_timeout() {
        let mut m = connected(10, vec![acked()]);
        m.submit(&[1u8; 15]).unwrap();
        let actions = m.handle_event(PlatformEvent::WriteFailed("GATT error 0x0e".into()));
        assert_eq!(actions[0], Action::Command(Command::Disconnect));
        assert_eq!(
            job_result(&actions).unwrap().failure,
            Some(JobFailure::Rejected("GATT error 0x0e".into()))
        );

        let mut m = connected(10, vec![acked()]);
        m.submit(&[1u8; 15]).unwrap();
        let actions = m.write_timed_out();
        assert_eq!(job_result(&actions).unwrap().failure, Some(JobFailure::Timeout));
        assert_eq!(m.state(), State::Disconnected);
    }

    #[test]
    fn test_paced_characteristic() {
        let paced = Characteristic {
            uuid: CHAR,
            write: false,
            write_without_response: true,
        };
        let mut m = connected(20, vec![paced]);
        let actions = m.submit(b"hello").unwrap();
        assert!(matches!(
            &actions[0],
            Action::Command(Command::Write {
                with_response: false,
                ..
            })
        ));
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    #[test]
    fn test_cancel_each_state() {
        let mut m = TransportMachine::new(TransportConfig::default());
        m.start_scan().unwrap();
        assert_eq!(m.cancel(), vec![Action::Command(Command::StopScan)]);
        assert_eq!(m.state(), State::Idle);

        m.connect("p".into()).unwrap();
        let actions = m.cancel();
        assert!(actions.contains(&Action::Notice(Notice::ConnectFailed(
            ConnectFailure::Cancelled
        ))));
        assert_eq!(m.state(), State::Idle);

        let mut m = connected(5, vec![acked()]);
        m.submit(&[0u8; 12]).unwrap();
        m.handle_event(PlatformEvent::WriteAcknowledged);
        let actions = m.cancel();
        let result = job_result(&actions).unwrap();
        assert_eq!(result.failure, Some(JobFailure::Cancelled));
        assert_eq!(result.bytes_delivered, 5);
        assert_eq!(m.state(), State::Disconnected);

        // Connected has nothing to cancel
        let mut m = connected(5, vec![acked()]);
        assert!(m.cancel().is_empty());
        assert_eq!(m.state(), State::Connected);
    }

    #[test]
    fn test_disconnect_from_any_state() {
        let mut m = connected(5, vec![acked()]);
        m.submit(&[0u8; 12]).unwrap();
        let actions = m.disconnect();
        assert_eq!(actions[0], Action::Command(Command::Disconnect));
        assert_eq!(
            job_result(&actions).unwrap().failure,
            Some(JobFailure::Cancelled)
        );
        assert_eq!(m.state(), State::Idle);

        assert!(m.disconnect().is_empty());
        assert_eq!(m.state(), State::Idle);
    }

    #[test]
    fn test_link_lost_ignored_when_idle() {
        let mut m = TransportMachine::new(TransportConfig::default());
        assert!(m.handle_event(PlatformEvent::Disconnected).is_empty());
        assert_eq!(m.state(), State::Idle);
    }

    #[test]
    fn test_link_lost_while_connected() {
        let mut m = connected(5, vec![acked()]);
        assert!(m.handle_event(PlatformEvent::Disconnected).is_empty());
        assert_eq!(m.state(), State::Disconnected);
        assert!(m.submit(b"x").is_err());
        m.reset().unwrap();
        assert_eq!(m.state(), State::Idle);
    }

    #[test]
    fn test_command_failures() {
        let mut m = TransportMachine::new(TransportConfig::default());
        m.start_scan().unwrap();
        assert!(m.command_failed(&Command::StartScan, "adapter off".into()).is_empty());
        assert_eq!(m.state(), State::Idle);

        m.connect("p".into()).unwrap();
        let actions = m.command_failed(&Command::Connect("p".into()), "no route".into());
        assert!(actions.contains(&Action::Notice(Notice::ConnectFailed(
            ConnectFailure::Platform("no route".into())
        ))));
        assert_eq!(m.state(), State::Idle);
    }
}
