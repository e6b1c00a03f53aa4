//! # Session
//!
//! The async driver around [`TransportMachine`]. A session owns the machine,
//! the platform and the platform's event channel, and is the only place
//! where the transport waits.
//!
//! ## Waiting
//!
//! Every wait is a `tokio::select!` over:
//!
//! | Branch | Effect |
//! |--------|--------|
//! | next platform event | fed to the machine |
//! | deadline (connect or per-chunk write timeout) | `connect_timed_out` / `write_timed_out` |
//! | pacing delay (unacknowledged writes only) | synthesized `WriteAcknowledged` |
//! | [`CancelHandle::cancel`] | `cancel` |
//!
//! A closed event channel counts as a lost link.
//!
//! Events that arrive while nothing is waiting (a link dropping while the
//! session sits Connected) are queued. Every operation drains the queue
//! before acting, and [`Session::drain_events`] does so on demand.
//!
//! ## Example
//!
//! ```no_run
//! use thermalink::printer::TransportConfig;
//! use thermalink::transport::{Session, rfcomm::RfcommPlatform, platform::event_channel};
//!
//! # async fn demo() -> thermalink::Result<()> {
//! let (events_tx, events_rx) = event_channel();
//! let platform = RfcommPlatform::new(events_tx);
//! let mut session = Session::new(Box::new(platform), events_rx, TransportConfig::default());
//!
//! session.connect(&"00:11:22:33:44:55".into()).await?;
//! let result = session.submit(b"\x1b@hello\n").await?;
//! println!("{} bytes delivered", result.bytes_delivered);
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::{Instant, sleep_until};

use super::machine::{Action, Command, JobResult, Notice, State, TransportMachine};
use super::platform::{BlePlatform, Device, DeviceId, EventReceiver, PlatformEvent};
use crate::error::{Result, ThermalinkError};
use crate::printer::TransportConfig;

/// Cancels whatever the session is currently waiting on, from any task.
///
/// A cancel with nothing pending has no effect.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    notify: Arc<Notify>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.notify.notify_waiters();
    }
}

/// Owner of one printer link.
pub struct Session {
    machine: TransportMachine,
    platform: Box<dyn BlePlatform>,
    events: EventReceiver,
    cancel: Arc<Notify>,
    /// Discoveries not yet handed out by `next_device`
    found: VecDeque<Device>,
    /// Acknowledgment deadline of the chunk in flight
    write_deadline: Option<Instant>,
    /// When to synthesize the acknowledgment of an unacknowledged write
    paced_ack: Option<Instant>,
}

impl Session {
    pub fn new(platform: Box<dyn BlePlatform>, events: EventReceiver, config: TransportConfig) -> Self {
        Self {
            machine: TransportMachine::new(config),
            platform,
            events,
            cancel: Arc::new(Notify::new()),
            found: VecDeque::new(),
            write_deadline: None,
            paced_ack: None,
        }
    }

    /// State as of the last processed event. Call
    /// [`drain_events`](Self::drain_events) first to account for events
    /// queued since.
    pub fn state(&self) -> State {
        self.machine.state()
    }

    /// Process every queued platform event without waiting.
    pub async fn drain_events(&mut self) -> Result<()> {
        loop {
            let (event, closed) = match self.events.try_recv() {
                Ok(event) => (Some(event), false),
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => (None, true),
            };
            let actions = self.feed(event);
            let notices = self.run(actions).await?;
            self.collect_devices(notices);
            if closed {
                return Ok(());
            }
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            notify: Arc::clone(&self.cancel),
        }
    }

    fn config(&self) -> &TransportConfig {
        self.machine.config()
    }

    // ========================================================================
    // Discovery
    // ========================================================================

    /// Begin discovering devices. Idle → Scanning.
    pub async fn start_scan(&mut self) -> Result<()> {
        self.drain_events().await?;
        self.found.clear();
        let actions = self.machine.start_scan()?;
        let notices = self.run(actions).await?;
        self.collect_devices(notices);
        Ok(())
    }

    /// Wait up to `wait` for the next newly discovered device.
    ///
    /// Returns `Ok(None)` when nothing new shows up in time.
    pub async fn next_device(&mut self, wait: Duration) -> Result<Option<Device>> {
        self.drain_events().await?;
        if let Some(device) = self.found.pop_front() {
            return Ok(Some(device));
        }
        if self.state() != State::Scanning {
            return Err(ThermalinkError::InvalidState {
                operation: "wait for devices",
                state: self.state().as_str(),
            });
        }

        let cancel = Arc::clone(&self.cancel);
        let cancelled = cancel.notified();
        tokio::pin!(cancelled);
        let deadline = Instant::now() + wait;

        loop {
            let actions = tokio::select! {
                event = self.events.recv() => self.feed(event),
                _ = sleep_until(deadline) => return Ok(None),
                _ = &mut cancelled => {
                    let actions = self.machine.cancel();
                    self.run(actions).await?;
                    return Err(ThermalinkError::Cancelled);
                }
            };
            let notices = self.run(actions).await?;
            self.collect_devices(notices);

            if let Some(device) = self.found.pop_front() {
                return Ok(Some(device));
            }
            if self.state() != State::Scanning {
                return Err(ThermalinkError::LinkLost);
            }
        }
    }

    /// Stop discovering. Scanning → Idle.
    pub async fn stop_scan(&mut self) -> Result<()> {
        self.found.clear();
        let actions = self.machine.stop_scan()?;
        self.run(actions).await?;
        Ok(())
    }

    fn collect_devices(&mut self, notices: Vec<Notice>) {
        for notice in notices {
            if let Notice::DeviceFound(device) = notice {
                self.found.push_back(device);
            }
        }
    }

    // ========================================================================
    // Connection
    // ========================================================================

    /// Connect to `device` and resolve its writable characteristic.
    ///
    /// Works from Idle, or from Scanning (which stops the scan). Fails with
    /// [`ThermalinkError::ConnectionTimeout`] if the link is not up within
    /// the connect timeout.
    pub async fn connect(&mut self, device: &DeviceId) -> Result<()> {
        let cancel = Arc::clone(&self.cancel);
        let cancelled = cancel.notified();
        tokio::pin!(cancelled);

        self.drain_events().await?;
        self.found.clear();
        let actions = self.machine.connect(device.clone())?;
        let deadline = Instant::now() + self.config().connect_timeout();
        let mut notices = self.run(actions).await?;

        loop {
            for notice in notices.drain(..) {
                match notice {
                    Notice::Connected { .. } => return Ok(()),
                    Notice::ConnectFailed(failure) => return Err(failure.into()),
                    _ => {}
                }
            }

            let actions = tokio::select! {
                event = self.events.recv() => self.feed(event),
                _ = sleep_until(deadline) => self.machine.connect_timed_out(),
                _ = &mut cancelled => self.machine.cancel(),
            };
            notices = self.run(actions).await?;
        }
    }

    /// Tear down the link, whatever state it is in. Ends Idle.
    pub async fn disconnect(&mut self) -> Result<()> {
        self.drain_events().await?;
        let actions = self.machine.disconnect();
        self.run(actions).await?;
        self.found.clear();
        Ok(())
    }

    /// Acknowledge a dropped link. Disconnected → Idle.
    pub fn reset(&mut self) -> Result<()> {
        self.write_deadline = None;
        self.paced_ack = None;
        self.machine.reset()
    }

    // ========================================================================
    // Jobs
    // ========================================================================

    /// Deliver `data` to the printer, chunk by chunk.
    ///
    /// Transport failures (lost link, rejected write, timeout, cancel) come
    /// back as a [`JobResult`] with `failure` set; use
    /// [`JobResult::into_result`] to turn them into errors. `Err` is only
    /// returned when the session is not in a state to accept a job.
    pub async fn submit(&mut self, data: &[u8]) -> Result<JobResult> {
        let cancel = Arc::clone(&self.cancel);
        let cancelled = cancel.notified();
        tokio::pin!(cancelled);

        self.drain_events().await?;
        let actions = self.machine.submit(data)?;
        let mut notices = self.run(actions).await?;

        loop {
            for notice in notices.drain(..) {
                if let Notice::JobFinished(result) = notice {
                    self.write_deadline = None;
                    self.paced_ack = None;
                    return Ok(result);
                }
            }

            let write_timeout = self.config().write_timeout();
            let deadline = self
                .write_deadline
                .unwrap_or_else(|| Instant::now() + write_timeout);
            let paced = self.paced_ack;

            let actions = tokio::select! {
                event = self.events.recv() => self.feed(event),
                _ = sleep_until(paced.unwrap_or(deadline)), if paced.is_some() => {
                    self.paced_ack = None;
                    self.machine.handle_event(PlatformEvent::WriteAcknowledged)
                }
                _ = sleep_until(deadline) => self.machine.write_timed_out(),
                _ = &mut cancelled => self.machine.cancel(),
            };
            notices = self.run(actions).await?;
        }
    }

    // ========================================================================
    // Plumbing
    // ========================================================================

    /// Feed a received event. A closed channel is a lost link.
    fn feed(&mut self, event: Option<PlatformEvent>) -> Vec<Action> {
        let event = event.unwrap_or_else(|| {
            log::warn!("platform event channel closed");
            PlatformEvent::Disconnected
        });
        self.machine.handle_event(event)
    }

    /// Carry out machine actions: commands go to the platform, notices are
    /// returned in order.
    async fn run(&mut self, actions: Vec<Action>) -> Result<Vec<Notice>> {
        let mut pending: VecDeque<Action> = actions.into();
        let mut notices = Vec::new();

        while let Some(action) = pending.pop_front() {
            match action {
                Action::Notice(notice) => notices.push(notice),
                Action::Command(command) => {
                    if let Err(e) = self.execute(&command).await {
                        log::warn!("platform rejected {:?}: {}", command, e);
                        pending.extend(self.machine.command_failed(&command, e.to_string()));
                        if matches!(command, Command::StartScan) {
                            return Err(e);
                        }
                    }
                }
            }
        }
        Ok(notices)
    }

    async fn execute(&mut self, command: &Command) -> Result<()> {
        match command {
            Command::StartScan => self.platform.start_scan().await,
            Command::StopScan => self.platform.stop_scan().await,
            Command::Connect(device) => self.platform.connect(device).await,
            Command::DiscoverCharacteristics => self.platform.discover_characteristics().await,
            Command::Write {
                characteristic,
                chunk,
                with_response,
            } => {
                log::debug!("write chunk {} ({} bytes)", chunk.index, chunk.data.len());
                self.platform
                    .write(*characteristic, &chunk.data, *with_response)
                    .await?;
                let now = Instant::now();
                self.write_deadline = Some(now + self.config().write_timeout());
                self.paced_ack = if *with_response {
                    None
                } else {
                    Some(now + self.config().write_delay())
                };
                Ok(())
            }
            Command::Disconnect => {
                self.write_deadline = None;
                self.paced_ack = None;
                self.platform.disconnect().await
            }
        }
    }
}
