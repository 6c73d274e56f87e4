//! UDP command channel.
//!
//! An orchestrator drives recording with two plain-text datagrams sent to
//! the control port (11111 by default):
//!
//! - `Start Collection`: begin writing frames
//! - `End Collection`: stop writing and finish the run
//!
//! Anything else is ignored. The socket is polled without blocking, one
//! datagram per iteration, with a fixed sleep in between.

use crate::error::{CollectorError, Result};
use crate::session::SessionContext;
use chrono::{Local, NaiveDateTime};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

/// Payload that starts recording.
pub const START_COMMAND: &str = "Start Collection";
/// Payload that stops recording and ends the run.
pub const STOP_COMMAND: &str = "End Collection";

const MAX_DATAGRAM: usize = 1024;

/// A decoded control datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Start,
    Stop,
    Unrecognized,
}

impl ControlCommand {
    /// Decode a datagram. Non-UTF-8 payloads are unrecognized.
    pub fn parse(payload: &[u8]) -> Self {
        match std::str::from_utf8(payload) {
            Ok(START_COMMAND) => ControlCommand::Start,
            Ok(STOP_COMMAND) => ControlCommand::Stop,
            _ => ControlCommand::Unrecognized,
        }
    }
}

/// Lifecycle of the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Idle,
    Recording,
    /// Terminal.
    Stopped,
}

impl ControlState {
    /// Apply `command`, updating the session's recording flag.
    pub fn apply(self, command: ControlCommand, session: &SessionContext) -> ControlState {
        match (self, command) {
            (ControlState::Stopped, _) => ControlState::Stopped,
            (state, ControlCommand::Unrecognized) => state,
            (ControlState::Idle, ControlCommand::Start) => {
                session.set_active(true);
                ControlState::Recording
            }
            (ControlState::Recording, ControlCommand::Start) => ControlState::Recording,
            (ControlState::Idle, ControlCommand::Stop) => {
                session.set_active(false);
                ControlState::Idle
            }
            (ControlState::Recording, ControlCommand::Stop) => {
                session.set_active(false);
                ControlState::Stopped
            }
        }
    }
}

/// How the control loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    /// `End Collection` received while recording, at the given local time.
    Stopped { at: NaiveDateTime },
    /// The cancellation token fired first.
    Cancelled,
}

/// Non-blocking command listener.
pub struct ControlChannel {
    socket: UdpSocket,
    poll_interval: Duration,
}

impl ControlChannel {
    /// Bind the listener.
    ///
    /// UDP has no TIME_WAIT state, so a restarted collector can rebind the
    /// port as soon as the previous process has exited.
    pub async fn bind(addr: SocketAddr, poll_interval: Duration) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| CollectorError::Bind { addr, source })?;
        tracing::info!("Control channel listening on {}", addr);
        Ok(Self {
            socket,
            poll_interval,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Read at most one pending datagram.
    pub fn try_poll(&self) -> Option<(ControlCommand, SocketAddr)> {
        let mut buf = [0u8; MAX_DATAGRAM];
        match self.socket.try_recv_from(&mut buf) {
            Ok((n, peer)) => Some((ControlCommand::parse(&buf[..n]), peer)),
            Err(e) if e.kind() == ErrorKind::WouldBlock => None,
            Err(e) => {
                tracing::warn!("Control socket read error: {}", e);
                None
            }
        }
    }

    /// Poll commands until the session stops or `cancel` fires.
    pub async fn run(
        &self,
        session: &SessionContext,
        cancel: &CancellationToken,
    ) -> ControlOutcome {
        let mut state = ControlState::Idle;
        loop {
            if cancel.is_cancelled() {
                return ControlOutcome::Cancelled;
            }

            if let Some((command, peer)) = self.try_poll() {
                let next = state.apply(command, session);
                match (state, next) {
                    (ControlState::Idle, ControlState::Recording) => {
                        tracing::info!("Data collection started (from {})", peer);
                    }
                    (_, ControlState::Stopped) => {
                        tracing::info!("Data collection stopped (from {})", peer);
                        return ControlOutcome::Stopped {
                            at: Local::now().naive_local(),
                        };
                    }
                    _ if command == ControlCommand::Unrecognized => {
                        tracing::debug!("Ignoring unrecognized datagram from {}", peer);
                    }
                    _ => {
                        tracing::debug!("{:?} from {} leaves control state {:?}", command, peer, next);
                    }
                }
                state = next;
            }

            tokio::select! {
                _ = cancel.cancelled() => return ControlOutcome::Cancelled,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}
