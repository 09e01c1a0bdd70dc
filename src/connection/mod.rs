//! Long lived connection to a meter's TCP exposed P1 port.
//!
//! A [`supervisor::Supervisor`] owns exactly one transport at a time, frames the
//! incoming bytes into telegrams, decodes them and reports everything it does
//! through [`SupervisorEvent`]s. Callers control it with a
//! [`supervisor::SupervisorHandle`].

use crate::metering_dsmr::structs::Snapshot;
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};
use thiserror::Error;
#[cfg(feature = "api")]
use utoipa::ToSchema;

pub mod framer;
pub mod retry;
pub mod supervisor;
pub mod transport;

pub use supervisor::{Supervisor, SupervisorHandle};
pub use transport::{Connector, TcpConnector};

/// The byte that starts the last line of every telegram
pub const TELEGRAM_TERMINATOR: u8 = b'!';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "api", derive(ToSchema))]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    BackingOff,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::BackingOff => "backing_off",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "api", derive(ToSchema))]
pub struct MeterAddress {
    pub host: String,
    pub port: u16,
}

impl MeterAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        MeterAddress {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for MeterAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
    #[error("connection closed by peer")]
    Closed,
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("telegram exceeds {0} bytes without terminator")]
    TelegramTooLong(usize),
}

/// Everything a supervisor reports to its owner.
#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    Snapshot(Snapshot),
    /// A framed telegram that could not be decoded; the connection stays up
    DecodeError { reason: String, raw: String },
    ConnectionState(ConnectionState),
    /// Sent right before the supervisor enters `BackingOff`
    TransportError(String),
}

impl SupervisorEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SupervisorEvent::Snapshot(_) => "snapshot",
            SupervisorEvent::DecodeError { .. } => "decode error",
            SupervisorEvent::ConnectionState(_) => "state change",
            SupervisorEvent::TransportError(_) => "transport error",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorConfig {
    /// Name used as log prefix
    pub name: String,
    pub retry_delay: Duration,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_telegram_len: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        SupervisorConfig {
            name: "dsmr".to_string(),
            retry_delay: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(60),
            max_telegram_len: 16 * 1024,
        }
    }
}
