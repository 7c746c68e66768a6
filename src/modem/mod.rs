//! # Modem Command/Response Engine
//!
//! This module owns the byte-level conversation with the cellular modem: framing the
//! incoming byte stream into response lines, deciding how long to wait for each command,
//! and classifying the outcome.
//!
//! ## Layers
//!
//! - [`collector`] - line framing state machine with overflow and inactivity handling
//! - [`timeout`] - signal-quality-aware timeout budget
//! - [`session`] - send a command, drive the collector, report a [`CommandOutcome`]
//! - [`serial`] - `serialport` backed [`ByteChannel`] (feature `serial`)
//! - [`scripted`] - in-memory [`ByteChannel`] replaying canned modem replies
//! - [`commands`] - AT command strings
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use trapwatch::modem::{CommandSession, ScriptedChannel, ProtocolLimits};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let channel = ScriptedChannel::new().respond("AT", "OK\r\n");
//!     let mut session = CommandSession::new(channel, ProtocolLimits::default());
//!     let outcome = session.execute("AT", Duration::from_millis(1000), false).await?;
//!     assert!(outcome.is_completed());
//!     Ok(())
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

pub mod collector;
pub mod commands;
pub mod scripted;
#[cfg(feature = "serial")]
pub mod serial;
pub mod session;
pub mod timeout;

pub use collector::{CommandOutcome, ResponseBuffer, ResponseCollector};
pub use scripted::ScriptedChannel;
#[cfg(feature = "serial")]
pub use serial::SerialModem;
pub use session::{CommandSession, ProtocolLimits};
pub use timeout::{SignalQuality, TimeoutPolicy};

/// Errors raised by the modem protocol layers.
///
/// Line overflow is deliberately absent: it is recorded on the [`ResponseBuffer`] and logged,
/// never propagated.
#[derive(Debug, Error)]
pub enum ModemError {
    /// No terminal marker line arrived within the effective budget.
    #[error("no terminal marker within {0:?}")]
    Timeout(Duration),

    /// The network time query returned an error location code.
    #[error("no network time fix (location code {0})")]
    NoFix(String),

    /// A response field did not have the expected shape.
    #[error("malformed response: {0}")]
    BadFormat(String),

    /// Network registration did not succeed within the attempt limit.
    #[error("network registration failed after {0} attempts")]
    RegistrationFailed(u32),

    /// The modem answered with an error marker line.
    #[error("modem rejected command: {0}")]
    Rejected(String),

    /// Alert recipient or body failed validation before anything was sent.
    #[error("invalid alert: {0}")]
    InvalidAlert(#[from] crate::validation::AlertValidationError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "serial")]
    #[error("serialport error: {0}")]
    Serialport(#[from] serialport::Error),
}

pub type Result<T> = std::result::Result<T, ModemError>;

/// Byte-level transport to the modem.
///
/// Reads are non-blocking: `read_byte` returns `Ok(None)` when nothing is pending and the
/// collector decides how long to idle before asking again.
pub trait ByteChannel {
    /// Take the next pending byte, if any.
    fn read_byte(&mut self) -> Result<Option<u8>>;

    /// Write all bytes and flush.
    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Drop everything currently pending on the receive side. Returns the number of bytes dropped.
    fn discard_input(&mut self) -> Result<usize> {
        let mut dropped = 0;
        while self.read_byte()?.is_some() {
            dropped += 1;
        }
        Ok(dropped)
    }
}

impl<C: ByteChannel + ?Sized> ByteChannel for Box<C> {
    fn read_byte(&mut self) -> Result<Option<u8>> {
        (**self).read_byte()
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        (**self).write_all(data)
    }

    fn discard_input(&mut self) -> Result<usize> {
        (**self).discard_input()
    }
}
