//! Error taxonomy for the rig core.
//!
//! Wiring and startup code reports failures through `anyhow`; the types here
//! are the ones that cross component boundaries inside the core and need to
//! be matched on.

use thiserror::Error;

/// Failure of a single sensor-bus transaction.
///
/// Produced by [`PinIo`](crate::hardware::PinIo) backends and returned by the
/// retrying session once every attempt has failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The bus transaction failed (I2C NAK, timeout, garbled frame).
    #[error("bus i/o failed on pin {pin}: {reason}")]
    Io { pin: u8, reason: String },

    /// The backend has been released and no longer accepts transactions.
    #[error("bus released")]
    Released,
}

/// Why a temperature sample could not be used for this tick.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SensorReadError {
    #[error(transparent)]
    Bus(#[from] BusError),

    /// The sensor answered, but not with a number.
    #[error("sensor returned no reading")]
    NoReading,

    /// The reading is outside what a DHT sensor can physically report.
    #[error("implausible temperature {0}°C")]
    OutOfRange(f32),
}

/// Outcome of a rejected command.
///
/// Maps one-to-one onto the status codes of the remote command surface.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Malformed or out-of-range payload.
    #[error("{0}")]
    InvalidArgument(String),

    /// The command was valid but could not be carried out.
    #[error("{0}")]
    Processing(String),
}

impl CommandError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// HTTP-equivalent status code for this error.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::InvalidArgument(_) => 400,
            Self::Processing(_) => 500,
        }
    }
}

pub type CommandResult<T> = Result<T, CommandError>;
