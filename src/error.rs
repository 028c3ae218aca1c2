use std::time::Duration;

use thiserror::Error;

use crate::messages::ExceptionResponse;

pub type Result<T> = std::result::Result<T, ModbusError>;

#[derive(Error, Debug)]
pub enum ModbusError {
    /// A constructor was given an out-of-range field.
    #[error("modbus: {0}")]
    Validation(String),

    /// The byte layout of a PDU is inconsistent with the requested shape.
    #[error("modbus: decode error: {0}")]
    Decode(String),

    #[error("modbus: i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("modbus: short write: {written}/{expected}")]
    ShortWrite { written: usize, expected: usize },

    /// Checksum mismatch on a serial frame. Kept apart from the other
    /// protocol errors so callers can decide to retry.
    #[error("modbus: bad CRC; got: {got:04x}, want: {want:04x}, frame: {frame:02x?}")]
    BadCrc { got: u16, want: u16, frame: Vec<u8> },

    #[error("modbus: unexpected slave address, sent: {sent}, recv: {received}")]
    UnexpectedSlaveAddress { sent: u8, received: u8 },

    #[error("modbus: unsupported response function code: {0:#04x}")]
    UnsupportedFunctionCode(u8),

    #[error("modbus: unexpected function code, sent: {sent:#04x}, recv: {received:#04x}")]
    UnexpectedFunctionCode { sent: u8, received: u8 },

    #[error("modbus: unexpected transaction id: {0}")]
    UnexpectedTransactionId(u16),

    #[error("modbus: unexpected protocol id: {0}")]
    UnexpectedProtocolId(u16),

    #[error("modbus: unexpected unit id, sent: {sent}, recv: {received}")]
    UnexpectedUnitId { sent: u8, received: u8 },

    #[error("modbus: bad frame length: {0}")]
    FrameLength(String),

    #[error("{0}")]
    Exception(ExceptionResponse),

    #[error("modbus: timeout after {0:?} waiting for response")]
    Timeout(Duration),

    #[error("modbus: transport closed")]
    Closed,
}

impl ModbusError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        ModbusError::Validation(message.into())
    }

    pub(crate) fn decode(message: impl Into<String>) -> Self {
        ModbusError::Decode(message.into())
    }

    /// Bad checksums and timeouts are the only failures a caller can
    /// reasonably retry on the same connection.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ModbusError::BadCrc { .. } | ModbusError::Timeout(_))
    }

    /// Re-labels a constructor failure hit while unmarshalling as a decode
    /// failure.
    pub(crate) fn into_decode(self) -> Self {
        match self {
            ModbusError::Validation(message) => ModbusError::Decode(message),
            other => other,
        }
    }
}

impl From<serialport::Error> for ModbusError {
    fn from(err: serialport::Error) -> Self {
        ModbusError::Io(err.into())
    }
}
