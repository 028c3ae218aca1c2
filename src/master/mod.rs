use async_trait::async_trait;

use crate::error::Result;
use crate::messages::{ModbusPdu, RawPdu};

pub mod comm;
mod context;
pub mod rtu;
pub mod tcp;

pub use comm::RtuPort;
pub use rtu::{ResponseShape, RtuConfig, RtuTransport};
pub use tcp::{TcpConfig, TcpTransport};

/// A master that exchanges one request at a time with the addressed slave.
pub trait Transport {
    /// Sends `request` to `slave_address` and returns the response PDU, or
    /// `None` for a broadcast (address 0), which no slave answers.
    fn write_request(&mut self, slave_address: u8, request: &dyn ModbusPdu) -> Result<Option<RawPdu>>;

    fn close(&mut self) -> Result<()>;
}

/// A master whose requests may be in flight concurrently.
#[async_trait]
pub trait AsyncTransport: Send + Sync {
    async fn write_request(&self, unit_id: u8, request: &dyn ModbusPdu) -> Result<RawPdu>;

    /// Fails every request still waiting with [`crate::error::ModbusError::Closed`].
    /// Calling it again has no effect.
    async fn close(&self) -> Result<()>;
}
