pub mod codec;
pub mod error;
pub mod master;
pub mod messages;

pub use error::{ModbusError, Result};

pub use master::{AsyncTransport, Transport};
pub use master::{RtuConfig, RtuTransport, TcpConfig, TcpTransport};

pub use messages::{ModbusPdu, Pdu, RawPdu};
