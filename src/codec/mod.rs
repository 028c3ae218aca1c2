//! Byte-level building blocks shared by the PDU codec and the transports.

pub mod builder;
pub mod crc;
pub mod rtu;
pub mod tcp;
pub mod utils;

pub use builder::FrameBuilder;
pub use crc::{checksum, Crc16};
pub use utils::{bools_to_bytes, bytes_to_bools};
