use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

use super::builder::FrameBuilder;
use crate::error::{ModbusError, Result};
use crate::messages::MAX_PDU_SIZE;

pub const MBAP_HEADER_LEN: usize = 7;

/// Protocol Identifier: 0u16 means Modbus
pub const MODBUS_PROTOCOL_ID: u16 = 0;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct MbapHeader {
    pub transaction_id: u16,
    pub protocol_id: u16,
    /// Byte count of everything after this field: unit id plus PDU.
    pub length: u16,
    pub unit_id: u8,
}

impl MbapHeader {
    pub fn parse(data: &[u8; MBAP_HEADER_LEN]) -> Result<Self> {
        let mut data = Cursor::new(&data[..]);

        Ok(MbapHeader {
            transaction_id: data.read_u16::<BigEndian>()?,
            protocol_id: data.read_u16::<BigEndian>()?,
            length: data.read_u16::<BigEndian>()?,
            unit_id: data.read_u8()?,
        })
    }

    /// Number of PDU bytes that follow the header. Fails when the length field
    /// cannot describe a PDU of at least two bytes and at most
    /// [`MAX_PDU_SIZE`].
    pub fn pdu_len(&self) -> Result<usize> {
        let length = self.length as usize;
        if length < 3 {
            return Err(ModbusError::FrameLength(format!(
                "short frame, expected frame to be at least 9 bytes long: {}",
                6 + length
            )));
        }
        if length - 1 > MAX_PDU_SIZE {
            return Err(ModbusError::FrameLength(format!(
                "frame too long: {}",
                6 + length
            )));
        }
        Ok(length - 1)
    }
}

/// `transaction_id ‖ protocol_id ‖ length ‖ unit_id ‖ pdu`
pub fn assemble_frame(transaction_id: u16, unit_id: u8, pdu: &[u8]) -> Vec<u8> {
    let mut buf = FrameBuilder::with_capacity(MBAP_HEADER_LEN + pdu.len());

    buf.write_u16(&[transaction_id, MODBUS_PROTOCOL_ID, (1 + pdu.len()) as u16])
        .write_u8(unit_id)
        .write_bytes(pdu);

    buf.into_bytes()
}
