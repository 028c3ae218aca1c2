use byteorder::{ByteOrder, LittleEndian};

use super::builder::FrameBuilder;
use super::crc;
use crate::error::{ModbusError, Result};
use crate::messages::RawPdu;

/// Largest serial ADU: address, 253 byte PDU, CRC.
pub const MAX_FRAME_LENGTH: usize = 256;

/// Smallest decodable frame: address, two PDU bytes, CRC.
const MIN_FRAME_LENGTH: usize = 5;

/// `slave_address ‖ pdu ‖ crc16-le`
pub fn assemble_frame(slave_address: u8, pdu: &[u8]) -> Vec<u8> {
    let mut buf = FrameBuilder::with_capacity(1 + pdu.len() + 2);
    buf.write_u8(slave_address).write_bytes(pdu);
    buf.into_bytes_with_crc()
}

/// Validates the trailing CRC and strips address and CRC off the frame.
pub fn decode_frame(frame: &[u8]) -> Result<RawPdu> {
    if frame.len() < MIN_FRAME_LENGTH {
        return Err(ModbusError::FrameLength(format!(
            "rtu frame must be at least {} bytes long: {:02x?}",
            MIN_FRAME_LENGTH, frame
        )));
    }

    let (body, trailer) = frame.split_at(frame.len() - 2);
    let got = LittleEndian::read_u16(trailer);
    let want = crc::checksum(body);

    if got != want {
        return Err(ModbusError::BadCrc {
            got,
            want,
            frame: frame.to_vec(),
        });
    }

    RawPdu::new(body[1..].to_vec())
}
