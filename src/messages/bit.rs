use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use std::io::Cursor;

use super::{ModbusPdu, MAX_PDU_SIZE, MAX_READ_BIT_COUNT, MAX_WRITE_BIT_COUNT};
use crate::codec::builder::FrameBuilder;
use crate::codec::utils::{
    bools_to_bytes, bytes_to_bools, check_address_span, check_byte_count, check_function_code,
    packed_len,
};
use crate::error::{ModbusError, Result};

const COIL_ON: u16 = 0xFF00;
const COIL_OFF: u16 = 0x0000;

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ReadBitRequest {
    function_code: u8,
    start_address: u16,
    count: u16,
}

impl ReadBitRequest {
    pub fn new(function_code: u8, start_address: u16, count: u16) -> Result<Self> {
        check_function_code(function_code)?;
        if !(1..=MAX_READ_BIT_COUNT).contains(&count) {
            return Err(ModbusError::validation(format!(
                "count out of range [1, {:#x}]: {}",
                MAX_READ_BIT_COUNT, count
            )));
        }
        check_address_span(start_address, count, 0xFFFF)?;

        Ok(ReadBitRequest {
            function_code,
            start_address,
            count,
        })
    }

    pub fn start_address(&self) -> u16 {
        self.start_address
    }

    pub fn bit_count(&self) -> u16 {
        self.count
    }
}

impl ModbusPdu for ReadBitRequest {
    fn function_code(&self) -> u8 {
        self.function_code
    }

    fn marshal(&self) -> Vec<u8> {
        let mut buf = FrameBuilder::with_capacity(5);
        buf.write_u8(self.function_code)
            .write_u16(&[self.start_address, self.count]);
        buf.into_bytes()
    }

    fn unmarshal(data: &[u8]) -> Result<Self> {
        if data.len() != 5 {
            return Err(ModbusError::decode(format!(
                "exactly 5 bytes required to unmarshal as ReadBitRequest: {:02x?}",
                data
            )));
        }

        ReadBitRequest::new(
            data[0],
            BigEndian::read_u16(&data[1..3]),
            BigEndian::read_u16(&data[3..5]),
        )
        .map_err(ModbusError::into_decode)
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ReadBitResponse {
    function_code: u8,
    bit_values: Vec<u8>,
}

impl ReadBitResponse {
    /// `bit_values` is the packed bitset exactly as it travels on the wire.
    pub fn new(function_code: u8, bit_values: Vec<u8>) -> Result<Self> {
        check_function_code(function_code)?;
        if bit_values.is_empty() {
            return Err(ModbusError::validation("bit status must hold at least one byte"));
        }
        // function code, byte count
        if 1 + 1 + bit_values.len() > MAX_PDU_SIZE {
            return Err(ModbusError::validation(format!(
                "PDU exceeds size limit: {} bytes of bit status",
                bit_values.len()
            )));
        }

        Ok(ReadBitResponse {
            function_code,
            bit_values,
        })
    }

    pub fn from_bools(function_code: u8, bit_status: &[bool]) -> Result<Self> {
        let count = bit_status.len();
        if count < 1 || count > MAX_READ_BIT_COUNT as usize {
            return Err(ModbusError::validation(format!(
                "bit status count out of range [1, {}]: {}",
                MAX_READ_BIT_COUNT, count
            )));
        }

        ReadBitResponse::new(function_code, bools_to_bytes(bit_status))
    }

    pub fn values(&self) -> &[u8] {
        &self.bit_values
    }

    /// Unpacked bits, including the padding of the last byte.
    pub fn bit_values(&self) -> Vec<bool> {
        bytes_to_bools(&self.bit_values)
    }
}

impl ModbusPdu for ReadBitResponse {
    fn function_code(&self) -> u8 {
        self.function_code
    }

    fn marshal(&self) -> Vec<u8> {
        let mut buf = FrameBuilder::with_capacity(2 + self.bit_values.len());
        buf.write_u8(self.function_code)
            .write_u8(self.bit_values.len() as u8)
            .write_bytes(&self.bit_values);
        buf.into_bytes()
    }

    fn unmarshal(data: &[u8]) -> Result<Self> {
        if data.len() < 3 {
            return Err(ModbusError::decode(format!(
                "at least 3 bytes required to unmarshal as ReadBitResponse: {:02x?}",
                data
            )));
        }

        check_byte_count(data[1], &data[2..])?;

        ReadBitResponse::new(data[0], data[2..].to_vec()).map_err(ModbusError::into_decode)
    }
}

/// Single coil write. A slave echoes the request verbatim, so the same type
/// serves as the response.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct WriteSingleBitRequest {
    function_code: u8,
    start_address: u16,
    value: bool,
}

pub type WriteSingleBitResponse = WriteSingleBitRequest;

impl WriteSingleBitRequest {
    pub fn new(function_code: u8, start_address: u16, value: bool) -> Result<Self> {
        check_function_code(function_code)?;

        Ok(WriteSingleBitRequest {
            function_code,
            start_address,
            value,
        })
    }

    pub fn start_address(&self) -> u16 {
        self.start_address
    }

    pub fn bit_value(&self) -> bool {
        self.value
    }
}

impl ModbusPdu for WriteSingleBitRequest {
    fn function_code(&self) -> u8 {
        self.function_code
    }

    fn marshal(&self) -> Vec<u8> {
        let value = if self.value { COIL_ON } else { COIL_OFF };

        let mut buf = FrameBuilder::with_capacity(5);
        buf.write_u8(self.function_code)
            .write_u16(&[self.start_address, value]);
        buf.into_bytes()
    }

    fn unmarshal(data: &[u8]) -> Result<Self> {
        if data.len() != 5 {
            return Err(ModbusError::decode(format!(
                "exactly 5 bytes required to unmarshal as WriteSingleBitRequest: {:02x?}",
                data
            )));
        }

        let value = match BigEndian::read_u16(&data[3..5]) {
            COIL_ON => true,
            COIL_OFF => false,
            other => {
                return Err(ModbusError::decode(format!(
                    "invalid coil value {:#06x}, only 0xff00 and 0x0000 are allowed",
                    other
                )))
            }
        };

        WriteSingleBitRequest::new(data[0], BigEndian::read_u16(&data[1..3]), value)
            .map_err(ModbusError::into_decode)
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct WriteMultipleBitsRequest {
    function_code: u8,
    start_address: u16,
    count: u16,
    values: Vec<u8>,
}

impl WriteMultipleBitsRequest {
    /// `values` must hold exactly `ceil(count / 8)` packed bytes.
    pub fn new(function_code: u8, start_address: u16, count: u16, values: Vec<u8>) -> Result<Self> {
        check_function_code(function_code)?;
        check_write_bit_count(count)?;
        check_address_span(start_address, count, 0xFFFF)?;

        let expected_len = packed_len(count as usize);
        if values.len() != expected_len {
            return Err(ModbusError::validation(format!(
                "expected {} bytes of values for {} bits, got {}",
                expected_len,
                count,
                values.len()
            )));
        }

        Ok(WriteMultipleBitsRequest {
            function_code,
            start_address,
            count,
            values,
        })
    }

    pub fn from_bools(function_code: u8, start_address: u16, values: &[bool]) -> Result<Self> {
        let count = values.len();
        if count < 1 || count > MAX_WRITE_BIT_COUNT as usize {
            return Err(ModbusError::validation(format!(
                "number of values {} out of range [1, {:#06x}]",
                count, MAX_WRITE_BIT_COUNT
            )));
        }

        WriteMultipleBitsRequest::new(
            function_code,
            start_address,
            count as u16,
            bools_to_bytes(values),
        )
    }

    pub fn start_address(&self) -> u16 {
        self.start_address
    }

    pub fn count(&self) -> u16 {
        self.count
    }

    pub fn values(&self) -> &[u8] {
        &self.values
    }

    pub fn bit_values(&self) -> Vec<bool> {
        bytes_to_bools(&self.values)
    }
}

impl ModbusPdu for WriteMultipleBitsRequest {
    fn function_code(&self) -> u8 {
        self.function_code
    }

    fn marshal(&self) -> Vec<u8> {
        let mut buf = FrameBuilder::with_capacity(6 + self.values.len());
        buf.write_u8(self.function_code)
            .write_u16(&[self.start_address, self.count])
            .write_u8(self.values.len() as u8)
            .write_bytes(&self.values);
        buf.into_bytes()
    }

    fn unmarshal(data: &[u8]) -> Result<Self> {
        if data.len() < 7 {
            return Err(ModbusError::decode(format!(
                "at least 7 bytes required to unmarshal as WriteMultipleBitsRequest: {:02x?}",
                data
            )));
        }

        let mut header = Cursor::new(&data[..6]);
        let function_code = header.read_u8()?;
        let start_address = header.read_u16::<BigEndian>()?;
        let count = header.read_u16::<BigEndian>()?;
        let byte_count = header.read_u8()?;

        let values = &data[6..];
        check_byte_count(byte_count, values)?;

        if byte_count as usize != packed_len(count as usize) {
            return Err(ModbusError::decode(format!(
                "data length {} inconsistent with bit count {}, expected {} bytes of data",
                byte_count,
                count,
                packed_len(count as usize)
            )));
        }

        WriteMultipleBitsRequest::new(function_code, start_address, count, values.to_vec())
            .map_err(ModbusError::into_decode)
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct WriteMultipleBitsResponse {
    function_code: u8,
    start_address: u16,
    count: u16,
}

impl WriteMultipleBitsResponse {
    pub fn new(function_code: u8, start_address: u16, count: u16) -> Result<Self> {
        check_function_code(function_code)?;
        check_write_bit_count(count)?;
        check_address_span(start_address, count, 0xFFFF)?;

        Ok(WriteMultipleBitsResponse {
            function_code,
            start_address,
            count,
        })
    }

    pub fn start_address(&self) -> u16 {
        self.start_address
    }

    pub fn count(&self) -> u16 {
        self.count
    }
}

impl ModbusPdu for WriteMultipleBitsResponse {
    fn function_code(&self) -> u8 {
        self.function_code
    }

    fn marshal(&self) -> Vec<u8> {
        let mut buf = FrameBuilder::with_capacity(5);
        buf.write_u8(self.function_code)
            .write_u16(&[self.start_address, self.count]);
        buf.into_bytes()
    }

    fn unmarshal(data: &[u8]) -> Result<Self> {
        if data.len() != 5 {
            return Err(ModbusError::decode(format!(
                "exactly 5 bytes required to unmarshal as WriteMultipleBitsResponse: {:02x?}",
                data
            )));
        }

        WriteMultipleBitsResponse::new(
            data[0],
            BigEndian::read_u16(&data[1..3]),
            BigEndian::read_u16(&data[3..5]),
        )
        .map_err(ModbusError::into_decode)
    }
}

fn check_write_bit_count(count: u16) -> Result<()> {
    if !(1..=MAX_WRITE_BIT_COUNT).contains(&count) {
        return Err(ModbusError::validation(format!(
            "count out of range [1, {:#06x}]: {}",
            MAX_WRITE_BIT_COUNT, count
        )));
    }
    Ok(())
}
