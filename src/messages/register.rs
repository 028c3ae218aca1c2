use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use std::io::Cursor;

use super::{ModbusPdu, MAX_PDU_SIZE, MAX_WRITE_REGISTER_COUNT};
use crate::codec::builder::FrameBuilder;
use crate::codec::utils::{check_address_span, check_byte_count, check_function_code};
use crate::error::{ModbusError, Result};

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ReadRegisterRequest {
    function_code: u8,
    start_address: u16,
    count: u16,
}

impl ReadRegisterRequest {
    pub fn new(function_code: u8, start_address: u16, count: u16) -> Result<Self> {
        check_function_code(function_code)?;
        if start_address > 0xFF {
            return Err(ModbusError::validation(format!(
                "start address out of range [0, 0xff]: {}",
                start_address
            )));
        }
        check_address_span(start_address, count, 0xFF)?;

        // function code, byte count
        if 1 + 1 + 2 * count as usize > MAX_PDU_SIZE {
            return Err(ModbusError::validation(format!(
                "response to {} registers would exceed maximum PDU size",
                count
            )));
        }

        Ok(ReadRegisterRequest {
            function_code,
            start_address,
            count,
        })
    }

    pub fn start_address(&self) -> u16 {
        self.start_address
    }

    pub fn register_count(&self) -> u16 {
        self.count
    }
}

impl ModbusPdu for ReadRegisterRequest {
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
                "exactly 5 bytes required to unmarshal as ReadRegisterRequest: {:02x?}",
                data
            )));
        }

        ReadRegisterRequest::new(
            data[0],
            BigEndian::read_u16(&data[1..3]),
            BigEndian::read_u16(&data[3..5]),
        )
        .map_err(ModbusError::into_decode)
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ReadRegisterResponse {
    function_code: u8,
    values: Vec<u8>,
}

impl ReadRegisterResponse {
    /// `values` holds the register contents as sent, two bytes per register.
    pub fn new(function_code: u8, values: Vec<u8>) -> Result<Self> {
        check_function_code(function_code)?;
        if values.is_empty() {
            return Err(ModbusError::validation("register status must hold at least one register"));
        }
        if 1 + 1 + values.len() > MAX_PDU_SIZE {
            return Err(ModbusError::validation(format!(
                "response would exceed maximum PDU size: {} bytes of register status",
                values.len()
            )));
        }
        if values.len() % 2 != 0 {
            return Err(ModbusError::validation(format!(
                "register status should have an even number of bytes: {:02x?}",
                values
            )));
        }

        Ok(ReadRegisterResponse {
            function_code,
            values,
        })
    }

    pub fn from_u16s(function_code: u8, registers: &[u16]) -> Result<Self> {
        let mut buf = FrameBuilder::with_capacity(2 * registers.len());
        buf.write_u16(registers);
        ReadRegisterResponse::new(function_code, buf.into_bytes())
    }

    pub fn values(&self) -> &[u8] {
        &self.values
    }

    pub fn uint16(&self) -> Vec<u16> {
        self.values
            .chunks_exact(2)
            .map(BigEndian::read_u16)
            .collect()
    }

    /// Reads consecutive register pairs as IEEE-754 singles.
    ///
    /// The first register of each pair carries bits 15-0 and the second bits
    /// 31-16, so the words are swapped relative to a big-endian float.
    pub fn float32(&self) -> Result<Vec<f32>> {
        if self.values.len() % 4 != 0 {
            return Err(ModbusError::decode(format!(
                "need an even number of registers to interpret as float32s, got {}",
                self.values.len() / 2
            )));
        }

        Ok(self
            .values
            .chunks_exact(4)
            .map(|pair| {
                let low = BigEndian::read_u16(&pair[0..2]) as u32;
                let high = BigEndian::read_u16(&pair[2..4]) as u32;
                f32::from_bits(high << 16 | low)
            })
            .collect())
    }
}

impl ModbusPdu for ReadRegisterResponse {
    fn function_code(&self) -> u8 {
        self.function_code
    }

    fn marshal(&self) -> Vec<u8> {
        let mut buf = FrameBuilder::with_capacity(2 + self.values.len());
        buf.write_u8(self.function_code)
            .write_u8(self.values.len() as u8)
            .write_bytes(&self.values);
        buf.into_bytes()
    }

    fn unmarshal(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(ModbusError::decode(format!(
                "at least 4 bytes required to unmarshal as ReadRegisterResponse: {:02x?}",
                data
            )));
        }

        let byte_count = data[1];
        if byte_count % 2 != 0 {
            return Err(ModbusError::decode(format!(
                "byte count for read register response should be even: {}",
                byte_count
            )));
        }
        check_byte_count(byte_count, &data[2..])?;

        ReadRegisterResponse::new(data[0], data[2..].to_vec()).map_err(ModbusError::into_decode)
    }
}

/// Single register write; the slave echoes it, so it doubles as the
/// response.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct WriteSingleRegisterRequest {
    function_code: u8,
    address: u16,
    value: [u8; 2],
}

pub type WriteSingleRegisterResponse = WriteSingleRegisterRequest;

impl WriteSingleRegisterRequest {
    pub fn new(function_code: u8, address: u16, value: &[u8]) -> Result<Self> {
        check_function_code(function_code)?;
        let value: [u8; 2] = value.try_into().map_err(|_| {
            ModbusError::validation(format!("register value must be 2 bytes long: {:02x?}", value))
        })?;

        Ok(WriteSingleRegisterRequest {
            function_code,
            address,
            value,
        })
    }

    pub fn from_u16(function_code: u8, address: u16, value: u16) -> Result<Self> {
        WriteSingleRegisterRequest::new(function_code, address, &value.to_be_bytes())
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn value_u16(&self) -> u16 {
        u16::from_be_bytes(self.value)
    }
}

impl ModbusPdu for WriteSingleRegisterRequest {
    fn function_code(&self) -> u8 {
        self.function_code
    }

    fn marshal(&self) -> Vec<u8> {
        let mut buf = FrameBuilder::with_capacity(5);
        buf.write_u8(self.function_code)
            .write_u16(&[self.address])
            .write_bytes(&self.value);
        buf.into_bytes()
    }

    fn unmarshal(data: &[u8]) -> Result<Self> {
        if data.len() != 5 {
            return Err(ModbusError::decode(format!(
                "exactly 5 bytes required to unmarshal as WriteSingleRegisterRequest: {:02x?}",
                data
            )));
        }

        WriteSingleRegisterRequest::new(data[0], BigEndian::read_u16(&data[1..3]), &data[3..5])
            .map_err(ModbusError::into_decode)
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct WriteMultipleRegistersRequest {
    function_code: u8,
    address: u16,
    count: u16,
    values: Vec<u8>,
}

impl WriteMultipleRegistersRequest {
    /// The register count is derived from `values`, two bytes per register.
    pub fn new(function_code: u8, address: u16, values: Vec<u8>) -> Result<Self> {
        check_function_code(function_code)?;
        if values.len() % 2 != 0 {
            return Err(ModbusError::validation(format!(
                "number of values bytes not even: {}",
                values.len()
            )));
        }

        let count = values.len() / 2;
        if count < 1 || count > MAX_WRITE_REGISTER_COUNT as usize {
            return Err(ModbusError::validation(format!(
                "number of values {} out of range [1, {:#06x}]",
                count, MAX_WRITE_REGISTER_COUNT
            )));
        }
        let count = count as u16;
        check_address_span(address, count, 0xFFFF)?;

        Ok(WriteMultipleRegistersRequest {
            function_code,
            address,
            count,
            values,
        })
    }

    pub fn from_u16s(function_code: u8, address: u16, registers: &[u16]) -> Result<Self> {
        let mut buf = FrameBuilder::with_capacity(2 * registers.len());
        buf.write_u16(registers);
        WriteMultipleRegistersRequest::new(function_code, address, buf.into_bytes())
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn count(&self) -> u16 {
        self.count
    }

    pub fn values(&self) -> &[u8] {
        &self.values
    }
}

impl ModbusPdu for WriteMultipleRegistersRequest {
    fn function_code(&self) -> u8 {
        self.function_code
    }

    fn marshal(&self) -> Vec<u8> {
        let mut buf = FrameBuilder::with_capacity(6 + self.values.len());
        buf.write_u8(self.function_code)
            .write_u16(&[self.address, self.count])
            .write_u8(self.values.len() as u8)
            .write_bytes(&self.values);
        buf.into_bytes()
    }

    fn unmarshal(data: &[u8]) -> Result<Self> {
        if data.len() < 7 {
            return Err(ModbusError::decode(format!(
                "at least 7 bytes required to unmarshal as WriteMultipleRegistersRequest: {:02x?}",
                data
            )));
        }

        let mut header = Cursor::new(&data[..6]);
        let function_code = header.read_u8()?;
        let address = header.read_u16::<BigEndian>()?;
        let count = header.read_u16::<BigEndian>()?;
        let byte_count = header.read_u8()?;

        let values = &data[6..];
        check_byte_count(byte_count, values)?;

        if byte_count as usize != 2 * count as usize {
            return Err(ModbusError::decode(format!(
                "data length {} inconsistent with register count {}, expected {} bytes of data",
                byte_count,
                count,
                2 * count as usize
            )));
        }

        WriteMultipleRegistersRequest::new(function_code, address, values.to_vec())
            .map_err(ModbusError::into_decode)
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct WriteMultipleRegistersResponse {
    function_code: u8,
    address: u16,
    count: u16,
}

impl WriteMultipleRegistersResponse {
    pub fn new(function_code: u8, address: u16, count: u16) -> Result<Self> {
        check_function_code(function_code)?;
        if !(1..=MAX_WRITE_REGISTER_COUNT).contains(&count) {
            return Err(ModbusError::validation(format!(
                "count out of range [1, {:#06x}]: {}",
                MAX_WRITE_REGISTER_COUNT, count
            )));
        }
        check_address_span(address, count, 0xFFFF)?;

        Ok(WriteMultipleRegistersResponse {
            function_code,
            address,
            count,
        })
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn count(&self) -> u16 {
        self.count
    }
}

impl ModbusPdu for WriteMultipleRegistersResponse {
    fn function_code(&self) -> u8 {
        self.function_code
    }

    fn marshal(&self) -> Vec<u8> {
        let mut buf = FrameBuilder::with_capacity(5);
        buf.write_u8(self.function_code)
            .write_u16(&[self.address, self.count]);
        buf.into_bytes()
    }

    fn unmarshal(data: &[u8]) -> Result<Self> {
        if data.len() != 5 {
            return Err(ModbusError::decode(format!(
                "exactly 5 bytes required to unmarshal as WriteMultipleRegistersResponse: {:02x?}",
                data
            )));
        }

        WriteMultipleRegistersResponse::new(
            data[0],
            BigEndian::read_u16(&data[1..3]),
            BigEndian::read_u16(&data[3..5]),
        )
        .map_err(ModbusError::into_decode)
    }
}
