use crate::error::{ModbusError, Result};

/// Packs bits LSB-first: index `i` lands in byte `i / 8`, bit `i % 8`.
pub fn bools_to_bytes(values: &[bool]) -> Vec<u8> {
    let mut result = vec![0u8; packed_len(values.len())];

    for (index, value) in values.iter().enumerate() {
        if *value {
            result[index / 8] |= 1 << (index % 8);
        }
    }
    result
}

/// Inverse of [`bools_to_bytes`]. Padding bits of the last byte are
/// returned too, so the result always holds `8 * data.len()` values.
pub fn bytes_to_bools(data: &[u8]) -> Vec<bool> {
    let mut values = Vec::with_capacity(data.len() * 8);
    for byte in data {
        for bit in 0..8 {
            values.push(byte & (1 << bit) != 0);
        }
    }
    values
}

/// Number of bytes needed to carry `count` packed bits.
pub fn packed_len(count: usize) -> usize {
    count.div_ceil(8)
}

/// Checks that the byte-count field of a list-carrying PDU matches the bytes
/// that actually follow it.
pub fn check_byte_count(byte_count: u8, payload: &[u8]) -> Result<()> {
    if payload.len() != byte_count as usize {
        return Err(ModbusError::decode(format!(
            "byte count field is {} but {} bytes of payload follow",
            byte_count,
            payload.len()
        )));
    }
    Ok(())
}

pub fn check_function_code(function_code: u8) -> Result<()> {
    if !(1..0x80).contains(&function_code) {
        return Err(ModbusError::validation(format!(
            "function code out of range [1, 0x80): {:#04x}",
            function_code
        )));
    }
    Ok(())
}

/// `start + count` must stay inside the 16-bit address space.
pub fn check_address_span(start: u16, count: u16, limit: u32) -> Result<()> {
    if start as u32 + count as u32 > limit {
        return Err(ModbusError::validation(format!(
            "requested addresses out of range: start address: {}, count: {}",
            start, count
        )));
    }
    Ok(())
}
