//! CRC-16/MODBUS: reflected polynomial 0xA001, initial register 0xFFFF.

const POLYNOMIAL: u16 = 0xA001;

const TABLE: [u16; 256] = build_table();

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ POLYNOMIAL;
            } else {
                crc >>= 1;
            }
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Incremental checksum. Feeding the input in pieces yields the same value
/// as a single call to [`checksum`] over the concatenation.
#[derive(Clone, Copy, Debug)]
pub struct Crc16 {
    register: u16,
}

impl Crc16 {
    pub fn new() -> Self {
        Crc16 { register: 0xFFFF }
    }

    pub fn write(&mut self, data: &[u8]) -> &mut Self {
        for byte in data {
            let index = (self.register ^ *byte as u16) & 0x00FF;
            self.register = (self.register >> 8) ^ TABLE[index as usize];
        }
        self
    }

    pub fn checksum(&self) -> u16 {
        self.register
    }
}

impl Default for Crc16 {
    fn default() -> Self {
        Crc16::new()
    }
}

pub fn checksum(data: &[u8]) -> u16 {
    Crc16::new().write(data).checksum()
}
