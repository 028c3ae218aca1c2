use byteorder::{BigEndian, ByteOrder, LittleEndian};

use super::crc;

/// Append-only byte accumulator used to lay out PDUs and frames.
///
/// It performs no validation; whoever builds a frame is responsible for the
/// values it writes.
#[derive(Clone, Debug, Default)]
pub struct FrameBuilder {
    buf: Vec<u8>,
}

impl FrameBuilder {
    pub fn with_capacity(capacity: usize) -> Self {
        FrameBuilder {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn write_u8(&mut self, byte: u8) -> &mut Self {
        self.buf.push(byte);
        self
    }

    /// Appends each value big-endian.
    pub fn write_u16(&mut self, values: &[u16]) -> &mut Self {
        let mut word = [0u8; 2];
        for value in values {
            BigEndian::write_u16(&mut word, *value);
            self.buf.extend_from_slice(&word);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Finishes the buffer with the little-endian CRC-16 of everything
    /// written so far.
    pub fn into_bytes_with_crc(mut self) -> Vec<u8> {
        let mut word = [0u8; 2];
        LittleEndian::write_u16(&mut word, crc::checksum(&self.buf));
        self.buf.extend_from_slice(&word);
        self.buf
    }
}
