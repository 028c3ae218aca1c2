use super::ModbusPdu;
use crate::error::{ModbusError, Result};

/// Uninterpreted PDU bytes, as handed back by the transports.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RawPdu {
    bytes: Vec<u8>,
}

impl RawPdu {
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < 2 {
            return Err(ModbusError::validation(format!(
                "insufficient bytes for PDU: {:02x?}",
                bytes
            )));
        }
        Ok(RawPdu { bytes })
    }

    pub fn from_pdu<P: ModbusPdu + ?Sized>(pdu: &P) -> Result<Self> {
        RawPdu::new(pdu.marshal())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn decode_as<T: ModbusPdu>(&self) -> Result<T> {
        T::unmarshal(&self.bytes)
    }
}

impl ModbusPdu for RawPdu {
    fn function_code(&self) -> u8 {
        self.bytes[0]
    }

    fn marshal(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    fn unmarshal(data: &[u8]) -> Result<Self> {
        RawPdu::new(data.to_vec()).map_err(ModbusError::into_decode)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::messages::ReadBitRequest;

    #[test]
    fn test_minimum_length() {
        assert!(RawPdu::new(vec![]).is_err());
        assert!(RawPdu::new(vec![0x03]).is_err());
        assert!(matches!(RawPdu::unmarshal(&[0x03]), Err(ModbusError::Decode(_))));

        let raw = RawPdu::new(vec![0x83, 0x02]).unwrap();
        assert_eq!(raw.function_code(), 0x83);
        assert_eq!(raw.as_bytes(), &[0x83, 0x02]);
    }

    #[test]
    fn test_from_pdu_and_back() {
        let request = ReadBitRequest::new(0x02, 0, 8).unwrap();
        let raw = RawPdu::from_pdu(&request).unwrap();
        assert_eq!(raw.marshal(), request.marshal());
        assert_eq!(raw.decode_as::<ReadBitRequest>().unwrap(), request);
        assert_eq!(raw.into_bytes(), vec![0x02, 0x00, 0x00, 0x00, 0x08]);
    }
}
