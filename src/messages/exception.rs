use std::fmt;

use super::{ExceptionCode, ModbusPdu, EXCEPTION_FLAG};
use crate::error::{ModbusError, Result};

/// A slave's refusal of a request: the request's function code with the high
/// bit set, followed by one exception code.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ExceptionResponse {
    error_code: u8,
    exception_code: u8,
}

impl ExceptionResponse {
    pub fn new(error_code: u8, exception_code: u8) -> Result<Self> {
        if error_code <= EXCEPTION_FLAG {
            return Err(ModbusError::validation(format!(
                "error code out of range (0x80, 0xff]: {:#04x}",
                error_code
            )));
        }
        if exception_code < 1 {
            return Err(ModbusError::validation(format!(
                "exception code out of range [1, 0xff]: {:#04x}",
                exception_code
            )));
        }

        Ok(ExceptionResponse {
            error_code,
            exception_code,
        })
    }

    pub fn exception_code(&self) -> u8 {
        self.exception_code
    }

    /// Function code of the request that was refused.
    pub fn request_function_code(&self) -> u8 {
        self.error_code & !EXCEPTION_FLAG
    }

    pub fn exception_kind(&self) -> Option<ExceptionCode> {
        ExceptionCode::try_from(self.exception_code).ok()
    }
}

impl fmt::Display for ExceptionResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "modbus: exception {:#04x}:{:#04x}",
            self.error_code, self.exception_code
        )?;
        if let Some(kind) = self.exception_kind() {
            write!(f, " ({:?})", kind)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExceptionResponse {}

impl ModbusPdu for ExceptionResponse {
    fn function_code(&self) -> u8 {
        self.error_code
    }

    fn marshal(&self) -> Vec<u8> {
        vec![self.error_code, self.exception_code]
    }

    fn unmarshal(data: &[u8]) -> Result<Self> {
        if data.len() != 2 {
            return Err(ModbusError::decode(format!(
                "exactly 2 bytes required to unmarshal as ExceptionResponse: {:02x?}",
                data
            )));
        }

        ExceptionResponse::new(data[0], data[1]).map_err(ModbusError::into_decode)
    }
}
