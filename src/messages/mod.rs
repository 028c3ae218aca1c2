mod bit;
mod exception;
mod raw;
mod register;

use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::{ModbusError, Result};

pub use bit::{
    ReadBitRequest, ReadBitResponse, WriteMultipleBitsRequest, WriteMultipleBitsResponse,
    WriteSingleBitRequest, WriteSingleBitResponse,
};
pub use exception::ExceptionResponse;
pub use raw::RawPdu;
pub use register::{
    ReadRegisterRequest, ReadRegisterResponse, WriteMultipleRegistersRequest,
    WriteMultipleRegistersResponse, WriteSingleRegisterRequest, WriteSingleRegisterResponse,
};

pub const MAX_PDU_SIZE: usize = 253;
pub const MAX_READ_BIT_COUNT: u16 = 0x07D0;
pub const MAX_WRITE_BIT_COUNT: u16 = 0x07B0;
pub const MAX_WRITE_REGISTER_COUNT: u16 = 0x007B;

/// High bit that turns a function code into its exception response code.
pub const EXCEPTION_FLAG: u8 = 0x80;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum FunctionCode {
    ReadCoils = 0x01,
    ReadDiscreteInputs = 0x02,
    ReadHoldingRegisters = 0x03,
    ReadInputRegisters = 0x04,
    WriteSingleCoil = 0x05,
    WriteSingleRegister = 0x06,
    ReadExceptionStatus = 0x07, //RTU ONLY
    Diagnostic = 0x08,          //RTU ONLY
    GetCommEventCounter = 0x0B, //RTU ONLY
    GetCommEventLog = 0x0C,     //RTU ONLY
    WriteMultipleCoils = 0x0F,
    WriteMultipleRegisters = 0x10,
    ReportServerId = 0x11, //RTU ONLY
    ReadFileRecord = 0x14,
    WriteFileRecord = 0x15,
    MaskWriteRegister = 0x16,
    ReadWriteMultipleRegisters = 0x17,
    ReadFifoQueue = 0x18,
}

impl FunctionCode {
    /// Function code a slave answers with when it rejects this operation.
    pub fn exception_code(self) -> u8 {
        u8::from(self) | EXCEPTION_FLAG
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ExceptionCode {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    ServerDeviceFailure = 0x04,
    Acknowledge = 0x05,
    ServerDeviceBusy = 0x06,
    MemoryParityError = 0x08,
    GatewayPathUnavailable = 0x0A,
    GatewayTargetDeviceFailedToRespond = 0x0B,
}

/// Capabilities shared by every PDU shape.
///
/// Constructors validate their inputs, so `marshal` cannot fail. `unmarshal`
/// re-runs the same validation on the decoded fields.
pub trait ModbusPdu: fmt::Debug + Send + Sync {
    fn function_code(&self) -> u8;

    fn marshal(&self) -> Vec<u8>;

    fn unmarshal(data: &[u8]) -> Result<Self>
    where
        Self: Sized;

    /// Replaces `self` with the value decoded from `data`. On error `self`
    /// is left untouched.
    fn unmarshal_into(&mut self, data: &[u8]) -> Result<()>
    where
        Self: Sized,
    {
        *self = Self::unmarshal(data)?;
        Ok(())
    }
}

/// Marshals `source` and decodes the bytes as a `T`.
///
/// This is how an opaque PDU received by a transport becomes a typed
/// response.
pub fn reinterpret_as<T, S>(source: &S) -> Result<T>
where
    T: ModbusPdu,
    S: ModbusPdu + ?Sized,
{
    T::unmarshal(&source.marshal())
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Pdu {
    ReadBitRequest(ReadBitRequest),
    ReadBitResponse(ReadBitResponse),
    WriteSingleBit(WriteSingleBitRequest),
    WriteMultipleBitsRequest(WriteMultipleBitsRequest),
    WriteMultipleBitsResponse(WriteMultipleBitsResponse),
    ReadRegisterRequest(ReadRegisterRequest),
    ReadRegisterResponse(ReadRegisterResponse),
    WriteSingleRegister(WriteSingleRegisterRequest),
    WriteMultipleRegistersRequest(WriteMultipleRegistersRequest),
    WriteMultipleRegistersResponse(WriteMultipleRegistersResponse),
    Exception(ExceptionResponse),
    Raw(RawPdu),
}

impl Pdu {
    fn inner(&self) -> &dyn ModbusPdu {
        match self {
            Pdu::ReadBitRequest(pdu) => pdu,
            Pdu::ReadBitResponse(pdu) => pdu,
            Pdu::WriteSingleBit(pdu) => pdu,
            Pdu::WriteMultipleBitsRequest(pdu) => pdu,
            Pdu::WriteMultipleBitsResponse(pdu) => pdu,
            Pdu::ReadRegisterRequest(pdu) => pdu,
            Pdu::ReadRegisterResponse(pdu) => pdu,
            Pdu::WriteSingleRegister(pdu) => pdu,
            Pdu::WriteMultipleRegistersRequest(pdu) => pdu,
            Pdu::WriteMultipleRegistersResponse(pdu) => pdu,
            Pdu::Exception(pdu) => pdu,
            Pdu::Raw(pdu) => pdu,
        }
    }

    /// Decodes the answer to a request carrying `request_function_code`.
    ///
    /// `request_function_code | 0x80` always yields [`Pdu::Exception`]; any
    /// other mismatching code is an error. Function codes outside the bit and
    /// register families are handed back as [`Pdu::Raw`].
    pub fn decode_response(request_function_code: u8, response: &RawPdu) -> Result<Pdu> {
        let received = response.function_code();

        if received == request_function_code | EXCEPTION_FLAG {
            return Ok(Pdu::Exception(response.decode_as()?));
        }
        if received != request_function_code {
            return Err(ModbusError::UnexpectedFunctionCode {
                sent: request_function_code,
                received,
            });
        }

        let pdu = match FunctionCode::try_from(received) {
            Ok(FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs) => {
                Pdu::ReadBitResponse(response.decode_as()?)
            }
            Ok(FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters) => {
                Pdu::ReadRegisterResponse(response.decode_as()?)
            }
            Ok(FunctionCode::WriteSingleCoil) => Pdu::WriteSingleBit(response.decode_as()?),
            Ok(FunctionCode::WriteSingleRegister) => {
                Pdu::WriteSingleRegister(response.decode_as()?)
            }
            Ok(FunctionCode::WriteMultipleCoils) => {
                Pdu::WriteMultipleBitsResponse(response.decode_as()?)
            }
            Ok(FunctionCode::WriteMultipleRegisters) => {
                Pdu::WriteMultipleRegistersResponse(response.decode_as()?)
            }
            _ => Pdu::Raw(response.clone()),
        };
        Ok(pdu)
    }

    /// Turns an exception response into an error.
    pub fn into_result(self) -> Result<Pdu> {
        match self {
            Pdu::Exception(exception) => Err(ModbusError::Exception(exception)),
            other => Ok(other),
        }
    }
}

impl ModbusPdu for Pdu {
    fn function_code(&self) -> u8 {
        self.inner().function_code()
    }

    fn marshal(&self) -> Vec<u8> {
        self.inner().marshal()
    }

    /// Without a request to interpret them against, bytes decode as
    /// [`Pdu::Raw`].
    fn unmarshal(data: &[u8]) -> Result<Self> {
        Ok(Pdu::Raw(RawPdu::unmarshal(data)?))
    }
}

macro_rules! impl_from_for_pdu {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Pdu {
                fn from(pdu: $ty) -> Self {
                    Pdu::$variant(pdu)
                }
            }
        )*
    };
}

impl_from_for_pdu! {
    ReadBitRequest => ReadBitRequest,
    ReadBitResponse => ReadBitResponse,
    WriteSingleBit => WriteSingleBitRequest,
    WriteMultipleBitsRequest => WriteMultipleBitsRequest,
    WriteMultipleBitsResponse => WriteMultipleBitsResponse,
    ReadRegisterRequest => ReadRegisterRequest,
    ReadRegisterResponse => ReadRegisterResponse,
    WriteSingleRegister => WriteSingleRegisterRequest,
    WriteMultipleRegistersRequest => WriteMultipleRegistersRequest,
    WriteMultipleRegistersResponse => WriteMultipleRegistersResponse,
    Exception => ExceptionResponse,
    Raw => RawPdu,
}
