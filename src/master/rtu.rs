use std::collections::HashMap;
use std::io;
use std::time::{Duration, Instant};

use log::debug;

use super::comm::{open_serial, RtuPort};
use super::Transport;
use crate::codec::rtu::{assemble_frame, decode_frame, MAX_FRAME_LENGTH};
use crate::error::{ModbusError, Result};
use crate::messages::{FunctionCode, ModbusPdu, RawPdu};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(300);

/// How many bytes follow the address and function code of a response.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ResponseShape {
    /// One byte count `N`, then `N` payload bytes and the CRC.
    ByteCounted,
    /// Address and quantity (or value) echoed back, then the CRC.
    FixedEcho,
    /// One exception code, then the CRC.
    Exception,
}

impl ResponseShape {
    fn fixed_remainder(self) -> Option<usize> {
        match self {
            ResponseShape::ByteCounted => None,
            ResponseShape::FixedEcho => Some(4 + 2),
            ResponseShape::Exception => Some(1 + 2),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RtuConfig {
    pub request_timeout: Duration,
    /// Response layout per response function code. Codes missing here are
    /// rejected as unsupported.
    pub response_shapes: HashMap<u8, ResponseShape>,
}

impl Default for RtuConfig {
    fn default() -> Self {
        let mut response_shapes = HashMap::new();

        for code in [
            FunctionCode::ReadCoils,
            FunctionCode::ReadDiscreteInputs,
            FunctionCode::ReadHoldingRegisters,
            FunctionCode::ReadInputRegisters,
        ] {
            response_shapes.insert(u8::from(code), ResponseShape::ByteCounted);
            response_shapes.insert(code.exception_code(), ResponseShape::Exception);
        }
        for code in [
            FunctionCode::WriteSingleCoil,
            FunctionCode::WriteSingleRegister,
            FunctionCode::WriteMultipleCoils,
            FunctionCode::WriteMultipleRegisters,
        ] {
            response_shapes.insert(u8::from(code), ResponseShape::FixedEcho);
            response_shapes.insert(code.exception_code(), ResponseShape::Exception);
        }

        RtuConfig {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            response_shapes,
        }
    }
}

impl RtuConfig {
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn with_response_shape(mut self, function_code: u8, shape: ResponseShape) -> Self {
        self.response_shapes.insert(function_code, shape);
        self
    }
}

/// Synchronous master over a serial line. One request at a time; callers
/// sharing a port must serialize access themselves.
pub struct RtuTransport<P> {
    /// `None` once closed.
    port: Option<P>,
    config: RtuConfig,
}

impl RtuTransport<Box<dyn serialport::SerialPort>> {
    pub fn open(device: &str, baud_rate: u32, config: RtuConfig) -> Result<Self> {
        let port = open_serial(device, baud_rate, config.request_timeout)?;
        Ok(RtuTransport::new(port, config))
    }
}

impl<P: RtuPort> RtuTransport<P> {
    pub fn new(port: P, config: RtuConfig) -> Self {
        RtuTransport {
            port: Some(port),
            config,
        }
    }

    pub fn config(&self) -> &RtuConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.port.is_none()
    }

    /// Hands the port back, or `None` if `close` already released it.
    pub fn into_inner(self) -> Option<P> {
        self.port
    }
}

impl<P: RtuPort> Transport for RtuTransport<P> {
    fn write_request(&mut self, slave_address: u8, request: &dyn ModbusPdu) -> Result<Option<RawPdu>> {
        let port = self.port.as_mut().ok_or(ModbusError::Closed)?;

        let frame = assemble_frame(slave_address, &request.marshal());
        debug!("modbus/rtu: sending {:02x?}", frame);

        let written = port.write(&frame)?;
        if written != frame.len() {
            return Err(ModbusError::ShortWrite {
                written,
                expected: frame.len(),
            });
        }
        port.flush()?;

        if slave_address == 0 {
            return Ok(None);
        }

        let deadline = Instant::now() + self.config.request_timeout;
        let response = read_response_frame(port, &self.config.response_shapes, slave_address, deadline)?;
        debug!("modbus/rtu: received {:02x?}", response);

        decode_frame(&response).map(Some)
    }

    /// Flushes and drops the port, which releases the device.
    fn close(&mut self) -> Result<()> {
        match self.port.take() {
            Some(mut port) => Ok(port.flush()?),
            None => Ok(()),
        }
    }
}

fn read_response_frame<P: RtuPort>(
    port: &mut P,
    response_shapes: &HashMap<u8, ResponseShape>,
    slave_address: u8,
    deadline: Instant,
) -> Result<Vec<u8>> {
    let mut frame = vec![0u8; MAX_FRAME_LENGTH];

    // read slave address and function code
    read_before(port, &mut frame[0..2], deadline)?;
    let (received_address, function_code) = (frame[0], frame[1]);

    if received_address != slave_address {
        return Err(ModbusError::UnexpectedSlaveAddress {
            sent: slave_address,
            received: received_address,
        });
    }

    let shape = response_shapes
        .get(&function_code)
        .copied()
        .ok_or(ModbusError::UnsupportedFunctionCode(function_code))?;

    let end = match shape.fixed_remainder() {
        Some(remainder) => {
            read_before(port, &mut frame[2..2 + remainder], deadline)?;
            2 + remainder
        }
        None => {
            read_before(port, &mut frame[2..3], deadline)?;
            let end = 3 + frame[2] as usize + 2;
            if end > MAX_FRAME_LENGTH {
                return Err(ModbusError::FrameLength(format!(
                    "response length {} exceeds maximum RTU frame length",
                    end
                )));
            }
            read_before(port, &mut frame[3..end], deadline)?;
            end
        }
    };

    frame.truncate(end);
    Ok(frame)
}

/// Fills `buf` completely, re-arming the port timeout before every read so
/// the whole response shares one deadline.
fn read_before<P: RtuPort>(port: &mut P, buf: &mut [u8], deadline: Instant) -> io::Result<()> {
    let mut filled = 0;

    while filled < buf.len() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "modbus/rtu: response deadline exceeded",
            ));
        }
        port.set_response_timeout(remaining)?;

        match port.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "modbus/rtu: port closed in the middle of a response",
                ))
            }
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            // sockets report an expired read timeout as WouldBlock
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                return Err(io::Error::new(io::ErrorKind::TimedOut, err))
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::messages::{
        reinterpret_as, ExceptionCode, Pdu, ReadRegisterRequest, ReadRegisterResponse,
        WriteMultipleRegistersRequest, WriteMultipleRegistersResponse, WriteSingleBitRequest,
    };
    use std::io::{self, Cursor, Read, Write};

    #[derive(Default)]
    struct MockPort {
        written: Vec<u8>,
        response: Cursor<Vec<u8>>,
        timeouts: Vec<Duration>,
        short_write: bool,
        /// When set, every read sleeps this long and yields a single byte.
        byte_delay: Option<Duration>,
    }

    impl MockPort {
        fn answering(response: Vec<u8>) -> Self {
            MockPort {
                response: Cursor::new(response),
                ..MockPort::default()
            }
        }
    }

    impl Read for MockPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.byte_delay {
                Some(delay) => {
                    std::thread::sleep(delay);
                    let n = buf.len().min(1);
                    self.response.read(&mut buf[..n])
                }
                None => self.response.read(buf),
            }
        }
    }

    impl Write for MockPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = if self.short_write { buf.len() / 2 } else { buf.len() };
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl RtuPort for MockPort {
        fn set_response_timeout(&mut self, timeout: Duration) -> io::Result<()> {
            self.timeouts.push(timeout);
            Ok(())
        }
    }

    fn mock_transport(response: Vec<u8>) -> RtuTransport<MockPort> {
        RtuTransport::new(MockPort::answering(response), RtuConfig::default())
    }

    #[test]
    fn test_write_then_read_registers() {
        let write_request =
            WriteMultipleRegistersRequest::from_u16s(0x10, 1, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10])
                .unwrap();
        let echo = WriteMultipleRegistersResponse::new(0x10, 1, 10).unwrap();

        let mut transport = mock_transport(assemble_frame(1, &echo.marshal()));
        let response = transport.write_request(1, &write_request).unwrap().unwrap();
        assert_eq!(reinterpret_as::<WriteMultipleRegistersResponse, _>(&response).unwrap(), echo);

        let port = transport.into_inner().unwrap();
        assert_eq!(port.written, assemble_frame(1, &write_request.marshal()));
        assert_eq!(&port.written[1..7], &[0x10, 0x00, 0x01, 0x00, 0x0A, 0x14]);
        assert!(!port.timeouts.is_empty());
        assert!(port.timeouts.iter().all(|t| *t <= DEFAULT_REQUEST_TIMEOUT));

        let read_request = ReadRegisterRequest::new(0x03, 0, 12).unwrap();
        let registers: Vec<u16> = (0..12).collect();
        let reply = ReadRegisterResponse::from_u16s(0x03, &registers).unwrap();

        let mut transport = mock_transport(assemble_frame(1, &reply.marshal()));
        let response = transport.write_request(1, &read_request).unwrap().unwrap();
        let decoded = Pdu::decode_response(0x03, &response).unwrap();
        assert_eq!(decoded, Pdu::ReadRegisterResponse(reply));
    }

    #[test]
    fn test_flipped_crc_is_rejected() {
        let echo = WriteMultipleRegistersResponse::new(0x10, 1, 10).unwrap();
        let mut frame = assemble_frame(1, &echo.marshal());
        let last = frame.len() - 1;
        frame[last] ^= 0x01;

        let request =
            WriteMultipleRegistersRequest::from_u16s(0x10, 1, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10])
                .unwrap();
        let err = mock_transport(frame.clone()).write_request(1, &request).unwrap_err();

        match err {
            ModbusError::BadCrc { got, want, frame: received } => {
                assert_ne!(got, want);
                assert_eq!(received, frame);
            }
            other => panic!("expected bad CRC, got {:?}", other),
        }
    }

    #[test]
    fn test_exception_response() {
        let request = ReadRegisterRequest::new(0x03, 0, 1).unwrap();
        let mut transport = mock_transport(assemble_frame(1, &[0x83, 0x02]));

        let response = transport.write_request(1, &request).unwrap().unwrap();
        match Pdu::decode_response(0x03, &response).unwrap() {
            Pdu::Exception(exception) => {
                assert_eq!(exception.exception_kind(), Some(ExceptionCode::IllegalDataAddress))
            }
            other => panic!("expected exception, got {:?}", other),
        }
    }

    #[test]
    fn test_broadcast_does_not_wait_for_response() {
        let request = WriteSingleBitRequest::new(0x05, 3, true).unwrap();
        let mut transport = mock_transport(vec![]);

        assert_eq!(transport.write_request(0, &request).unwrap(), None);

        let port = transport.into_inner().unwrap();
        assert_eq!(port.written, assemble_frame(0, &request.marshal()));
        assert!(port.timeouts.is_empty());
    }

    #[test]
    fn test_unexpected_slave_address() {
        let request = WriteSingleBitRequest::new(0x05, 3, true).unwrap();
        let mut transport = mock_transport(assemble_frame(2, &request.marshal()));

        assert!(matches!(
            transport.write_request(1, &request),
            Err(ModbusError::UnexpectedSlaveAddress { sent: 1, received: 2 })
        ));
    }

    #[test]
    fn test_unsupported_function_code_unless_configured() {
        let request = RawPdu::new(vec![0x2B, 0x0E, 0x01, 0x00]).unwrap();
        let reply = [0x2B, 0x03, 0x0E, 0x01, 0x01];

        let mut transport = mock_transport(assemble_frame(1, &reply));
        assert!(matches!(
            transport.write_request(1, &request),
            Err(ModbusError::UnsupportedFunctionCode(0x2B))
        ));

        let config = RtuConfig::default().with_response_shape(0x2B, ResponseShape::ByteCounted);
        let mut transport =
            RtuTransport::new(MockPort::answering(assemble_frame(1, &reply)), config);
        let response = transport.write_request(1, &request).unwrap().unwrap();
        assert_eq!(response.as_bytes(), &reply);
    }

    #[test]
    fn test_short_write_is_fatal() {
        let request = ReadRegisterRequest::new(0x03, 0, 1).unwrap();
        let port = MockPort {
            short_write: true,
            ..MockPort::default()
        };
        let mut transport = RtuTransport::new(port, RtuConfig::default());

        assert!(matches!(
            transport.write_request(1, &request),
            Err(ModbusError::ShortWrite { written: 4, expected: 8 })
        ));
    }

    #[test]
    fn test_truncated_response_is_an_io_error() {
        let request = ReadRegisterRequest::new(0x03, 0, 2).unwrap();
        let reply = ReadRegisterResponse::from_u16s(0x03, &[1, 2]).unwrap();
        let mut frame = assemble_frame(1, &reply.marshal());
        frame.truncate(frame.len() - 3);

        match mock_transport(frame).write_request(1, &request) {
            Err(ModbusError::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("expected i/o error, got {:?}", other),
        }
    }

    #[test]
    fn test_oversized_byte_count() {
        let request = ReadRegisterRequest::new(0x03, 0, 2).unwrap();
        let mut transport = mock_transport(vec![0x01, 0x03, 0xFF]);

        assert!(matches!(
            transport.write_request(1, &request),
            Err(ModbusError::FrameLength(_))
        ));
    }

    #[test]
    fn test_closed_transport_rejects_requests() {
        let request = ReadRegisterRequest::new(0x03, 0, 1).unwrap();
        let mut transport = mock_transport(vec![]);
        transport.close().unwrap();
        transport.close().unwrap();

        assert!(matches!(transport.write_request(1, &request), Err(ModbusError::Closed)));
        assert!(transport.is_closed());
        assert!(transport.into_inner().is_none());
    }

    #[test]
    fn test_slow_slave_hits_response_deadline() {
        let request = WriteSingleBitRequest::new(0x05, 3, true).unwrap();
        let port = MockPort {
            byte_delay: Some(Duration::from_millis(30)),
            ..MockPort::answering(assemble_frame(1, &request.marshal()))
        };
        let config = RtuConfig::default().with_request_timeout(Duration::from_millis(100));
        let mut transport = RtuTransport::new(port, config);

        let started = Instant::now();
        match transport.write_request(1, &request) {
            Err(ModbusError::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::TimedOut),
            other => panic!("expected a timed out read, got {:?}", other),
        }
        // eight bytes at 30ms each would take 240ms
        assert!(started.elapsed() < Duration::from_millis(200));

        let port = transport.into_inner().unwrap();
        assert!(port.timeouts.len() >= 2);
        assert!(port.timeouts[0] <= Duration::from_millis(100));
        assert!(port.timeouts.windows(2).all(|pair| pair[1] < pair[0]));
    }

    #[test]
    fn test_slow_slave_within_deadline() {
        let request = WriteSingleBitRequest::new(0x05, 3, true).unwrap();
        let port = MockPort {
            byte_delay: Some(Duration::from_millis(2)),
            ..MockPort::answering(assemble_frame(1, &request.marshal()))
        };
        let mut transport = RtuTransport::new(port, RtuConfig::default());

        let response = transport.write_request(1, &request).unwrap().unwrap();
        assert_eq!(response.as_bytes(), request.marshal().as_slice());
    }

    #[test]
    fn test_config_builders() {
        let config = RtuConfig::default().with_request_timeout(Duration::from_secs(1));
        assert_eq!(config.request_timeout, Duration::from_secs(1));
        assert_eq!(config.response_shapes.len(), 16);
        assert_eq!(config.response_shapes.get(&0x90), Some(&ResponseShape::Exception));
        assert_eq!(config.response_shapes.get(&0x0F), Some(&ResponseShape::FixedEcho));
    }
}
