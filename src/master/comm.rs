use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

//This trait is meant to abstract serial ports and plain sockets carrying RTU frames
pub trait RtuPort: Read + Write {
    /// Bounds how long the next read may block.
    fn set_response_timeout(&mut self, timeout: Duration) -> io::Result<()>;
}

impl RtuPort for Box<dyn serialport::SerialPort> {
    fn set_response_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        serialport::SerialPort::set_timeout(&mut **self, timeout).map_err(io::Error::from)
    }
}

/// RTU framing over a TCP socket, as spoken by serial-to-ethernet gateways.
impl RtuPort for TcpStream {
    fn set_response_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        TcpStream::set_read_timeout(self, Some(timeout))
    }
}

pub fn open_serial(device: &str, baud_rate: u32, timeout: Duration) -> io::Result<Box<dyn serialport::SerialPort>> {
    serialport::new(device, baud_rate)
        .timeout(timeout)
        .open()
        .map_err(io::Error::from)
}
