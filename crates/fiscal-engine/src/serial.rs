//! Serial and USB serial transports

use std::io::{Read, Write};
use std::time::Duration;

use serialport::{available_ports, SerialPort, SerialPortType};
use tracing::{debug, info};

use crate::error::TransportError;
use crate::transport::ByteTransport;

/// Serial port transport
///
/// Reads only ever ask the driver for bytes it reports as buffered, so they
/// return immediately.
pub struct SerialTransport {
    name: String,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// Open a serial port by path
    pub fn open(name: &str, baud_rate: u32) -> Result<Self, TransportError> {
        let port = serialport::new(name, baud_rate)
            .timeout(Duration::from_millis(50))
            .open()?;
        info!("Opened {} at {} baud", name, baud_rate);
        Ok(Self {
            name: name.to_string(),
            port: Some(port),
        })
    }

    /// Open the USB serial adapter with the given `vid:pid` address
    pub fn open_usb(address: &str, baud_rate: u32) -> Result<Self, TransportError> {
        let (vid, pid) = parse_usb_address(address)?;
        let name = find_usb_port(vid, pid)?;
        Self::open(&name, baud_rate)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, TransportError> {
        self.port.as_mut().ok_or(TransportError::Closed)
    }
}

impl ByteTransport for SerialTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
        let port = self.port()?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(bytes.len())
    }

    fn read(&mut self, n: usize) -> Result<Vec<u8>, TransportError> {
        let available = self.bytes_available()?;
        let mut buf = vec![0u8; n.min(available)];
        if !buf.is_empty() {
            let read = self.port()?.read(&mut buf)?;
            buf.truncate(read);
        }
        Ok(buf)
    }

    fn read_all(&mut self) -> Result<Vec<u8>, TransportError> {
        let available = self.bytes_available()?;
        self.read(available)
    }

    fn bytes_available(&mut self) -> Result<usize, TransportError> {
        Ok(self.port()?.bytes_to_read()? as usize)
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!("Closed {}", self.name);
        }
    }
}

/// Parse a `vid:pid` pair written in hex
pub fn parse_usb_address(address: &str) -> Result<(u16, u16), TransportError> {
    let invalid = || TransportError::InvalidAddress(address.to_string());
    let (vid, pid) = address.split_once(':').ok_or_else(invalid)?;
    let vid = u16::from_str_radix(vid.trim(), 16).map_err(|_| invalid())?;
    let pid = u16::from_str_radix(pid.trim(), 16).map_err(|_| invalid())?;
    Ok((vid, pid))
}

/// Find the port name of the first USB serial device matching `vid`/`pid`
pub fn find_usb_port(vid: u16, pid: u16) -> Result<String, TransportError> {
    available_ports()?
        .into_iter()
        .find(|p| matches!(&p.port_type, SerialPortType::UsbPort(usb) if usb.vid == vid && usb.pid == pid))
        .map(|p| p.port_name)
        .ok_or(TransportError::NoDevice { vid, pid })
}
