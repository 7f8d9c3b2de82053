//! Native serial port transport.
//!
//! Wraps `tokio_serial::SerialStream`. DTR/RTS go through the
//! `serialport::SerialPort` trait that `SerialStream` implements.
//!
//! # Example
//!
//! ```ignore
//! use stk500_uploader::transport::{SerialTransport, Transport};
//!
//! let mut port = SerialTransport::new("/dev/ttyACM0");
//! port.open(115_200).await?;
//! ```

use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};

use super::{read_with_deadline, Transport};
use crate::error::TransportError;

/// [`Transport`] over an OS serial port.
pub struct SerialTransport {
    path: String,
    port: Option<SerialStream>,
}

impl SerialTransport {
    /// Create a transport for the named port (e.g. `/dev/ttyUSB0`, `COM3`).
    ///
    /// The port is not touched until [`Transport::open`].
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            port: None,
        }
    }

    /// Port name.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn port_mut(&mut self) -> Result<&mut SerialStream, TransportError> {
        self.port.as_mut().ok_or(TransportError::NotOpen)
    }
}

fn serial_err(e: tokio_serial::Error) -> TransportError {
    TransportError::Io(e.into())
}

impl Transport for SerialTransport {
    async fn open(&mut self, baud_rate: u32) -> Result<(), TransportError> {
        // Reopening at a new rate drops the previous handle first.
        self.port = None;

        let port = tokio_serial::new(&self.path, baud_rate)
            .open_native_async()
            .map_err(|e| TransportError::Open(format!("{}: {}", self.path, e)))?;

        tracing::debug!("Opened {} at {} baud", self.path, baud_rate);
        self.port = Some(port);
        Ok(())
    }

    async fn set_dtr(&mut self, level: bool) -> Result<(), TransportError> {
        self.port_mut()?
            .write_data_terminal_ready(level)
            .map_err(serial_err)
    }

    async fn set_rts(&mut self, level: bool) -> Result<(), TransportError> {
        self.port_mut()?
            .write_request_to_send(level)
            .map_err(serial_err)
    }

    async fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let port = self.port_mut()?;
        port.write_all(bytes).await?;
        port.flush().await?;
        Ok(())
    }

    async fn read_bytes(
        &mut self,
        count: usize,
        timeout: Duration,
    ) -> Result<Bytes, TransportError> {
        read_with_deadline(self.port_mut()?, count, timeout).await
    }

    async fn clear_input(&mut self) -> Result<(), TransportError> {
        self.port_mut()?
            .clear(ClearBuffer::Input)
            .map_err(serial_err)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.port.take().is_some() {
            tracing::debug!("Closed {}", self.path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_operations_before_open_fail() {
        let mut port = SerialTransport::new("/dev/does-not-exist");
        assert_eq!(port.path(), "/dev/does-not-exist");

        assert!(matches!(
            port.write_bytes(&[0x30, 0x20]).await,
            Err(TransportError::NotOpen)
        ));
        assert!(matches!(
            port.set_dtr(true).await,
            Err(TransportError::NotOpen)
        ));
        port.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_missing_port_reports_open_error() {
        let mut port = SerialTransport::new("/dev/does-not-exist");
        let err = port.open(115_200).await.unwrap_err();
        assert!(matches!(err, TransportError::Open(_)));
        assert!(err.to_string().contains("/dev/does-not-exist"));
    }
}
