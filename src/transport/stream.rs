//! Transport over an already-connected tokio stream.
//!
//! Useful for serial-over-TCP bridges and for driving a simulated
//! bootloader through `tokio::io::duplex`. Streams have no control lines,
//! so reset relies on the board's auto-reset circuitry.
//!
//! # Example
//!
//! ```ignore
//! use stk500_uploader::transport::StreamTransport;
//!
//! let stream = tokio::net::TcpStream::connect("192.168.1.50:2000").await?;
//! let transport = StreamTransport::new(stream);
//! ```

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{read_with_deadline, Transport, READ_CHUNK};
use crate::error::TransportError;

/// [`Transport`] wrapping any `AsyncRead + AsyncWrite` stream.
pub struct StreamTransport<S> {
    stream: Option<S>,
    baud_rate: Option<u32>,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a connected stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream: Some(stream),
            baud_rate: None,
        }
    }

    /// Baud rate requested by the last `open` (informational only).
    pub fn baud_rate(&self) -> Option<u32> {
        self.baud_rate
    }

    /// True until `close` has been called.
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn stream_mut(&mut self) -> Result<&mut S, TransportError> {
        self.stream.as_mut().ok_or(TransportError::NotOpen)
    }
}

impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    async fn open(&mut self, baud_rate: u32) -> Result<(), TransportError> {
        // The stream is connected already; a closed one cannot be reopened.
        self.stream_mut()?;
        self.baud_rate = Some(baud_rate);
        Ok(())
    }

    async fn set_dtr(&mut self, _level: bool) -> Result<(), TransportError> {
        Err(TransportError::ControlLinesUnsupported)
    }

    async fn set_rts(&mut self, _level: bool) -> Result<(), TransportError> {
        Err(TransportError::ControlLinesUnsupported)
    }

    async fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream_mut()?;
        stream.write_all(bytes).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn read_bytes(
        &mut self,
        count: usize,
        timeout: Duration,
    ) -> Result<Bytes, TransportError> {
        read_with_deadline(self.stream_mut()?, count, timeout).await
    }

    /// Discard whatever is already buffered without waiting for more.
    async fn clear_input(&mut self) -> Result<(), TransportError> {
        let stream = self.stream_mut()?;
        let mut chunk = [0u8; READ_CHUNK];
        let mut dropped = 0usize;

        loop {
            match tokio::time::timeout(Duration::ZERO, stream.read(&mut chunk)).await {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(n)) => dropped += n,
                Ok(Err(e)) => return Err(e.into()),
            }
        }

        if dropped > 0 {
            tracing::debug!("Discarded {} stale input byte(s)", dropped);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
        }
        Ok(())
    }
}
