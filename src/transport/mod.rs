//! Transport module - the duplex byte channel under the bootloader protocol.
//!
//! Provides:
//! - [`Transport`] - async byte I/O plus DTR/RTS control lines
//! - [`SerialTransport`] - native serial port via `tokio-serial` (feature `serial`)
//! - [`StreamTransport`] - any tokio `AsyncRead + AsyncWrite` (TCP bridges, in-memory pipes)
//! - `mock::MockTransport` - scripted transport for tests (feature `mock`)
//!
//! Higher layers never issue concurrent reads and writes; every method takes
//! `&mut self`.

#[cfg(any(test, feature = "mock"))]
pub mod mock;
#[cfg(feature = "serial")]
mod serial;
mod stream;

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::TransportError;

#[cfg(feature = "serial")]
pub use serial::SerialTransport;
pub use stream::StreamTransport;

/// Maximum bytes pulled from the channel per read call.
const READ_CHUNK: usize = 256;

/// Byte channel to a bootloader.
///
/// `assert_reset` / `release_reset` are provided: they drive DTR and RTS and
/// only log when the channel has no control lines, since boards with
/// auto-reset circuitry do not need them.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Open the channel at the given baud rate.
    async fn open(&mut self, baud_rate: u32) -> Result<(), TransportError>;

    /// Drive the DTR line (`true` = asserted).
    async fn set_dtr(&mut self, level: bool) -> Result<(), TransportError>;

    /// Drive the RTS line (`true` = asserted).
    async fn set_rts(&mut self, level: bool) -> Result<(), TransportError>;

    /// Write all bytes.
    async fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Read exactly `count` bytes, or fail with [`TransportError::Timeout`]
    /// carrying the number of bytes that did arrive.
    async fn read_bytes(&mut self, count: usize, timeout: Duration)
        -> Result<Bytes, TransportError>;

    /// Drop any input received but not yet read.
    async fn clear_input(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Release the channel. Calling it again is a no-op.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Hold the target in reset (DTR and RTS asserted).
    async fn assert_reset(&mut self) {
        if let Err(e) = self.set_dtr(true).await {
            tracing::warn!("Could not assert DTR, relying on auto-reset: {}", e);
        }
        if let Err(e) = self.set_rts(true).await {
            tracing::warn!("Could not assert RTS, relying on auto-reset: {}", e);
        }
    }

    /// Let the target run into its bootloader.
    async fn release_reset(&mut self) {
        if let Err(e) = self.set_dtr(false).await {
            tracing::warn!("Could not release DTR: {}", e);
        }
        if let Err(e) = self.set_rts(false).await {
            tracing::warn!("Could not release RTS: {}", e);
        }
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    async fn open(&mut self, baud_rate: u32) -> Result<(), TransportError> {
        (**self).open(baud_rate).await
    }

    async fn set_dtr(&mut self, level: bool) -> Result<(), TransportError> {
        (**self).set_dtr(level).await
    }

    async fn set_rts(&mut self, level: bool) -> Result<(), TransportError> {
        (**self).set_rts(level).await
    }

    async fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).write_bytes(bytes).await
    }

    async fn read_bytes(
        &mut self,
        count: usize,
        timeout: Duration,
    ) -> Result<Bytes, TransportError> {
        (**self).read_bytes(count, timeout).await
    }

    async fn clear_input(&mut self) -> Result<(), TransportError> {
        (**self).clear_input().await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        (**self).close().await
    }
}

/// Accumulate `count` bytes from `reader` until `timeout` elapses.
///
/// End of stream is reported as an I/O error, not a timeout.
pub(crate) async fn read_with_deadline<R: AsyncRead + Unpin>(
    reader: &mut R,
    count: usize,
    timeout: Duration,
) -> Result<Bytes, TransportError> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut buf = BytesMut::with_capacity(count);
    let mut chunk = [0u8; READ_CHUNK];

    while buf.len() < count {
        let want = (count - buf.len()).min(READ_CHUNK);
        let n = match tokio::time::timeout_at(deadline, reader.read(&mut chunk[..want])).await {
            Err(_) => {
                return Err(TransportError::Timeout {
                    expected: count,
                    received: buf.len(),
                })
            }
            Ok(Ok(0)) => {
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("channel closed after {} of {} bytes", buf.len(), count),
                )))
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(TransportError::Io(e)),
        };
        buf.extend_from_slice(&chunk[..n]);
    }

    Ok(buf.freeze())
}
