//! Async packet framing over a byte stream.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use super::{MAX_PACKET_SIZE, Packet};
use crate::error::{Error, Result};

const READ_CHUNK: usize = 4096;

/// Buffered packet reader.
///
/// Unparsed bytes stay in the reader between calls, so a `read` cancelled by
/// a timeout loses nothing.
#[derive(Debug)]
pub struct PacketReader {
    buf: BytesMut,
    max_packet_size: usize,
}

impl Default for PacketReader {
    fn default() -> Self {
        Self::new(MAX_PACKET_SIZE)
    }
}

impl PacketReader {
    pub fn new(max_packet_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(READ_CHUNK),
            max_packet_size,
        }
    }

    /// Decode a packet that is already fully buffered.
    pub fn try_decode(&mut self) -> Result<Option<Packet>> {
        Ok(Packet::read(&mut self.buf, self.max_packet_size)?)
    }

    /// Read the next packet.
    ///
    /// Returns `Ok(None)` on EOF at a packet boundary. EOF inside a packet is
    /// [`Error::ConnectionClosed`].
    pub async fn read<R: AsyncRead + Unpin>(&mut self, reader: &mut R) -> Result<Option<Packet>> {
        loop {
            if let Some(packet) = self.try_decode()? {
                trace!("Read {} packet", packet.packet_type());
                return Ok(Some(packet));
            }

            self.buf.reserve(READ_CHUNK);
            let n = reader.read_buf(&mut self.buf).await?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(Error::ConnectionClosed);
            }
        }
    }

    /// Drop buffered bytes, used when the connection is replaced.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Number of buffered, not yet decoded bytes.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

/// Write a single packet to an async writer.
///
/// The packet is fully encoded before the first byte is written.
pub async fn write_packet<W: AsyncWrite + Unpin>(writer: &mut W, packet: &Packet) -> Result<()> {
    let mut buf = BytesMut::with_capacity(packet.size());
    packet.write(&mut buf)?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    trace!("Wrote {} packet ({} bytes)", packet.packet_type(), buf.len());
    Ok(())
}
