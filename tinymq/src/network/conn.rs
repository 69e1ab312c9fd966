use bytes::BytesMut;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

use crate::packet::{self, Packet};

use super::Error;

/// Connection between a client and the broker. Pure TCP read/write
/// management, packet at a time.
pub(crate) struct ClientConnection {
    stream: TcpStream,
    /// Read buffer: the socket is drained into it and whole frames are carved
    /// out, instead of reading the socket byte by byte.
    read: BytesMut,
    /// Write buffer: a packet is serialized here and flushed in one write.
    write: BytesMut,
}

impl ClientConnection {
    pub(crate) fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            read: BytesMut::new(),
            write: BytesMut::new(),
        }
    }

    /// Reads one packet, pulling more bytes from the socket until a whole
    /// frame is buffered.
    pub(crate) async fn read_packet(&mut self) -> Result<Packet, Error> {
        loop {
            let required = match Packet::read(&mut self.read) {
                Ok(packet) => return Ok(packet),
                Err(packet::Error::InsufficientBytes(n)) => n,
                Err(e) => return Err(Error::Packet(e)),
            };

            self.read_bytes(required).await?;
        }
    }

    /// Waits until at least `required` more bytes are buffered. A peer that
    /// closes between frames surfaces as `ConnectionAborted`; one that closes
    /// mid-frame as `ConnectionReset`.
    async fn read_bytes(&mut self, required: usize) -> Result<(), Error> {
        let mut total_read = 0;
        loop {
            let read = self.stream.read_buf(&mut self.read).await?;
            if 0 == read {
                return if self.read.is_empty() {
                    Err(Error::ConnectionAborted)
                } else {
                    Err(Error::ConnectionReset)
                };
            }

            total_read += read;
            if total_read >= required {
                return Ok(());
            }
        }
    }

    pub(crate) async fn write_packet(&mut self, packet: &Packet) -> Result<(), Error> {
        packet.write(&mut self.write)?;
        self.flush().await
    }

    async fn flush(&mut self) -> Result<(), Error> {
        if self.write.is_empty() {
            return Ok(());
        }

        self.stream.write_all(&self.write).await?;
        self.write.clear();
        Ok(())
    }
}
