use bytes::{Bytes, BytesMut};

use super::{Error, PacketType};

/// First packet of a session. The payload is the raw client id bytes; the
/// session layer rejects an empty id.
#[derive(Debug, Clone)]
pub struct Connect {
    pub client_id: Bytes,
}

impl Connect {
    pub(crate) fn read(payload: Bytes) -> Self {
        Self { client_id: payload }
    }

    pub(crate) fn write(&self, stream: &mut BytesMut) -> Result<(), Error> {
        super::write_header(stream, PacketType::Conn, self.client_id.len())?;
        stream.extend_from_slice(&self.client_id);
        Ok(())
    }
}
