use bytes::{Bytes, BytesMut};

use super::{Error, PacketType};

/// Subscription request. The payload is the raw topic bytes; the outer length
/// field bounds them, so no inner length prefix is needed.
#[derive(Debug, Clone)]
pub struct Subscribe {
    pub topic: Bytes,
}

impl Subscribe {
    pub(crate) fn read(payload: Bytes) -> Self {
        // An empty topic is representable on the wire; the session layer
        // ignores it.
        Self { topic: payload }
    }

    pub(crate) fn write(&self, stream: &mut BytesMut) -> Result<(), Error> {
        super::write_header(stream, PacketType::Sub, self.topic.len())?;
        stream.extend_from_slice(&self.topic);
        Ok(())
    }
}
