use bytes::{Bytes, BytesMut};

use super::{Error, PacketType};

/// Unsubscription request, framed like `Subscribe`.
#[derive(Debug, Clone)]
pub struct Unsubscribe {
    pub topic: Bytes,
}

impl Unsubscribe {
    pub(crate) fn read(payload: Bytes) -> Self {
        Self { topic: payload }
    }

    pub(crate) fn write(&self, stream: &mut BytesMut) -> Result<(), Error> {
        super::write_header(stream, PacketType::Unsub, self.topic.len())?;
        stream.extend_from_slice(&self.topic);
        Ok(())
    }
}
