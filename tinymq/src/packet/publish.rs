use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{Error, PacketType, MAX_PAYLOAD_LEN, MAX_TOPIC_LEN};

/// Publish frame: one topic length byte, the topic bytes, then the message.
#[derive(Debug, Clone)]
pub struct Publish {
    pub topic: Bytes,
    pub message: Bytes,
}

impl Publish {
    /// Validates the frame limits up front so callers fail before anything
    /// reaches the wire.
    pub fn new(topic: impl Into<Bytes>, message: impl Into<Bytes>) -> Result<Self, Error> {
        let topic = topic.into();
        let message = message.into();
        if topic.is_empty() || topic.len() > MAX_TOPIC_LEN {
            return Err(Error::InvalidTopic);
        }
        if 1 + topic.len() + message.len() > MAX_PAYLOAD_LEN {
            return Err(Error::PayloadTooLarge);
        }
        Ok(Self { topic, message })
    }

    pub(crate) fn read(mut payload: Bytes) -> Result<Self, Error> {
        if payload.is_empty() {
            return Err(Error::MalformedPublish);
        }
        let topic_len = payload.get_u8() as usize;
        if topic_len == 0 || topic_len > payload.len() {
            return Err(Error::MalformedPublish);
        }
        let topic = payload.split_to(topic_len);
        Ok(Self {
            topic,
            message: payload,
        })
    }

    pub(crate) fn write(&self, stream: &mut BytesMut) -> Result<(), Error> {
        if self.topic.is_empty() || self.topic.len() > MAX_TOPIC_LEN {
            return Err(Error::InvalidTopic);
        }
        let payload_len = 1 + self.topic.len() + self.message.len();
        super::write_header(stream, PacketType::Pub, payload_len)?;
        stream.put_u8(self.topic.len() as u8);
        stream.extend_from_slice(&self.topic);
        stream.extend_from_slice(&self.message);
        Ok(())
    }
}
